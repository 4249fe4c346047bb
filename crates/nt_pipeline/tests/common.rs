// Shared fixtures for the orchestrator scenario tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nt_core::{
    AnalysisResult, AnalysisType, ArticleStorage, CompletionRequest, EnrichmentRecord, Error, InferenceModel,
    ProcessingConfig, RawArticle, Result,
};
use nt_inference::analysis::split_prompt_article;
use nt_pipeline::{BatchOrchestrator, Sleeper};
use nt_storage::MemoryStorage;
use tokio_util::sync::CancellationToken;

/// Well-formed answer for each analysis type.
pub fn canned_response(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Sentiment => r#"{"sentiment_score": 0.3, "explanation": "mildly upbeat", "confidence": 0.8}"#,
        AnalysisType::Topics => r#"{"topics": ["city", "transport"], "confidence": 0.7}"#,
        AnalysisType::Summary => r#"{"summary": "Something happened in the city.", "confidence": 0.6}"#,
        AnalysisType::Relevance => r#"{"relevance_score": 0.5, "explanation": "local news"}"#,
        AnalysisType::Bias => r#"{"bias_score": 0.1, "explanation": "neutral wording"}"#,
    }
}

/// Articles seen by the model between their first call starting and their
/// last call finishing.
#[derive(Debug, Default)]
struct ArticleGauge {
    started_calls: HashMap<String, usize>,
    finished_calls: HashMap<String, usize>,
    active: usize,
    max_active: usize,
    events: Vec<(String, bool)>,
}

/// Inference model with scripted failures and call instrumentation.
///
/// Articles are recognised by the title embedded in the prompt. The article
/// gauge assumes every article makes one call per analysis type, so it is
/// only meaningful for runs without failures.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    failing: Mutex<HashSet<(String, AnalysisType)>>,
    failing_titles: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<(String, AnalysisType), u32>>,
    total_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    cancel_on_first_call: Option<CancellationToken>,
    articles: Mutex<ArticleGauge>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fires `token` as soon as the first call arrives.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_first_call = Some(token);
        self
    }

    /// Every call for `analysis_type` on the article titled `title` fails with a 503.
    pub fn fail(self, title: &str, analysis_type: AnalysisType) -> Self {
        self.failing.lock().unwrap().insert((title.to_string(), analysis_type));
        self
    }

    /// Every call for the article titled `title` fails with a 503.
    pub fn fail_article(self, title: &str) -> Self {
        self.failing_titles.lock().unwrap().insert(title.to_string());
        self
    }

    pub fn calls_for(&self, title: &str, analysis_type: AnalysisType) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&(title.to_string(), analysis_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Most articles that were mid-sequence at the same moment.
    pub fn max_articles_in_flight(&self) -> usize {
        self.articles.lock().unwrap().max_active
    }

    /// `(title, true)` when an article's first call starts, `(title, false)`
    /// when its last call finishes, in the order they happened.
    pub fn article_events(&self) -> Vec<(String, bool)> {
        self.articles.lock().unwrap().events.clone()
    }

    fn article_call_started(&self, title: &str) {
        let mut gauge = self.articles.lock().unwrap();
        let first = {
            let calls = gauge.started_calls.entry(title.to_string()).or_insert(0);
            *calls += 1;
            *calls == 1
        };
        if first {
            gauge.active += 1;
            gauge.max_active = gauge.max_active.max(gauge.active);
            gauge.events.push((title.to_string(), true));
        }
    }

    fn article_call_finished(&self, title: &str) {
        let mut gauge = self.articles.lock().unwrap();
        let last = {
            let calls = gauge.finished_calls.entry(title.to_string()).or_insert(0);
            *calls += 1;
            *calls == AnalysisType::ALL.len()
        };
        if last {
            gauge.active -= 1;
            gauge.events.push((title.to_string(), false));
        }
    }
}

#[async_trait]
impl InferenceModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let title = split_prompt_article(&request.prompt)
            .map(|(title, _)| title.to_string())
            .unwrap_or_default();
        let key = (title.clone(), request.analysis_type);
        *self.calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
        if self.total_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(token) = &self.cancel_on_first_call {
                token.cancel();
            }
        }

        self.article_call_started(&title);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.article_call_finished(&title);

        let fails = self.failing.lock().unwrap().contains(&key) || self.failing_titles.lock().unwrap().contains(&title);
        if fails {
            return Err(Error::Upstream {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(canned_response(request.analysis_type).to_string())
    }
}

/// Memory storage that refuses writes for chosen article ids.
#[derive(Default)]
pub struct FailingStorage {
    inner: MemoryStorage,
    reject: HashSet<String>,
}

impl FailingStorage {
    pub fn rejecting(ids: &[&str]) -> Self {
        Self {
            inner: MemoryStorage::new(),
            reject: ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ArticleStorage for FailingStorage {
    async fn persist_enrichment(&self, record: &EnrichmentRecord, results: &[AnalysisResult]) -> Result<()> {
        if self.reject.contains(&record.article.id) {
            return Err(Error::Database("constraint violation".to_string()));
        }
        self.inner.persist_enrichment(record, results).await
    }

    async fn get_article(&self, id: &str) -> Result<Option<EnrichmentRecord>> {
        self.inner.get_article(id).await
    }

    async fn get_analyses(&self, id: &str) -> Result<Vec<AnalysisResult>> {
        self.inner.get_analyses(id).await
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<EnrichmentRecord>> {
        self.inner.get_by_source(source).await
    }
}

/// Backoff sleeps return immediately.
#[derive(Debug, Default)]
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

pub fn url_for(slug: &str) -> String {
    format!("https://news.example.com/{}", slug)
}

/// A valid article; the body is long enough for [`test_config`].
pub fn article(title: &str, slug: &str) -> RawArticle {
    RawArticle {
        id: None,
        title: title.to_string(),
        content: format!("{} was reported this morning. Officials gave further details at noon.", title),
        url: url_for(slug),
        source: "example".to_string(),
        published_at: None,
    }
}

pub fn test_config() -> ProcessingConfig {
    ProcessingConfig {
        batch_size: 2,
        max_concurrent_batches: 3,
        max_concurrent_analyses: 4,
        min_title_length: 5,
        min_content_length: 20,
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

pub fn orchestrator(model: Arc<ScriptedModel>, storage: Arc<dyn ArticleStorage>) -> BatchOrchestrator {
    BatchOrchestrator::new(model, storage).with_sleeper(Arc::new(NoSleep))
}
