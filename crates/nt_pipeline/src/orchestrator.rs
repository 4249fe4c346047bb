//! Batch entry points: splits a batch into chunks, runs each admitted
//! article through the analysis sequence and folds every outcome into one
//! [`BatchResult`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use nt_core::{
    ArticleCache, ArticleOutcome, ArticleStatus, ArticleStorage, BatchMetadata, BatchResult, BatchState,
    DuplicateArticle, Error, InferenceModel, NormalizedArticle, ProcessingConfig, RawArticle, Result,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::coordinator::AnalysisCoordinator;
use crate::dedup::{article_hash, Deduplicator};
use crate::executor::AnalysisExecutor;
use crate::logging::Logger;
use crate::postprocess::Postprocessor;
use crate::retry::{Sleeper, TokioSleeper};
use crate::validator::normalize;

/// Where an input article stands after validation and deduplication.
enum Admission {
    Admitted(usize, NormalizedArticle),
    Rejected(ArticleOutcome, String),
    Duplicate(DuplicateArticle),
}

/// What one input article contributes to the batch result.
enum Report {
    Outcome {
        outcome: ArticleOutcome,
        error: Option<String>,
    },
    Duplicate(DuplicateArticle),
}

/// State shared by every task of one run.
struct Run {
    batch_id: Uuid,
    source_type: String,
    config: ProcessingConfig,
    coordinator: AnalysisCoordinator,
    postprocessor: Postprocessor,
    cancel: CancellationToken,
    total: usize,
    logger: Logger,
}

impl Run {
    async fn process_chunk(self: Arc<Self>, chunk_no: usize, chunk: Vec<Admission>) -> Vec<Report> {
        self.logger
            .debug(&format!("📦 Starting chunk {} with {} articles", chunk_no + 1, chunk.len()));

        let mut reports = Vec::with_capacity(chunk.len());
        let mut tasks = Vec::new();
        for admission in chunk {
            match admission {
                Admission::Rejected(outcome, error) => reports.push(Report::Outcome {
                    outcome,
                    error: Some(error),
                }),
                Admission::Duplicate(duplicate) => reports.push(Report::Duplicate(duplicate)),
                Admission::Admitted(index, article) if self.config.enable_parallel_processing => {
                    let stub = stub_for(index, &article);
                    let handle = tokio::spawn(self.clone().process_article(index, article));
                    tasks.push((stub, handle));
                }
                Admission::Admitted(index, article) => {
                    reports.push(self.clone().process_article(index, article).await);
                }
            }
        }

        let (stubs, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        for (stub, joined) in stubs.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    let error = format!("InternalError: article {}: {}", stub.index, e);
                    self.logger.error(&error);
                    let mut outcome = stub;
                    outcome.error = Some(error.clone());
                    reports.push(Report::Outcome {
                        outcome,
                        error: Some(error),
                    });
                }
            }
        }
        reports
    }

    async fn process_article(self: Arc<Self>, index: usize, article: NormalizedArticle) -> Report {
        let logger = self.logger.for_article(index, self.total, &article.id);
        let span = logger.span().clone();
        self.analyse(index, article, logger).instrument(span).await
    }

    async fn analyse(&self, index: usize, article: NormalizedArticle, logger: Logger) -> Report {
        logger.debug(&format!("📰 Waiting to analyse: {}", article.title));
        let started = self
            .coordinator
            .process_unless_cancelled(index, &article, &self.config, &self.cancel)
            .await;
        let Some(mut outcome) = started else {
            logger.debug("🛑 Cancelled before the first analysis");
            let mut outcome = stub_for(index, &article);
            outcome.status = ArticleStatus::Cancelled;
            outcome.error = Some("Cancelled before analysis started".to_string());
            // Summarized once for the whole batch.
            return Report::Outcome { outcome, error: None };
        };
        let mut error = None;

        if outcome.status == ArticleStatus::Failed {
            let failed: Vec<&str> = outcome
                .results
                .iter()
                .filter(|r| !r.is_success())
                .map(|r| r.analysis_type.as_str())
                .collect();
            let summary = format!(
                "AnalysisError: article {}: {} of {} analyses failed ({})",
                article.id,
                failed.len(),
                outcome.results.len(),
                failed.join(", ")
            );
            logger.warn(&summary);
            outcome.error = Some(summary.clone());
            error = Some(summary);
        }

        if outcome.succeeded_count() > 0 {
            match self
                .postprocessor
                .persist(&article, &outcome, &self.source_type, self.batch_id, &self.config)
                .await
            {
                Ok(()) => {
                    outcome.persisted = true;
                    logger.debug("💾 Stored enrichment");
                }
                Err(e) => {
                    let summary = format!("PersistenceError: article {}: {}", article.id, e);
                    logger.error(&summary);
                    outcome.status = ArticleStatus::PersistenceFailed;
                    outcome.error = Some(summary.clone());
                    error = Some(summary);
                }
            }
        }

        logger.info(&format!(
            "✅ Done: {} of {} analyses succeeded ({:?})",
            outcome.succeeded_count(),
            outcome.results.len(),
            outcome.status
        ));
        Report::Outcome { outcome, error }
    }
}

/// Outcome used when an admitted article never reaches the coordinator.
fn stub_for(index: usize, article: &NormalizedArticle) -> ArticleOutcome {
    ArticleOutcome {
        index,
        article_id: article.id.clone(),
        url: article.url.clone(),
        title: article.title.clone(),
        source: article.source.clone(),
        content_hash: Some(article_hash(article)),
        status: ArticleStatus::Failed,
        results: Vec::new(),
        error: None,
        persisted: false,
        processing_time_ms: 0,
    }
}

/// Validates and deduplicates in input order, so the first of several
/// identical articles is always the one analysed.
///
/// Article ids are also unique within a batch: a later article whose id was
/// already admitted with different content is rejected, since both would be
/// stored under the same key.
fn admit(raw_articles: Vec<RawArticle>, config: &ProcessingConfig, dedup: &Deduplicator) -> Vec<Admission> {
    let mut ids = HashSet::new();
    let rejected = |index: usize, raw: &RawArticle, e: Error| {
        let error = format!("ValidationError: article {} ({}): {}", index, raw.url.trim(), e);
        let outcome = ArticleOutcome::rejected(index, raw, ArticleStatus::Invalid, error.clone());
        Admission::Rejected(outcome, error)
    };

    raw_articles
        .into_iter()
        .enumerate()
        .map(|(index, raw)| match normalize(&raw, config) {
            Err(e) => rejected(index, &raw, e),
            Ok(article) => {
                let hash = article_hash(&article);
                if !dedup.check_and_mark(&hash) {
                    Admission::Duplicate(DuplicateArticle {
                        index,
                        url: article.url,
                        content_hash: hash,
                    })
                } else if !ids.insert(article.id.clone()) {
                    let e = Error::Validation(format!("article id {} is already used in this batch", article.id));
                    rejected(index, &raw, e)
                } else {
                    Admission::Admitted(index, article)
                }
            }
        })
        .collect()
}

/// Runs batches of raw articles through validation, analysis and storage.
#[derive(Clone)]
pub struct BatchOrchestrator {
    model: Arc<dyn InferenceModel>,
    storage: Arc<dyn ArticleStorage>,
    cache: Option<Arc<dyn ArticleCache>>,
    sleeper: Arc<dyn Sleeper>,
}

impl BatchOrchestrator {
    pub fn new(model: Arc<dyn InferenceModel>, storage: Arc<dyn ArticleStorage>) -> Self {
        Self {
            model,
            storage,
            cache: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ArticleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Processes one batch.
    ///
    /// Fails only when `config` is invalid. Every per-article problem is
    /// reported inside the returned [`BatchResult`]. When `cancel` fires,
    /// articles that have not started yet come back as `Cancelled`; those
    /// already running finish their analysis sequence.
    pub async fn run(
        &self,
        raw_articles: Vec<RawArticle>,
        source_type: &str,
        config: &ProcessingConfig,
        cancel: CancellationToken,
    ) -> Result<BatchResult> {
        config.validate()?;

        let start = Instant::now();
        let batch_id = Uuid::new_v4();
        let total = raw_articles.len();
        let mut metadata = BatchMetadata {
            source_type: source_type.to_string(),
            state: BatchState::Created,
            chunk_count: total.div_ceil(config.batch_size),
            analysis_types: config.ordered_analysis_types(),
            success_policy: config.success_policy,
            duplicates: Vec::new(),
            cancelled_articles: 0,
            started_at: Utc::now(),
            completed_at: None,
        };

        let logger = Logger::for_batch(batch_id, source_type);
        logger.info(&format!(
            "🚀 Processing {} articles from '{}' in {} chunks",
            total, source_type, metadata.chunk_count
        ));

        let permits = Arc::new(Semaphore::new(config.max_concurrent_analyses));
        let executor = AnalysisExecutor::new(self.model.clone(), permits).with_sleeper(self.sleeper.clone());
        let mut postprocessor = Postprocessor::new(self.storage.clone());
        if let Some(cache) = &self.cache {
            postprocessor = postprocessor.with_cache(cache.clone());
        }
        let run = Arc::new(Run {
            batch_id,
            source_type: source_type.to_string(),
            config: config.clone(),
            coordinator: AnalysisCoordinator::new(executor),
            postprocessor,
            cancel,
            total,
            logger: logger.clone(),
        });

        metadata.state = BatchState::Running;
        let dedup = Deduplicator::new();
        let mut admissions = admit(raw_articles, config, &dedup).into_iter().peekable();
        let mut chunks = Vec::with_capacity(metadata.chunk_count);
        while admissions.peek().is_some() {
            chunks.push(admissions.by_ref().take(config.batch_size).collect::<Vec<_>>());
        }

        let concurrent_chunks = if config.enable_parallel_processing {
            config.max_concurrent_batches
        } else {
            1
        };
        let reports: Vec<Vec<Report>> = stream::iter(chunks.into_iter().enumerate())
            .map(|(chunk_no, chunk)| run.clone().process_chunk(chunk_no, chunk))
            .buffer_unordered(concurrent_chunks)
            .collect()
            .await;

        let mut results = Vec::with_capacity(total);
        let mut errors = Vec::new();
        let mut successful = 0;
        let mut failed = 0;
        for report in reports.into_iter().flatten() {
            match report {
                Report::Duplicate(duplicate) => metadata.duplicates.push(duplicate),
                Report::Outcome { outcome, error } => {
                    if outcome.status.is_success() {
                        successful += 1;
                    } else {
                        failed += 1;
                    }
                    if outcome.status == ArticleStatus::Cancelled {
                        metadata.cancelled_articles += 1;
                    }
                    if let Some(error) = error {
                        errors.push((outcome.index, error));
                    }
                    results.push(outcome);
                }
            }
        }
        results.sort_by_key(|o| o.index);
        errors.sort_by_key(|(index, _)| *index);
        metadata.duplicates.sort_by_key(|d| d.index);
        if metadata.cancelled_articles > 0 {
            errors.push((
                total,
                format!("Cancelled: {} articles were not processed", metadata.cancelled_articles),
            ));
        }

        metadata.state = BatchState::Completed;
        metadata.completed_at = Some(Utc::now());
        let result = BatchResult {
            batch_id,
            total_articles: total,
            successful_analyses: successful,
            failed_analyses: failed,
            duplicate_articles: metadata.duplicates.len(),
            processing_time_ms: start.elapsed().as_millis() as u64,
            results,
            errors: errors.into_iter().map(|(_, e)| e).collect(),
            metadata,
        };

        logger.info(&format!(
            "🏁 Completed: {} succeeded, {} failed, {} duplicates in {}ms",
            result.successful_analyses, result.failed_analyses, result.duplicate_articles, result.processing_time_ms
        ));
        Ok(result)
    }

    /// [`run`](Self::run) without external cancellation.
    pub async fn process_articles_batch(
        &self,
        raw_articles: Vec<RawArticle>,
        source_type: &str,
        config: &ProcessingConfig,
    ) -> Result<BatchResult> {
        self.run(raw_articles, source_type, config, CancellationToken::new()).await
    }

    /// A batch of exactly one article.
    pub async fn process_single_article(
        &self,
        raw_article: RawArticle,
        source_type: &str,
        config: &ProcessingConfig,
    ) -> Result<BatchResult> {
        self.process_articles_batch(vec![raw_article], source_type, config)
            .await
    }
}
