use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nt_core::{
    AnalysisType, ArticleCache, ArticleOutcome, ArticleStorage, EnrichmentRecord, Error, NormalizedArticle,
    ProcessingConfig, Result,
};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on a cache refresh. The cache is advisory, so a slow cache
/// is abandoned rather than waited on.
const CACHE_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Builds the stored record for an analysed article from its successful results.
pub fn enrichment_record(
    article: &NormalizedArticle,
    outcome: &ArticleOutcome,
    source_type: &str,
    batch_id: Uuid,
) -> EnrichmentRecord {
    let ok = |analysis_type| outcome.result_for(analysis_type).filter(|r| r.is_success());

    let sentiment = ok(AnalysisType::Sentiment);
    let topics = ok(AnalysisType::Topics)
        .and_then(|r| r.field("topics"))
        .and_then(Value::as_array)
        .map(|topics| topics.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    EnrichmentRecord {
        article: article.clone(),
        source_type: source_type.to_string(),
        batch_id,
        summary: ok(AnalysisType::Summary).and_then(|r| r.str_field("summary")).map(str::to_string),
        sentiment_score: sentiment.and_then(|r| r.f64_field("sentiment_score")),
        sentiment_label: sentiment.and_then(|r| r.str_field("sentiment_label")).map(str::to_string),
        relevance_score: ok(AnalysisType::Relevance).and_then(|r| r.f64_field("relevance_score")),
        bias_score: ok(AnalysisType::Bias).and_then(|r| r.f64_field("bias_score")),
        topics,
        processed_at: Utc::now(),
    }
}

/// Writes analysed articles to storage and refreshes the article cache.
#[derive(Clone)]
pub struct Postprocessor {
    storage: Arc<dyn ArticleStorage>,
    cache: Option<Arc<dyn ArticleCache>>,
}

impl Postprocessor {
    pub fn new(storage: Arc<dyn ArticleStorage>) -> Self {
        Self { storage, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ArticleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Commits the enrichment fields and analysis rows in one write. Any
    /// storage failure comes back as [`Error::Persistence`]. The cache is only
    /// touched after a successful commit and its errors are logged, not returned.
    pub async fn persist(
        &self,
        article: &NormalizedArticle,
        outcome: &ArticleOutcome,
        source_type: &str,
        batch_id: Uuid,
        config: &ProcessingConfig,
    ) -> Result<()> {
        let record = enrichment_record(article, outcome, source_type, batch_id);

        self.storage
            .persist_enrichment(&record, &outcome.results)
            .await
            .map_err(|e| match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            })?;
        debug!(article_id = %article.id, "enrichment persisted");

        if config.enable_caching {
            if let Some(cache) = &self.cache {
                match tokio::time::timeout(CACHE_WRITE_TIMEOUT, cache.put(&record)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(article_id = %article.id, error = %e, "cache refresh failed"),
                    Err(_) => warn!(article_id = %article.id, "cache refresh timed out"),
                }
            }
        }
        Ok(())
    }
}
