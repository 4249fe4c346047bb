use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AnalysisResult, NormalizedArticle};
use crate::Result;

/// Article row with the enrichment fields derived from its analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub article: NormalizedArticle,
    pub source_type: String,
    pub batch_id: Uuid,
    pub summary: Option<String>,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<String>,
    pub relevance_score: Option<f64>,
    pub bias_score: Option<f64>,
    pub topics: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Writes the article's enrichment fields and replaces its cached analysis
    /// rows. Both writes commit together or not at all.
    async fn persist_enrichment(&self, record: &EnrichmentRecord, results: &[AnalysisResult]) -> Result<()>;

    async fn get_article(&self, id: &str) -> Result<Option<EnrichmentRecord>>;

    async fn get_analyses(&self, id: &str) -> Result<Vec<AnalysisResult>>;

    /// Get all articles from a specific source
    async fn get_by_source(&self, source: &str) -> Result<Vec<EnrichmentRecord>>;
}

/// Fast lookup of recently processed articles. Best effort only.
#[async_trait]
pub trait ArticleCache: Send + Sync {
    async fn put(&self, record: &EnrichmentRecord) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<EnrichmentRecord>>;
}
