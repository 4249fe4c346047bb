use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::SuccessPolicy;

/// Article payload as handed to the pipeline. Nothing about it is trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// A validated, cleaned article. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedArticle {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Hex digest of an article's normalized title and content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Sentiment,
    Topics,
    Summary,
    Relevance,
    Bias,
}

impl AnalysisType {
    /// Execution order for a single article. Cheaper signals first so later
    /// stages can read them as context.
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::Sentiment,
        AnalysisType::Topics,
        AnalysisType::Summary,
        AnalysisType::Relevance,
        AnalysisType::Bias,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Sentiment => "sentiment",
            AnalysisType::Topics => "topics",
            AnalysisType::Summary => "summary",
            AnalysisType::Relevance => "relevance",
            AnalysisType::Bias => "bias",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    const THRESHOLD: f64 = 0.1;

    pub fn from_score(score: f64) -> Self {
        if score > Self::THRESHOLD {
            SentimentLabel::Positive
        } else if score < -Self::THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Succeeded,
    Failed,
}

/// Outcome of one analysis type for one article. A failed call is still a
/// result; `error_message` is set iff `status` is `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub article_id: String,
    pub analysis_type: AnalysisType,
    pub result: Map<String, Value>,
    pub confidence_score: f64,
    pub model_used: String,
    pub processing_time_ms: u64,
    pub attempts: u32,
    pub status: AnalysisStatus,
    pub error_message: Option<String>,
}

impl AnalysisResult {
    pub fn succeeded(
        article_id: &str,
        analysis_type: AnalysisType,
        result: Map<String, Value>,
        confidence_score: f64,
        model_used: &str,
    ) -> Self {
        Self {
            article_id: article_id.to_string(),
            analysis_type,
            result,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            model_used: model_used.to_string(),
            processing_time_ms: 0,
            attempts: 1,
            status: AnalysisStatus::Succeeded,
            error_message: None,
        }
    }

    pub fn failed(article_id: &str, analysis_type: AnalysisType, model_used: &str, error: impl Into<String>) -> Self {
        Self {
            article_id: article_id.to_string(),
            analysis_type,
            result: Map::new(),
            confidence_score: 0.0,
            model_used: model_used.to_string(),
            processing_time_ms: 0,
            attempts: 1,
            status: AnalysisStatus::Failed,
            error_message: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Succeeded
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.result.get(name)
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Value::as_f64)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    /// Analyses done and the success policy was met.
    Completed,
    /// Analyses done but the success policy was not met.
    Failed,
    /// Rejected by the validator; no analysis ran.
    Invalid,
    /// Analyses done but the transactional write failed.
    PersistenceFailed,
    /// Never started because the run was cancelled.
    Cancelled,
}

impl ArticleStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ArticleStatus::Completed)
    }
}

/// Sealed set of analysis results for one article within a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleOutcome {
    /// Position of the article in the caller's input list.
    pub index: usize,
    pub article_id: String,
    pub url: String,
    pub title: String,
    pub source: String,
    pub content_hash: Option<ContentHash>,
    pub status: ArticleStatus,
    pub results: Vec<AnalysisResult>,
    pub error: Option<String>,
    pub persisted: bool,
    pub processing_time_ms: u64,
}

impl ArticleOutcome {
    /// Seals the results of an analysed article, deciding its status from
    /// `policy`.
    pub fn analysed(
        index: usize,
        article: &NormalizedArticle,
        content_hash: ContentHash,
        results: Vec<AnalysisResult>,
        policy: SuccessPolicy,
    ) -> Self {
        let status = if policy.is_success(&results) {
            ArticleStatus::Completed
        } else {
            ArticleStatus::Failed
        };
        Self {
            index,
            article_id: article.id.clone(),
            url: article.url.clone(),
            title: article.title.clone(),
            source: article.source.clone(),
            content_hash: Some(content_hash),
            status,
            results,
            error: None,
            persisted: false,
            processing_time_ms: 0,
        }
    }

    /// Outcome of an article that never reached the analysis stage.
    pub fn rejected(index: usize, raw: &RawArticle, status: ArticleStatus, error: impl Into<String>) -> Self {
        Self {
            index,
            article_id: raw.id.clone().unwrap_or_else(|| raw.url.trim().to_string()),
            url: raw.url.trim().to_string(),
            title: raw.title.trim().to_string(),
            source: raw.source.trim().to_string(),
            content_hash: None,
            status,
            results: Vec::new(),
            error: Some(error.into()),
            persisted: false,
            processing_time_ms: 0,
        }
    }

    pub fn result_for(&self, analysis_type: AnalysisType) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.analysis_type == analysis_type)
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Created,
    Running,
    Completed,
}

/// An input article dropped because an earlier one had the same content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateArticle {
    pub index: usize,
    pub url: String,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub source_type: String,
    pub state: BatchState,
    pub chunk_count: usize,
    pub analysis_types: Vec<AnalysisType>,
    pub success_policy: SuccessPolicy,
    pub duplicates: Vec<DuplicateArticle>,
    pub cancelled_articles: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    /// Every submitted article, duplicates included.
    pub total_articles: usize,
    pub successful_analyses: usize,
    pub failed_analyses: usize,
    pub duplicate_articles: usize,
    pub processing_time_ms: u64,
    /// Ordered by input index.
    pub results: Vec<ArticleOutcome>,
    pub errors: Vec<String>,
    pub metadata: BatchMetadata,
}

impl BatchResult {
    pub fn is_fully_successful(&self) -> bool {
        self.failed_analyses == 0 && self.errors.is_empty()
    }

    pub fn outcome_at(&self, index: usize) -> Option<&ArticleOutcome> {
        self.results.iter().find(|o| o.index == index)
    }
}
