use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{AnalysisResult, AnalysisType};
use crate::{Error, Result};

/// Decides whether an analysed article counts as successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Failed only when every configured analysis failed.
    #[default]
    AllFailed,
    /// Failed as soon as one configured analysis failed.
    AnyFailed,
}

impl SuccessPolicy {
    pub fn is_success(&self, results: &[AnalysisResult]) -> bool {
        if results.is_empty() {
            return false;
        }
        match self {
            SuccessPolicy::AllFailed => results.iter().any(AnalysisResult::is_success),
            SuccessPolicy::AnyFailed => results.iter().all(AnalysisResult::is_success),
        }
    }
}

/// Tunables for one pipeline run. Passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub max_concurrent_analyses: usize,
    #[serde(rename = "analysis_timeout_ms", with = "millis")]
    pub analysis_timeout: Duration,
    pub max_retries: u32,
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,
    pub min_title_length: usize,
    pub max_title_length: usize,
    pub min_content_length: usize,
    pub max_content_length: usize,
    pub enable_parallel_processing: bool,
    pub enable_caching: bool,
    pub enable_validation: bool,
    #[serde(rename = "cache_ttl_ms", with = "millis")]
    pub cache_ttl: Duration,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub analysis_types: Vec<AnalysisType>,
    pub success_policy: SuccessPolicy,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrent_batches: 3,
            max_concurrent_analyses: 5,
            analysis_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            min_title_length: 10,
            max_title_length: 500,
            min_content_length: 100,
            max_content_length: 50_000,
            enable_parallel_processing: true,
            enable_caching: true,
            enable_validation: true,
            cache_ttl: Duration::from_secs(3600),
            model_name: "deepseek-chat".to_string(),
            max_tokens: 1000,
            temperature: 0.3,
            analysis_types: AnalysisType::ALL.to_vec(),
            success_policy: SuccessPolicy::AllFailed,
        }
    }
}

impl ProcessingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Fatal precondition check; a run never starts with an invalid config.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be greater than 0".to_string()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(Error::InvalidConfig("max_concurrent_batches must be greater than 0".to_string()));
        }
        if self.max_concurrent_analyses == 0 {
            return Err(Error::InvalidConfig("max_concurrent_analyses must be greater than 0".to_string()));
        }
        if self.analysis_timeout.is_zero() {
            return Err(Error::InvalidConfig("analysis_timeout must be greater than 0".to_string()));
        }
        if self.min_title_length > self.max_title_length {
            return Err(Error::InvalidConfig(format!(
                "min_title_length ({}) exceeds max_title_length ({})",
                self.min_title_length, self.max_title_length
            )));
        }
        if self.min_content_length > self.max_content_length {
            return Err(Error::InvalidConfig(format!(
                "min_content_length ({}) exceeds max_content_length ({})",
                self.min_content_length, self.max_content_length
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::InvalidConfig(format!("temperature {} is outside [0, 2]", self.temperature)));
        }
        if self.max_tokens == 0 {
            return Err(Error::InvalidConfig("max_tokens must be greater than 0".to_string()));
        }
        if self.analysis_types.is_empty() {
            return Err(Error::InvalidConfig("at least one analysis type must be configured".to_string()));
        }
        Ok(())
    }

    /// Configured analysis types in canonical execution order, without repeats.
    pub fn ordered_analysis_types(&self) -> Vec<AnalysisType> {
        let mut types = self.analysis_types.clone();
        types.sort();
        types.dedup();
        types
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
