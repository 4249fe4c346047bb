use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::AnalysisType;
use crate::Result;

/// One call to the inference service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub prompt: String,
    /// Which analysis the prompt asks for. Informational for remote models.
    pub analysis_type: AnalysisType,
}

#[async_trait]
pub trait InferenceModel: Send + Sync + fmt::Debug {
    /// Name used in logs and recorded as `model_used` when the request does
    /// not name a model.
    fn name(&self) -> &str;

    /// Identifier recorded as `model_used` for a call that requested `requested`.
    fn model_id(&self, requested: &str) -> String {
        requested.to_string()
    }

    /// Sends the prompt and returns the raw completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
