use nt_core::Result;

pub mod analysis;
pub mod models;

/// Selects and configures the inference backend.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    /// Backend name: `dummy` or `deepseek`.
    pub model_name: Option<String>,
    /// Base URL of an OpenAI-compatible endpoint, overriding the backend default.
    pub model_url: Option<String>,
}

pub mod prelude {
    pub use super::analysis::{build_request, parse_response, AnalysisContext, ParsedAnalysis};
    pub use super::models::create_model;
    pub use super::Config;
    pub use nt_core::{CompletionRequest, Error, InferenceModel, Result};
}

pub use analysis::{build_request, parse_response, AnalysisContext, ParsedAnalysis};
pub use models::create_model;

/// Checks that a model URL is usable before any request goes out.
pub fn parse_model_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|e| nt_core::Error::InvalidUrl(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(nt_core::Error::InvalidUrl(format!("unsupported scheme '{}' in {}", other, raw))),
    }
}
