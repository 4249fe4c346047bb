//! Prompt construction and response parsing for each analysis type.

use nt_core::{AnalysisResult, AnalysisType};

mod parser;
mod prompts;

pub use parser::{parse_response, ParsedAnalysis, DEFAULT_CONFIDENCE};
pub use prompts::{build_request, split_prompt_article, SYSTEM_PROMPT};

/// Results already produced for the article, made available to later stages.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    previous: Vec<AnalysisResult>,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only successful results are kept; a failed stage contributes nothing.
    pub fn record(&mut self, result: &AnalysisResult) {
        if result.is_success() {
            self.previous.push(result.clone());
        }
    }

    pub fn get(&self, analysis_type: AnalysisType) -> Option<&AnalysisResult> {
        self.previous.iter().find(|r| r.analysis_type == analysis_type)
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }
}
