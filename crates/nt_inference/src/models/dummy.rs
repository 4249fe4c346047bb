use std::fmt;

use nt_core::{AnalysisType, CompletionRequest, InferenceModel, Result};
use serde_json::json;

use crate::analysis::split_prompt_article;
use crate::Config;

const POSITIVE_WORDS: &[&str] = &[
    "gain", "gains", "growth", "improve", "improved", "success", "successful", "win", "wins", "record",
    "hope", "agreement", "recovery", "celebrate", "praised", "benefit", "strong", "rise", "boost",
];

const NEGATIVE_WORDS: &[&str] = &[
    "loss", "losses", "crisis", "decline", "fail", "failed", "war", "attack", "death", "deaths", "crash",
    "fear", "scandal", "collapse", "protest", "fall", "weak", "cut", "cuts", "violence",
];

const LOADED_WORDS: &[&str] = &[
    "clearly", "obviously", "outrageous", "disgraceful", "shocking", "radical", "extremist", "disaster",
    "must", "never", "always", "so-called", "corrupt", "absurd",
];

const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("politics", &["election", "government", "minister", "parliament", "vote", "senate", "president", "congress"]),
    ("economy", &["market", "economy", "inflation", "bank", "rates", "trade", "prices", "budget"]),
    ("technology", &["software", "technology", "tech", "digital", "startup", "ai", "internet", "data"]),
    ("health", &["health", "hospital", "vaccine", "disease", "doctors", "patients"]),
    ("sports", &["match", "team", "league", "goal", "championship", "tournament"]),
    ("environment", &["climate", "emissions", "energy", "weather", "pollution", "wildlife"]),
];

/// Offline model answering every analysis type with keyword heuristics.
pub struct DummyModel;

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel").finish()
    }
}

impl DummyModel {
    pub async fn new(_config: Option<Config>) -> Result<Self> {
        Ok(Self)
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn count_in(words: &[String], list: &[&str]) -> usize {
    words.iter().filter(|w| list.contains(&w.as_str())).count()
}

fn sentiment(text: &str) -> serde_json::Value {
    let words = words(text);
    let positive = count_in(&words, POSITIVE_WORDS) as f64;
    let negative = count_in(&words, NEGATIVE_WORDS) as f64;
    let score = if positive + negative == 0.0 {
        0.0
    } else {
        (positive - negative) / (positive + negative)
    };
    json!({
        "sentiment_score": score,
        "explanation": format!("{} positive and {} negative cue words", positive, negative),
        "confidence": 0.6,
    })
}

fn topics(text: &str) -> serde_json::Value {
    let words = words(text);
    let mut hits: Vec<(&str, usize)> = TOPIC_KEYWORDS
        .iter()
        .map(|(topic, keywords)| (*topic, count_in(&words, keywords)))
        .filter(|(_, n)| *n > 0)
        .collect();
    hits.sort_by(|a, b| b.1.cmp(&a.1));
    let mut topics: Vec<&str> = hits.into_iter().map(|(t, _)| t).collect();
    if topics.is_empty() {
        topics.push("general");
    }
    json!({ "topics": topics, "confidence": 0.5 })
}

fn summary(content: &str) -> serde_json::Value {
    let sentences: Vec<&str> = content
        .split(|c| c == '.' || c == '!' || c == '?')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();
    let summary = if sentences.is_empty() {
        content.split_whitespace().take(20).collect::<Vec<_>>().join(" ")
    } else {
        sentences.join(". ") + "."
    };
    json!({ "summary": summary, "confidence": 0.4 })
}

fn relevance(content: &str) -> serde_json::Value {
    let word_count = content.split_whitespace().count() as f64;
    let score = 0.3 + 0.7 * (word_count / 400.0).min(1.0);
    json!({
        "relevance_score": score,
        "explanation": format!("{} words of reporting", word_count),
        "confidence": 0.5,
    })
}

fn bias(content: &str) -> serde_json::Value {
    let words = words(content);
    let loaded = count_in(&words, LOADED_WORDS) as f64;
    let score = if words.is_empty() {
        0.0
    } else {
        (loaded * 20.0 / words.len() as f64).min(1.0)
    };
    json!({
        "bias_score": score,
        "explanation": format!("{} loaded terms", loaded),
        "confidence": 0.5,
    })
}

#[async_trait::async_trait]
impl InferenceModel for DummyModel {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn model_id(&self, _requested: &str) -> String {
        "dummy".to_string()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let (title, content) = split_prompt_article(&request.prompt).unwrap_or(("", request.prompt.as_str()));
        let full = format!("{} {}", title, content);

        let response = match request.analysis_type {
            AnalysisType::Sentiment => sentiment(&full),
            AnalysisType::Topics => topics(&full),
            AnalysisType::Summary => summary(content),
            AnalysisType::Relevance => relevance(content),
            AnalysisType::Bias => bias(content),
        };
        Ok(response.to_string())
    }
}
