use nt_core::{AnalysisType, CompletionRequest, NormalizedArticle, ProcessingConfig};

use super::AnalysisContext;

pub const SYSTEM_PROMPT: &str =
    "You are a careful news analyst. Answer with a single JSON object and nothing else.";

const MAX_PROMPT_CONTENT_CHARS: usize = 6000;
const TITLE_MARKER: &str = "Title: ";
const CONTENT_MARKER: &str = "Content:\n";
const CONTENT_END: &str = "\n---\n";

fn instruction(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Sentiment => "Assess the overall sentiment of the following news article.",
        AnalysisType::Topics => "List the main topics covered by the following news article.",
        AnalysisType::Summary => "Summarize the following news article in two or three sentences.",
        AnalysisType::Relevance => {
            "Rate how newsworthy and broadly relevant the following article is for a general audience."
        }
        AnalysisType::Bias => "Rate how much editorial or political bias the following article shows.",
    }
}

fn response_schema(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Sentiment => {
            r#"{"sentiment_score": <number from -1.0 to 1.0>, "explanation": "<one sentence>", "confidence": <number from 0.0 to 1.0>}"#
        }
        AnalysisType::Topics => r#"{"topics": ["<topic>", ...], "confidence": <number from 0.0 to 1.0>}"#,
        AnalysisType::Summary => r#"{"summary": "<summary>", "confidence": <number from 0.0 to 1.0>}"#,
        AnalysisType::Relevance => {
            r#"{"relevance_score": <number from 0.0 to 1.0>, "explanation": "<one sentence>", "confidence": <number from 0.0 to 1.0>}"#
        }
        AnalysisType::Bias => {
            r#"{"bias_score": <number from 0.0 to 1.0>, "explanation": "<one sentence>", "confidence": <number from 0.0 to 1.0>}"#
        }
    }
}

fn topics_line(context: &AnalysisContext) -> Option<String> {
    let topics = context.get(AnalysisType::Topics)?.field("topics")?.as_array()?;
    let names: Vec<&str> = topics.iter().filter_map(|t| t.as_str()).collect();
    if names.is_empty() {
        return None;
    }
    Some(format!("Known topics: {}", names.join(", ")))
}

fn sentiment_line(context: &AnalysisContext) -> Option<String> {
    let sentiment = context.get(AnalysisType::Sentiment)?;
    let score = sentiment.f64_field("sentiment_score")?;
    let label = sentiment.str_field("sentiment_label").unwrap_or("unknown");
    Some(format!("Known sentiment: {} ({:.2})", label, score))
}

fn summary_line(context: &AnalysisContext) -> Option<String> {
    let summary = context.get(AnalysisType::Summary)?.str_field("summary")?;
    Some(format!("Known summary: {}", summary))
}

fn context_lines(analysis_type: AnalysisType, context: &AnalysisContext) -> Vec<String> {
    let lines = match analysis_type {
        AnalysisType::Sentiment | AnalysisType::Topics => vec![],
        AnalysisType::Summary => vec![sentiment_line(context), topics_line(context)],
        AnalysisType::Relevance => vec![summary_line(context), topics_line(context)],
        AnalysisType::Bias => vec![sentiment_line(context), summary_line(context)],
    };
    lines.into_iter().flatten().collect()
}

/// Builds the request for one analysis of one article. Earlier results in
/// `context` are appended after the article body.
pub fn build_request(
    article: &NormalizedArticle,
    analysis_type: AnalysisType,
    context: &AnalysisContext,
    config: &ProcessingConfig,
) -> CompletionRequest {
    let content: String = article.content.chars().take(MAX_PROMPT_CONTENT_CHARS).collect();
    let mut prompt = format!(
        "{}\n\n{}{}\nSource: {}\n{}{}{}",
        instruction(analysis_type),
        TITLE_MARKER,
        article.title,
        article.source,
        CONTENT_MARKER,
        content,
        CONTENT_END,
    );
    for line in context_lines(analysis_type, context) {
        prompt.push_str(&line);
        prompt.push('\n');
    }
    prompt.push_str("Respond only with a JSON object of the form:\n");
    prompt.push_str(response_schema(analysis_type));

    CompletionRequest {
        model: config.model_name.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        system: SYSTEM_PROMPT.to_string(),
        prompt,
        analysis_type,
    }
}

/// Recovers the title and article body from a prompt built by [`build_request`].
pub fn split_prompt_article(prompt: &str) -> Option<(&str, &str)> {
    let title_start = prompt.find(TITLE_MARKER)? + TITLE_MARKER.len();
    let title_end = title_start + prompt[title_start..].find('\n')?;
    let content_start = title_end + prompt[title_end..].find(CONTENT_MARKER)? + CONTENT_MARKER.len();
    let content_end = content_start + prompt[content_start..].rfind(CONTENT_END)?;
    Some((&prompt[title_start..title_end], &prompt[content_start..content_end]))
}
