use nt_core::{AnalysisType, Error, Result, SentimentLabel};
use serde_json::{Map, Value};

/// Confidence recorded when the model does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const MAX_TOPICS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub payload: Map<String, Value>,
    pub confidence: f64,
}

/// Returns the first balanced `{...}` in `text`, skipping fences and prose.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn malformed(analysis_type: AnalysisType, reason: impl std::fmt::Display) -> Error {
    Error::MalformedResponse(format!("{} response {}", analysis_type, reason))
}

fn number_in(
    object: &Map<String, Value>,
    key: &str,
    range: std::ops::RangeInclusive<f64>,
    analysis_type: AnalysisType,
) -> Result<f64> {
    let value = object
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed(analysis_type, format!("is missing numeric '{}'", key)))?;
    if !range.contains(&value) {
        return Err(malformed(
            analysis_type,
            format!("has '{}' = {} outside [{}, {}]", key, value, range.start(), range.end()),
        ));
    }
    Ok(value)
}

fn explanation(object: &Map<String, Value>) -> Value {
    Value::String(
        object
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
    )
}

/// Parses a raw completion into the payload for `analysis_type`.
///
/// Anything that does not satisfy the type's field contract is a
/// `MalformedResponse`.
pub fn parse_response(analysis_type: AnalysisType, text: &str) -> Result<ParsedAnalysis> {
    let json = extract_json_object(text).ok_or_else(|| malformed(analysis_type, "contains no JSON object"))?;
    let value: Value = serde_json::from_str(json).map_err(|e| malformed(analysis_type, e))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed(analysis_type, "is not a JSON object"))?;

    let confidence = match object.get("confidence") {
        Some(Value::Null) | None => DEFAULT_CONFIDENCE,
        Some(_) => number_in(object, "confidence", 0.0..=1.0, analysis_type)?,
    };

    let mut payload = Map::new();
    match analysis_type {
        AnalysisType::Sentiment => {
            let score = number_in(object, "sentiment_score", -1.0..=1.0, analysis_type)?;
            payload.insert("sentiment_score".to_string(), Value::from(score));
            payload.insert(
                "sentiment_label".to_string(),
                Value::from(SentimentLabel::from_score(score).as_str()),
            );
            payload.insert("explanation".to_string(), explanation(object));
        }
        AnalysisType::Topics => {
            let raw = object
                .get("topics")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed(analysis_type, "is missing 'topics' array"))?;
            let mut topics: Vec<String> = Vec::new();
            for topic in raw.iter().filter_map(Value::as_str) {
                let topic = topic.trim().to_lowercase();
                if !topic.is_empty() && !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
            if topics.is_empty() {
                return Err(malformed(analysis_type, "has no usable topics"));
            }
            topics.truncate(MAX_TOPICS);
            payload.insert("topics".to_string(), Value::from(topics));
        }
        AnalysisType::Summary => {
            let summary = object
                .get("summary")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| malformed(analysis_type, "is missing 'summary'"))?;
            payload.insert("summary".to_string(), Value::from(summary));
        }
        AnalysisType::Relevance => {
            let score = number_in(object, "relevance_score", 0.0..=1.0, analysis_type)?;
            payload.insert("relevance_score".to_string(), Value::from(score));
            payload.insert("explanation".to_string(), explanation(object));
        }
        AnalysisType::Bias => {
            let score = number_in(object, "bias_score", 0.0..=1.0, analysis_type)?;
            payload.insert("bias_score".to_string(), Value::from(score));
            payload.insert("explanation".to_string(), explanation(object));
        }
    }

    Ok(ParsedAnalysis { payload, confidence })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_sentiment() {
        let text = "Here you go:\n```json\n{\"sentiment_score\": -0.6, \"explanation\": \"grim\", \"confidence\": 0.9}\n```";
        let parsed = parse_response(AnalysisType::Sentiment, text).unwrap();
        assert_eq!(parsed.confidence, 0.9);
        assert_eq!(parsed.payload["sentiment_label"], "negative");
        assert_eq!(parsed.payload["explanation"], "grim");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"summary": "Officials said {nothing} new.", "confidence": 0.7} trailing"#;
        let parsed = parse_response(AnalysisType::Summary, text).unwrap();
        assert_eq!(parsed.payload["summary"], "Officials said {nothing} new.");
    }

    #[test]
    fn test_out_of_range_score_is_malformed() {
        let err = parse_response(AnalysisType::Bias, r#"{"bias_score": 1.5}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_missing_confidence_defaults() {
        let parsed = parse_response(AnalysisType::Relevance, r#"{"relevance_score": 0.4}"#).unwrap();
        assert_eq!(parsed.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(parsed.payload["explanation"], "");
    }

    #[test]
    fn test_topics_are_cleaned() {
        let parsed = parse_response(
            AnalysisType::Topics,
            r#"{"topics": [" Politics ", "politics", "", 3, "Economy"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.payload["topics"], serde_json::json!(["politics", "economy"]));
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(parse_response(AnalysisType::Summary, "I cannot help with that.").is_err());
        assert!(parse_response(AnalysisType::Summary, r#"{"summary": "#).is_err());
        assert!(parse_response(AnalysisType::Summary, r#"{"summary": "  "}"#).is_err());
    }
}
