//! Cleanup and validation of one raw article. Pure and synchronous.

use nt_core::{Error, NormalizedArticle, ProcessingConfig, RawArticle, Result};
use url::Url;

use crate::dedup::content_hash;

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace inside lines and keeps at most one blank line between
/// paragraphs. Control characters other than newlines are dropped.
fn clean_content(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let line: String = line.chars().filter(|c| !c.is_control() || *c == '\t').collect();
        let line = collapse_whitespace(&line);
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(Error::Validation(format!(
            "{} length {} is outside [{}, {}]",
            field, len, min, max
        )));
    }
    Ok(())
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidUrl(format!("{} is not an http(s) URL", raw)));
    }
    Ok(url)
}

/// Validates and cleans `raw`.
///
/// With `enable_validation` off this never fails: fields are only trimmed
/// and whitespace-collapsed, and a missing id falls back to the content hash.
pub fn normalize(raw: &RawArticle, config: &ProcessingConfig) -> Result<NormalizedArticle> {
    let title = collapse_whitespace(&raw.title);
    let content = clean_content(&raw.content);
    let source = raw.source.trim().to_string();
    let raw_url = raw.url.trim();
    let id = raw.id.as_deref().map(str::trim).filter(|id| !id.is_empty());

    if !config.enable_validation {
        let url = parse_url(raw_url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| raw_url.to_string());
        let id = match id {
            Some(id) => id.to_string(),
            None if !url.is_empty() => url.clone(),
            None => content_hash(&title, &content).to_string(),
        };
        return Ok(NormalizedArticle {
            id,
            title,
            content,
            url,
            source,
            published_at: raw.published_at,
        });
    }

    if title.is_empty() {
        return Err(Error::Validation("title is empty".to_string()));
    }
    if content.is_empty() {
        return Err(Error::Validation("content is empty".to_string()));
    }
    if raw_url.is_empty() {
        return Err(Error::Validation("url is empty".to_string()));
    }
    if source.is_empty() {
        return Err(Error::Validation("source is empty".to_string()));
    }
    check_length("title", &title, config.min_title_length, config.max_title_length)?;
    check_length("content", &content, config.min_content_length, config.max_content_length)?;
    let url = parse_url(raw_url)?.to_string();

    Ok(NormalizedArticle {
        id: id.map(str::to_string).unwrap_or_else(|| url.clone()),
        title,
        content,
        url,
        source,
        published_at: raw.published_at,
    })
}
