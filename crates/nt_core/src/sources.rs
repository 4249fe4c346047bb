//! Known upstream record shapes, converted into [`RawArticle`] at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RawArticle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum SourceRecord {
    Generic(RawArticle),
    Rss(RssItem),
    NewsApi(NewsApiArticle),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub feed: String,
    /// RFC 2822, as found in RSS `pubDate`.
    #[serde(default)]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub guid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsApiSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsApiArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: String,
    pub source: NewsApiSource,
    #[serde(default, rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
}

impl From<SourceRecord> for RawArticle {
    fn from(record: SourceRecord) -> Self {
        match record {
            SourceRecord::Generic(raw) => raw,
            SourceRecord::Rss(item) => {
                let published_at = item
                    .pub_date
                    .as_deref()
                    .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                    .map(|d| d.with_timezone(&Utc));
                RawArticle {
                    id: item.guid,
                    title: item.title,
                    content: item.description,
                    url: item.link,
                    source: item.feed,
                    published_at,
                }
            }
            SourceRecord::NewsApi(article) => {
                // NewsAPI truncates `content`; prefer it, but fall back to the description.
                let content = match (article.content, article.description) {
                    (Some(c), _) if !c.trim().is_empty() => c,
                    (_, Some(d)) => d,
                    _ => String::new(),
                };
                RawArticle {
                    id: None,
                    title: article.title,
                    content,
                    url: article.url,
                    source: article.source.id.unwrap_or(article.source.name),
                    published_at: article.published_at,
                }
            }
        }
    }
}
