use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nt_core::{AnalysisResult, ArticleStorage, EnrichmentRecord, Result};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryStore {
    articles: HashMap<String, EnrichmentRecord>,
    analyses: HashMap<String, Vec<AnalysisResult>>,
}

impl MemoryStore {
    fn persist(&mut self, record: &EnrichmentRecord, results: &[AnalysisResult]) {
        let id = record.article.id.clone();
        let cached: Vec<AnalysisResult> = results.iter().filter(|r| r.is_success()).cloned().collect();
        self.articles.insert(id.clone(), record.clone());
        self.analyses.insert(id, cached);
    }

    fn get_by_source(&self, source: &str) -> Vec<EnrichmentRecord> {
        let mut articles: Vec<EnrichmentRecord> = self
            .articles
            .values()
            .filter(|r| r.article.source == source)
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        articles
    }
}

/// Process-local storage. Both halves of a write happen under one lock, so
/// readers never observe an article without its analyses.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArticleStorage for MemoryStorage {
    async fn persist_enrichment(&self, record: &EnrichmentRecord, results: &[AnalysisResult]) -> Result<()> {
        let mut store = self.store.write().await;
        store.persist(record, results);
        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<EnrichmentRecord>> {
        Ok(self.store.read().await.articles.get(id).cloned())
    }

    async fn get_analyses(&self, id: &str) -> Result<Vec<AnalysisResult>> {
        Ok(self.store.read().await.analyses.get(id).cloned().unwrap_or_default())
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<EnrichmentRecord>> {
        Ok(self.store.read().await.get_by_source(source))
    }
}
