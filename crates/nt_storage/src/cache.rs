use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nt_core::{ArticleCache, EnrichmentRecord, Result};
use tokio::sync::RwLock;

/// In-process article cache keyed by article id, with a fixed time-to-live.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Instant, EnrichmentRecord)>>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArticleCache for MemoryCache {
    /// Expired entries are dropped on every write, so the map never holds
    /// more than what was stored within one ttl.
    async fn put(&self, record: &EnrichmentRecord) -> Result<()> {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(record.article.id.clone(), (Instant::now(), record.clone()));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<EnrichmentRecord>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(id)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, record)| record.clone()))
    }
}
