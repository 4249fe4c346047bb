use std::collections::HashSet;
use std::sync::Mutex;

use nt_core::{ContentHash, NormalizedArticle};
use sha2::{Digest, Sha256};

/// SHA-256 over the case-folded title and content.
pub fn content_hash(title: &str, content: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(title.to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(content.to_lowercase().as_bytes());
    ContentHash::new(format!("{:x}", hasher.finalize()))
}

pub fn article_hash(article: &NormalizedArticle) -> ContentHash {
    content_hash(&article.title, &article.content)
}

/// Content hashes seen during one batch run. Never shared across runs.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<ContentHash>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<ContentHash>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seen(&self, hash: &ContentHash) -> bool {
        self.lock().contains(hash)
    }

    pub fn mark_seen(&self, hash: ContentHash) {
        self.lock().insert(hash);
    }

    /// Atomically marks `hash` as seen. Returns `true` if it was new.
    pub fn check_and_mark(&self, hash: &ContentHash) -> bool {
        self.lock().insert(hash.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
