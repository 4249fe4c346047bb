use std::sync::Arc;

use nt_core::{ArticleStorage, Error, Result};

pub mod backends;
pub mod cache;

pub use backends::*;
pub use cache::MemoryCache;

/// Storage backends compiled into this build.
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = vec!["memory"];
    if cfg!(feature = "sqlite") {
        backends.push("sqlite");
    }
    backends
}

/// Opens the named backend. `backend_url` is backend specific; for SQLite it
/// is the database file path.
pub async fn create_storage(kind: &str, backend_url: Option<&str>) -> Result<Arc<dyn ArticleStorage>> {
    match kind {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = std::path::PathBuf::from(backend_url.unwrap_or(sqlite::DEFAULT_DB_PATH));
            Ok(Arc::new(SQLiteStorage::new_with_path(&path).await?))
        }
        other => {
            let _ = backend_url;
            Err(Error::Storage(format!(
                "Unknown storage backend '{}'. Available backends: {}",
                other,
                available_backends().join(", ")
            )))
        }
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::cache::MemoryCache;
    pub use super::create_storage;
}
