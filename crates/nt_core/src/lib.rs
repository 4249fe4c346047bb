pub mod config;
pub mod error;
pub mod models;
pub mod sources;
pub mod storage;
pub mod types;

pub use config::{ProcessingConfig, SuccessPolicy};
pub use error::{Error, Result};
pub use models::{CompletionRequest, InferenceModel};
pub use sources::SourceRecord;
pub use storage::{ArticleCache, ArticleStorage, EnrichmentRecord};
pub use types::*;
