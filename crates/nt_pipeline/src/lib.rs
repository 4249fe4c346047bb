pub mod coordinator;
pub mod dedup;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod postprocess;
pub mod retry;
pub mod validator;

pub use coordinator::AnalysisCoordinator;
pub use dedup::{content_hash, Deduplicator};
pub use executor::AnalysisExecutor;
pub use logging::{init_logging, Logger};
pub use orchestrator::BatchOrchestrator;
pub use postprocess::{enrichment_record, Postprocessor};
pub use retry::{retry_with_backoff, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};
pub use validator::normalize;

pub mod prelude {
    pub use super::{BatchOrchestrator, Sleeper};
    pub use nt_core::{BatchResult, ProcessingConfig, RawArticle, Result, SourceRecord};
    pub use tokio_util::sync::CancellationToken;
}
