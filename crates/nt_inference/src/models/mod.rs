use std::sync::Arc;

use nt_core::{Error, Result};

pub mod deepseek;
pub mod dummy;

pub use deepseek::DeepSeekModel;
pub use dummy::DummyModel;
pub use nt_core::InferenceModel;

use crate::Config;

/// Builds the configured inference backend. Defaults to the offline dummy model.
pub async fn create_model(config: Option<Config>) -> Result<Arc<dyn InferenceModel>> {
    let config = config.unwrap_or_default();
    let name = config.model_name.as_deref().unwrap_or("dummy").to_lowercase();

    match name.as_str() {
        "dummy" => Ok(Arc::new(DummyModel::new(Some(config)).await?)),
        "deepseek" => Ok(Arc::new(DeepSeekModel::from_config(config)?)),
        other => Err(Error::Inference(format!(
            "Unknown model '{}'. Available models: dummy, deepseek",
            other
        ))),
    }
}
