use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nt_core::{ArticleStorage, ProcessingConfig, RawArticle, SourceRecord, SuccessPolicy};
use nt_pipeline::{init_logging, BatchOrchestrator};
use nt_storage::MemoryCache;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[derive(Debug, Clone, Copy, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    /// Accepts compound durations such as `1h15m`, `30s` or `250ms`. A bare
    /// number is read as seconds.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total = Duration::ZERO;
        let mut number = String::new();
        let mut unit = String::new();
        let mut has_value = false;

        let mut flush = |number: &mut String, unit: &mut String| -> std::result::Result<(), String> {
            if number.is_empty() {
                return if unit.is_empty() {
                    Ok(())
                } else {
                    Err(format!("Missing number before unit: {}", unit))
                };
            }
            let n: u64 = number.parse().map_err(|_| format!("Invalid number in duration: {}", number))?;
            let too_large = || format!("Duration too large: {}{}", number, unit);
            let secs = |factor: u64| n.checked_mul(factor).map(Duration::from_secs).ok_or_else(too_large);
            let part = match unit.as_str() {
                "ms" => Duration::from_millis(n),
                "" | "s" => Duration::from_secs(n),
                "m" => secs(60)?,
                "h" => secs(3600)?,
                "d" => secs(86400)?,
                other => return Err(format!("Invalid duration unit: {}", other)),
            };
            total = total.checked_add(part).ok_or_else(too_large)?;
            has_value = true;
            number.clear();
            unit.clear();
            Ok(())
        };

        for c in s.trim().chars() {
            if c.is_ascii_digit() {
                if !unit.is_empty() {
                    flush(&mut number, &mut unit)?;
                }
                number.push(c);
            } else if c.is_ascii_alphabetic() {
                unit.push(c);
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }
        flush(&mut number, &mut unit)?;

        if !has_value {
            return Err("Duration must include a number".to_string());
        }
        Ok(HumanDuration(total))
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum PolicyArg {
    /// An article fails only when all of its analyses failed
    AllFailed,
    /// An article fails when any of its analyses failed
    AnyFailed,
}

impl From<PolicyArg> for SuccessPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::AllFailed => SuccessPolicy::AllFailed,
            PolicyArg::AnyFailed => SuccessPolicy::AnyFailed,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Enrich news articles with AI analyses", long_about = None)]
pub struct Cli {
    #[arg(long, default_value = "memory", help = "Storage backend. Available: memory, sqlite")]
    storage: String,
    #[arg(long, help = "Backend location, e.g. the SQLite database path")]
    backend_url: Option<String>,
    #[arg(long, default_value = "dummy", help = "Model to use for inference. Available models: dummy (default), deepseek")]
    model: String,
    #[arg(long, help = "Base URL of an OpenAI-compatible chat API")]
    model_url: Option<String>,
    #[arg(long, env = "NT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// JSON file with a processing configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    model_name: Option<String>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    max_concurrent_batches: Option<usize>,
    #[arg(long)]
    max_concurrent_analyses: Option<usize>,
    /// Per-call deadline (e.g. 30s, 1m)
    #[arg(long)]
    analysis_timeout: Option<HumanDuration>,
    #[arg(long)]
    max_retries: Option<u32>,
    /// Base delay of the retry backoff (e.g. 500ms)
    #[arg(long)]
    retry_delay: Option<HumanDuration>,
    #[arg(long)]
    no_validation: bool,
    #[arg(long)]
    no_caching: bool,
    /// Process chunks and articles one at a time
    #[arg(long)]
    sequential: bool,
    #[arg(long, value_enum)]
    success_policy: Option<PolicyArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a batch of articles read from a JSON file
    Process {
        file: PathBuf,
        #[arg(long, default_value = "generic")]
        source_type: String,
        /// The file holds one record instead of an array
        #[arg(long)]
        single: bool,
    },
    /// Print a stored article and its cached analyses
    Show { id: String },
}

impl Cli {
    fn processing_config(&self) -> anyhow::Result<ProcessingConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                ProcessingConfig::from_json(&json)?
            }
            None => ProcessingConfig::default(),
        };

        if let Some(name) = &self.model_name {
            config.model_name = name.clone();
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.max_concurrent_batches {
            config.max_concurrent_batches = n;
        }
        if let Some(n) = self.max_concurrent_analyses {
            config.max_concurrent_analyses = n;
        }
        if let Some(d) = self.analysis_timeout {
            config.analysis_timeout = d.0;
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        if let Some(d) = self.retry_delay {
            config.retry_delay = d.0;
        }
        if let Some(policy) = self.success_policy {
            config.success_policy = policy.into();
        }
        config.enable_validation &= !self.no_validation;
        config.enable_caching &= !self.no_caching;
        config.enable_parallel_processing &= !self.sequential;

        config.validate()?;
        Ok(config)
    }
}

fn read_articles(path: &Path, single: bool) -> anyhow::Result<Vec<RawArticle>> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<SourceRecord> = if single {
        vec![serde_json::from_str(&json).with_context(|| format!("parsing record in {}", path.display()))?]
    } else {
        serde_json::from_str(&json).with_context(|| format!("parsing records in {}", path.display()))?
    };
    Ok(records.into_iter().map(RawArticle::from).collect())
}

/// Checks the backend with a read, retrying a few times before giving up.
async fn check_storage(storage: &Arc<dyn ArticleStorage>, storage_type: &str) -> anyhow::Result<()> {
    const ATTEMPTS: u32 = 3;
    let mut last_error = None;

    for attempt in 1..=ATTEMPTS {
        match tokio::time::timeout(Duration::from_secs(10), storage.get_by_source("__health__")).await {
            Ok(Ok(_)) => {
                info!("🏦 Storage backend initialized successfully (using {})", storage_type);
                return Ok(());
            }
            Ok(Err(e)) => last_error = Some(anyhow::anyhow!(e)),
            Err(_) => last_error = Some(anyhow::anyhow!("storage health check timed out")),
        }
        if attempt < ATTEMPTS {
            info!("Storage health check failed, retrying {}/{}...", attempt, ATTEMPTS);
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("storage health check failed")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let storage = nt_storage::create_storage(cli.storage.as_str(), cli.backend_url.as_deref()).await?;
    check_storage(&storage, &cli.storage).await?;

    match &cli.command {
        Commands::Show { id } => {
            let record = storage
                .get_article(id)
                .await?
                .with_context(|| format!("no stored article with id {}", id))?;
            let analyses = storage.get_analyses(id).await?;
            let output = serde_json::json!({ "article": record, "analyses": analyses });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Process {
            file,
            source_type,
            single,
        } => {
            let config = cli.processing_config()?;
            let articles = read_articles(file, *single)?;

            let model = nt_inference::create_model(Some(nt_inference::Config {
                api_key: cli.api_key.clone(),
                model_name: Some(cli.model.clone()),
                model_url: cli.model_url.clone(),
            }))
            .await?;
            info!("🧠 Inference model initialized successfully (using {})", model.name());

            let orchestrator = BatchOrchestrator::new(model, storage.clone())
                .with_cache(Arc::new(MemoryCache::new(config.cache_ttl)));

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("🛑 Interrupt received, finishing articles already in progress");
                    on_signal.cancel();
                }
            });

            info!("📰 Processing {} articles from {}", articles.len(), file.display());
            let result = orchestrator.run(articles, source_type, &config, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration() {
        let parse = |s: &str| HumanDuration::from_str(s).map(|d| d.0);
        assert_eq!(parse("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse("1h15m"), Ok(Duration::from_secs(4500)));
        assert_eq!(parse("1m 30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse("45"), Ok(Duration::from_secs(45)));
        assert!(parse("").is_err());
        assert!(parse("ms").is_err());
        assert!(parse("5y").is_err());
        assert!(parse("1.5s").is_err());
    }

    #[test]
    fn test_human_duration_overflow_is_an_error() {
        let parse = |s: &str| HumanDuration::from_str(s).map(|d| d.0);
        assert!(parse("999999999999999999h").is_err());
        assert!(parse("18446744073709551615d").is_err());
        assert!(parse("18446744073709551615s 18446744073709551615s").is_err());
        assert_eq!(parse("2562047788015215h"), Ok(Duration::from_secs(2562047788015215 * 3600)));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "nt",
            "--batch-size",
            "4",
            "--retry-delay",
            "500ms",
            "--sequential",
            "--success-policy",
            "any-failed",
            "process",
            "articles.json",
        ]);
        let config = cli.processing_config().unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert!(!config.enable_parallel_processing);
        assert!(config.enable_validation);
        assert_eq!(config.success_policy, SuccessPolicy::AnyFailed);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from(["nt", "--max-concurrent-analyses", "0", "show", "a1"]);
        assert!(cli.processing_config().is_err());
    }
}
