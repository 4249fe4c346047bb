use std::sync::Arc;
use std::time::Instant;

use nt_core::{AnalysisResult, AnalysisType, Error, InferenceModel, NormalizedArticle, ProcessingConfig};
use nt_inference::{build_request, parse_response, AnalysisContext};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::retry::{retry_with_backoff, RetryPolicy, Sleeper, TokioSleeper};

/// Runs one analysis of one article against the inference model.
///
/// Every call to the model holds a permit from `permits`, a semaphore shared
/// by all articles of the run. The permit is released before the response is
/// parsed and before any backoff sleep, so waiting never blocks other calls.
#[derive(Debug, Clone)]
pub struct AnalysisExecutor {
    model: Arc<dyn InferenceModel>,
    permits: Arc<Semaphore>,
    sleeper: Arc<dyn Sleeper>,
}

impl AnalysisExecutor {
    pub fn new(model: Arc<dyn InferenceModel>, permits: Arc<Semaphore>) -> Self {
        Self {
            model,
            permits,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Waits for a call slot unless `cancel` fires first. Returns `None` once
    /// the token is cancelled, even if a slot became free at the same time.
    pub async fn reserve(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok().filter(|_| !cancel.is_cancelled()),
        }
    }

    /// Never fails: exhausted retries and permanent errors come back as an
    /// [`AnalysisResult`] with `Failed` status.
    pub async fn execute(
        &self,
        context: &AnalysisContext,
        article: &NormalizedArticle,
        analysis_type: AnalysisType,
        config: &ProcessingConfig,
    ) -> AnalysisResult {
        self.execute_with_permit(context, article, analysis_type, config, None)
            .await
    }

    /// Like [`execute`](Self::execute), but the first attempt uses `reserved`
    /// instead of waiting for a fresh permit.
    pub async fn execute_with_permit(
        &self,
        context: &AnalysisContext,
        article: &NormalizedArticle,
        analysis_type: AnalysisType,
        config: &ProcessingConfig,
        reserved: Option<OwnedSemaphorePermit>,
    ) -> AnalysisResult {
        let start = Instant::now();
        let request = build_request(article, analysis_type, context, config);
        let model_used = self.model.model_id(&request.model);
        let policy = RetryPolicy::from_config(config);
        let deadline = config.analysis_timeout;

        let mut reserved = reserved;
        let outcome = retry_with_backoff(&policy, self.sleeper.as_ref(), Error::is_transient, |attempt| {
            let request = &request;
            let held = reserved.take();
            async move {
                debug!(article_id = %article.id, %analysis_type, attempt, "calling inference model");
                let permit = match held {
                    Some(permit) => permit,
                    None => self.permits.clone().acquire_owned().await.map_err(|_| Error::Cancelled)?,
                };
                let response = tokio::time::timeout(deadline, self.model.complete(request)).await;
                drop(permit);

                let text = response.map_err(|_| Error::Timeout(deadline))??;
                parse_response(analysis_type, &text)
            }
        })
        .await;

        let mut result = match outcome.result {
            Ok(parsed) => {
                AnalysisResult::succeeded(&article.id, analysis_type, parsed.payload, parsed.confidence, &model_used)
            }
            Err(e) => {
                warn!(
                    article_id = %article.id,
                    %analysis_type,
                    attempts = outcome.attempts,
                    error = %e,
                    "analysis failed"
                );
                AnalysisResult::failed(&article.id, analysis_type, &model_used, e.to_string())
            }
        };
        result.attempts = outcome.attempts;
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::tests::RecordingSleeper;
    use async_trait::async_trait;
    use nt_core::{AnalysisStatus, CompletionRequest, Result};
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Answers with `respond(call_number)`; call numbers start at 1.
    struct FnModel<F> {
        respond: F,
        calls: AtomicU32,
        delay: Duration,
    }

    impl<F> fmt::Debug for FnModel<F> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FnModel").finish()
        }
    }

    #[async_trait]
    impl<F> InferenceModel for FnModel<F>
    where
        F: Fn(u32) -> Result<String> + Send + Sync,
    {
        fn name(&self) -> &str {
            "fn-model"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.respond)(call)
        }
    }

    fn model<F>(respond: F) -> Arc<FnModel<F>>
    where
        F: Fn(u32) -> Result<String> + Send + Sync,
    {
        Arc::new(FnModel {
            respond,
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        })
    }

    fn article() -> NormalizedArticle {
        NormalizedArticle {
            id: "a1".to_string(),
            title: "Council approves budget".to_string(),
            content: "The city council approved the budget after a long debate.".to_string(),
            url: "https://news.example.com/budget".to_string(),
            source: "example".to_string(),
            published_at: None,
        }
    }

    fn config(max_retries: u32) -> ProcessingConfig {
        ProcessingConfig {
            max_retries,
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn executor(model: Arc<dyn InferenceModel>, permits: usize) -> (AnalysisExecutor, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = AnalysisExecutor::new(model, Arc::new(Semaphore::new(permits))).with_sleeper(sleeper.clone());
        (executor, sleeper)
    }

    #[tokio::test]
    async fn test_successful_analysis() {
        let model = model(|_| Ok(r#"{"sentiment_score": 0.4, "explanation": "upbeat", "confidence": 0.9}"#.to_string()));
        let (executor, _) = executor(model.clone(), 1);

        let result = executor
            .execute(&AnalysisContext::new(), &article(), AnalysisType::Sentiment, &config(3))
            .await;

        assert_eq!(result.status, AnalysisStatus::Succeeded);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.model_used, "deepseek-chat");
        assert_eq!(result.str_field("sentiment_label"), Some("positive"));
        assert!((result.confidence_score - 0.9).abs() < f64::EPSILON);
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_retries() {
        let model = model(|_| Err(Error::Upstream { status: 503, message: "unavailable".to_string() }));
        let (executor, sleeper) = executor(model.clone(), 1);

        let result = executor
            .execute(&AnalysisContext::new(), &article(), AnalysisType::Sentiment, &config(2))
            .await;

        assert_eq!(result.status, AnalysisStatus::Failed);
        assert_eq!(result.attempts, 3);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        assert!(result.error_message.as_deref().unwrap().contains("503"));
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let model = model(|call| {
            if call == 1 {
                Err(Error::RateLimited("429".to_string()))
            } else {
                Ok(r#"{"summary": "Budget passed."}"#.to_string())
            }
        });
        let (executor, _) = executor(model.clone(), 1);

        let result = executor
            .execute(&AnalysisContext::new(), &article(), AnalysisType::Summary, &config(3))
            .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let model = model(|_| Ok("I cannot answer that.".to_string()));
        let (executor, _) = executor(model.clone(), 1);

        let result = executor
            .execute(&AnalysisContext::new(), &article(), AnalysisType::Topics, &config(3))
            .await;

        assert_eq!(result.status, AnalysisStatus::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_gets_its_own_deadline() {
        let model = Arc::new(FnModel {
            respond: |_: u32| -> Result<String> { Ok(r#"{"summary": "late"}"#.to_string()) },
            calls: AtomicU32::new(0),
            delay: Duration::from_secs(60),
        });
        let (executor, _) = executor(model.clone(), 1);
        let config = ProcessingConfig {
            analysis_timeout: Duration::from_millis(100),
            ..config(1)
        };

        let result = executor
            .execute(&AnalysisContext::new(), &article(), AnalysisType::Summary, &config)
            .await;

        assert_eq!(result.status, AnalysisStatus::Failed);
        assert_eq!(result.attempts, 2);
        assert!(result.error_message.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_closed_semaphore_fails_without_calling_model() {
        let model = model(|_| Ok(r#"{"summary": "never"}"#.to_string()));
        let (executor, _) = executor(model.clone(), 1);
        executor.permits.close();

        let result = executor
            .execute(&AnalysisContext::new(), &article(), AnalysisType::Summary, &config(3))
            .await;

        assert_eq!(result.status, AnalysisStatus::Failed);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reserved_permit_serves_first_attempt() {
        let model = model(|_| Ok(r#"{"summary": "Budget passed."}"#.to_string()));
        let (executor, _) = executor(model.clone(), 1);

        let permit = executor.reserve(&CancellationToken::new()).await;
        assert!(permit.is_some());
        assert_eq!(executor.permits.available_permits(), 0);

        let result = executor
            .execute_with_permit(&AnalysisContext::new(), &article(), AnalysisType::Summary, &config(0), permit)
            .await;

        assert!(result.is_success());
        assert_eq!(executor.permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_reserve_gives_up_when_cancelled() {
        let (executor, _) = executor(model(|_| Ok(String::new())), 1);
        let cancel = CancellationToken::new();

        let held = executor.reserve(&cancel).await;
        assert!(held.is_some());

        let waiting = {
            let executor = executor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { executor.reserve(&cancel).await.is_some() })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        drop(held);

        assert!(!waiting.await.unwrap());
        assert!(executor.reserve(&cancel).await.is_none());
        assert_eq!(executor.permits.available_permits(), 1);
    }
}
