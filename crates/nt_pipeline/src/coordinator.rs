use std::time::Instant;

use nt_core::{ArticleOutcome, NormalizedArticle, ProcessingConfig};
use nt_inference::AnalysisContext;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dedup::article_hash;
use crate::executor::AnalysisExecutor;

/// Runs the configured analysis types for one article, strictly in order.
#[derive(Debug, Clone)]
pub struct AnalysisCoordinator {
    executor: AnalysisExecutor,
}

impl AnalysisCoordinator {
    pub fn new(executor: AnalysisExecutor) -> Self {
        Self { executor }
    }

    /// Every configured type is attempted even after a failure, so the
    /// outcome always carries one result per type.
    pub async fn process(&self, index: usize, article: &NormalizedArticle, config: &ProcessingConfig) -> ArticleOutcome {
        self.run_sequence(index, article, config, None).await
    }

    /// Returns `None` when `cancel` fires before the article's first model
    /// call could start. Once started, the whole sequence runs.
    pub async fn process_unless_cancelled(
        &self,
        index: usize,
        article: &NormalizedArticle,
        config: &ProcessingConfig,
        cancel: &CancellationToken,
    ) -> Option<ArticleOutcome> {
        let first_permit = self.executor.reserve(cancel).await?;
        Some(self.run_sequence(index, article, config, Some(first_permit)).await)
    }

    async fn run_sequence(
        &self,
        index: usize,
        article: &NormalizedArticle,
        config: &ProcessingConfig,
        mut first_permit: Option<OwnedSemaphorePermit>,
    ) -> ArticleOutcome {
        let start = Instant::now();
        let mut context = AnalysisContext::new();
        let mut results = Vec::new();

        for analysis_type in config.ordered_analysis_types() {
            let result = self
                .executor
                .execute_with_permit(&context, article, analysis_type, config, first_permit.take())
                .await;
            debug!(
                article_id = %article.id,
                %analysis_type,
                status = ?result.status,
                "analysis finished"
            );
            context.record(&result);
            results.push(result);
        }

        let mut outcome =
            ArticleOutcome::analysed(index, article, article_hash(article), results, config.success_policy);
        outcome.processing_time_ms = start.elapsed().as_millis() as u64;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nt_core::{AnalysisType, ArticleStatus, CompletionRequest, Error, InferenceModel, Result, SuccessPolicy};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Fails every Topics call and records the prompts it receives.
    #[derive(Debug, Default)]
    struct TopicsDown {
        prompts: Mutex<Vec<(AnalysisType, String)>>,
    }

    #[async_trait]
    impl InferenceModel for TopicsDown {
        fn name(&self) -> &str {
            "topics-down"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((request.analysis_type, request.prompt.clone()));
            let body = match request.analysis_type {
                AnalysisType::Sentiment => r#"{"sentiment_score": -0.6, "explanation": "grim"}"#,
                AnalysisType::Topics => return Err(Error::Inference("topics model offline".to_string())),
                AnalysisType::Summary => r#"{"summary": "Floods closed the bridge."}"#,
                AnalysisType::Relevance => r#"{"relevance_score": 0.8, "explanation": "local"}"#,
                AnalysisType::Bias => r#"{"bias_score": 0.1, "explanation": "neutral"}"#,
            };
            Ok(body.to_string())
        }
    }

    fn article() -> NormalizedArticle {
        NormalizedArticle {
            id: "flood-1".to_string(),
            title: "Floods close bridge".to_string(),
            content: "Rising water closed the main bridge on Monday.".to_string(),
            url: "https://news.example.com/flood".to_string(),
            source: "example".to_string(),
            published_at: None,
        }
    }

    fn coordinator(model: Arc<TopicsDown>) -> AnalysisCoordinator {
        AnalysisCoordinator::new(AnalysisExecutor::new(model, Arc::new(Semaphore::new(2))))
    }

    #[tokio::test]
    async fn test_failed_type_does_not_halt_sequence() {
        let model = Arc::new(TopicsDown::default());
        let config = ProcessingConfig {
            max_retries: 0,
            ..Default::default()
        };

        let outcome = coordinator(model.clone()).process(0, &article(), &config).await;

        assert_eq!(outcome.results.len(), 5);
        assert_eq!(outcome.failed_count(), 1);
        assert!(!outcome.result_for(AnalysisType::Topics).unwrap().is_success());
        assert_eq!(outcome.status, ArticleStatus::Completed);

        let order: Vec<_> = model.prompts.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert_eq!(order, AnalysisType::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_later_prompts_see_earlier_results() {
        let model = Arc::new(TopicsDown::default());
        let config = ProcessingConfig {
            max_retries: 0,
            ..Default::default()
        };

        coordinator(model.clone()).process(0, &article(), &config).await;

        let prompts = model.prompts.lock().unwrap();
        let bias_prompt = &prompts.iter().find(|(t, _)| *t == AnalysisType::Bias).unwrap().1;
        assert!(bias_prompt.contains("Floods closed the bridge."));
    }

    #[tokio::test]
    async fn test_any_failed_policy() {
        let config = ProcessingConfig {
            max_retries: 0,
            success_policy: SuccessPolicy::AnyFailed,
            ..Default::default()
        };

        let outcome = coordinator(Arc::new(TopicsDown::default()))
            .process(3, &article(), &config)
            .await;

        assert_eq!(outcome.index, 3);
        assert_eq!(outcome.status, ArticleStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_article_makes_no_calls() {
        let model = Arc::new(TopicsDown::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = coordinator(model.clone())
            .process_unless_cancelled(0, &article(), &ProcessingConfig::default(), &cancel)
            .await;

        assert!(outcome.is_none());
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_started_article_runs_every_type() {
        let model = Arc::new(TopicsDown::default());
        let config = ProcessingConfig {
            max_retries: 0,
            ..Default::default()
        };

        let outcome = coordinator(model.clone())
            .process_unless_cancelled(0, &article(), &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 5);
        assert_eq!(model.prompts.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_runs_only_configured_types() {
        let config = ProcessingConfig {
            analysis_types: vec![AnalysisType::Summary, AnalysisType::Sentiment],
            ..Default::default()
        };

        let outcome = coordinator(Arc::new(TopicsDown::default()))
            .process(0, &article(), &config)
            .await;

        let types: Vec<_> = outcome.results.iter().map(|r| r.analysis_type).collect();
        assert_eq!(types, vec![AnalysisType::Sentiment, AnalysisType::Summary]);
    }
}
