use std::fmt;

use async_trait::async_trait;
use nt_core::{CompletionRequest, Error, InferenceModel, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::Config;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Client for DeepSeek or any other OpenAI-compatible chat completion API.
pub struct DeepSeekModel {
    client: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for DeepSeekModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepSeekModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl DeepSeekModel {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Inference("DeepSeek API key is required".to_string()))?;
        let base_url = crate::parse_model_url(base_url)?;
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let base_url = config.model_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::with_base_url(config.api_key, base_url)
    }
}

/// Maps a non-success status to a classified error.
fn error_for_status(status: StatusCode, body: &str) -> Error {
    let message: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited(message)
    } else if status.is_server_error() {
        Error::Upstream { status: status.as_u16(), message }
    } else {
        Error::Inference(format!("request rejected with {}: {}", status, message))
    }
}

#[async_trait]
impl InferenceModel for DeepSeekModel {
    fn name(&self) -> &str {
        "DeepSeek"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &text));
        }

        let response = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| Error::MalformedResponse(format!("unexpected completion body: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::MalformedResponse("completion had no choices".to_string()))?;

        tracing::debug!(analysis_type = %request.analysis_type, chars = content.len(), "Received completion");
        Ok(content)
    }
}
