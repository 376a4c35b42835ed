use std::time::Duration;

use relay_core::config::BackendSettings;
use relay_core::error::AppError;
use relay_core::models::{ChatRequest, ChatResponse, Usage};
use relay_core::traits::ChatBackend;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::classify::{classify_status, classify_transport};

const SYSTEM_PROMPT: &str =
    "You are a support assistant. Answer using the ingested documentation; say so when the \
     documentation does not cover the question.";

/// OpenAI-compatible chat backend.
///
/// Works with any `/chat/completions`-shaped API. Each call carries the
/// configured per-call timeout; retries live in
/// [`ResilientBackend`](relay_core::backend::ResilientBackend), which wraps this.
#[derive(Clone)]
pub struct HttpChatBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    health_timeout: Duration,
}

impl HttpChatBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            timeout: settings.timeout,
            health_timeout: settings.health_timeout,
        })
    }
}

// ---- wire types ----

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Parse a successful completion body into a [`ChatResponse`].
///
/// A body that does not parse, or parses with no answer text, is a permanent
/// fault: the call completed, retrying will not change the payload.
fn parse_completion(status: u16, body: &str) -> Result<ChatResponse, AppError> {
    let parsed: CompletionResponse = serde_json::from_str(body).map_err(|e| AppError::Backend {
        status,
        message: format!("malformed response body: {e}"),
    })?;

    let answer = parsed
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or(AppError::Backend {
            status,
            message: "empty response from backend".to_string(),
        })?;

    Ok(ChatResponse {
        answer,
        usage: Usage {
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        },
    })
}

/// Extract the API error message from an error body, falling back to the
/// raw body when it isn't the expected shape.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {status}: {body}"))
}

impl ChatBackend for HttpChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let url = format!("{}/chat/completions", self.base_url);

        let payload = CompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: &request.query,
                },
            ],
            user: request.conversation_id.as_deref(),
        };

        tracing::debug!(model = %self.model, "issuing chat completion request");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("failed to read response body: {e}")))?;

        if status >= 400 {
            return Err(classify_status(status, error_message(status, &body)));
        }

        parse_completion(status, &body)
    }

    async fn health(&self) -> Result<(), AppError> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.health_timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(
                status.as_u16(),
                format!("health probe got HTTP {}", status.as_u16()),
            ));
        }
        Ok(())
    }
}
