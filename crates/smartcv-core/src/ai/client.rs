use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::warn;

use crate::ai::types::{
    ChatCompletionRequestBody, ChatCompletionResponseBody, CompletionRequest, CompletionResponse,
    ResponseFormat,
};
use crate::config::{AiConfig, AiProviderConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(80);

#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    ProviderStatus { status: u16, body: String },
    #[error("provider returned no completion choices")]
    EmptyResponse,
    #[error("both primary and fallback providers failed: primary={primary}, fallback={fallback}")]
    BothFailed { primary: String, fallback: String },
}

#[async_trait::async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiClientError>;
}

struct Provider {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    label: &'static str,
}

impl Provider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiClientError> {
        let body = ChatCompletionRequestBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_mode
                .then_some(ResponseFormat { format_type: "json_object" }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiClientError::ProviderStatus { status, body });
        }

        let parsed: ChatCompletionResponseBody = response.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or(AiClientError::EmptyResponse)?;
        let content = choice.message.content.unwrap_or_default();

        Ok(CompletionResponse {
            content,
            provider: self.label.to_string(),
            input_tokens: parsed.usage.as_ref().and_then(|u| u.prompt_tokens),
            output_tokens: parsed.usage.as_ref().and_then(|u| u.completion_tokens),
        })
    }
}

/// OpenAI-compatible chat client (C6 stage 2 / letter generation) that retries
/// once against a fallback provider whenever the primary fails for any reason,
/// replaying the same request payload unchanged.
pub struct AiClient {
    primary: Provider,
    fallback: Provider,
}

impl AiClient {
    pub fn new(http: Client, config: &AiConfig) -> Self {
        Self {
            primary: make_provider(http.clone(), &config.primary, "primary"),
            fallback: make_provider(http, &config.fallback, "fallback"),
        }
    }
}

#[async_trait::async_trait]
impl ChatCompleter for AiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiClientError> {
        match self.primary.complete(request).await {
            Ok(response) => Ok(response),
            Err(primary_err) => {
                warn!(error = %primary_err, "primary AI provider failed, retrying against fallback");
                match self.fallback.complete(request).await {
                    Ok(response) => Ok(response),
                    Err(fallback_err) => Err(AiClientError::BothFailed {
                        primary: primary_err.to_string(),
                        fallback: fallback_err.to_string(),
                    }),
                }
            }
        }
    }
}

fn make_provider(http: Client, config: &AiProviderConfig, label: &'static str) -> Provider {
    Provider {
        http,
        base_url: config.base_url.clone(),
        api_key: config.api_key.clone(),
        model: config.model.clone(),
        label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::ChatMessage;
    use crate::config::AiProviderConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user("hello")],
            temperature: 0.7,
            max_tokens: 256,
            json_mode: false,
        }
    }

    fn config(primary_url: &str, fallback_url: &str) -> AiConfig {
        AiConfig {
            primary: AiProviderConfig {
                base_url: primary_url.into(),
                api_key: "primary-key".into(),
                model: "gpt-4o-mini".into(),
            },
            fallback: AiProviderConfig {
                base_url: fallback_url.into(),
                api_key: "fallback-key".into(),
                model: "gpt-4o-mini".into(),
            },
            temperature: 0.7,
            max_tokens: 256,
        }
    }

    fn completion_body(text: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "content": text } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        })
    }

    #[tokio::test]
    async fn uses_primary_provider_when_it_succeeds() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("from primary")))
            .mount(&primary)
            .await;

        let client = AiClient::new(Client::new(), &config(&primary.uri(), &fallback.uri()));
        let response = client.complete(&request()).await.expect("completion");
        assert_eq!(response.content, "from primary");
        assert_eq!(response.provider, "primary");
    }

    #[tokio::test]
    async fn retries_fallback_once_when_primary_errors() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&primary)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("from fallback")))
            .mount(&fallback)
            .await;

        let client = AiClient::new(Client::new(), &config(&primary.uri(), &fallback.uri()));
        let response = client.complete(&request()).await.expect("completion");
        assert_eq!(response.content, "from fallback");
        assert_eq!(response.provider, "fallback");
    }

    #[tokio::test]
    async fn both_providers_failing_reports_both_errors() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&primary)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&fallback)
            .await;

        let client = AiClient::new(Client::new(), &config(&primary.uri(), &fallback.uri()));
        let err = client.complete(&request()).await.expect_err("should fail");
        assert!(matches!(err, AiClientError::BothFailed { .. }));
    }
}
