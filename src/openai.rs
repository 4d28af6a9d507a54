//! Chat completion client for an OpenAI-compatible API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("failed to send request to completion service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion service error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("model refused the request: {0}")]
    Refusal(String),

    #[error("completion response content is null")]
    EmptyContent,

    #[error("model output does not match the schema: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// The seam between the extraction pipeline and the remote model.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send `messages` and return the raw JSON content, constrained to `schema`.
    async fn complete_json(
        &self,
        messages: Vec<Message>,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String, CompletionError>;
}

/// Client for `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete_json(
        &self,
        messages: Vec<Message>,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            response_format: ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: schema_name.to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        debug!("Sending request to completion service: model={}", request.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatCompletionResponse = response.json().await?;

        if let Some(usage) = &response.usage {
            info!(
                "Completion response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(CompletionError::EmptyContent)?;

        if let Some(refusal) = message.refusal {
            return Err(CompletionError::Refusal(refusal));
        }

        message.content.ok_or(CompletionError::EmptyContent)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message with text and one image given as a data URL.
    pub fn user_with_image(text: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url.into(),
                    },
                },
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer, key: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(&Config::for_endpoint(server.url("/v1"), key))
    }

    #[test]
    fn test_image_message_serialization() {
        let msg = Message::user_with_image("Look:", "data:image/jpeg;base64,AAAA");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][1]["type"], "image_url");
        assert_eq!(value["content"][1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_sending() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200);
            })
            .await;

        let err = client_for(&server, None)
            .complete_json(vec![Message::user("hi")], "s", serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::MissingApiKey));
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_returns_content_and_sends_schema() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_contains("\"strict\":true")
                    .body_contains("traveller_information");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"content": "{\"ok\":true}", "refusal": null}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                }));
            })
            .await;

        let content = client_for(&server, Some("sk-test"))
            .complete_json(
                vec![Message::system("sys"), Message::user("hi")],
                "traveller_information",
                serde_json::json!({"type": "object"}),
            )
            .await
            .unwrap();

        assert_eq!(content, "{\"ok\":true}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refusal_and_null_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions").body_contains("refuse");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"content": null, "refusal": "I can't help with that."}}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions").body_contains("empty");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"content": null}}]
                }));
            })
            .await;

        let client = client_for(&server, Some("sk-test"));
        let refused = client
            .complete_json(vec![Message::user("refuse")], "s", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(refused, CompletionError::Refusal(ref r) if r == "I can't help with that."));

        let empty = client
            .complete_json(vec![Message::user("empty")], "s", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(empty, CompletionError::EmptyContent));
    }

    #[tokio::test]
    async fn test_api_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let err = client_for(&server, Some("sk-test"))
            .complete_json(vec![Message::user("hi")], "s", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 429, ref body } if body == "rate limited"));
    }
}
