//! OpenAI-compatible chat completions submitter.
//!
//! Works with Fireworks (the default endpoint), Groq, Together, OpenAI and any
//! other provider exposing `POST {endpoint}/chat/completions` with vision
//! `image_url` content parts. The API key is read from the environment
//! variable named in settings (default `FIREWORKS_API_KEY`).
//!
//! One request per submission. Rate limits and server errors are reported as
//! `ApiError`; retrying is left to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::{DocumentSubmitter, ExtractError};
use super::response::parse_field_mapping;
use super::schemas::render_instruction;
use crate::config::Settings;
use crate::models::{DocumentImage, FieldMapping, FieldSchema};
use crate::utils::image::prepare_payload;

/// Chat completions client for vision extraction.
pub struct ChatCompletionSubmitter {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

impl ChatCompletionSubmitter {
    /// Create a submitter from resolved settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ExtractError> {
        let timeout = Duration::from_secs(settings.request_timeout);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kycscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExtractError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            api_key_env: settings.api_key_env.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    fn build_request(&self, schema: &FieldSchema, data_url: String) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !schema.system_prompt.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: vec![ChatContent::Text {
                    text: schema.system_prompt.clone(),
                }],
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: vec![
                ChatContent::Text {
                    text: render_instruction(schema),
                },
                ChatContent::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ],
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ExtractError {
        if err.is_timeout() {
            ExtractError::Timeout(self.timeout)
        } else {
            ExtractError::ApiError(format!("HTTP request failed: {}", err))
        }
    }

    /// Send one chat completion and return the assistant message text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ExtractError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ExtractError::MissingCredential(self.api_key_env.clone()))?;

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::ApiError(format!(
                "{} returned {}: {}",
                self.endpoint,
                status,
                body.trim()
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ExtractError::Timeout(self.timeout)
            } else {
                ExtractError::ApiError(format!("Failed to parse response: {}", e))
            }
        })?;

        if let Some(error) = chat.error {
            return Err(ExtractError::ApiError(error.message));
        }

        chat.choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ExtractError::ApiError("Response contained no message content".to_string()))
    }
}

#[async_trait]
impl DocumentSubmitter for ChatCompletionSubmitter {
    fn describe(&self) -> String {
        format!("{} ({})", self.model, self.endpoint)
    }

    async fn submit(
        &self,
        image: &DocumentImage,
        schema: &FieldSchema,
    ) -> Result<FieldMapping, ExtractError> {
        let payload = prepare_payload(image)?;
        let request = self.build_request(schema, payload.data_url());

        debug!(
            "Submitting {} image ({} bytes, rotation {}) for schema '{}' to {}",
            image.kind(),
            image.len(),
            image.rotation().degrees(),
            schema.name,
            self.model
        );

        let reply = self.complete(&request).await?;
        debug!("Model reply: {}", reply);

        parse_field_mapping(&reply, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::schemas::passport_schema;

    fn settings() -> Settings {
        Settings {
            endpoint: "https://example.test/v1/".to_string(),
            api_key: Some("secret".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_request_shape() {
        let submitter = ChatCompletionSubmitter::from_settings(&settings()).unwrap();
        assert_eq!(
            submitter.completions_url(),
            "https://example.test/v1/chat/completions"
        );

        let request = submitter.build_request(&passport_schema(), "data:image/png;base64,AAAA".into());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"][0]["type"], "text");
        assert_eq!(json["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
        assert_eq!(json["model"], Settings::default().model);
    }

    #[test]
    fn test_system_message_omitted_when_blank() {
        let submitter = ChatCompletionSubmitter::from_settings(&settings()).unwrap();
        let mut schema = passport_schema();
        schema.system_prompt.clear();
        let request = submitter.build_request(&schema, "data:,".into());
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let submitter = ChatCompletionSubmitter::from_settings(&Settings {
            api_key: None,
            endpoint: "http://127.0.0.1:9".to_string(),
            ..Settings::default()
        })
        .unwrap();
        let image = DocumentImage::from_bytes(
            crate::utils::image::fixtures::png_bytes(2, 2),
            1 << 20,
        )
        .unwrap();

        let err = submitter.submit(&image, &passport_schema()).await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingCredential(ref var) if var == "FIREWORKS_API_KEY"));
    }
}
