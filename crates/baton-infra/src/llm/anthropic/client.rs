//! AnthropicGateway -- [`ProviderGateway`] for the Anthropic Messages API.
//!
//! The API key is wrapped in [`SecretString`] and only exposed when the
//! request headers are built.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};

use baton_core::llm::gateway::ProviderGateway;
use baton_types::llm::{FileInput, LlmError, PromptRequest};

use super::types::{
    AnthropicContent, AnthropicInputBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse,
    Base64Source,
};
use crate::llm::{build_http_client, status_error};

/// Output budget used when the step does not set `max_output_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4_096;

/// Anthropic Claude gateway.
///
/// Does not derive Debug; the key never appears in logs.
pub struct AnthropicGateway {
    client: reqwest::Client,
    name: String,
    api_key: SecretString,
    base_url: String,
}

impl AnthropicGateway {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(
        name: impl Into<String>,
        api_key: SecretString,
        base_url: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client()?,
            name: name.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build the wire request; `file` becomes a leading image or document block.
    fn to_anthropic_request(
        request: &PromptRequest,
        file: Option<&FileInput>,
    ) -> Result<AnthropicRequest, LlmError> {
        let content = match file {
            None => AnthropicContent::Text(request.prompt.clone()),
            Some(file) => {
                let source = Base64Source::new(file.mime.clone(), STANDARD.encode(&file.data));
                let attachment = if file.is_image() {
                    AnthropicInputBlock::Image { source }
                } else if file.is_pdf() {
                    AnthropicInputBlock::Document { source }
                } else {
                    return Err(LlmError::UnsupportedInput(format!(
                        "{} ({})",
                        file.file_name(),
                        file.mime
                    )));
                };
                AnthropicContent::Blocks(vec![
                    attachment,
                    AnthropicInputBlock::Text {
                        text: request.prompt.clone(),
                    },
                ])
            }
        };

        let options = &request.options;
        Ok(AnthropicRequest {
            model: request.model.clone(),
            max_tokens: options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content,
            }],
            system: options.instructions.clone(),
            temperature: options.temperature,
            top_p: options.top_p,
        })
    }

    async fn post(&self, body: &AnthropicRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.url("/v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_body));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        tracing::debug!(
            provider = %self.name,
            id = %parsed.id,
            model = %parsed.model,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "anthropic response"
        );
        Ok(parsed.text())
    }
}

impl ProviderGateway for AnthropicGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_prompt(&self, request: &PromptRequest) -> Result<String, LlmError> {
        let body = Self::to_anthropic_request(request, None)?;
        self.post(&body).await
    }

    async fn send_prompt_with_file(
        &self,
        request: &PromptRequest,
        file: &FileInput,
    ) -> Result<String, LlmError> {
        let body = Self::to_anthropic_request(request, Some(file))?;
        self.post(&body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::llm::PromptOptions;

    fn make_gateway() -> AnthropicGateway {
        AnthropicGateway::new(
            "anthropic",
            SecretString::from("test-key-not-real"),
            "https://api.anthropic.com/",
        )
        .unwrap()
    }

    #[test]
    fn test_gateway_name_and_url() {
        let gateway = make_gateway();
        assert_eq!(gateway.name(), "anthropic");
        assert_eq!(
            gateway.url("/v1/messages"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn test_text_request_carries_options() {
        let request = PromptRequest::new("claude-sonnet-4-20250514", "Hello").with_options(
            PromptOptions {
                instructions: Some("Be brief".into()),
                max_output_tokens: Some(256),
                temperature: Some(0.2),
                ..Default::default()
            },
        );

        let body = AnthropicGateway::to_anthropic_request(&request, None).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["system"], "Be brief");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_default_max_tokens() {
        let request = PromptRequest::new("claude-haiku", "Hi");
        let body = AnthropicGateway::to_anthropic_request(&request, None).unwrap();
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(body.system.is_none());
    }

    #[test]
    fn test_image_attachment_is_base64_block() {
        let request = PromptRequest::new("claude-sonnet", "Describe");
        let file = FileInput::new("cat.png", "image/png", vec![0x89, b'P', b'N', b'G']);

        let body = AnthropicGateway::to_anthropic_request(&request, Some(&file)).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        let blocks = &json["messages"][0]["content"];
        assert_eq!(blocks[0]["type"], "image");
        assert_eq!(blocks[0]["source"]["media_type"], "image/png");
        assert_eq!(blocks[0]["source"]["data"], STANDARD.encode([0x89, b'P', b'N', b'G']));
        assert_eq!(blocks[1]["text"], "Describe");
    }

    #[test]
    fn test_pdf_attachment_is_document_block() {
        let request = PromptRequest::new("claude-sonnet", "Summarize");
        let file = FileInput::new("paper.pdf", "application/pdf", b"%PDF".to_vec());

        let body = AnthropicGateway::to_anthropic_request(&request, Some(&file)).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "document");
    }

    #[test]
    fn test_other_attachment_is_rejected() {
        let request = PromptRequest::new("claude-sonnet", "Read");
        let file = FileInput::new("blob.bin", "application/octet-stream", vec![1]);

        let err = AnthropicGateway::to_anthropic_request(&request, Some(&file))
            .err()
            .unwrap();
        let msg = err.to_string();
        assert!(msg.contains("blob.bin"), "got: {msg}");
    }
}
