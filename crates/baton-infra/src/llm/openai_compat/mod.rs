//! OpenAI-compatible gateway implementation.
//!
//! A single [`OpenAiCompatibleGateway`] serves OpenAI, Ollama, vLLM and any
//! other server exposing `/chat/completions`. Steps of type
//! `openai-responses` go through `/responses` instead.

pub mod types;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

use baton_core::llm::gateway::ProviderGateway;
use baton_types::llm::{ApiMode, FileInput, LlmError, PromptRequest};

use self::types::{
    ChatContent, ChatMessage, ChatPart, ChatRequest, ChatResponse, FileData, ImageUrl,
    ResponsesInput, ResponsesMessage, ResponsesPart, ResponsesRequest, ResponsesResponse,
};
use crate::llm::{build_http_client, status_error};

/// Gateway for any OpenAI-compatible API.
///
/// Does NOT derive Debug; the optional key is a [`SecretString`].
pub struct OpenAiCompatibleGateway {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleGateway {
    /// Create a gateway. `api_key` is `None` for keyless local servers.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client()?,
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn build_chat_request(request: &PromptRequest, file: Option<&FileInput>) -> ChatRequest {
        let options = &request.options;
        let mut messages = Vec::with_capacity(2);

        if let Some(instructions) = &options.instructions {
            messages.push(ChatMessage {
                role: "system",
                content: ChatContent::Text(instructions.clone()),
            });
        }

        let content = match file {
            None => ChatContent::Text(request.prompt.clone()),
            Some(file) => {
                let attachment = if file.is_image() {
                    ChatPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(file),
                        },
                    }
                } else {
                    ChatPart::File {
                        file: FileData {
                            filename: file.file_name().to_string(),
                            file_data: data_url(file),
                        },
                    }
                };
                ChatContent::Parts(vec![
                    ChatPart::Text {
                        text: request.prompt.clone(),
                    },
                    attachment,
                ])
            }
        };
        messages.push(ChatMessage {
            role: "user",
            content,
        });

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_completion_tokens: options.max_output_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            tools: options.tools.clone(),
            response_format: options.response_format.clone(),
        }
    }

    fn build_responses_request(
        request: &PromptRequest,
        file: Option<&FileInput>,
    ) -> ResponsesRequest {
        let options = &request.options;
        let input = match file {
            None => ResponsesInput::Text(request.prompt.clone()),
            Some(file) => {
                let attachment = if file.is_image() {
                    ResponsesPart::InputImage {
                        image_url: data_url(file),
                    }
                } else {
                    ResponsesPart::InputFile {
                        filename: file.file_name().to_string(),
                        file_data: data_url(file),
                    }
                };
                ResponsesInput::Messages(vec![ResponsesMessage {
                    role: "user",
                    content: vec![
                        ResponsesPart::InputText {
                            text: request.prompt.clone(),
                        },
                        attachment,
                    ],
                }])
            }
        };

        ResponsesRequest {
            model: request.model.clone(),
            input,
            instructions: options.instructions.clone(),
            previous_response_id: options.previous_response_id.clone(),
            tools: options.tools.clone(),
            max_output_tokens: options.max_output_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        }
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, LlmError> {
        let mut builder = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| LlmError::Provider {
            message: format!("HTTP request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))
    }

    async fn complete(
        &self,
        request: &PromptRequest,
        file: Option<&FileInput>,
    ) -> Result<String, LlmError> {
        if file.is_some_and(|f| !f.is_image() && !f.is_pdf()) {
            let file = file.map(|f| format!("{} ({})", f.file_name(), f.mime));
            return Err(LlmError::UnsupportedInput(file.unwrap_or_default()));
        }

        match request.options.api {
            ApiMode::Chat => {
                let body = Self::build_chat_request(request, file);
                let response: ChatResponse = self.post("/chat/completions", &body).await?;
                let choice = response.choices.into_iter().next().ok_or_else(|| {
                    LlmError::Deserialization("response contained no choices".to_string())
                })?;
                tracing::debug!(
                    provider = %self.name,
                    id = response.id.as_deref().unwrap_or(""),
                    finish_reason = choice.finish_reason.as_deref().unwrap_or(""),
                    "chat completion response"
                );
                Ok(choice.message.content.unwrap_or_default())
            }
            ApiMode::Responses => {
                let body = Self::build_responses_request(request, file);
                let response: ResponsesResponse = self.post("/responses", &body).await?;
                tracing::debug!(
                    provider = %self.name,
                    id = response.id.as_deref().unwrap_or(""),
                    "responses api response"
                );
                Ok(response.output_text())
            }
        }
    }
}

impl ProviderGateway for OpenAiCompatibleGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_prompt(&self, request: &PromptRequest) -> Result<String, LlmError> {
        self.complete(request, None).await
    }

    async fn send_prompt_with_file(
        &self,
        request: &PromptRequest,
        file: &FileInput,
    ) -> Result<String, LlmError> {
        self.complete(request, Some(file)).await
    }
}

/// `data:` URL carrying the file bytes as base64.
fn data_url(file: &FileInput) -> String {
    format!("data:{};base64,{}", file.mime, STANDARD.encode(&file.data))
}
