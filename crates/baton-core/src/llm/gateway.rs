//! ProviderGateway trait definition.
//!
//! The engine's only view of a model provider: send a prompt to a named model,
//! optionally with one attached file, and get text back. Any error fails the
//! calling step.

use std::future::Future;

use baton_types::llm::{FileInput, LlmError, PromptRequest};

/// Trait for provider backends (OpenAI-compatible servers, Anthropic, mocks).
///
/// Uses native async fn in traits (RPITIT). Implementations live in
/// baton-infra; [`super::box_gateway::BoxGateway`] erases the concrete type.
pub trait ProviderGateway: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a text prompt and receive the full response text.
    fn send_prompt(
        &self,
        request: &PromptRequest,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Send a prompt together with a binary attachment (image or PDF).
    fn send_prompt_with_file(
        &self,
        request: &PromptRequest,
        file: &FileInput,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;
}
