//! BoxGateway -- object-safe dynamic dispatch wrapper for ProviderGateway.
//!
//! 1. `ProviderGatewayDyn` is the object-safe twin with boxed futures
//! 2. a blanket impl covers every `T: ProviderGateway`
//! 3. `BoxGateway` wraps `Box<dyn ProviderGatewayDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use baton_types::llm::{FileInput, LlmError, PromptRequest};

use super::gateway::ProviderGateway;

type GatewayFuture<'a> = Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;

/// Object-safe version of [`ProviderGateway`] with boxed futures.
pub trait ProviderGatewayDyn: Send + Sync {
    fn name(&self) -> &str;

    fn send_prompt_boxed<'a>(&'a self, request: &'a PromptRequest) -> GatewayFuture<'a>;

    fn send_prompt_with_file_boxed<'a>(
        &'a self,
        request: &'a PromptRequest,
        file: &'a FileInput,
    ) -> GatewayFuture<'a>;
}

impl<T: ProviderGateway> ProviderGatewayDyn for T {
    fn name(&self) -> &str {
        ProviderGateway::name(self)
    }

    fn send_prompt_boxed<'a>(&'a self, request: &'a PromptRequest) -> GatewayFuture<'a> {
        Box::pin(self.send_prompt(request))
    }

    fn send_prompt_with_file_boxed<'a>(
        &'a self,
        request: &'a PromptRequest,
        file: &'a FileInput,
    ) -> GatewayFuture<'a> {
        Box::pin(self.send_prompt_with_file(request, file))
    }
}

/// Type-erased provider gateway for runtime routing by model name.
pub struct BoxGateway {
    inner: Box<dyn ProviderGatewayDyn + Send + Sync>,
}

impl BoxGateway {
    /// Wrap a concrete gateway.
    pub fn new<T: ProviderGateway + 'static>(gateway: T) -> Self {
        Self {
            inner: Box::new(gateway),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn send_prompt(&self, request: &PromptRequest) -> Result<String, LlmError> {
        self.inner.send_prompt_boxed(request).await
    }

    pub async fn send_prompt_with_file(
        &self,
        request: &PromptRequest,
        file: &FileInput,
    ) -> Result<String, LlmError> {
        self.inner.send_prompt_with_file_boxed(request, file).await
    }
}
