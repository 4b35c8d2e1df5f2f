//! Model-name routing over a set of gateways.
//!
//! Each route owns a list of model patterns (`gpt-*`, `claude-*`, exact
//! names). The first route whose pattern matches wins.

use std::sync::Arc;

use baton_types::config::matches_pattern;
use baton_types::llm::{FileInput, LlmError, PromptRequest};

use super::box_gateway::BoxGateway;

struct Route {
    patterns: Vec<String>,
    strip_prefix: Option<String>,
    gateway: Arc<BoxGateway>,
}

/// Ordered routing table from model names to gateways.
#[derive(Default)]
pub struct GatewayRegistry {
    routes: Vec<Route>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Earlier routes take precedence.
    pub fn register(
        &mut self,
        patterns: Vec<String>,
        strip_prefix: Option<String>,
        gateway: BoxGateway,
    ) {
        self.routes.push(Route {
            patterns,
            strip_prefix,
            gateway: Arc::new(gateway),
        });
    }

    /// Names of the registered gateways, in routing order.
    pub fn gateway_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.gateway.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the gateway for `model` and the model name to put on the wire.
    pub fn resolve(&self, model: &str) -> Result<(Arc<BoxGateway>, String), LlmError> {
        let route = self
            .routes
            .iter()
            .find(|r| r.patterns.iter().any(|p| matches_pattern(model, p)))
            .ok_or_else(|| LlmError::UnknownModel(model.to_string()))?;

        let wire_model = route
            .strip_prefix
            .as_deref()
            .and_then(|prefix| model.strip_prefix(prefix))
            .unwrap_or(model)
            .to_string();

        Ok((Arc::clone(&route.gateway), wire_model))
    }

    /// Route and send a text prompt.
    pub async fn send_prompt(&self, request: &PromptRequest) -> Result<String, LlmError> {
        let (gateway, wire_model) = self.resolve(&request.model)?;
        tracing::debug!(gateway = gateway.name(), model = %wire_model, "sending prompt");
        if wire_model == request.model {
            gateway.send_prompt(request).await
        } else {
            let mut routed = request.clone();
            routed.model = wire_model;
            gateway.send_prompt(&routed).await
        }
    }

    /// Route and send a prompt with an attachment.
    pub async fn send_prompt_with_file(
        &self,
        request: &PromptRequest,
        file: &FileInput,
    ) -> Result<String, LlmError> {
        let (gateway, wire_model) = self.resolve(&request.model)?;
        tracing::debug!(
            gateway = gateway.name(),
            model = %wire_model,
            file = %file.path.display(),
            "sending prompt with file"
        );
        let mut routed = request.clone();
        routed.model = wire_model;
        gateway.send_prompt_with_file(&routed, file).await
    }
}
