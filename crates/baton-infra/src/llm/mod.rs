//! Provider gateway implementations.
//!
//! Contains the concrete [`ProviderGateway`] implementations for
//! OpenAI-compatible servers and Anthropic, plus [`build_registry`], which
//! turns the configured provider table into a [`GatewayRegistry`].

pub mod anthropic;
pub mod openai_compat;

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::SecretString;

use baton_core::llm::box_gateway::BoxGateway;
use baton_core::llm::gateway::ProviderGateway;
use baton_core::llm::registry::GatewayRegistry;
use baton_types::config::{ProviderConfig, ProviderKind};
use baton_types::llm::{FileInput, LlmError, PromptRequest};

use self::anthropic::AnthropicGateway;
use self::openai_compat::OpenAiCompatibleGateway;

/// Shared reqwest client settings: 5 min timeout for long generations.
pub(crate) fn build_http_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| LlmError::Provider {
            message: format!("failed to create HTTP client: {e}"),
        })
}

/// Map a non-success HTTP status to an [`LlmError`].
pub(crate) fn status_error(status: StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: None,
        },
        400 => LlmError::InvalidRequest(body),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

/// Stand-in for a provider that could not be constructed.
///
/// Routing still reaches it, so a step using its models fails with the
/// reason instead of "no provider configured".
struct UnavailableGateway {
    name: String,
    reason: String,
}

impl ProviderGateway for UnavailableGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_prompt(&self, _request: &PromptRequest) -> Result<String, LlmError> {
        Err(LlmError::InvalidRequest(self.reason.clone()))
    }

    async fn send_prompt_with_file(
        &self,
        _request: &PromptRequest,
        _file: &FileInput,
    ) -> Result<String, LlmError> {
        Err(LlmError::InvalidRequest(self.reason.clone()))
    }
}

/// Create a [`BoxGateway`] for one configured provider.
///
/// `api_key` is the already-resolved value of the provider's key variable.
pub fn create_gateway(
    config: &ProviderConfig,
    api_key: Option<String>,
) -> Result<BoxGateway, LlmError> {
    let secret = api_key.map(SecretString::from);
    match config.kind {
        ProviderKind::OpenAiCompatible => {
            if config.api_key_env.is_some() && secret.is_none() {
                return Err(LlmError::AuthenticationFailed);
            }
            let gateway = OpenAiCompatibleGateway::new(&config.name, &config.base_url, secret)?;
            Ok(BoxGateway::new(gateway))
        }
        ProviderKind::Anthropic => {
            let key = secret.ok_or(LlmError::AuthenticationFailed)?;
            let gateway = AnthropicGateway::new(&config.name, key, &config.base_url)?;
            Ok(BoxGateway::new(gateway))
        }
    }
}

/// Build the routing table from `providers`, in order.
///
/// `lookup_env` resolves key variable names (normally `std::env::var`).
/// Providers whose key is missing are still registered, as gateways that
/// fail with a message naming the variable.
pub fn build_registry(
    providers: &[ProviderConfig],
    lookup_env: impl Fn(&str) -> Option<String>,
) -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();

    for provider in providers {
        let api_key = provider
            .api_key_env
            .as_deref()
            .and_then(&lookup_env)
            .filter(|k| !k.trim().is_empty());

        let gateway = match create_gateway(provider, api_key) {
            Ok(gateway) => gateway,
            Err(err) => {
                let reason = match (&err, provider.api_key_env.as_deref()) {
                    (LlmError::AuthenticationFailed, Some(var)) => {
                        format!("provider '{}' needs {var} to be set", provider.name)
                    }
                    _ => format!("provider '{}' is unavailable: {err}", provider.name),
                };
                tracing::debug!(provider = %provider.name, %reason, "provider not ready");
                BoxGateway::new(UnavailableGateway {
                    name: provider.name.clone(),
                    reason,
                })
            }
        };

        registry.register(
            provider.models.clone(),
            provider.strip_prefix.clone(),
            gateway,
        );
    }

    registry
}
