//! Anthropic Messages API gateway.
//!
//! [`AnthropicGateway`] implements
//! [`ProviderGateway`](baton_core::llm::gateway::ProviderGateway) against
//! `/v1/messages`, attaching images and PDFs as base64 content blocks.

pub mod client;
pub mod types;

pub use client::AnthropicGateway;
