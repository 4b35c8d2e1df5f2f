//! Provider gateway abstractions.
//!
//! - `ProviderGateway`: RPITIT trait for concrete provider clients
//! - `BoxGateway`: object-safe wrapper for dynamic dispatch
//! - `GatewayRegistry`: routes model names to gateways

pub mod box_gateway;
pub mod gateway;
#[cfg(test)]
pub(crate) mod mock;
pub mod registry;
