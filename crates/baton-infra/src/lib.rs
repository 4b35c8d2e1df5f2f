//! Infrastructure layer for baton.
//!
//! Implements the ports defined in `baton-core`: reqwest-based provider
//! gateways, the HTTP resource fetcher for URL inputs, `config.toml`
//! loading, and memory document discovery.

pub mod config;
pub mod fetch;
pub mod llm;
pub mod memory_path;
