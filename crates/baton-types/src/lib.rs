//! Shared domain types for baton.
//!
//! Workflow document shapes, provider request types, configuration, and the
//! error types shared between the engine and its adapters.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, thiserror.

pub mod config;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod workflow;
