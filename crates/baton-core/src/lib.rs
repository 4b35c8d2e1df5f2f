//! The baton workflow engine.
//!
//! Defines the ports that the infrastructure layer implements
//! (`ProviderGateway`, `ResourceFetcher`, `ConsoleSink`) and everything that
//! turns a workflow document into model calls. Depends only on
//! `baton-types` -- never on `baton-infra` or any HTTP crate.

pub mod llm;
pub mod memory;
pub mod normalize;
pub mod workflow;
