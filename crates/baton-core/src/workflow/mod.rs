//! Workflow engine: planning, dependency resolution, chunking, execution,
//! and deferred dispatch.
//!
//! - `definition` -- YAML parsing, validation, `WorkflowPlan`, `WorkflowError`
//! - `resolver` -- input existence checks, forward references, producer edges
//! - `input` -- input keywords, file/glob/URL loading, the `ResourceFetcher` port
//! - `output` -- `STDOUT`/file/memory routing, the `ConsoleSink` port
//! - `chunk` -- splitting oversized inputs and recombining results
//! - `defer` -- the defer-table dispatch state machine
//! - `state` -- per-run last output and metrics
//! - `step_runner` -- one step of any kind
//! - `executor` -- `WorkflowProcessor`, sequential steps and parallel groups

pub mod chunk;
pub mod defer;
pub mod definition;
pub mod executor;
pub mod input;
pub mod output;
pub mod resolver;
pub mod state;
pub mod step_runner;
