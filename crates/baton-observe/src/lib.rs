//! Observability setup for baton: tracing subscriber and optional
//! OpenTelemetry bridge.

pub mod tracing_setup;
