//! Per-step timing metrics.

use serde::Serialize;

/// Milliseconds spent in each phase of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceMetrics {
    pub input_ms: u64,
    pub model_ms: u64,
    pub action_ms: u64,
    pub output_ms: u64,
    pub total_ms: u64,
}

/// Metrics recorded for a named step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepMetrics {
    pub step: String,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
}
