//! Per-run execution state: the running last-output value and step metrics.
//!
//! The last output is a lock-guarded cell shared by concurrent parallel
//! members. Group members read a snapshot taken before the group starts and
//! never write it; the group's aggregate is written once, after the join.

use baton_types::metrics::{PerformanceMetrics, StepMetrics};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
pub struct ExecutionState {
    last_output: RwLock<String>,
    metrics: Mutex<Vec<StepMetrics>>,
}

impl ExecutionState {
    /// Create state seeded with an optional piped value.
    pub fn new(initial: Option<String>) -> Self {
        Self {
            last_output: RwLock::new(initial.unwrap_or_default()),
            metrics: Mutex::new(Vec::new()),
        }
    }

    /// Current last-output value.
    pub async fn last_output(&self) -> String {
        self.last_output.read().await.clone()
    }

    pub async fn set_last_output(&self, value: impl Into<String>) {
        *self.last_output.write().await = value.into();
    }

    pub async fn record(&self, step: &str, metrics: PerformanceMetrics) {
        self.metrics.lock().await.push(StepMetrics {
            step: step.to_string(),
            metrics,
        });
    }

    /// Metrics in the order steps finished.
    pub async fn metrics(&self) -> Vec<StepMetrics> {
        self.metrics.lock().await.clone()
    }
}
