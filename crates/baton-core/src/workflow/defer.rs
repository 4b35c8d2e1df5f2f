//! DeferDispatcher: one-level conditional dispatch into the defer table.
//!
//! After a step completes, its textual result is inspected for a payload of
//! the form `{"step": "<name>", "input": <value>}`. A payload that parses and
//! names an entry of the defer table moves the dispatcher to `Dispatched`;
//! anything else moves it straight to `Terminal` and leaves the last output
//! alone.

use baton_types::workflow::{Step, StepTable};
use serde_json::Value;

/// Dispatcher state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferState {
    Idle,
    Inspecting,
    Dispatched { step: String },
    Terminal,
}

/// A parsed dispatch payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferPayload {
    pub step: String,
    /// Value to inject as the new last output before the deferred step runs.
    pub input: String,
}

/// The deferred step selected by a payload.
#[derive(Debug, Clone)]
pub struct Dispatch<'t> {
    pub step: &'t Step,
    pub input: String,
}

/// State machine over a closed set of dispatch targets (the defer table keys).
#[derive(Debug)]
pub struct DeferDispatcher<'t> {
    table: &'t StepTable,
    state: DeferState,
}

impl<'t> DeferDispatcher<'t> {
    pub fn new(table: &'t StepTable) -> Self {
        Self {
            table,
            state: DeferState::Idle,
        }
    }

    pub fn state(&self) -> &DeferState {
        &self.state
    }

    /// Inspect a step result. Returns the deferred step to run, if any.
    pub fn inspect(&mut self, output: &str) -> Option<Dispatch<'t>> {
        if self.table.is_empty() {
            self.state = DeferState::Terminal;
            return None;
        }
        self.state = DeferState::Inspecting;

        let Some(payload) = parse_payload(output) else {
            tracing::debug!("step output is not a defer payload");
            self.state = DeferState::Terminal;
            return None;
        };

        match self.table.get(&payload.step) {
            Some(step) => {
                self.state = DeferState::Dispatched {
                    step: payload.step.clone(),
                };
                Some(Dispatch {
                    step,
                    input: payload.input,
                })
            }
            None => {
                tracing::debug!(step = %payload.step, "defer payload names no deferred step");
                self.state = DeferState::Terminal;
                None
            }
        }
    }

    /// Mark the dispatched step as finished. Deferred steps never defer again.
    pub fn complete(&mut self) {
        self.state = DeferState::Terminal;
    }
}

/// Parse `{"step": ..., "input": ...}` out of a step result.
///
/// A surrounding Markdown code fence is removed first. `step` must be a
/// non-empty string. A string `input` is used as is; any other non-null
/// value is forwarded as its JSON text.
pub fn parse_payload(output: &str) -> Option<DeferPayload> {
    let text = strip_code_fence(output.trim());
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;

    let step = object.get("step")?.as_str()?.trim();
    if step.is_empty() {
        return None;
    }

    let input = match object.get("input") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Some(DeferPayload {
        step: step.to_string(),
        input,
    })
}

/// Remove a leading ```` ```lang ```` line and a trailing ```` ``` ```` line.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
