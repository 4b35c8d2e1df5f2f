//! Workflow definition parsing, validation, and plan construction.
//!
//! Turns YAML into a [`WorkflowDocument`], checks every step's required
//! fields and chunk bounds, rejects duplicate names, and hands the document to
//! the dependency resolver. The resulting [`WorkflowPlan`] is immutable.

use std::collections::HashSet;
use std::path::Path;

use baton_types::llm::LlmError;
use baton_types::memory::MemoryError;
use baton_types::workflow::{
    DocumentEntry, Step, StepDependency, StepKind, StepTable, WorkflowDocument,
};
use thiserror::Error;

use super::chunk::validate_chunk_config;
use super::resolver;
use crate::normalize::normalize_string_slice;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while building or running a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML parse failure, including duplicate names inside the defer block.
    #[error("parse error: {0}")]
    Parse(String),

    /// Missing required field, bad chunk bounds, unknown step type, ...
    #[error("validation error: {0}")]
    ConfigValidation(String),

    /// An input that neither exists nor is produced by any step.
    #[error("dependency error: step '{step}': input '{path}' does not exist and is not produced by any step")]
    Dependency { step: String, path: String },

    /// The provider gateway returned an error.
    #[error("step '{step}': provider call failed: {source}")]
    Provider {
        step: String,
        #[source]
        source: LlmError,
    },

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A network input could not be downloaded.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Any other per-step runtime failure.
    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Sub-workflow nesting depth exceeded.
    #[error("sub-workflow depth {depth} exceeds maximum {max}")]
    SubWorkflowDepthExceeded { depth: u32, max: u32 },
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A validated, dependency-checked workflow ready for execution.
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    document: WorkflowDocument,
    dependencies: Vec<StepDependency>,
}

impl WorkflowPlan {
    /// Top-level entries (steps and parallel groups) in declaration order.
    pub fn entries(&self) -> &[DocumentEntry] {
        &self.document.entries
    }

    /// Top-level sequential steps in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.document.steps()
    }

    pub fn parallel_groups(&self) -> impl Iterator<Item = (&str, &[Step])> {
        self.document.parallel_groups()
    }

    pub fn has_defer(&self) -> bool {
        !self.document.defer.0.is_empty()
    }

    pub fn defer_table(&self) -> &StepTable {
        &self.document.defer.0
    }

    /// Producer edges for every step that reads another step's output.
    pub fn dependencies(&self) -> &[StepDependency] {
        &self.dependencies
    }

    /// Steps that run as part of the main sequence (including group members).
    pub fn step_count(&self) -> usize {
        self.document
            .entries
            .iter()
            .map(|e| match e {
                DocumentEntry::Step(_) => 1,
                DocumentEntry::Parallel { steps, .. } => steps.len(),
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse YAML into a document without validating it.
pub fn parse_workflow_document(yaml: &str) -> Result<WorkflowDocument, WorkflowError> {
    if yaml.trim().is_empty() {
        return Ok(WorkflowDocument::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))
}

/// Parse, validate, and resolve a workflow document.
///
/// Relative input paths are checked against `base_dir`.
pub fn parse_workflow_yaml(yaml: &str, base_dir: &Path) -> Result<WorkflowPlan, WorkflowError> {
    let document = parse_workflow_document(yaml)?;
    build_plan(document, base_dir)
}

/// Validate a parsed document and resolve its dependencies.
pub fn build_plan(document: WorkflowDocument, base_dir: &Path) -> Result<WorkflowPlan, WorkflowError> {
    validate_document(&document)?;
    let dependencies = resolver::resolve(&document, base_dir)?;
    Ok(WorkflowPlan {
        document,
        dependencies,
    })
}

/// Load a workflow file and build its plan against `base_dir`.
pub fn load_workflow_file(path: &Path, base_dir: &Path) -> Result<WorkflowPlan, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content, base_dir)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural validation of a whole document.
///
/// Checks:
/// - at least one step outside the defer block
/// - top-level and group step names are unique
/// - every step (deferred ones included) passes [`validate_step`]
pub fn validate_document(document: &WorkflowDocument) -> Result<(), WorkflowError> {
    let main_steps: Vec<&Step> = document
        .entries
        .iter()
        .flat_map(|e| match e {
            DocumentEntry::Step(step) => std::slice::from_ref(step).iter(),
            DocumentEntry::Parallel { steps, .. } => steps.iter(),
        })
        .collect();

    if main_steps.is_empty() {
        return Err(WorkflowError::ConfigValidation(
            "workflow must have at least one step".to_string(),
        ));
    }

    for (key, steps) in document.parallel_groups() {
        if steps.is_empty() {
            return Err(WorkflowError::ConfigValidation(format!(
                "parallel group '{key}' has no steps"
            )));
        }
    }

    let mut seen = HashSet::new();
    for step in &main_steps {
        if !seen.insert(step.name.as_str()) {
            return Err(WorkflowError::ConfigValidation(format!(
                "step '{}' is already defined",
                step.name
            )));
        }
    }

    for step in document.all_steps() {
        validate_step(step)?;
    }
    Ok(())
}

/// Check the required fields of one step for its kind.
pub fn validate_step(step: &Step) -> Result<(), WorkflowError> {
    let fail = |message: &str| {
        Err(WorkflowError::ConfigValidation(format!(
            "step '{}': {message}",
            step.name
        )))
    };
    let config = &step.config;

    let kind = match config.kind() {
        Ok(kind) => kind,
        Err(other) => return fail(&format!("unknown step type '{other}'")),
    };

    match kind {
        StepKind::Standard | StepKind::Responses => {
            // An empty or `NA` input is fine; only a missing tag is an error.
            if config.input.is_none() {
                return fail("input tag is required");
            }
            if !has_value(&normalize_string_slice(config.model.as_ref())) {
                return fail("model is required");
            }
            if !has_value(&normalize_string_slice(config.action.as_ref())) {
                return fail("action is required");
            }
            if !has_value(&normalize_string_slice(config.output.as_ref())) {
                return fail("output is required");
            }
        }
        StepKind::Generate => {
            let Some(generate) = &config.generate else {
                return fail("generate block is required");
            };
            if generate.action.trim().is_empty() {
                return fail("generate.action is required");
            }
            if generate.output.trim().is_empty() {
                return fail("generate.output is required");
            }
        }
        StepKind::Process => {
            let Some(process) = &config.process else {
                return fail("process block is required");
            };
            if process.workflow_file.trim().is_empty() {
                return fail("process.workflow_file is required");
            }
        }
    }

    if let Some(chunk) = &config.chunk {
        if let Err(message) = validate_chunk_config(chunk) {
            return fail(&message);
        }
    }
    Ok(())
}

fn has_value(values: &[String]) -> bool {
    values.iter().any(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
