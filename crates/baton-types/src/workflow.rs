//! Workflow document types for baton.
//!
//! A workflow document is a YAML mapping whose top-level keys are step names in
//! declaration order. Two kinds of keys are reserved: `defer` holds steps that
//! only run when a previous step dispatches to them, and `parallel-*` keys hold
//! groups of steps that run concurrently.
//!
//! Deserialization is hand-written for the document, the defer table, and the
//! string-or-list fields so that declaration order is kept and duplicate names
//! are reported instead of silently overwritten.

use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Reserved keywords
// ---------------------------------------------------------------------------

/// Top-level key holding the defer table.
pub const DEFER_KEY: &str = "defer";

/// Prefix shared by every parallel group key (`parallel-process` and any
/// other `parallel-*` name).
pub const PARALLEL_KEY_PREFIX: &str = "parallel-";

/// Input sentinel: the step takes no input.
pub const NO_INPUT: &str = "NA";

/// Input sentinel: the step reads the running last-output value.
pub const STDIN: &str = "STDIN";

/// Output sentinel: the result is written to standard output.
pub const STDOUT: &str = "STDOUT";

/// Input/output sentinel for the memory document, optionally `MEMORY:<section>`.
pub const MEMORY: &str = "MEMORY";

/// Whether a top-level document key declares a parallel group.
pub fn is_parallel_key(key: &str) -> bool {
    key.starts_with(PARALLEL_KEY_PREFIX)
}

/// Split a `MEMORY` / `MEMORY:<section>` keyword into its optional section.
///
/// Returns `None` when `value` is not a memory keyword at all.
pub fn parse_memory_target(value: &str) -> Option<Option<&str>> {
    if value == MEMORY {
        return Some(None);
    }
    value
        .strip_prefix(MEMORY)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(|section| Some(section.trim()).filter(|s| !s.is_empty()))
}

// ---------------------------------------------------------------------------
// String-or-list fields
// ---------------------------------------------------------------------------

/// A field declared as "a single value or a list" (`input`, `model`, `action`,
/// `output`, `next-action`), kept in its raw shape until normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A single scalar. Numbers and booleans are stringified.
    Scalar(String),
    /// A list whose elements may or may not be strings.
    List(Vec<FieldItem>),
}

/// One element of a list-shaped [`FieldValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldItem {
    Text(String),
    /// Anything that is not a string (numbers, maps, nested lists, null).
    Other,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(value.to_string())
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(values: Vec<&str>) -> Self {
        FieldValue::List(
            values
                .into_iter()
                .map(|v| FieldItem::Text(v.to_string()))
                .collect(),
        )
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or a list of strings")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(FieldValue::Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(FieldValue::Scalar(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(FieldValue::Scalar(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(FieldValue::Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(FieldValue::Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(FieldValue::Scalar(v.to_string()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<FieldItem>()? {
            items.push(item);
        }
        Ok(FieldValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        // Drain and degrade to an empty list.
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(FieldValue::List(Vec::new()))
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

struct FieldItemVisitor;

impl<'de> Visitor<'de> for FieldItemVisitor {
    type Value = FieldItem;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any list element")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(FieldItem::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(FieldItem::Text(v))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(FieldItem::Other)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
        Ok(FieldItem::Other)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
        Ok(FieldItem::Other)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(FieldItem::Other)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FieldItem::Other)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FieldItem::Other)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(FieldItem::Other)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(FieldItem::Other)
    }
}

impl<'de> Deserialize<'de> for FieldItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldItemVisitor)
    }
}

// ---------------------------------------------------------------------------
// Step configuration
// ---------------------------------------------------------------------------

/// How a step with several inputs feeds them to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// All inputs go into a single prompt.
    #[default]
    Combined,
    /// One prompt per input; results are joined.
    Individual,
}

/// Unit used to measure and split oversized inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkBy {
    Lines,
    Bytes,
    Tokens,
}

impl fmt::Display for ChunkBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkBy::Lines => write!(f, "lines"),
            ChunkBy::Bytes => write!(f, "bytes"),
            ChunkBy::Tokens => write!(f, "tokens"),
        }
    }
}

/// Chunking configuration for a step.
///
/// `overlap < size` and `size > 0` are enforced when the plan is built, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub by: ChunkBy,
    pub size: usize,
    #[serde(default)]
    pub overlap: usize,
    /// Maximum number of chunks to process; 0 means unlimited.
    #[serde(default)]
    pub max_chunks: usize,
}

/// `generate` block: ask a model to write a new workflow document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateStepConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub context_files: Vec<String>,
}

/// `process` block: run another workflow document as a sub-workflow.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProcessStepConfig {
    #[serde(default)]
    pub workflow_file: String,
    /// `STDIN` seeds the nested run with the current last output; any other
    /// value is used literally.
    #[serde(default)]
    pub input: Option<String>,
}

/// Configuration of a single step as written in the workflow document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepConfig {
    /// Step kind: absent/`standard`, `openai-responses`, `generate`, `process`.
    #[serde(rename = "type", default)]
    pub step_type: Option<String>,
    #[serde(default)]
    pub input: Option<FieldValue>,
    #[serde(default)]
    pub model: Option<FieldValue>,
    #[serde(default)]
    pub action: Option<FieldValue>,
    #[serde(default)]
    pub output: Option<FieldValue>,
    #[serde(rename = "next-action", default)]
    pub next_action: Option<FieldValue>,
    #[serde(default)]
    pub batch_mode: BatchMode,
    #[serde(default)]
    pub skip_errors: bool,
    #[serde(default)]
    pub chunk: Option<ChunkConfig>,
    /// Prepend the memory document to the prompt.
    #[serde(default)]
    pub memory: bool,

    // Provider-extended fields, passed through to the gateway.
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
    #[serde(default)]
    pub previous_response_id: Option<String>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub response_format: Option<serde_json::Value>,

    #[serde(default)]
    pub generate: Option<GenerateStepConfig>,
    #[serde(default)]
    pub process: Option<ProcessStepConfig>,
}

/// Resolved kind of a step, derived from `type` and the nested blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Standard,
    Responses,
    Generate,
    Process,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Standard => write!(f, "standard"),
            StepKind::Responses => write!(f, "openai-responses"),
            StepKind::Generate => write!(f, "generate"),
            StepKind::Process => write!(f, "process"),
        }
    }
}

impl StepConfig {
    /// Resolve the step kind. Unknown `type` values are returned as `Err`.
    pub fn kind(&self) -> Result<StepKind, String> {
        match self.step_type.as_deref().map(str::trim) {
            None | Some("") | Some("standard") => {
                if self.generate.is_some() {
                    Ok(StepKind::Generate)
                } else if self.process.is_some() {
                    Ok(StepKind::Process)
                } else {
                    Ok(StepKind::Standard)
                }
            }
            Some("openai-responses") => Ok(StepKind::Responses),
            Some("generate") => Ok(StepKind::Generate),
            Some("process") => Ok(StepKind::Process),
            Some(other) => Err(other.to_string()),
        }
    }
}

/// A named step.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub config: StepConfig,
}

impl Step {
    pub fn new(name: impl Into<String>, config: StepConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Producer/consumer edge summary for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDependency {
    pub name: String,
    pub depends_on: Vec<String>,
}

// ---------------------------------------------------------------------------
// Ordered step maps (defer table, parallel groups)
// ---------------------------------------------------------------------------

/// An ordered name → config mapping that rejects duplicate names.
#[derive(Debug, Clone, Default)]
pub struct StepTable {
    steps: Vec<Step>,
}

impl StepTable {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

struct StepTableVisitor {
    scope: &'static str,
}

impl<'de> Visitor<'de> for StepTableVisitor {
    type Value = StepTable;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a mapping of step names to step definitions in the {} block", self.scope)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(StepTable::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut steps: Vec<Step> = Vec::new();
        while let Some(name) = map.next_key::<String>()? {
            if steps.iter().any(|s| s.name == name) {
                return Err(de::Error::custom(format!(
                    "step '{name}' is already defined in {} block",
                    self.scope
                )));
            }
            let config = map.next_value::<StepConfig>()?;
            steps.push(Step::new(name, config));
        }
        Ok(StepTable { steps })
    }
}

/// Defer table: steps that only run when dispatched by name.
#[derive(Debug, Clone, Default)]
pub struct DeferTable(pub StepTable);

impl<'de> Deserialize<'de> for DeferTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_map(StepTableVisitor { scope: "defer" })
            .map(DeferTable)
    }
}

struct ParallelGroupTable(StepTable);

impl<'de> Deserialize<'de> for ParallelGroupTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_map(StepTableVisitor { scope: "parallel" })
            .map(ParallelGroupTable)
    }
}

// ---------------------------------------------------------------------------
// Workflow document
// ---------------------------------------------------------------------------

/// One top-level entry of a workflow document, in declaration order.
#[derive(Debug, Clone)]
pub enum DocumentEntry {
    Step(Step),
    Parallel { key: String, steps: Vec<Step> },
}

/// A parsed workflow document before validation.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDocument {
    pub entries: Vec<DocumentEntry>,
    pub defer: DeferTable,
}

impl WorkflowDocument {
    /// Top-level sequential steps, in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.entries.iter().filter_map(|e| match e {
            DocumentEntry::Step(step) => Some(step),
            DocumentEntry::Parallel { .. } => None,
        })
    }

    /// Parallel groups as (key, members), in declaration order.
    pub fn parallel_groups(&self) -> impl Iterator<Item = (&str, &[Step])> {
        self.entries.iter().filter_map(|e| match e {
            DocumentEntry::Parallel { key, steps } => Some((key.as_str(), steps.as_slice())),
            DocumentEntry::Step(_) => None,
        })
    }

    /// Every step in the document: sequential, grouped, and deferred.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.entries
            .iter()
            .flat_map(|e| match e {
                DocumentEntry::Step(step) => std::slice::from_ref(step).iter(),
                DocumentEntry::Parallel { steps, .. } => steps.iter(),
            })
            .chain(self.defer.0.iter())
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = WorkflowDocument;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of step names to step definitions")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(WorkflowDocument::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        let mut defer: Option<DeferTable> = None;

        while let Some(key) = map.next_key::<String>()? {
            if key == DEFER_KEY {
                if defer.is_some() {
                    return Err(de::Error::custom("the defer block is already defined"));
                }
                defer = Some(map.next_value::<DeferTable>()?);
            } else if is_parallel_key(&key) {
                let ParallelGroupTable(table) = map.next_value()?;
                entries.push(DocumentEntry::Parallel {
                    key,
                    steps: table.into_steps(),
                });
            } else {
                let config = map.next_value::<StepConfig>()?;
                entries.push(DocumentEntry::Step(Step::new(key, config)));
            }
        }

        Ok(WorkflowDocument {
            entries,
            defer: defer.unwrap_or_default(),
        })
    }
}

impl<'de> Deserialize<'de> for WorkflowDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DocumentVisitor)
    }
}
