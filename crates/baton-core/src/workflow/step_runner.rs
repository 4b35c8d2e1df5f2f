//! Step runner for the four step kinds.
//!
//! `StepRunner` resolves a step's inputs, calls the provider gateway (once,
//! per input, or per chunk), applies `next-action`s, routes the result to the
//! declared outputs, and returns the text that becomes the new last output.
//!
//! Step kinds: standard, openai-responses, generate, process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use baton_types::llm::{ApiMode, FileInput, PromptOptions, PromptRequest};
use baton_types::metrics::PerformanceMetrics;
use baton_types::workflow::{
    BatchMode, ChunkConfig, GenerateStepConfig, ProcessStepConfig, STDIN, Step, StepConfig,
    StepKind,
};
use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::chunk::{self, CHUNK_SEPARATOR};
use super::defer::strip_code_fence;
use super::definition::{WorkflowError, parse_workflow_document, parse_workflow_yaml, validate_document};
use super::executor::WorkflowProcessor;
use super::input::{
    InputSource, Loaded, LoadedInputs, ResourceFetcher, TextInput, classify_input, expand_glob,
    read_file_input, resolve_path,
};
use super::output::{ConsoleSink, OutputWriter};
use crate::llm::registry::GatewayRegistry;
use crate::memory::manager::MemoryManager;
use crate::normalize::{normalize_input, normalize_string_slice};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum sub-workflow nesting depth.
pub const MAX_SUB_WORKFLOW_DEPTH: u32 = 5;

/// Separator between results of multiple models, inputs, or files.
pub const RESULT_SEPARATOR: &str = "\n\n";

const CURRENT_CHUNK: &str = "current_chunk";
const CHUNK_INDEX: &str = "chunk_index";
const TOTAL_CHUNKS: &str = "total_chunks";

/// Format reference sent with every `generate` request.
const GENERATE_GUIDE: &str = "\
You write workflow documents in YAML. Each top-level key is a step name mapping to:
  input: a file path, a list of paths, NA (no input) or STDIN (previous step's result)
  model: a model name or a list of model names
  action: the instruction for the model
  output: STDOUT, a file path, MEMORY or MEMORY:<section>
Optional step fields: batch_mode (combined|individual), skip_errors, chunk {by, size, overlap}.
Steps run in the order they are declared. Reply with the YAML document only.";

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Everything a step needs from the outside world, shared by all steps of a
/// run and by nested sub-workflows.
pub struct StepServices {
    pub gateways: Arc<GatewayRegistry>,
    pub memory: Arc<MemoryManager>,
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub sink: Arc<dyn ConsoleSink>,
    /// Directory relative input and output paths resolve against.
    pub base_dir: PathBuf,
    /// Maximum chunk calls in flight for one step.
    pub chunk_concurrency: usize,
    /// Model for `generate` steps that do not name one.
    pub generation_model: String,
}

/// Result of one step.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub output: String,
    pub metrics: PerformanceMetrics,
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes individual steps. Cheap to clone; clones share services.
#[derive(Clone)]
pub struct StepRunner {
    services: Arc<StepServices>,
    depth: u32,
}

impl StepRunner {
    pub fn new(services: Arc<StepServices>) -> Self {
        Self { services, depth: 0 }
    }

    /// Runner for a sub-workflow at nesting `depth`.
    pub fn with_depth(services: Arc<StepServices>, depth: u32) -> Self {
        Self { services, depth }
    }

    pub fn services(&self) -> &Arc<StepServices> {
        &self.services
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Run a step against the current last output.
    ///
    /// With `skip_errors`, a failure is logged and turned into an empty result.
    pub async fn run(&self, step: &Step, last_output: &str) -> Result<StepResult, WorkflowError> {
        let started = Instant::now();
        match self.execute(step, last_output).await {
            Ok(result) => Ok(result),
            Err(err) if step.config.skip_errors => {
                tracing::warn!(step = %step.name, error = %err, "step failed, continuing (skip_errors)");
                Ok(StepResult {
                    output: String::new(),
                    metrics: PerformanceMetrics {
                        total_ms: elapsed_ms(started),
                        ..Default::default()
                    },
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn execute(&self, step: &Step, last_output: &str) -> Result<StepResult, WorkflowError> {
        let kind = step
            .config
            .kind()
            .map_err(|other| WorkflowError::ConfigValidation(format!("step '{}': unknown step type '{other}'", step.name)))?;

        tracing::debug!(step = %step.name, kind = %kind, depth = self.depth, "running step");

        match kind {
            StepKind::Standard | StepKind::Responses => {
                self.run_model_step(step, kind, last_output).await
            }
            StepKind::Generate => {
                let config = step.config.generate.as_ref().ok_or_else(|| {
                    WorkflowError::ConfigValidation(format!("step '{}': generate block is required", step.name))
                })?;
                self.run_generate(&step.name, config).await
            }
            StepKind::Process => {
                let config = step.config.process.as_ref().ok_or_else(|| {
                    WorkflowError::ConfigValidation(format!("step '{}': process block is required", step.name))
                })?;
                self.run_process(&step.name, config, last_output).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Standard / Responses
    // -----------------------------------------------------------------------

    async fn run_model_step(
        &self,
        step: &Step,
        kind: StepKind,
        last_output: &str,
    ) -> Result<StepResult, WorkflowError> {
        let started = Instant::now();
        let config = &step.config;
        let models = non_empty(normalize_string_slice(config.model.as_ref()));
        let actions = non_empty(normalize_string_slice(config.action.as_ref()));
        let outputs = normalize_string_slice(config.output.as_ref());
        let next_actions = non_empty(normalize_string_slice(config.next_action.as_ref()));

        // Input phase. `loaded` holds fetched temp files until this step ends.
        let phase = Instant::now();
        let loaded = self
            .load_inputs(&step.name, &normalize_input(config.input.as_ref()), last_output)
            .await?;
        let memory_context = if config.memory {
            Some(self.services.memory.read().await).filter(|m| !m.trim().is_empty())
        } else {
            None
        };
        let input_ms = elapsed_ms(phase);

        // Model phase.
        let phase = Instant::now();
        let action = actions.join("\n");
        let options = prompt_options(config, kind);
        let call = ModelCall {
            step: &step.name,
            config,
            action: &action,
            memory: memory_context.as_deref(),
            options: &options,
        };

        let mut per_model = Vec::with_capacity(models.len());
        for model in &models {
            let result = self.invoke_model(&call, model, &loaded).await?;
            per_model.push((model.clone(), result));
        }
        let mut combined = combine_model_results(&per_model);
        let model_ms = elapsed_ms(phase);

        // Action phase: chained next-actions on the first model.
        let phase = Instant::now();
        if let Some(first_model) = models.first() {
            for next in &next_actions {
                let prompt = build_prompt(
                    next,
                    &[TextInput {
                        label: "previous result".to_string(),
                        content: combined.clone(),
                    }],
                    None,
                );
                combined = self.send(&step.name, first_model, prompt, &options).await?;
            }
        }
        let action_ms = elapsed_ms(phase);

        // Output phase.
        let phase = Instant::now();
        let writer = OutputWriter {
            sink: self.services.sink.as_ref(),
            memory: self.services.memory.as_ref(),
            base_dir: &self.services.base_dir,
        };
        let per_output = next_actions.is_empty() && models.len() > 1 && outputs.len() == models.len();
        for (i, target) in outputs.iter().enumerate() {
            let content = if per_output { &per_model[i].1 } else { &combined };
            writer.write(&step.name, target, content).await?;
        }
        let output_ms = elapsed_ms(phase);

        drop(loaded);
        let metrics = PerformanceMetrics {
            input_ms,
            model_ms,
            action_ms,
            output_ms,
            total_ms: elapsed_ms(started),
        };
        tracing::info!(
            step = %step.name,
            models = models.len(),
            elapsed_ms = metrics.total_ms,
            "step completed"
        );
        Ok(StepResult {
            output: combined,
            metrics,
        })
    }

    /// Resolve every declared input into text or attachments.
    async fn load_inputs(
        &self,
        step: &str,
        inputs: &[String],
        last_output: &str,
    ) -> Result<LoadedInputs, WorkflowError> {
        let mut loaded = LoadedInputs::default();

        for raw in inputs {
            match classify_input(raw) {
                InputSource::None => {}
                InputSource::Pipe => {
                    if last_output.is_empty() {
                        tracing::debug!(step, "STDIN input is empty");
                    } else {
                        loaded.texts.push(TextInput {
                            label: STDIN.to_string(),
                            content: last_output.to_string(),
                        });
                    }
                }
                InputSource::Memory(section) => {
                    let (label, content) = match section {
                        Some(section) => (
                            format!("MEMORY:{section}"),
                            self.services.memory.read_section(&section).await,
                        ),
                        None => ("MEMORY".to_string(), self.services.memory.read().await),
                    };
                    loaded.texts.push(TextInput { label, content });
                }
                InputSource::Url(url) => {
                    let temp = self
                        .services
                        .fetcher
                        .fetch(&url)
                        .await
                        .map_err(|message| WorkflowError::Fetch {
                            url: url.clone(),
                            message,
                        })?;
                    let item = read_file_input(step, &temp, &url).await?;
                    push_loaded(&mut loaded, item);
                    loaded.temp_files.push(temp);
                }
                InputSource::Glob(pattern) => {
                    let paths = expand_glob(&self.services.base_dir, &pattern).map_err(|message| {
                        WorkflowError::StepFailed {
                            step: step.to_string(),
                            message,
                        }
                    })?;
                    if paths.is_empty() {
                        return Err(WorkflowError::Dependency {
                            step: step.to_string(),
                            path: pattern,
                        });
                    }
                    for path in paths {
                        let label = path.display().to_string();
                        push_loaded(&mut loaded, read_file_input(step, &path, &label).await?);
                    }
                }
                InputSource::File(file) => {
                    let path = resolve_path(&self.services.base_dir, &file);
                    push_loaded(&mut loaded, read_file_input(step, &path, &file).await?);
                }
            }
        }
        Ok(loaded)
    }

    /// Run one model over the loaded inputs, honouring batch mode and chunking.
    async fn invoke_model(
        &self,
        call: &ModelCall<'_>,
        model: &str,
        loaded: &LoadedInputs,
    ) -> Result<String, WorkflowError> {
        if !loaded.files.is_empty() {
            return self.invoke_with_files(call, model, loaded).await;
        }

        if call.config.batch_mode == BatchMode::Individual && loaded.texts.len() > 1 {
            let mut results = Vec::with_capacity(loaded.texts.len());
            for text in &loaded.texts {
                match self.process_texts(call, model, std::slice::from_ref(text)).await {
                    Ok(result) => results.push(result),
                    Err(err) if call.config.skip_errors => {
                        tracing::warn!(step = call.step, input = %text.label, error = %err, "input failed, skipping");
                    }
                    Err(err) => return Err(err),
                }
            }
            return Ok(results.join(RESULT_SEPARATOR));
        }

        self.process_texts(call, model, &loaded.texts).await
    }

    /// One `send_prompt_with_file` call per attachment; text inputs go into
    /// every prompt.
    async fn invoke_with_files(
        &self,
        call: &ModelCall<'_>,
        model: &str,
        loaded: &LoadedInputs,
    ) -> Result<String, WorkflowError> {
        let prompt = build_prompt(call.action, &loaded.texts, call.memory);
        let mut results = Vec::with_capacity(loaded.files.len());
        for file in &loaded.files {
            match self.send_with_file(call.step, model, &prompt, file, call.options).await {
                Ok(result) => results.push(result),
                Err(err) if call.config.skip_errors && loaded.files.len() > 1 => {
                    tracing::warn!(step = call.step, file = %file.path.display(), error = %err, "attachment failed, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(results.join(RESULT_SEPARATOR))
    }

    /// Prompt with `texts`, chunking when the rendered input is over threshold.
    async fn process_texts(
        &self,
        call: &ModelCall<'_>,
        model: &str,
        texts: &[TextInput],
    ) -> Result<String, WorkflowError> {
        if let Some(chunk_config) = &call.config.chunk {
            let content = render_inputs(texts);
            if chunk::needs_chunking(&content, chunk_config) {
                return self.process_chunked(call, model, &content, chunk_config).await;
            }
        }
        let prompt = build_prompt(call.action, texts, call.memory);
        self.send(call.step, model, prompt, call.options).await
    }

    async fn process_chunked(
        &self,
        call: &ModelCall<'_>,
        model: &str,
        content: &str,
        chunk_config: &ChunkConfig,
    ) -> Result<String, WorkflowError> {
        let split = chunk::split(content, chunk_config);
        let total = split.len();
        if split.truncated() {
            tracing::warn!(
                step = call.step,
                kept = split.len(),
                needed = split.total(),
                max_chunks = chunk_config.max_chunks,
                "chunk limit reached, remaining chunks dropped"
            );
        }
        tracing::info!(step = call.step, chunks = total, by = %chunk_config.by, "processing input in chunks");

        let semaphore = Arc::new(Semaphore::new(self.services.chunk_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for piece in split {
            let prompt = chunk_prompt(call.action, &piece, total, call.memory);
            let request = PromptRequest::new(model, prompt).with_options(call.options.clone());
            let gateways = Arc::clone(&self.services.gateways);
            let semaphore = Arc::clone(&semaphore);
            let step = call.step.to_string();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| WorkflowError::StepFailed {
                    step: step.clone(),
                    message: format!("chunk scheduler closed: {e}"),
                })?;
                tracing::debug!(step = %step, chunk = piece.index + 1, "sending chunk");
                gateways
                    .send_prompt(&request)
                    .await
                    .map(|text| (piece.index, text))
                    .map_err(|source| WorkflowError::Provider { step, source })
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined.map_err(|e| WorkflowError::StepFailed {
                step: call.step.to_string(),
                message: format!("chunk task failed: {e}"),
            })?;
            match outcome {
                Ok(result) => results.push(result),
                Err(err) if call.config.skip_errors => {
                    tracing::warn!(step = call.step, error = %err, "chunk failed, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(chunk::recombine(results))
    }

    async fn send(
        &self,
        step: &str,
        model: &str,
        prompt: String,
        options: &PromptOptions,
    ) -> Result<String, WorkflowError> {
        let request = PromptRequest::new(model, prompt).with_options(options.clone());
        self.services
            .gateways
            .send_prompt(&request)
            .await
            .map_err(|source| WorkflowError::Provider {
                step: step.to_string(),
                source,
            })
    }

    async fn send_with_file(
        &self,
        step: &str,
        model: &str,
        prompt: &str,
        file: &FileInput,
        options: &PromptOptions,
    ) -> Result<String, WorkflowError> {
        let request = PromptRequest::new(model, prompt).with_options(options.clone());
        self.services
            .gateways
            .send_prompt_with_file(&request, file)
            .await
            .map_err(|source| WorkflowError::Provider {
                step: step.to_string(),
                source,
            })
    }

    // -----------------------------------------------------------------------
    // Generate
    // -----------------------------------------------------------------------

    async fn run_generate(
        &self,
        step: &str,
        config: &GenerateStepConfig,
    ) -> Result<StepResult, WorkflowError> {
        let started = Instant::now();
        let model = config
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.services.generation_model)
            .to_string();

        let phase = Instant::now();
        let mut context = Vec::with_capacity(config.context_files.len());
        for file in &config.context_files {
            let path = resolve_path(&self.services.base_dir, file);
            match read_file_input(step, &path, file).await? {
                Loaded::Text(text) => context.push(text),
                Loaded::File(_) => {
                    tracing::warn!(step, file = %file, "binary context file ignored");
                }
            }
        }
        let input_ms = elapsed_ms(phase);

        let phase = Instant::now();
        let prompt = build_prompt(&format!("{GENERATE_GUIDE}\n\nRequest: {}", config.action), &context, None);
        let response = self.send(step, &model, prompt, &PromptOptions::default()).await?;
        let model_ms = elapsed_ms(phase);

        let yaml = strip_code_fence(response.trim()).to_string();
        let document = parse_workflow_document(&yaml).map_err(|e| WorkflowError::StepFailed {
            step: step.to_string(),
            message: format!("generated workflow is invalid: {e}"),
        })?;
        validate_document(&document).map_err(|e| WorkflowError::StepFailed {
            step: step.to_string(),
            message: format!("generated workflow is invalid: {e}"),
        })?;

        let phase = Instant::now();
        let path = resolve_path(&self.services.base_dir, config.output.trim());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, format!("{yaml}\n")).await?;
        let output_ms = elapsed_ms(phase);

        tracing::info!(step, model = %model, path = %path.display(), "generated workflow written");
        Ok(StepResult {
            output: format!("Generated workflow written to {}", config.output.trim()),
            metrics: PerformanceMetrics {
                input_ms,
                model_ms,
                action_ms: 0,
                output_ms,
                total_ms: elapsed_ms(started),
            },
        })
    }

    // -----------------------------------------------------------------------
    // Process (sub-workflow)
    // -----------------------------------------------------------------------

    /// Boxed to break the async recursion through [`WorkflowProcessor::run`].
    fn run_process<'a>(
        &'a self,
        step: &'a str,
        config: &'a ProcessStepConfig,
        last_output: &'a str,
    ) -> BoxFuture<'a, Result<StepResult, WorkflowError>> {
        Box::pin(async move {
            let started = Instant::now();
            let depth = self.depth + 1;
            if depth > MAX_SUB_WORKFLOW_DEPTH {
                return Err(WorkflowError::SubWorkflowDepthExceeded {
                    depth,
                    max: MAX_SUB_WORKFLOW_DEPTH,
                });
            }

            let path = resolve_path(&self.services.base_dir, config.workflow_file.trim());
            let yaml = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| WorkflowError::StepFailed {
                    step: step.to_string(),
                    message: format!("failed to read workflow '{}': {e}", path.display()),
                })?;
            let plan = parse_workflow_yaml(&yaml, &self.services.base_dir)?;

            let initial = match config.input.as_deref().map(str::trim) {
                Some(STDIN) => Some(last_output.to_string()),
                Some("") | None => None,
                Some(other) => Some(other.to_string()),
            };

            tracing::info!(step, workflow = %path.display(), depth, "running sub-workflow");
            let processor = WorkflowProcessor::with_depth(Arc::clone(&self.services), depth);
            let report = processor.run(&plan, initial).await?;

            Ok(StepResult {
                output: report.final_output,
                metrics: PerformanceMetrics {
                    model_ms: elapsed_ms(started),
                    total_ms: elapsed_ms(started),
                    ..Default::default()
                },
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

/// Per-step values shared by every model call of that step.
struct ModelCall<'a> {
    step: &'a str,
    config: &'a StepConfig,
    action: &'a str,
    memory: Option<&'a str>,
    options: &'a PromptOptions,
}

fn push_loaded(loaded: &mut LoadedInputs, item: Loaded) {
    match item {
        Loaded::Text(text) => loaded.texts.push(text),
        Loaded::File(file) => loaded.files.push(file),
    }
}

/// Text of all inputs; several inputs are each labelled with their source.
pub fn render_inputs(texts: &[TextInput]) -> String {
    match texts {
        [] => String::new(),
        [single] => single.content.clone(),
        many => many
            .iter()
            .map(|t| format!("Source: {}\n{}", t.label, t.content))
            .collect::<Vec<_>>()
            .join(RESULT_SEPARATOR),
    }
}

/// Prompt sent to the model: optional memory context, then input and action.
pub fn build_prompt(action: &str, texts: &[TextInput], memory: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(memory) = memory {
        prompt.push_str("Memory context:\n");
        prompt.push_str(memory.trim());
        prompt.push_str("\n\n");
    }

    let content = render_inputs(texts);
    if content.is_empty() {
        prompt.push_str(action);
    } else {
        prompt.push_str(&format!("Input:\n{content}\n\nAction: {action}"));
    }
    prompt
}

/// Prompt for one chunk. An action that places `{{ current_chunk }}` itself
/// is sent as is; otherwise the chunk becomes the prompt input.
fn chunk_prompt(action: &str, piece: &chunk::Chunk, total: usize, memory: Option<&str>) -> String {
    let index = (piece.index + 1).to_string();
    let total = total.to_string();
    let embeds_chunk = has_placeholder(action, CURRENT_CHUNK);

    // Chunk text goes in last so placeholders inside it stay literal.
    let rendered = [
        (CHUNK_INDEX, index.as_str()),
        (TOTAL_CHUNKS, total.as_str()),
        (CURRENT_CHUNK, piece.text.as_str()),
    ]
    .iter()
    .fold(action.to_string(), |acc, (name, value)| {
        replace_placeholder(&acc, name, value)
    });

    if embeds_chunk {
        build_prompt(&rendered, &[], memory)
    } else {
        let text = TextInput {
            label: format!("chunk {index} of {total}"),
            content: piece.text.clone(),
        };
        build_prompt(&rendered, std::slice::from_ref(&text), memory)
    }
}

fn has_placeholder(text: &str, name: &str) -> bool {
    text.contains(&format!("{{{{ {name} }}}}")) || text.contains(&format!("{{{{{name}}}}}"))
}

fn replace_placeholder(text: &str, name: &str, value: &str) -> String {
    let spaced = format!("{{{{ {name} }}}}");
    text.replace(&format!("{{{{{name}}}}}"), &spaced)
        .replace(&spaced, value)
}

/// One model: its result. Several: each result labelled with its model.
fn combine_model_results(results: &[(String, String)]) -> String {
    match results {
        [] => String::new(),
        [(_, single)] => single.clone(),
        many => many
            .iter()
            .map(|(model, result)| format!("Response from {model}:\n{result}"))
            .collect::<Vec<_>>()
            .join(RESULT_SEPARATOR),
    }
}

fn prompt_options(config: &StepConfig, kind: StepKind) -> PromptOptions {
    PromptOptions {
        instructions: config.instructions.clone(),
        tools: config.tools.clone(),
        previous_response_id: config.previous_response_id.clone(),
        max_output_tokens: config.max_output_tokens,
        temperature: config.temperature,
        top_p: config.top_p,
        stream: config.stream,
        response_format: config.response_format.clone(),
        api: if kind == StepKind::Responses {
            ApiMode::Responses
        } else {
            ApiMode::Chat
        },
    }
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter(|v| !v.trim().is_empty()).collect()
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::box_gateway::BoxGateway;
    use crate::llm::mock::MockGateway;
    use crate::workflow::input::NoFetcher;
    use crate::workflow::output::CaptureSink;
    use baton_types::llm::LlmError;
    use baton_types::workflow::ChunkBy;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Harness {
        runner: StepRunner,
        sink: Arc<CaptureSink>,
        calls: Arc<Mutex<Vec<PromptRequest>>>,
        tmp: TempDir,
    }

    fn harness(mock: MockGateway) -> Harness {
        let tmp = TempDir::new().unwrap();
        let calls = mock.calls();
        let mut registry = GatewayRegistry::new();
        registry.register(vec!["*".into()], None, BoxGateway::new(mock));
        let sink = Arc::new(CaptureSink::new());
        let services = StepServices {
            gateways: Arc::new(registry),
            memory: Arc::new(
                MemoryManager::new(Some(tmp.path().join("BATON.md"))).with_timestamp("ts"),
            ),
            fetcher: Arc::new(NoFetcher),
            sink: sink.clone(),
            base_dir: tmp.path().to_path_buf(),
            chunk_concurrency: 2,
            generation_model: "gen-model".into(),
        };
        Harness {
            runner: StepRunner::new(Arc::new(services)),
            sink,
            calls,
            tmp,
        }
    }

    fn step(yaml: &str) -> Step {
        let doc = parse_workflow_document(yaml).unwrap();
        doc.all_steps().next().unwrap().clone()
    }

    fn prompts(h: &Harness) -> Vec<String> {
        h.calls.lock().unwrap().iter().map(|c| c.prompt.clone()).collect()
    }

    #[tokio::test]
    async fn standard_step_writes_stdout() {
        let h = harness(MockGateway::new().reply("Say hi", "hi there"));
        let s = step("greet:\n  input: NA\n  model: m\n  action: Say hi\n  output: STDOUT\n");

        let result = h.runner.run(&s, "").await.unwrap();
        assert_eq!(result.output, "hi there");
        assert_eq!(h.sink.outputs(), vec!["hi there"]);
        assert_eq!(prompts(&h), vec!["Say hi"]);
    }

    #[tokio::test]
    async fn stdin_input_uses_last_output() {
        let h = harness(MockGateway::new());
        let s = step("s:\n  input: STDIN\n  model: m\n  action: Summarize\n  output: STDOUT\n");
        h.runner.run(&s, "previous text").await.unwrap();
        assert_eq!(prompts(&h), vec!["Input:\nprevious text\n\nAction: Summarize"]);
    }

    #[tokio::test]
    async fn file_inputs_and_file_output() {
        let h = harness(MockGateway::new().reply("Action: Merge", "merged"));
        std::fs::write(h.tmp.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(h.tmp.path().join("b.txt"), "beta").unwrap();
        let s = step("s:\n  input: [a.txt, b.txt]\n  model: m\n  action: Merge\n  output: out/merged.txt\n");

        let result = h.runner.run(&s, "").await.unwrap();
        assert_eq!(result.output, "merged");
        let prompt = &prompts(&h)[0];
        assert!(prompt.contains("Source: a.txt\nalpha"), "got: {prompt}");
        assert!(prompt.contains("Source: b.txt\nbeta"), "got: {prompt}");
        let written = std::fs::read_to_string(h.tmp.path().join("out/merged.txt")).unwrap();
        assert_eq!(written, "merged");
    }

    #[tokio::test]
    async fn individual_batch_mode_skips_failures() {
        let h = harness(MockGateway::new().fail("bad").reply("good", "ok"));
        std::fs::write(h.tmp.path().join("1.txt"), "good one").unwrap();
        std::fs::write(h.tmp.path().join("2.txt"), "bad one").unwrap();
        let s = step(
            "s:\n  input: [1.txt, 2.txt]\n  model: m\n  action: Check\n  output: STDOUT\n  batch_mode: individual\n  skip_errors: true\n",
        );

        let result = h.runner.run(&s, "").await.unwrap();
        assert_eq!(result.output, "ok");
        assert_eq!(prompts(&h).len(), 2);
    }

    #[tokio::test]
    async fn failure_without_skip_errors_propagates() {
        let h = harness(MockGateway::new().fail("Explode"));
        let s = step("s:\n  input: NA\n  model: m\n  action: Explode\n  output: STDOUT\n");
        let err = h.runner.run(&s, "").await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Provider {
                source: LlmError::Provider { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn skip_errors_yields_empty_result() {
        let h = harness(MockGateway::new().fail("Explode"));
        let s = step("s:\n  input: NA\n  model: m\n  action: Explode\n  output: STDOUT\n  skip_errors: true\n");
        let result = h.runner.run(&s, "before").await.unwrap();
        assert_eq!(result.output, "");
        assert!(h.sink.outputs().is_empty());
    }

    #[tokio::test]
    async fn multiple_models_label_and_map_outputs() {
        let h = harness(MockGateway::new());
        let s = step(
            "s:\n  input: NA\n  model: [alpha, beta]\n  action: Compare\n  output: [a.txt, b.txt]\n",
        );
        let result = h.runner.run(&s, "").await.unwrap();
        assert_eq!(
            result.output,
            "Response from alpha:\nalpha says ok\n\nResponse from beta:\nbeta says ok"
        );
        assert_eq!(std::fs::read_to_string(h.tmp.path().join("a.txt")).unwrap(), "alpha says ok");
        assert_eq!(std::fs::read_to_string(h.tmp.path().join("b.txt")).unwrap(), "beta says ok");
    }

    #[tokio::test]
    async fn next_actions_chain_on_first_model() {
        let h = harness(
            MockGateway::new()
                .reply("Action: Translate", "translated")
                .reply("Draft", "draft"),
        );
        let s = step(
            "s:\n  input: NA\n  model: m\n  action: Draft\n  next-action: Translate\n  output: STDOUT\n",
        );
        let result = h.runner.run(&s, "").await.unwrap();
        assert_eq!(result.output, "translated");
        let prompts = prompts(&h);
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1], "Input:\ndraft\n\nAction: Translate");
    }

    #[tokio::test]
    async fn chunked_step_recombines_in_order() {
        let h = harness(MockGateway::new());
        let text: String = (1..=6).map(|i| format!("line {i}\n")).collect();
        std::fs::write(h.tmp.path().join("big.txt"), &text).unwrap();
        let mut s = step(
            "s:\n  input: big.txt\n  model: m\n  action: \"Part {{ chunk_index }}/{{ total_chunks }}: {{ current_chunk }}\"\n  output: STDOUT\n",
        );
        s.config.chunk = Some(ChunkConfig {
            by: ChunkBy::Lines,
            size: 2,
            overlap: 0,
            max_chunks: 0,
        });

        let result = h.runner.run(&s, "").await.unwrap();
        assert_eq!(result.output, ["m says ok"; 3].join(CHUNK_SEPARATOR));

        let mut prompts = prompts(&h);
        prompts.sort();
        assert_eq!(prompts[0], "Part 1/3: line 1\nline 2\n");
        assert_eq!(prompts[2], "Part 3/3: line 5\nline 6\n");
    }

    #[tokio::test]
    async fn memory_flag_prepends_document() {
        let h = harness(MockGateway::new());
        h.runner
            .services()
            .memory
            .write_section("Notes", "remember this")
            .await
            .unwrap();
        let s = step("s:\n  input: NA\n  model: m\n  action: Go\n  output: STDOUT\n  memory: true\n");
        h.runner.run(&s, "").await.unwrap();
        let prompt = &prompts(&h)[0];
        assert!(prompt.starts_with("Memory context:\n"), "got: {prompt}");
        assert!(prompt.contains("remember this"));
        assert!(prompt.ends_with("Go"));
    }

    #[tokio::test]
    async fn image_input_goes_through_file_call() {
        let h = harness(MockGateway::new());
        std::fs::write(h.tmp.path().join("chart.png"), [0x89, 0x50]).unwrap();
        let s = step("s:\n  input: chart.png\n  model: m\n  action: Describe\n  output: STDOUT\n");
        h.runner.run(&s, "").await.unwrap();
        assert_eq!(prompts(&h), vec!["Describe\n[file: chart.png]"]);
    }

    #[tokio::test]
    async fn url_input_without_fetcher_fails() {
        let h = harness(MockGateway::new());
        let s = step("s:\n  input: https://example.com/a.txt\n  model: m\n  action: Read\n  output: STDOUT\n");
        let err = h.runner.run(&s, "").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Fetch { .. }));
    }

    #[tokio::test]
    async fn responses_type_sets_api_mode() {
        let h = harness(MockGateway::new());
        let s = step(
            "s:\n  type: openai-responses\n  input: NA\n  model: m\n  action: Go\n  output: STDOUT\n  instructions: be brief\n",
        );
        h.runner.run(&s, "").await.unwrap();
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls[0].options.api, ApiMode::Responses);
        assert_eq!(calls[0].options.instructions.as_deref(), Some("be brief"));
    }

    #[tokio::test]
    async fn generate_writes_validated_workflow() {
        let generated = "```yaml\nhello:\n  input: NA\n  model: m\n  action: Say hi\n  output: STDOUT\n```";
        let h = harness(MockGateway::new().reply("Request: greet", generated));
        let s = step("g:\n  generate:\n    action: greet\n    output: flows/new.yaml\n");

        let result = h.runner.run(&s, "").await.unwrap();
        assert!(result.output.contains("flows/new.yaml"));
        let written = std::fs::read_to_string(h.tmp.path().join("flows/new.yaml")).unwrap();
        assert!(written.starts_with("hello:"), "got: {written}");
        assert_eq!(h.calls.lock().unwrap()[0].model, "gen-model");
    }

    #[tokio::test]
    async fn generate_rejects_invalid_workflow() {
        let h = harness(MockGateway::new().reply("Request", "hello:\n  input: NA\n"));
        let s = step("g:\n  generate:\n    action: greet\n    output: new.yaml\n");
        let err = h.runner.run(&s, "").await.unwrap_err();
        assert!(err.to_string().contains("generated workflow is invalid"), "got: {err}");
        assert!(!h.tmp.path().join("new.yaml").exists());
    }

    #[tokio::test]
    async fn process_runs_nested_workflow_with_stdin() {
        let h = harness(MockGateway::new().reply("Action: Shout", "LOUD"));
        std::fs::write(
            h.tmp.path().join("child.yaml"),
            "shout:\n  input: STDIN\n  model: m\n  action: Shout\n  output: STDOUT\n",
        )
        .unwrap();
        let s = step("p:\n  process:\n    workflow_file: child.yaml\n    input: STDIN\n");

        let result = h.runner.run(&s, "quiet words").await.unwrap();
        assert_eq!(result.output, "LOUD");
        assert_eq!(prompts(&h), vec!["Input:\nquiet words\n\nAction: Shout"]);
    }

    #[tokio::test]
    async fn process_depth_is_capped() {
        let h = harness(MockGateway::new());
        std::fs::write(
            h.tmp.path().join("self.yaml"),
            "again:\n  process:\n    workflow_file: self.yaml\n",
        )
        .unwrap();
        let s = step("p:\n  process:\n    workflow_file: self.yaml\n");
        let err = h.runner.run(&s, "").await.unwrap_err();
        assert!(
            matches!(err, WorkflowError::SubWorkflowDepthExceeded { max: MAX_SUB_WORKFLOW_DEPTH, .. }),
            "got: {err}"
        );
    }

    #[test]
    fn build_prompt_shapes() {
        assert_eq!(build_prompt("Do it", &[], None), "Do it");
        let text = TextInput {
            label: "x".into(),
            content: "body".into(),
        };
        assert_eq!(
            build_prompt("Do it", std::slice::from_ref(&text), Some("mem")),
            "Memory context:\nmem\n\nInput:\nbody\n\nAction: Do it"
        );
    }

    #[test]
    fn chunk_prompt_without_placeholder_uses_input_section() {
        let piece = chunk::Chunk {
            index: 1,
            text: "chunk body".into(),
        };
        assert_eq!(
            chunk_prompt("Summarize", &piece, 3, None),
            "Input:\nchunk body\n\nAction: Summarize"
        );
        assert_eq!(
            chunk_prompt("Part {{chunk_index}}: {{current_chunk}}", &piece, 3, None),
            "Part 2: chunk body"
        );
    }

    #[test]
    fn chunk_prompt_leaves_placeholders_inside_chunk_text() {
        let piece = chunk::Chunk {
            index: 0,
            text: "literal {{ chunk_index }} of {{total_chunks}} and {{current_chunk}}".into(),
        };
        let prompt = chunk_prompt(
            "[{{ chunk_index }}/{{ total_chunks }}] {{ current_chunk }}",
            &piece,
            2,
            None,
        );
        assert_eq!(
            prompt,
            "[1/2] literal {{ chunk_index }} of {{total_chunks}} and {{current_chunk}}"
        );
    }
}
