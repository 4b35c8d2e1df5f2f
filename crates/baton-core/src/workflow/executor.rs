//! Workflow processor: runs a plan's steps and parallel groups in order.
//!
//! Sequential steps run one after another, each reading the current last
//! output and replacing it with its result. After each sequential step the
//! defer dispatcher inspects the result. A parallel group spawns one task per
//! member on a `tokio::task::JoinSet`; every member reads the same snapshot,
//! and the results are folded in declaration order once all members finish.

use std::sync::Arc;

use baton_types::metrics::StepMetrics;
use baton_types::workflow::{DocumentEntry, Step};
use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::defer::DeferDispatcher;
use super::definition::{WorkflowError, WorkflowPlan};
use super::state::ExecutionState;
use super::step_runner::{RESULT_SEPARATOR, StepResult, StepRunner, StepServices};

/// Outcome of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Last output after the final step.
    pub final_output: String,
    /// Per-step metrics in completion order.
    pub metrics: Vec<StepMetrics>,
}

/// Drives one workflow plan to completion.
#[derive(Clone)]
pub struct WorkflowProcessor {
    runner: StepRunner,
}

impl WorkflowProcessor {
    pub fn new(services: Arc<StepServices>) -> Self {
        Self {
            runner: StepRunner::new(services),
        }
    }

    /// Processor for a sub-workflow at nesting `depth`.
    pub fn with_depth(services: Arc<StepServices>, depth: u32) -> Self {
        Self {
            runner: StepRunner::with_depth(services, depth),
        }
    }

    /// Run `plan`, seeding the last output with `initial` (piped input).
    pub async fn run(&self, plan: &WorkflowPlan, initial: Option<String>) -> Result<RunReport, WorkflowError> {
        let run_id = Uuid::now_v7();
        let state = ExecutionState::new(initial);

        tracing::info!(
            run_id = %run_id,
            steps = plan.step_count(),
            depth = self.runner.depth(),
            "starting workflow"
        );

        for entry in plan.entries() {
            match entry {
                DocumentEntry::Step(step) => {
                    self.run_sequential(step, &state).await?;
                    self.dispatch_deferred(plan, &state).await?;
                }
                DocumentEntry::Parallel { key, steps } => {
                    self.run_group(key, steps, &state).await?;
                }
            }
        }

        let report = RunReport {
            run_id,
            final_output: state.last_output().await,
            metrics: state.metrics().await,
        };
        tracing::info!(run_id = %run_id, steps = report.metrics.len(), "workflow completed");
        Ok(report)
    }

    async fn run_sequential(&self, step: &Step, state: &ExecutionState) -> Result<(), WorkflowError> {
        let last_output = state.last_output().await;
        let result = self.runner.run(step, &last_output).await?;
        self.commit(step, result, state).await;
        Ok(())
    }

    async fn commit(&self, step: &Step, result: StepResult, state: &ExecutionState) {
        state.record(&step.name, result.metrics).await;
        state.set_last_output(result.output).await;
    }

    /// Inspect the last output for a defer payload and run the named step.
    async fn dispatch_deferred(&self, plan: &WorkflowPlan, state: &ExecutionState) -> Result<(), WorkflowError> {
        if !plan.has_defer() {
            return Ok(());
        }

        let last_output = state.last_output().await;
        let mut dispatcher = DeferDispatcher::new(plan.defer_table());
        let Some(dispatch) = dispatcher.inspect(&last_output) else {
            return Ok(());
        };

        tracing::info!(step = %dispatch.step.name, "dispatching deferred step");
        state.set_last_output(dispatch.input.clone()).await;
        let result = self.runner.run(dispatch.step, &dispatch.input).await?;
        self.commit(dispatch.step, result, state).await;
        dispatcher.complete();
        Ok(())
    }

    /// Run all members of a parallel group concurrently and fold their
    /// results in declaration order.
    async fn run_group(&self, key: &str, steps: &[Step], state: &ExecutionState) -> Result<(), WorkflowError> {
        let snapshot = Arc::new(state.last_output().await);
        tracing::info!(group = key, steps = steps.len(), "running parallel group");

        let mut join_set = JoinSet::new();
        for (index, step) in steps.iter().enumerate() {
            let runner = self.runner.clone();
            let step = step.clone();
            let snapshot = Arc::clone(&snapshot);
            join_set.spawn(async move {
                let result = runner.run(&step, &snapshot).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<StepResult, WorkflowError>>> = steps.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined.map_err(|e| WorkflowError::StepFailed {
                step: key.to_string(),
                message: format!("parallel task failed: {e}"),
            })?;
            slots[index] = Some(result);
        }

        let mut outputs = Vec::with_capacity(steps.len());
        for (step, slot) in steps.iter().zip(slots) {
            let result = slot.ok_or_else(|| WorkflowError::StepFailed {
                step: step.name.clone(),
                message: "parallel step produced no result".to_string(),
            })??;
            state.record(&step.name, result.metrics).await;
            if !result.output.is_empty() {
                outputs.push(result.output);
            }
        }

        state.set_last_output(outputs.join(RESULT_SEPARATOR)).await;
        tracing::debug!(group = key, "parallel group completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::box_gateway::BoxGateway;
    use crate::llm::mock::MockGateway;
    use crate::llm::registry::GatewayRegistry;
    use crate::memory::manager::MemoryManager;
    use crate::workflow::definition::parse_workflow_yaml;
    use crate::workflow::input::NoFetcher;
    use crate::workflow::output::CaptureSink;
    use crate::llm::gateway::ProviderGateway;
    use baton_types::llm::{FileInput, LlmError, PromptRequest};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Harness {
        processor: WorkflowProcessor,
        sink: Arc<CaptureSink>,
        calls: Arc<Mutex<Vec<PromptRequest>>>,
        memory: Arc<MemoryManager>,
        tmp: TempDir,
    }

    fn harness(mock: MockGateway) -> Harness {
        let calls = mock.calls();
        harness_with(BoxGateway::new(mock), calls)
    }

    fn harness_with(gateway: BoxGateway, calls: Arc<Mutex<Vec<PromptRequest>>>) -> Harness {
        let tmp = TempDir::new().unwrap();
        let mut registry = GatewayRegistry::new();
        registry.register(vec!["*".into()], None, gateway);
        let sink = Arc::new(CaptureSink::new());
        let memory = Arc::new(
            MemoryManager::new(Some(tmp.path().join("BATON.md"))).with_timestamp("2025-01-01 00:00:00"),
        );
        let services = StepServices {
            gateways: Arc::new(registry),
            memory: Arc::clone(&memory),
            fetcher: Arc::new(NoFetcher),
            sink: sink.clone(),
            base_dir: tmp.path().to_path_buf(),
            chunk_concurrency: 4,
            generation_model: "gen".into(),
        };
        Harness {
            processor: WorkflowProcessor::new(Arc::new(services)),
            sink,
            calls,
            memory,
            tmp,
        }
    }

    impl Harness {
        async fn run(&self, yaml: &str, initial: Option<&str>) -> Result<RunReport, WorkflowError> {
            let plan = parse_workflow_yaml(yaml, self.tmp.path())?;
            self.processor.run(&plan, initial.map(str::to_string)).await
        }

        fn prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.prompt.clone()).collect()
        }
    }

    const DEFER_WORKFLOW: &str = r#"
write_haiku:
  input: NA
  model: m
  action: Write a haiku
  output: STDOUT
defer:
  analyze_haiku:
    input: STDIN
    model: m
    action: Analyze this haiku
    output: STDOUT
"#;

    #[tokio::test]
    async fn defer_payload_dispatches_deferred_step() {
        let h = harness(
            MockGateway::new()
                .reply("Write a haiku", r#"{"step":"analyze_haiku","input":"a test haiku"}"#)
                .reply("Analyze this haiku", "Haiku analysis complete."),
        );

        let report = h.run(DEFER_WORKFLOW, None).await.unwrap();
        assert_eq!(report.final_output, "Haiku analysis complete.");

        let prompts = h.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1], "Input:\na test haiku\n\nAction: Analyze this haiku");
        let names: Vec<&str> = report.metrics.iter().map(|m| m.step.as_str()).collect();
        assert_eq!(names, vec!["write_haiku", "analyze_haiku"]);
    }

    #[tokio::test]
    async fn plain_output_leaves_deferred_steps_idle() {
        let h = harness(MockGateway::new().reply("Write a haiku", "Just a regular string output."));

        let report = h.run(DEFER_WORKFLOW, None).await.unwrap();
        assert_eq!(report.final_output, "Just a regular string output.");
        assert_eq!(h.prompts().len(), 1);
    }

    #[tokio::test]
    async fn unknown_defer_target_leaves_output_unchanged() {
        let payload = r#"{"step":"nope","input":"x"}"#;
        let h = harness(MockGateway::new().reply("Write a haiku", payload));

        let report = h.run(DEFER_WORKFLOW, None).await.unwrap();
        assert_eq!(report.final_output, payload);
        assert_eq!(h.prompts().len(), 1);
    }

    #[tokio::test]
    async fn steps_chain_through_last_output() {
        let h = harness(
            MockGateway::new()
                .reply("Action: Polish", "polished")
                .reply("Draft", "draft text"),
        );
        let report = h
            .run(
                r#"
first:
  input: NA
  model: m
  action: Draft
  output: draft.txt
second:
  input: STDIN
  model: m
  action: Polish
  output: STDOUT
"#,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.final_output, "polished");
        assert_eq!(h.prompts()[1], "Input:\ndraft text\n\nAction: Polish");
        assert_eq!(h.sink.outputs(), vec!["polished"]);
        assert_eq!(report.metrics.len(), 2);
    }

    #[tokio::test]
    async fn piped_input_seeds_first_step() {
        let h = harness(MockGateway::new());
        h.run(
            "s:\n  input: STDIN\n  model: m\n  action: Echo\n  output: STDOUT\n",
            Some("from the pipe"),
        )
        .await
        .unwrap();
        assert_eq!(h.prompts(), vec!["Input:\nfrom the pipe\n\nAction: Echo"]);
    }

    #[tokio::test]
    async fn forward_reference_passes_planning_but_keeps_declaration_order() {
        let h = harness(MockGateway::new().reply("Produce", "produced"));
        // `consume` is declared first and reads what `produce` writes. The plan
        // is accepted, but `consume` still runs first and finds no file.
        let err = h
            .run(
                r#"
consume:
  input: shared.txt
  model: m
  action: Consume
  output: STDOUT
produce:
  input: NA
  model: m
  action: Produce
  output: shared.txt
"#,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::StepFailed { ref step, .. } if step == "consume"));
        assert!(err.to_string().contains("shared.txt"), "got: {err}");
        assert!(h.prompts().is_empty());
    }

    #[tokio::test]
    async fn nonexistent_input_fails_before_any_call() {
        let h = harness(MockGateway::new());
        let err = h
            .run("s:\n  input: nonexistent.txt\n  model: m\n  action: a\n  output: STDOUT\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Dependency { .. }));
        assert!(h.prompts().is_empty());
    }

    #[tokio::test]
    async fn parallel_group_folds_in_declaration_order() {
        let h = harness(
            MockGateway::new()
                .reply("Left", "left result")
                .reply("Right", "right result"),
        );
        let report = h
            .run(
                r#"
intro:
  input: NA
  model: m
  action: Intro
  output: STDOUT
parallel-process:
  left:
    input: STDIN
    model: m
    action: Left
    output: left.txt
  right:
    input: STDIN
    model: m
    action: Right
    output: right.txt
merge:
  input: [left.txt, right.txt]
  model: m
  action: Merge
  output: STDOUT
"#,
                None,
            )
            .await
            .unwrap();

        // Both members saw the intro result as their snapshot.
        let prompts = h.prompts();
        assert!(prompts.contains(&"Input:\nm says ok\n\nAction: Left".to_string()));
        assert!(prompts.contains(&"Input:\nm says ok\n\nAction: Right".to_string()));

        let names: Vec<&str> = report.metrics.iter().map(|m| m.step.as_str()).collect();
        assert_eq!(names, vec!["intro", "left", "right", "merge"]);
        assert_eq!(
            std::fs::read_to_string(h.tmp.path().join("left.txt")).unwrap(),
            "left result"
        );
        let merge_prompt = prompts.last().unwrap();
        assert!(merge_prompt.contains("Source: left.txt\nleft result"), "got: {merge_prompt}");
    }

    #[tokio::test]
    async fn parallel_aggregate_becomes_last_output() {
        let h = harness(MockGateway::new().reply("One", "1").reply("Two", "2"));
        let report = h
            .run(
                r#"
parallel-process:
  one:
    input: NA
    model: m
    action: One
    output: STDOUT
  two:
    input: NA
    model: m
    action: Two
    output: STDOUT
"#,
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.final_output, "1\n\n2");
    }

    #[tokio::test]
    async fn failing_step_aborts_run_unless_skipped() {
        let yaml = |skip: bool| {
            format!(
                "a:\n  input: NA\n  model: m\n  action: Boom\n  output: STDOUT\n  skip_errors: {skip}\nb:\n  input: STDIN\n  model: m\n  action: After\n  output: STDOUT\n"
            )
        };

        let h = harness(MockGateway::new().fail("Boom"));
        let err = h.run(&yaml(false), Some("seed")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Provider { ref step, .. } if step == "a"));
        assert_eq!(h.prompts().len(), 1);

        let h = harness(MockGateway::new().fail("Boom"));
        let report = h.run(&yaml(true), Some("seed")).await.unwrap();
        // The skipped step left an empty last output, so `b` got only its action.
        assert_eq!(h.prompts()[1], "After");
        assert_eq!(report.final_output, "m says ok");
    }

    #[tokio::test]
    async fn memory_output_round_trips_into_later_input() {
        let h = harness(MockGateway::new().reply("Note", "keep this"));
        h.run(
            r#"
note:
  input: NA
  model: m
  action: Note
  output: "MEMORY:Notes"
recall:
  input: "MEMORY:Notes"
  model: m
  action: Recall
  output: STDOUT
"#,
            None,
        )
        .await
        .unwrap();

        assert_eq!(h.memory.read_section("Notes").await, "keep this");
        assert_eq!(h.prompts()[1], "Input:\nkeep this\n\nAction: Recall");
    }

    /// Holds every call at a shared barrier, then answers "1" for the first
    /// member after a delay and "2" for the second straight away.
    struct BarrierGateway {
        barrier: Arc<tokio::sync::Barrier>,
    }

    impl ProviderGateway for BarrierGateway {
        fn name(&self) -> &str {
            "barrier"
        }

        async fn send_prompt(&self, request: &PromptRequest) -> Result<String, LlmError> {
            self.barrier.wait().await;
            if request.prompt.contains("First") {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok("1".to_string())
            } else {
                Ok("2".to_string())
            }
        }

        async fn send_prompt_with_file(
            &self,
            request: &PromptRequest,
            _file: &FileInput,
        ) -> Result<String, LlmError> {
            self.send_prompt(request).await
        }
    }

    #[tokio::test]
    async fn parallel_members_run_together_and_fold_in_declared_order() {
        let gateway = BarrierGateway {
            barrier: Arc::new(tokio::sync::Barrier::new(2)),
        };
        let h = harness_with(BoxGateway::new(gateway), Arc::new(Mutex::new(Vec::new())));

        let run = h.run(
            r#"
parallel-process:
  first:
    input: NA
    model: m
    action: First
    output: STDOUT
  second:
    input: NA
    model: m
    action: Second
    output: STDOUT
"#,
            None,
        );
        // Members awaited one at a time would never get past the barrier.
        let report = tokio::time::timeout(std::time::Duration::from_secs(5), run)
            .await
            .expect("parallel members did not run concurrently")
            .unwrap();

        assert_eq!(report.final_output, "1\n\n2");
        let names: Vec<&str> = report.metrics.iter().map(|m| m.step.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
