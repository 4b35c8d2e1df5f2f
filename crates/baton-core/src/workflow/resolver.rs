//! DependencyResolver: check every declared input and record producer edges.
//!
//! An input is acceptable when it is a sentinel (`NA`, `STDIN`, `MEMORY`, a
//! URL), exists on disk, is a glob with at least one match, or is exactly the
//! declared output of some step anywhere in the document (a forward
//! reference). Execution order is never changed by this; only the existence
//! check is relaxed.
//!
//! Producer -> consumer edges are kept in a `petgraph` graph, which is also
//! used to reject parallel groups whose members feed each other.

use std::collections::HashMap;
use std::path::Path;

use baton_types::workflow::{STDOUT, Step, StepDependency, StepKind, WorkflowDocument, parse_memory_target};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};

use super::definition::WorkflowError;
use super::input::{InputSource, classify_input, expand_glob, resolve_path};
use crate::normalize::{normalize_input, normalize_string_slice};

/// Validate all inputs in `document` and return its dependency edges, one
/// entry per step in document order (top-level, grouped, then deferred).
pub fn resolve(document: &WorkflowDocument, base_dir: &Path) -> Result<Vec<StepDependency>, WorkflowError> {
    let steps: Vec<&Step> = document.all_steps().collect();

    // Output path -> indices of the steps that declare it.
    let mut producers: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, step) in steps.iter().enumerate() {
        for output in produced_paths(step) {
            producers.entry(output).or_default().push(idx);
        }
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let nodes: Vec<NodeIndex> = steps.iter().map(|s| graph.add_node(s.name.as_str())).collect();
    let mut dependencies = Vec::with_capacity(steps.len());

    for (idx, step) in steps.iter().enumerate() {
        let mut depends_on: Vec<String> = Vec::new();

        for path in consumed_paths(step) {
            let produced_by = producers.get(&path).map(Vec::as_slice).unwrap_or(&[]);
            let exists = match classify_input(&path) {
                InputSource::None | InputSource::Pipe | InputSource::Memory(_) | InputSource::Url(_) => {
                    continue;
                }
                InputSource::Glob(pattern) => {
                    let matches = expand_glob(base_dir, &pattern).map_err(|message| {
                        WorkflowError::ConfigValidation(format!("step '{}': {message}", step.name))
                    })?;
                    !matches.is_empty()
                }
                InputSource::File(file) => resolve_path(base_dir, &file).exists(),
            };

            let external: Vec<usize> = produced_by.iter().copied().filter(|&p| p != idx).collect();
            if !exists && external.is_empty() {
                return Err(WorkflowError::Dependency {
                    step: step.name.clone(),
                    path,
                });
            }
            if !exists {
                tracing::debug!(step = %step.name, path = %path, "input is a forward reference");
            }

            for producer in external {
                graph.update_edge(nodes[producer], nodes[idx], ());
                let name = &steps[producer].name;
                if !depends_on.contains(name) {
                    depends_on.push(name.clone());
                }
            }
        }

        dependencies.push(StepDependency {
            name: step.name.clone(),
            depends_on,
        });
    }

    check_parallel_groups(document, &steps, &nodes, &graph)?;
    Ok(dependencies)
}

/// Members of one parallel group must not be connected in either direction.
fn check_parallel_groups(
    document: &WorkflowDocument,
    steps: &[&Step],
    nodes: &[NodeIndex],
    graph: &DiGraph<&str, ()>,
) -> Result<(), WorkflowError> {
    let index_of = |member: &Step| {
        steps
            .iter()
            .position(|s| std::ptr::eq(*s, member))
            .map(|i| nodes[i])
    };

    for (key, members) in document.parallel_groups() {
        let indices: Vec<(&str, NodeIndex)> = members
            .iter()
            .filter_map(|m| index_of(m).map(|n| (m.name.as_str(), n)))
            .collect();

        for (i, (a_name, a)) in indices.iter().enumerate() {
            for (b_name, b) in indices.iter().skip(i + 1) {
                if has_path_connecting(graph, *a, *b, None) || has_path_connecting(graph, *b, *a, None) {
                    return Err(WorkflowError::ConfigValidation(format!(
                        "parallel group '{key}': steps '{a_name}' and '{b_name}' depend on each other"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Paths a step writes that other steps may read.
fn produced_paths(step: &Step) -> Vec<String> {
    let config = &step.config;
    match config.kind() {
        Ok(StepKind::Generate) => config
            .generate
            .iter()
            .map(|g| g.output.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect(),
        _ => normalize_string_slice(config.output.as_ref())
            .into_iter()
            .filter(|o| !o.is_empty() && o != STDOUT && parse_memory_target(o).is_none())
            .collect(),
    }
}

/// Paths a step reads.
fn consumed_paths(step: &Step) -> Vec<String> {
    let config = &step.config;
    match config.kind() {
        Ok(StepKind::Generate) => config
            .generate
            .iter()
            .flat_map(|g| g.context_files.iter().cloned())
            .collect(),
        Ok(StepKind::Process) => config
            .process
            .iter()
            .map(|p| p.workflow_file.trim().to_string())
            .collect(),
        _ => normalize_input(config.input.as_ref()),
    }
}
