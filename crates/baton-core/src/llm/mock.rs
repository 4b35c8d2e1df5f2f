//! Scripted in-memory gateway for engine tests.

use std::sync::{Arc, Mutex};

use baton_types::llm::{FileInput, LlmError, PromptRequest};

use super::gateway::ProviderGateway;

/// Replies by matching prompt substrings; records every request.
pub struct MockGateway {
    name: String,
    replies: Vec<(String, String)>,
    failures: Vec<String>,
    calls: Arc<Mutex<Vec<PromptRequest>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: Vec::new(),
            failures: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply with `reply` to any prompt containing `needle`.
    pub fn reply(mut self, needle: &str, reply: &str) -> Self {
        self.replies.push((needle.to_string(), reply.to_string()));
        self
    }

    /// Fail any prompt containing `needle`.
    pub fn fail(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_string());
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<PromptRequest>>> {
        Arc::clone(&self.calls)
    }

    fn answer(&self, request: &PromptRequest) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        if self.failures.iter().any(|n| request.prompt.contains(n)) {
            return Err(LlmError::Provider {
                message: "scripted failure".to_string(),
            });
        }
        Ok(self
            .replies
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| format!("{} says ok", request.model)))
    }
}

impl ProviderGateway for MockGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_prompt(&self, request: &PromptRequest) -> Result<String, LlmError> {
        self.answer(request)
    }

    async fn send_prompt_with_file(
        &self,
        request: &PromptRequest,
        file: &FileInput,
    ) -> Result<String, LlmError> {
        let mut request = request.clone();
        request.prompt = format!("{}\n[file: {}]", request.prompt, file.file_name());
        self.answer(&request)
    }
}
