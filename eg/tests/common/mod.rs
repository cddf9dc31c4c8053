//! Shared fixtures for the turn pipeline tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;

use exgen::agent::AgentEngine;
use exgen::config::AgentConfig;
use exgen::domain::SourceFile;
use exgen::guard::Namespace;
use exgen::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StreamChunk, ToolCall};
use exgen::references::StaticReferences;
use exgen::service::GenerationService;
use exgen::snapshot::DiskSnapshots;
use exgen::state::StateManager;
use exgen::verify::{Diagnostic, VerifyError, VerifyReport, Verifier};

pub const SLUG: &str = "odd-one-out";

/// Replays queued model responses and records every request
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, responses: Vec<CompletionResponse>) {
        self.responses.lock().unwrap().extend(responses);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        let response = self.complete(request).await?;
        if let Some(text) = &response.content {
            let _ = chunk_tx.send(StreamChunk::TextDelta(text.clone())).await;
        }
        Ok(response)
    }
}

/// Reports a type error for any file containing `TYPE_ERROR`
#[derive(Default)]
pub struct ScriptedVerifier {
    pub calls: Mutex<Vec<Vec<SourceFile>>>,
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, files: &[SourceFile], namespace: &Namespace) -> Result<VerifyReport, VerifyError> {
        self.calls.lock().unwrap().push(files.to_vec());
        let diagnostics = files
            .iter()
            .filter(|f| f.content.contains("TYPE_ERROR"))
            .map(|f| Diagnostic::error(namespace.to_repo_path(&f.path), Some(1), "type error"))
            .collect();
        Ok(VerifyReport::from_diagnostics(diagnostics))
    }
}

pub struct Pipeline {
    pub dir: TempDir,
    pub llm: Arc<ScriptedLlm>,
    pub verifier: Arc<ScriptedVerifier>,
    pub snapshots: Arc<DiskSnapshots>,
    pub service: Arc<GenerationService>,
}

impl Pipeline {
    pub async fn new(max_steps: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(Vec::new());
        let verifier = Arc::new(ScriptedVerifier::default());
        let snapshots = Arc::new(DiskSnapshots::open(dir.path().join("snapshots")).unwrap());
        let state = StateManager::spawn(dir.path().join("exgen.db")).unwrap();
        state.create_exercise(SLUG, "Odd One Out").await.unwrap();

        let engine = AgentEngine::new(
            llm.clone(),
            AgentConfig {
                max_steps,
                ..Default::default()
            },
        );
        let service = Arc::new(GenerationService::new(
            state,
            snapshots.clone(),
            verifier.clone(),
            Arc::new(StaticReferences::new(vec![SourceFile::new(
                "exercises/memory-grid/index.tsx",
                "export default function MemoryGrid() { return null; }",
            )])),
            engine,
        ));

        Self {
            dir,
            llm,
            verifier,
            snapshots,
            service,
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.list().unwrap().len()
    }
}

pub fn file(name: &str, content: &str) -> Value {
    json!({"path": format!("exercises/{}/{}", SLUG, name), "content": content})
}

pub fn call(id: &str, name: &str, input: Value) -> CompletionResponse {
    CompletionResponse::tool_calls(vec![ToolCall::new(id, name, input)])
}

pub fn verify(id: &str, files: Vec<Value>) -> CompletionResponse {
    call(id, "verifyFiles", json!({ "files": files }))
}

pub fn write(id: &str, files: Vec<Value>) -> CompletionResponse {
    call(id, "writeFiles", json!({ "files": files }))
}

pub fn with_text(mut response: CompletionResponse, text: &str) -> CompletionResponse {
    response.content = Some(text.to_string());
    response
}

/// verify + write of the same files, ending the run
pub fn verified_write(prefix: &str, files: Vec<Value>, summary: &str) -> Vec<CompletionResponse> {
    vec![
        verify(&format!("{prefix}-v"), files.clone()),
        with_text(write(&format!("{prefix}-w"), files), summary),
    ]
}
