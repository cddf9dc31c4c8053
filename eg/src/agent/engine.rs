//! AgentEngine - the bounded capability-calling loop for one turn

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::domain::PriorContext;
use crate::llm::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, StopReason, StreamChunk,
    TokenUsage, ToolCall,
};
use crate::tools::{ToolContext, ToolError, ToolExecutor, ToolResult};

use super::events::{AgentEvent, EventSink};
use super::prompt::PromptRenderer;

/// Errors that end a run without a stored snapshot
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Step budget of {limit} capability calls exhausted without a verified write")]
    StepBudgetExceeded { limit: u32, stats: RunStats },

    #[error("Turn budget of {limit} model responses exhausted without a verified write")]
    TurnBudgetExceeded { limit: u32, stats: RunStats },

    #[error("Model request failed: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Prompt error: {0}")]
    Prompt(String),
}

impl AgentError {
    /// Budget exhaustion is the only failure that marks the generation failed
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(
            self,
            AgentError::StepBudgetExceeded { .. } | AgentError::TurnBudgetExceeded { .. }
        )
    }

    /// Statistics of the run a budget error ended
    pub fn stats(&self) -> Option<RunStats> {
        match self {
            AgentError::StepBudgetExceeded { stats, .. } | AgentError::TurnBudgetExceeded { stats, .. } => Some(*stats),
            _ => None,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `writeFiles` succeeded
    Written { snapshot_ref: String, summary: String },
    /// The model answered in text without writing
    AwaitingInput { text: String },
}

/// Run statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub turns: u32,
    pub steps: u32,
    pub usage: TokenUsage,
}

const CONTINUE_TRUNCATED: &str = "Continue from where you left off. Your previous response was truncated.";

/// Drives the model through capability calls until a verified write or a budget runs out
pub struct AgentEngine {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    prompts: PromptRenderer,
    config: AgentConfig,
}

impl AgentEngine {
    pub fn new(llm: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        debug!(max_steps = config.max_steps, max_turns = config.max_turns, "AgentEngine::new: called");
        Self {
            llm,
            executor: ToolExecutor::new(),
            prompts: PromptRenderer::new(),
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one turn
    ///
    /// `conversation` is the user-facing chat so far, ending with the
    /// current user message. Capability calls stop the moment the step
    /// budget is reached; no final write is attempted.
    pub async fn run(
        &self,
        prior: &PriorContext,
        conversation: Vec<Message>,
        ctx: &ToolContext,
        events: &EventSink,
    ) -> Result<(RunOutcome, RunStats), AgentError> {
        let system_prompt = self
            .prompts
            .render(ctx.namespace(), prior, self.config.max_steps)
            .map_err(|e| AgentError::Prompt(e.to_string()))?;
        let tools = self.executor.definitions();

        info!(
            namespace = %ctx.namespace(),
            base = ?ctx.base_snapshot_ref(),
            max_steps = self.config.max_steps,
            "Starting agent run"
        );

        let mut messages = conversation;
        let mut stats = RunStats::default();
        let mut last_text: Option<String> = None;

        while stats.turns < self.config.max_turns {
            // A spent step budget admits no further model request
            if stats.steps >= self.config.max_steps {
                warn!(limit = self.config.max_steps, "Step budget exhausted");
                return Err(AgentError::StepBudgetExceeded {
                    limit: self.config.max_steps,
                    stats,
                });
            }
            stats.turns += 1;

            let request = CompletionRequest {
                system_prompt: system_prompt.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.config.max_tokens,
            };
            let response = self.request(request, events).await?;
            stats.usage += response.usage;
            debug!(
                turn = stats.turns,
                stop_reason = ?response.stop_reason,
                calls = response.tool_calls.len(),
                "AgentEngine::run: model responded"
            );

            let text = response.content.clone().filter(|t| !t.trim().is_empty());
            if text.is_some() {
                last_text = text.clone();
            }
            messages.push(build_assistant_message(&response));

            if !response.tool_calls.is_empty() {
                let mut results = Vec::with_capacity(response.tool_calls.len());

                for call in &response.tool_calls {
                    if stats.steps >= self.config.max_steps {
                        warn!(limit = self.config.max_steps, "Step budget exhausted");
                        return Err(AgentError::StepBudgetExceeded {
                            limit: self.config.max_steps,
                            stats,
                        });
                    }
                    stats.steps += 1;

                    let result = self.execute(call, ctx, events).await?;

                    if let Some(snapshot_ref) = ctx.written_ref().await {
                        let summary = text
                            .clone()
                            .or_else(|| last_text.clone())
                            .unwrap_or_else(|| default_summary(call));
                        info!(%snapshot_ref, steps = stats.steps, turns = stats.turns, "Agent run wrote snapshot");
                        return Ok((RunOutcome::Written { snapshot_ref, summary }, stats));
                    }
                    results.push((call.id.clone(), result));
                }

                messages.push(build_tool_result_message(&results));
                continue;
            }

            match response.stop_reason {
                StopReason::MaxTokens => {
                    debug!("AgentEngine::run: response truncated, asking to continue");
                    messages.push(Message::user(CONTINUE_TRUNCATED));
                }
                StopReason::EndTurn | StopReason::StopSequence | StopReason::ToolUse => {
                    let text = text.unwrap_or_default();
                    info!(turns = stats.turns, steps = stats.steps, "Agent run ended without a write");
                    return Ok((RunOutcome::AwaitingInput { text }, stats));
                }
            }
        }

        warn!(limit = self.config.max_turns, "Turn budget exhausted");
        Err(AgentError::TurnBudgetExceeded {
            limit: self.config.max_turns,
            stats,
        })
    }

    /// Send a request, streaming text to the sink when someone is listening
    async fn request(&self, request: CompletionRequest, events: &EventSink) -> Result<CompletionResponse, LlmError> {
        if !events.is_active() {
            return self.llm.complete(request).await;
        }

        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
        let forward = async {
            while let Some(chunk) = chunk_rx.recv().await {
                match chunk {
                    StreamChunk::TextDelta(text) => events.emit(AgentEvent::Text { text }).await,
                    StreamChunk::Error(message) => debug!(%message, "AgentEngine::request: stream error chunk"),
                    _ => {}
                }
            }
        };

        let (response, ()) = tokio::join!(self.llm.stream(request, chunk_tx), forward);
        response
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext, events: &EventSink) -> Result<ToolResult, ToolError> {
        events
            .emit(AgentEvent::CapabilityCalled {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            })
            .await;

        let result = self.executor.execute(call, ctx).await?;

        events
            .emit(AgentEvent::CapabilityResult {
                id: call.id.clone(),
                name: call.name.clone(),
                is_error: result.is_error,
                content: result.content.clone(),
            })
            .await;
        Ok(result)
    }
}

fn build_assistant_message(response: &CompletionResponse) -> Message {
    let mut blocks = Vec::new();

    if let Some(text) = &response.content {
        blocks.push(ContentBlock::text(text));
    }

    for call in &response.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });
    }

    Message::assistant_blocks(blocks)
}

fn build_tool_result_message(results: &[(String, ToolResult)]) -> Message {
    let blocks: Vec<ContentBlock> = results
        .iter()
        .map(|(id, result)| ContentBlock::tool_result(id, &result.content, result.is_error))
        .collect();

    Message::user_blocks(blocks)
}

fn default_summary(call: &ToolCall) -> String {
    let paths: Vec<&str> = call.input["files"]
        .as_array()
        .map(|files| files.iter().filter_map(|f| f["path"].as_str()).collect())
        .unwrap_or_default();
    format!("Wrote {} file(s): {}", paths.len(), paths.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallOutcome, SourceFile};
    use crate::llm::client::mock::MockLlmClient;
    use crate::snapshot::SnapshotBackend;
    use crate::tools::context::test_support::Fixture;
    use serde_json::{Value, json};

    fn files(content: &str) -> Value {
        json!({"files": [{"path": "exercises/odd-one-out/index.tsx", "content": content}]})
    }

    fn call(id: &str, name: &str, input: Value) -> CompletionResponse {
        CompletionResponse::tool_calls(vec![ToolCall::new(id, name, input)])
    }

    fn with_text(mut response: CompletionResponse, text: &str) -> CompletionResponse {
        response.content = Some(text.to_string());
        response
    }

    fn prior() -> PriorContext {
        PriorContext {
            base_prompt: "P1".to_string(),
            last_snapshot_ref: None,
            last_user_instruction: None,
        }
    }

    fn engine(responses: Vec<CompletionResponse>, max_steps: u32) -> (AgentEngine, Arc<MockLlmClient>) {
        let llm = Arc::new(MockLlmClient::new(responses));
        let config = AgentConfig {
            max_steps,
            ..Default::default()
        };
        (AgentEngine::new(llm.clone(), config), llm)
    }

    #[tokio::test]
    async fn test_self_correction_then_write() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let (engine, llm) = engine(
            vec![
                call("c1", "readFiles", json!({})),
                call("c2", "verifyFiles", files("BROKEN")),
                call("c3", "verifyFiles", files("fixed")),
                with_text(call("c4", "writeFiles", files("fixed")), "Built the grid."),
            ],
            15,
        );

        let (outcome, stats) = engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::none())
            .await
            .unwrap();

        let RunOutcome::Written { snapshot_ref, summary } = outcome else {
            panic!("expected a write");
        };
        assert_eq!(summary, "Built the grid.");
        assert_eq!(stats.steps, 4);
        assert_eq!(llm.call_count(), 4);
        assert_eq!(
            fx.snapshots.extract(&snapshot_ref).await.unwrap(),
            vec![SourceFile::new("index.tsx", "fixed")]
        );

        let log = ctx.call_log().await;
        assert_eq!(log.names(), vec!["readFiles", "verifyFiles", "verifyFiles", "writeFiles"]);
        assert!(matches!(
            &log.entries()[1].outcome,
            CallOutcome::Result { value, is_error: false } if value["ok"] == false
        ));

        // The diagnostics went back to the model as data
        let third_request = &llm.requests()[2];
        let feedback = serde_json::to_string(third_request.messages.last().unwrap()).unwrap();
        assert!(feedback.contains("type error"));
    }

    #[tokio::test]
    async fn test_step_budget_stops_before_next_call() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let (engine, llm) = engine(
            vec![
                call("c1", "verifyFiles", files("BROKEN")),
                call("c2", "verifyFiles", files("BROKEN again")),
                call("c3", "verifyFiles", files("fixed")),
                call("c4", "writeFiles", files("fixed")),
            ],
            2,
        );

        let err = engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::none())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::StepBudgetExceeded { limit: 2, .. }));
        assert!(err.is_budget_exhausted());
        assert_eq!(ctx.call_log().await.len(), 2);
        // The spent budget stops the run before a third model request
        assert_eq!(llm.call_count(), 2);
        let stats = err.stats().unwrap();
        assert_eq!(stats.steps, 2);
        assert_eq!(stats.turns, 2);
        assert!(fx.snapshots.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spent_budget_does_not_end_in_text_answer() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let (engine, llm) = engine(
            vec![
                call("c1", "verifyFiles", files("BROKEN")),
                CompletionResponse::text("Shall I keep going?"),
            ],
            1,
        );

        let err = engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::none())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::StepBudgetExceeded { limit: 1, .. }));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_turn_budget_carries_usage() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let mut truncated = CompletionResponse::text("Let me");
        truncated.stop_reason = StopReason::MaxTokens;
        truncated.usage.output_tokens = 7;
        let llm = Arc::new(MockLlmClient::new(vec![truncated.clone(), truncated]));
        let config = AgentConfig {
            max_turns: 2,
            ..Default::default()
        };
        let engine = AgentEngine::new(llm.clone(), config);

        let err = engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::none())
            .await
            .unwrap_err();

        let stats = err.stats().unwrap();
        assert!(matches!(err, AgentError::TurnBudgetExceeded { limit: 2, .. }));
        assert_eq!(stats.turns, 2);
        assert_eq!(stats.usage.output_tokens, 14);
    }

    #[tokio::test]
    async fn test_text_answer_awaits_input() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let (engine, _) = engine(vec![CompletionResponse::text("How many tiles?")], 15);

        let (outcome, stats) = engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::none())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::AwaitingInput {
                text: "How many tiles?".to_string()
            }
        );
        assert_eq!(stats.steps, 0);
    }

    #[tokio::test]
    async fn test_truncated_response_is_continued() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let mut truncated = CompletionResponse::text("Let me");
        truncated.stop_reason = StopReason::MaxTokens;
        let (engine, llm) = engine(vec![truncated, CompletionResponse::text("...ask first.")], 15);

        engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::none())
            .await
            .unwrap();

        let second = &llm.requests()[1];
        assert_eq!(second.messages.last().unwrap().text(), CONTINUE_TRUNCATED);
    }

    #[tokio::test]
    async fn test_unverified_write_aborts_run() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let (engine, llm) = engine(
            vec![call("c1", "writeFiles", files("fine")), CompletionResponse::text("unreachable")],
            15,
        );

        let err = engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::none())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Tool(ToolError::UnverifiedWrite { .. })));
        assert!(!err.is_budget_exhausted());
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let (engine, _) = engine(
            vec![
                call("c1", "verifyFiles", files("fine")),
                call("c2", "writeFiles", files("fine")),
            ],
            15,
        );
        let (tx, mut rx) = mpsc::channel(32);

        let (outcome, _) = engine
            .run(&prior(), vec![Message::user("P1")], &ctx, &EventSink::new(tx))
            .await
            .unwrap();

        let RunOutcome::Written { summary, .. } = outcome else {
            panic!("expected a write");
        };
        assert_eq!(summary, "Wrote 1 file(s): exercises/odd-one-out/index.tsx");

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "capability-called",
                "capability-result",
                "capability-called",
                "capability-result"
            ]
        );
    }
}
