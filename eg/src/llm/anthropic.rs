//! Anthropic Messages API client

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, StreamChunk, TokenUsage, ToolCall,
};
use crate::config::LlmConfig;

const API_VERSION: &str = "2023-06-01";

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504 | 529)
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt.saturating_sub(1)))
}

/// Anthropic Claude API client
pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a client from configuration; the API key comes from the environment
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "AnthropicClient::from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Result<serde_json::Value, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": serde_json::to_value(&request.messages)?,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::to_value(&request.tools)?;
        }

        Ok(body)
    }

    fn post(&self, body: &serde_json::Value) -> RequestBuilder {
        self.http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    fn parse_response(api_response: AnthropicResponse) -> CompletionResponse {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                AnthropicContentBlock::Text { text: t } => text.push(t),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, input });
                }
                AnthropicContentBlock::Other => {}
            }
        }

        CompletionResponse {
            content: if text.is_empty() { None } else { Some(text.join("\n")) },
            tool_calls,
            stop_reason: StopReason::from_anthropic(&api_response.stop_reason),
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
                cache_read_tokens: api_response.usage.cache_read_input_tokens.unwrap_or(0),
                cache_creation_tokens: api_response.usage.cache_creation_input_tokens.unwrap_or(0),
            },
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, messages = request.messages.len(), "AnthropicClient::complete: called");
        let body = self.build_request_body(&request)?;

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = backoff(attempt);
                warn!(attempt, backoff_ms = delay.as_millis() as u64, "Retrying model request");
                tokio::time::sleep(delay).await;
            }

            let response = match self.post(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "AnthropicClient::complete: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let message = response.text().await.unwrap_or_default();
                debug!(attempt, status, "AnthropicClient::complete: retryable status");
                last_error = Some(LlmError::ApiError { status, message });
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::ApiError { status, message });
            }

            let api_response: AnthropicResponse = response.json().await?;
            return Ok(Self::parse_response(api_response));
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, messages = request.messages.len(), "AnthropicClient::stream: called");
        let mut body = self.build_request_body(&request)?;
        body["stream"] = serde_json::json!(true);

        let mut es = EventSource::new(self.post(&body)).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        // (id, name, accumulated input json)
        let mut current_tool: Option<(String, String, String)> = None;
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();

        while let Some(event) = es.next().await {
            let msg = match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(msg)) => msg,
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    es.close();
                    let status = status.as_u16();
                    let message = response.text().await.unwrap_or_default();
                    let _ = chunk_tx.send(StreamChunk::Error(message.clone())).await;
                    if status == 429 {
                        return Err(LlmError::RateLimited {
                            retry_after: Duration::from_secs(60),
                        });
                    }
                    return Err(LlmError::ApiError { status, message });
                }
                Err(e) => {
                    es.close();
                    let _ = chunk_tx.send(StreamChunk::Error(e.to_string())).await;
                    return Err(LlmError::InvalidResponse(e.to_string()));
                }
            };

            let data: serde_json::Value = serde_json::from_str(&msg.data)?;
            match data["type"].as_str() {
                Some("message_start") => {
                    if let Some(u) = data["message"].get("usage") {
                        usage.input_tokens = u["input_tokens"].as_u64().unwrap_or(0);
                        usage.cache_read_tokens = u["cache_read_input_tokens"].as_u64().unwrap_or(0);
                        usage.cache_creation_tokens = u["cache_creation_input_tokens"].as_u64().unwrap_or(0);
                    }
                }
                Some("content_block_start") => {
                    let block = &data["content_block"];
                    if block["type"] == "tool_use" {
                        let id = block["id"].as_str().unwrap_or_default().to_string();
                        let name = block["name"].as_str().unwrap_or_default().to_string();
                        let _ = chunk_tx
                            .send(StreamChunk::ToolUseStart {
                                id: id.clone(),
                                name: name.clone(),
                            })
                            .await;
                        current_tool = Some((id, name, String::new()));
                    }
                }
                Some("content_block_delta") => {
                    let delta = &data["delta"];
                    if let Some(t) = delta["text"].as_str() {
                        text.push_str(t);
                        let _ = chunk_tx.send(StreamChunk::TextDelta(t.to_string())).await;
                    }
                    if let Some(json) = delta["partial_json"].as_str()
                        && let Some((_, _, acc)) = current_tool.as_mut()
                    {
                        acc.push_str(json);
                    }
                }
                Some("content_block_stop") => {
                    if let Some((id, name, json)) = current_tool.take() {
                        let input = if json.trim().is_empty() {
                            serde_json::json!({})
                        } else {
                            serde_json::from_str(&json)?
                        };
                        let _ = chunk_tx.send(StreamChunk::ToolUseEnd { id: id.clone() }).await;
                        tool_calls.push(ToolCall { id, name, input });
                    }
                }
                Some("message_delta") => {
                    if let Some(sr) = data["delta"]["stop_reason"].as_str() {
                        stop_reason = StopReason::from_anthropic(sr);
                    }
                    if let Some(out) = data["usage"]["output_tokens"].as_u64() {
                        usage.output_tokens = out;
                    }
                }
                Some("message_stop") => {
                    es.close();
                    break;
                }
                Some("error") => {
                    es.close();
                    let message = data["error"]["message"].as_str().unwrap_or("stream error").to_string();
                    let _ = chunk_tx.send(StreamChunk::Error(message.clone())).await;
                    return Err(LlmError::InvalidResponse(message));
                }
                _ => {}
            }
        }

        let _ = chunk_tx
            .send(StreamChunk::MessageDone {
                stop_reason: stop_reason.clone(),
                usage,
            })
            .await;

        Ok(CompletionResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            stop_reason,
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    cache_read_input_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlock, Message, ToolDefinition};

    fn client(max_tokens: u32) -> AnthropicClient {
        AnthropicClient {
            model: "claude-sonnet-4".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            http: Client::new(),
            max_tokens,
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let request = CompletionRequest {
            system_prompt: "You write exercises".to_string(),
            messages: vec![Message::user("Hello")],
            tools: vec![],
            max_tokens: 1000,
        };

        let body = client(8192).build_request_body(&request).unwrap();

        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["system"], "You write exercises");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_body_with_tools_and_blocks() {
        let request = CompletionRequest {
            system_prompt: "s".to_string(),
            messages: vec![
                Message::assistant_blocks(vec![ContentBlock::ToolUse {
                    id: "t1".to_string(),
                    name: "readFiles".to_string(),
                    input: serde_json::json!({}),
                }]),
                Message::user_blocks(vec![ContentBlock::tool_result("t1", "[]", false)]),
            ],
            tools: vec![ToolDefinition::new(
                "readFiles",
                "Read the current files",
                serde_json::json!({"type": "object", "properties": {}}),
            )],
            max_tokens: 1000,
        };

        let body = client(8192).build_request_body(&request).unwrap();

        assert_eq!(body["tools"][0]["name"], "readFiles");
        assert!(body["tools"][0]["input_schema"].is_object());
        assert_eq!(body["messages"][0]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][1]["content"][0]["tool_use_id"], "t1");
    }

    #[test]
    fn test_max_tokens_capped() {
        let request = CompletionRequest {
            system_prompt: "Test".to_string(),
            messages: vec![],
            tools: vec![],
            max_tokens: 5000,
        };

        let body = client(1000).build_request_body(&request).unwrap();
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_parse_response() {
        let api: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Checking the files."},
                {"type": "thinking", "thinking": "..."},
                {"type": "tool_use", "id": "t1", "name": "listFiles", "input": {"pattern": "*.tsx"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 4}
        }))
        .unwrap();

        let response = AnthropicClient::parse_response(api);

        assert_eq!(response.content.as_deref(), Some("Checking the files."));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].input["pattern"], "*.tsx");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.cache_read_tokens, 0);
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(1000));
        assert_eq!(backoff(2), Duration::from_millis(2000));
        assert_eq!(backoff(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(529));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }
}
