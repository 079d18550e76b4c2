//! Chat-completion collaborator client (OpenAI-compatible wire format).
//!
//! [`ChatBackend`] is the seam the agent and the HTTP layer talk through;
//! [`HttpChatClient`] is the production implementation. Requests carry an
//! optional tool-definition array and responses may carry tool calls
//! (name + JSON-encoded argument string) alongside plain text.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{LlmConfig, ModelEntry};
use crate::error::{RaglineError, Result};
use crate::models::{ChatResponse, FunctionCall, Message, ToolCall, Usage};

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        model: Option<&str>,
        tools: Option<&[Value]>,
    ) -> Result<ChatResponse>;
}

pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    models: Vec<ModelEntry>,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl HttpChatClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(env = %config.api_key_env, "chat API key not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: config.default_model.clone(),
            models: config.models.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn models(&self) -> &[ModelEntry] {
        &self.models
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn chat(
        &self,
        messages: &[Message],
        model: Option<&str>,
        tools: Option<&[Value]>,
    ) -> Result<ChatResponse> {
        let mut body = json!({
            "model": model.unwrap_or(&self.default_model),
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = Value::Array(tools.to_vec());
            }
        }

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RaglineError::from_reqwest("chat", self.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RaglineError::collaborator("chat", status.as_u16(), &text));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| RaglineError::from_reqwest("chat", self.timeout_secs, e))?;

        parse_chat_response(&json)
    }
}

/// Extract `{content, tool_calls, usage}` from an OpenAI-format response.
fn parse_chat_response(json: &Value) -> Result<ChatResponse> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| RaglineError::collaborator("chat", 200, "no choices in response"))?;

    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let tool_calls = choice["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|t| {
                    Some(ToolCall {
                        id: t["id"].as_str().unwrap_or_default().to_string(),
                        function: FunctionCall {
                            name: t["function"]["name"].as_str()?.to_string(),
                            arguments: t["function"]["arguments"].as_str()?.to_string(),
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = json
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
    })
}
