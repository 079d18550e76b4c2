//! Core data types shared across the pipeline, the agent, and the HTTP layer.

use serde::{Deserialize, Serialize};

/// Character-to-token heuristic used for chunk metadata (2 chars ≈ 1 token,
/// a middle ground between CJK and Latin text).
pub const CHARS_PER_TOKEN: usize = 2;

// ── Chat collaborator types ─────────────────────────────────────────────

/// A single chat message in OpenAI wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument string, exactly as the model produced it.
    pub arguments: String,
}

/// Token accounting reported by the chat backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Parsed chat-completion response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

// ── Vector store types ──────────────────────────────────────────────────

/// One chunk of an indexed document, immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedChunk {
    /// Sequence index within the collection.
    pub chunk_id: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub char_count: usize,
    pub token_estimate: usize,
}

impl IndexedChunk {
    pub fn new(chunk_id: usize, text: String, embedding: Vec<f32>) -> Self {
        let char_count = text.chars().count();
        Self {
            chunk_id,
            text,
            embedding,
            char_count,
            token_estimate: char_count / CHARS_PER_TOKEN,
        }
    }
}

/// A ranked retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: usize,
    pub text: String,
    /// Cosine similarity, rounded to 4 decimals.
    pub score: f32,
}

// ── Agent types ─────────────────────────────────────────────────────────

/// The action half of a parsed agent decision.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    WebSearch(String),
    KnowledgeBase(String),
    Finish(String),
    Unknown(String),
}

/// One reasoning-round decision produced by the chat model.
#[derive(Debug, Clone)]
pub struct AgentDecision {
    pub thought: String,
    pub action: AgentAction,
}

/// Category of a streamed agent trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    System,
    Think,
    Tool,
    Observe,
    Result,
    Error,
}

/// One structured step in an agent run, emitted in strict order.
#[derive(Debug, Clone, Serialize)]
pub struct StepEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub label: String,
    pub content: String,
}

impl StepEvent {
    pub fn new(kind: EventKind, label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            content: content.into(),
        }
    }
}

// ── HTTP request DTOs ───────────────────────────────────────────────────

fn default_doc_id() -> String {
    "default".to_string()
}
fn default_top_k() -> i64 {
    3
}
fn default_chunk_size() -> usize {
    300
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_max_length() -> usize {
    80_000
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkRequest {
    pub content: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub content: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_doc_id")]
    pub doc_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default = "default_doc_id")]
    pub doc_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FetchUrlRequest {
    pub url: String,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

/// A context snippet handed back to the generation step. Accepts full
/// search-result objects; only the text is used.
#[derive(Debug, Deserialize)]
pub struct ContextSnippet {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub query: String,
    pub search_results: Vec<ContextSnippet>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentRequest {
    pub query: String,
    #[serde(default = "default_doc_id")]
    pub doc_id: String,
    pub model: Option<String>,
}
