//! HTTP surface: JSON endpoints for the pipeline stages plus the SSE agent
//! stream.
//!
//! Every handler is a thin adapter over [`Services`]; the interesting logic
//! lives in the pipeline and agent modules. Errors map to status codes in
//! one place ([`ApiError`]) so collaborator failures, timeouts, and bad
//! input stay distinguishable at the wire.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;

use crate::agent::run_agent;
use crate::chunk::{chunk_text, clamp_params};
use crate::config::Config;
use crate::error::{truncate_chars, RaglineError};
use crate::models::{
    AgentRequest, ChatRequest, ChunkRequest, EmbedRequest, FetchUrlRequest, GenerateRequest,
    IndexRequest, Message, SearchRequest,
};
use crate::rag::assemble_prompt;
use crate::web::{truncate_with_marker, HttpWebClient};
use crate::Services;

/// Leading dims of a vector shown in embed/search previews.
const PREVIEW_DIMS: usize = 16;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Arc<Services>,
    pub web: Arc<HttpWebClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/models", get(models))
        .route("/api/chat", post(chat))
        .route("/api/chunk", post(chunk))
        .route("/api/embed", post(embed))
        .route("/api/index", post(index))
        .route("/api/search", post(search))
        .route("/api/generate", post(generate))
        .route("/api/fetch_url", post(fetch_url))
        .route("/api/agent/run", post(agent_run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind = state.config.server.bind.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Error mapping ───────────────────────────────────────────────────────

#[derive(Debug)]
struct ApiError(RaglineError);

impl From<RaglineError> for ApiError {
    fn from(err: RaglineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RaglineError::Validation(_) => StatusCode::BAD_REQUEST,
            RaglineError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            RaglineError::Collaborator { .. } => StatusCode::BAD_GATEWAY,
            RaglineError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(status = %status, error = %self.0, "request failed");
        (status, axum::Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    Json(json!({ "status": "ok", "ts": ts }))
}

async fn models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "models": state.config.llm.models,
        "default": state.config.llm.default_model,
    }))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let resp = state
        .services
        .chat
        .chat(&req.messages, req.model.as_deref(), req.tools.as_deref())
        .await?;
    Ok(Json(serde_json::to_value(&resp).unwrap_or_default()))
}

async fn chunk(Json(req): Json<ChunkRequest>) -> Json<Value> {
    let (size, overlap) = clamp_params(req.chunk_size, req.chunk_overlap);
    let chunks = chunk_text(&req.content, size, overlap);
    let items: Vec<Value> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let chars = c.chars().count();
            json!({
                "id": i,
                "text": c,
                "char_count": chars,
                "token_estimate": chars / crate::models::CHARS_PER_TOKEN,
            })
        })
        .collect();
    Json(json!({
        "total_chunks": items.len(),
        "chunk_size": size,
        "chunk_overlap": overlap,
        "chunks": items,
    }))
}

async fn embed(
    State(state): State<AppState>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<Value>, ApiError> {
    let vectors = state.services.rag.gateway().embed_batch(&req.texts).await?;
    let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
    let embeddings: Vec<Value> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            json!({
                "id": i,
                "preview": v.iter().take(PREVIEW_DIMS).collect::<Vec<_>>(),
                "norm": (norm * 10_000.0).round() / 10_000.0,
            })
        })
        .collect();
    Ok(Json(json!({
        "count": vectors.len(),
        "dimensions": dimensions,
        "embeddings": embeddings,
    })))
}

async fn index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<Value>, ApiError> {
    let summary = state
        .services
        .rag
        .index_document(&req.doc_id, &req.content, req.chunk_size, req.chunk_overlap)
        .await?;
    Ok(Json(serde_json::to_value(&summary).unwrap_or_default()))
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let (query_vec, results) = state
        .services
        .rag
        .search_detailed(&req.doc_id, &req.query, req.top_k)
        .await?;
    Ok(Json(json!({
        "query": req.query,
        "query_embedding_preview": query_vec.iter().take(PREVIEW_DIMS).collect::<Vec<_>>(),
        "results": results,
    })))
}

/// Grounded generation: assemble a numbered-context prompt from the
/// caller's search results and ask the chat model to answer from it.
async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    let snippets: Vec<String> = req.search_results.into_iter().map(|s| s.text).collect();
    let prompt = assemble_prompt(&req.query, &snippets);
    let resp = state
        .services
        .chat
        .chat(&[Message::user(prompt.clone())], req.model.as_deref(), None)
        .await?;
    Ok(Json(json!({
        "assembled_prompt": prompt,
        "answer": resp.content,
        "usage": resp.usage,
    })))
}

async fn fetch_url(
    State(state): State<AppState>,
    Json(req): Json<FetchUrlRequest>,
) -> Json<Value> {
    let text = state.web.fetch(&req.url).await;
    let total_chars = text.chars().count();
    let truncated = total_chars > req.max_length;
    let content = if truncated {
        truncate_with_marker(&text, req.max_length)
    } else {
        text
    };
    Json(json!({
        "url": req.url,
        "content": content,
        "char_count": total_chars,
        "truncated": truncated,
    }))
}

/// Agent run as an SSE stream: one JSON event per step, closed with a
/// `[DONE]` sentinel after the final (result or error) event.
async fn agent_run(
    State(state): State<AppState>,
    Json(req): Json<AgentRequest>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, axum::Error>>> {
    tracing::info!(query = %truncate_chars(&req.query, 120), doc_id = %req.doc_id, "agent run");
    let stream = run_agent(state.services.clone(), req)
        .map(|event| Event::default().json_data(&event))
        .chain(tokio_stream::once(Ok(Event::default().data("[DONE]"))));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
