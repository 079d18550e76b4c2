//! End-to-end agent flow over the public API: index a document, then drive
//! a full reason/act/observe run with scripted collaborators and check the
//! streamed trace.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_stream::StreamExt;

use ragline::agent::{run_agent, Services};
use ragline::embedding::{EmbeddingBackend, EmbeddingGateway, TaggedEmbedding};
use ragline::error::{RaglineError, Result};
use ragline::llm::ChatBackend;
use ragline::models::{AgentRequest, ChatResponse, EventKind, Message, StepEvent};
use ragline::rag::RagPipeline;
use ragline::store::VectorStore;
use ragline::web::SearchBackend;

struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String>>>,
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn chat(
        &self,
        _messages: &[Message],
        _model: Option<&str>,
        _tools: Option<&[serde_json::Value]>,
    ) -> Result<ChatResponse> {
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("chat script exhausted");
        next.map(|content| ChatResponse {
            content,
            tool_calls: Vec::new(),
            usage: Default::default(),
        })
    }
}

struct RecordingSearch {
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl SearchBackend for RecordingSearch {
    async fn search(&self, query: &str) -> String {
        self.queries.lock().unwrap().push(query.to_string());
        format!("[1] result for {query}\nSource: https://example.com")
    }
}

struct HashEmbeddings;

#[async_trait]
impl EmbeddingBackend for HashEmbeddings {
    async fn embed_group(&self, texts: &[String]) -> Result<Vec<TaggedEmbedding>> {
        Ok(texts
            .iter()
            .enumerate()
            .map(|(i, t)| TaggedEmbedding {
                index: i,
                embedding: vec![t.chars().count() as f32, (t.len() % 7) as f32, 1.0],
            })
            .collect())
    }
}

fn decision(action: &str, input: &str) -> Result<String> {
    Ok(format!(
        "{{\"thought\": \"step\", \"action\": \"{action}\", \"action_input\": \"{input}\"}}"
    ))
}

fn build(replies: Vec<Result<String>>) -> (Arc<Services>, Arc<RecordingSearch>) {
    let search = Arc::new(RecordingSearch {
        queries: Mutex::new(Vec::new()),
    });
    let services = Arc::new(Services {
        chat: Arc::new(ScriptedChat {
            replies: Mutex::new(replies.into_iter().collect()),
        }),
        search: search.clone(),
        rag: Arc::new(RagPipeline::new(
            EmbeddingGateway::new(Arc::new(HashEmbeddings), 4),
            VectorStore::new(),
        )),
    });
    (services, search)
}

async fn collect(services: Arc<Services>, query: &str) -> Vec<StepEvent> {
    let req = AgentRequest {
        query: query.to_string(),
        doc_id: "default".to_string(),
        model: None,
    };
    run_agent(services, req).collect().await
}

#[tokio::test]
async fn full_run_with_both_tools() {
    let (services, search) = build(vec![
        decision("knowledge_base", "retry policy"),
        decision("web_search", "embedding batching"),
        decision("finish", "final answer combining both sources"),
    ]);

    services
        .rag
        .index_document(
            "default",
            "The gateway never retries a failed group.\n\nBatches are sequential.",
            60,
            0,
        )
        .await
        .unwrap();

    let events = collect(services, "how do retries work?").await;
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::System,
            EventKind::Think,
            EventKind::Tool,
            EventKind::Observe,
            EventKind::Think,
            EventKind::Tool,
            EventKind::Observe,
            EventKind::Think,
            EventKind::Result,
        ]
    );

    // knowledge base advertised and queried first
    assert!(events[0].content.contains("knowledge_base"));
    assert_eq!(events[2].label, "knowledge_base");
    assert!(events[3].content.starts_with("[score "));

    // then the recorded web search
    assert_eq!(events[5].label, "web_search");
    assert_eq!(*search.queries.lock().unwrap(), vec!["embedding batching"]);
    assert!(events[6].content.contains("embedding batching"));

    // exactly one result, and it is last
    let results: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Result).collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "final answer combining both sources");
}

#[tokio::test]
async fn forced_synthesis_consumes_every_round() {
    let (services, search) = build(vec![
        decision("web_search", "q1"),
        decision("web_search", "q2"),
        decision("web_search", "q3"),
        Ok("synthesized from three searches".to_string()),
    ]);

    let events = collect(services, "broad question").await;
    assert_eq!(search.queries.lock().unwrap().len(), 3);

    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Result);
    assert_eq!(last.content, "synthesized from three searches");
    assert!(last.label.contains("limit reached"));
}

#[tokio::test]
async fn collaborator_failure_closes_stream_with_error() {
    let (services, _) = build(vec![
        decision("web_search", "first"),
        Err(RaglineError::collaborator("chat", 503, "overloaded")),
    ]);

    let events = collect(services, "q").await;
    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Error);
    assert!(last.content.contains("503"));
    // no result event anywhere
    assert!(events.iter().all(|e| e.kind != EventKind::Result));
}
