//! ReAct agent loop: reason → act → observe, streamed as ordered events.
//!
//! Each round asks the chat model for a JSON decision, executes the chosen
//! tool, and feeds the observation back into the next round's prompt. The
//! loop is capped at [`MAX_ITERATIONS`]; if the model never finishes on its
//! own, a final synthesis call produces the answer from whatever was
//! collected. Every run emits exactly one `result` event unless a
//! collaborator fails, in which case an `error` event is the last thing on
//! the stream.
//!
//! Events flow through a bounded channel; the producer task naturally slows
//! down when the consumer lags, and stops when the consumer goes away.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::truncate_chars;
use crate::llm::ChatBackend;
use crate::models::{AgentAction, AgentDecision, AgentRequest, EventKind, Message, StepEvent};
use crate::rag::RagPipeline;
use crate::web::SearchBackend;

/// Reasoning-round cap. Keeps a confused model from looping forever.
pub const MAX_ITERATIONS: usize = 3;

/// Channel capacity for the event stream.
const EVENT_BUFFER: usize = 32;

/// Per-tool observation cap inside the reasoning context.
const COLLECTED_LIMIT: usize = 1500;

/// Observation cap for emitted `observe` events.
const OBSERVE_LIMIT: usize = 2000;

/// How many recent observations the reasoning prompt carries.
const CONTEXT_WINDOW: usize = 3;

/// Shared handles for everything the agent can touch.
pub struct Services {
    pub chat: Arc<dyn ChatBackend>,
    pub search: Arc<dyn SearchBackend>,
    pub rag: Arc<RagPipeline>,
}

/// Start an agent run. The returned stream yields trace events in strict
/// order; it ends after the `result` event (or an `error` event on a
/// collaborator failure).
pub fn run_agent(services: Arc<Services>, req: AgentRequest) -> ReceiverStream<StepEvent> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        drive(services, req, tx).await;
    });
    ReceiverStream::new(rx)
}

async fn emit(tx: &mpsc::Sender<StepEvent>, event: StepEvent) -> bool {
    tx.send(event).await.is_ok()
}

macro_rules! send_or_return {
    ($tx:expr, $event:expr) => {
        if !emit($tx, $event).await {
            return;
        }
    };
}

async fn drive(services: Arc<Services>, req: AgentRequest, tx: mpsc::Sender<StepEvent>) {
    let mut collected: Vec<String> = Vec::new();
    let mut used_queries: HashSet<String> = HashSet::new();
    let model = req.model.as_deref();

    let has_knowledge_base = services.rag.collection_len(&req.doc_id) > 0;
    let mut available_tools = "web_search".to_string();
    if has_knowledge_base {
        available_tools.push_str(", knowledge_base");
    }

    send_or_return!(
        &tx,
        StepEvent::new(
            EventKind::System,
            "agent initialized",
            format!("Available tools: {available_tools}\nMax reasoning rounds: {MAX_ITERATIONS}"),
        )
    );

    let mut finished = false;
    let mut iteration = 0;
    while iteration < MAX_ITERATIONS {
        iteration += 1;

        let prompt = reason_prompt(&req.query, has_knowledge_base, &used_queries, &collected);
        let reply = match services.chat.chat(&[Message::user(prompt)], model, None).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(round = iteration, error = %e, "agent reasoning call failed");
                send_or_return!(&tx, StepEvent::new(EventKind::Error, "agent error", e.to_string()));
                return;
            }
        };

        let decision = parse_decision(&reply.content);
        let action_preview = match &decision.action {
            AgentAction::Finish(_) => "...".to_string(),
            AgentAction::WebSearch(q) | AgentAction::KnowledgeBase(q) => truncate_chars(q, 100),
            AgentAction::Unknown(name) => truncate_chars(name, 100),
        };
        send_or_return!(
            &tx,
            StepEvent::new(
                EventKind::Think,
                format!("[round {iteration}] thinking"),
                format!(
                    "Thought: {}\n\nDecision: {}({})",
                    decision.thought,
                    decision.action.name(),
                    action_preview
                ),
            )
        );

        match decision.action {
            AgentAction::Finish(answer) => {
                send_or_return!(
                    &tx,
                    StepEvent::new(
                        EventKind::Result,
                        format!("agent finished ({iteration} rounds)"),
                        answer,
                    )
                );
                finished = true;
                break;
            }

            AgentAction::WebSearch(query) => {
                if used_queries.contains(&query) {
                    send_or_return!(
                        &tx,
                        StepEvent::new(
                            EventKind::Think,
                            "duplicate query",
                            format!("query \"{query}\" was already used, trying another angle"),
                        )
                    );
                    continue;
                }
                used_queries.insert(query.clone());

                send_or_return!(
                    &tx,
                    StepEvent::new(EventKind::Tool, "web_search", format!("search query: {query}"))
                );

                let result = services.search.search(&query).await;
                collected.push(format!(
                    "[web_search: {query}]\n{}",
                    truncate_chars(&result, COLLECTED_LIMIT)
                ));

                let mut shown = truncate_chars(&result, OBSERVE_LIMIT);
                if result.chars().count() > OBSERVE_LIMIT {
                    shown.push_str("...");
                }
                send_or_return!(
                    &tx,
                    StepEvent::new(EventKind::Observe, "search results", shown)
                );
            }

            AgentAction::KnowledgeBase(query) => {
                send_or_return!(
                    &tx,
                    StepEvent::new(
                        EventKind::Tool,
                        "knowledge_base",
                        format!("retrieval query: {query}"),
                    )
                );

                let results = match services.rag.search(&req.doc_id, &query, 3).await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(round = iteration, error = %e, "knowledge base lookup failed");
                        send_or_return!(
                            &tx,
                            StepEvent::new(EventKind::Error, "agent error", e.to_string())
                        );
                        return;
                    }
                };

                if results.is_empty() {
                    send_or_return!(
                        &tx,
                        StepEvent::new(
                            EventKind::Observe,
                            "knowledge base results",
                            "No relevant content found.",
                        )
                    );
                } else {
                    let text = results
                        .iter()
                        .map(|r| format!("[score {:.2}] {}", r.score, r.text))
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    collected.push(format!(
                        "[knowledge_base: {query}]\n{}",
                        truncate_chars(&text, COLLECTED_LIMIT)
                    ));
                    send_or_return!(
                        &tx,
                        StepEvent::new(EventKind::Observe, "knowledge base results", text)
                    );
                }
            }

            AgentAction::Unknown(name) => {
                send_or_return!(
                    &tx,
                    StepEvent::new(
                        EventKind::Think,
                        "unknown action",
                        format!("model returned unknown action \"{name}\", continuing"),
                    )
                );
            }
        }
    }

    if !finished {
        send_or_return!(
            &tx,
            StepEvent::new(
                EventKind::Think,
                "round limit reached",
                "Maximum reasoning rounds reached, synthesizing an answer from collected information...",
            )
        );

        let context = if collected.is_empty() {
            "none".to_string()
        } else {
            collected.join("\n---\n")
        };
        let prompt = format!(
            "Answer the user's question based on the information collected below. \
             If the information is insufficient, say so honestly.\n\n\
             [Collected information]\n{context}\n\n[User question]\n{}",
            req.query
        );

        match services.chat.chat(&[Message::user(prompt)], model, None).await {
            Ok(reply) => {
                send_or_return!(
                    &tx,
                    StepEvent::new(EventKind::Result, "agent finished (limit reached)", reply.content)
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "agent synthesis call failed");
                send_or_return!(&tx, StepEvent::new(EventKind::Error, "agent error", e.to_string()));
            }
        }
    }
}

impl AgentAction {
    fn name(&self) -> &'static str {
        match self {
            AgentAction::WebSearch(_) => "web_search",
            AgentAction::KnowledgeBase(_) => "knowledge_base",
            AgentAction::Finish(_) => "finish",
            AgentAction::Unknown(_) => "unknown",
        }
    }
}

fn reason_prompt(
    query: &str,
    has_knowledge_base: bool,
    used_queries: &HashSet<String>,
    collected: &[String],
) -> String {
    let kb_hint = if has_knowledge_base {
        ""
    } else {
        " (the knowledge base is currently empty, not recommended)"
    };

    let used = if used_queries.is_empty() {
        "none".to_string()
    } else {
        used_queries
            .iter()
            .map(|q| format!("\"{q}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut context = String::new();
    if !collected.is_empty() {
        let recent = &collected[collected.len().saturating_sub(CONTEXT_WINDOW)..];
        context = format!("\n\n[Collected information]\n{}", recent.join("\n---\n"));
    }

    format!(
        "You are an assistant answering a question through step-by-step reasoning \
         with tools.\n\n\
         [User question]\n{query}\n\n\
         [Available tools]\n\
         1. web_search: search the internet, argument: query (search keywords)\n\
         2. knowledge_base: search the indexed knowledge base, argument: query{kb_hint}\n\n\
         [Queries already used]\n{used}{context}\n\n\
         Analyze the situation and decide the next step. You must reply in exactly \
         this JSON format:\n\
         {{\"thought\": \"your reasoning\", \"action\": \"tool name or finish\", \
         \"action_input\": \"tool argument or final answer\"}}\n\n\
         - If you have enough information to answer, set action to \"finish\" and put \
         the final answer in action_input.\n\
         - If you need more information, set action to a tool name and action_input to \
         the query.\n\
         - Never repeat a query you already used."
    )
}

/// Interpret the model's reply as a decision, degrading gracefully:
/// 1. the first flat JSON object containing a `"thought"` key;
/// 2. else a tool keyword anywhere in the text, with the first quoted
///    string as its argument;
/// 3. else the whole reply is treated as a final answer.
pub fn parse_decision(text: &str) -> AgentDecision {
    if let Some(parsed) = extract_decision_json(text) {
        let thought = parsed["thought"].as_str().unwrap_or_default().to_string();
        let input = parsed["action_input"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let action = match parsed["action"].as_str().unwrap_or("finish") {
            "finish" => AgentAction::Finish(input),
            "web_search" => AgentAction::WebSearch(input),
            "knowledge_base" => AgentAction::KnowledgeBase(input),
            other => AgentAction::Unknown(other.to_string()),
        };
        return AgentDecision { thought, action };
    }

    let lower = text.to_lowercase();
    if lower.contains("web_search") {
        return AgentDecision {
            thought: truncate_chars(text, 200),
            action: AgentAction::WebSearch(first_quoted(text).unwrap_or_default()),
        };
    }
    if lower.contains("knowledge_base") {
        return AgentDecision {
            thought: truncate_chars(text, 200),
            action: AgentAction::KnowledgeBase(first_quoted(text).unwrap_or_default()),
        };
    }

    AgentDecision {
        thought: text.to_string(),
        action: AgentAction::Finish(text.to_string()),
    }
}

/// Find the first `{ ... }` span with no nested braces that mentions a
/// `"thought"` key and parses as JSON.
fn extract_decision_json(text: &str) -> Option<serde_json::Value> {
    let mut from = 0;
    while let Some(off) = text[from..].find('{') {
        let start = from + off;
        let rest = &text[start + 1..];
        if let Some(rel) = rest.find(['{', '}']) {
            if rest.as_bytes()[rel] == b'}' {
                let candidate = &text[start..start + 1 + rel + 1];
                if candidate.contains("\"thought\"") {
                    if let Ok(v) = serde_json::from_str::<serde_json::Value>(candidate) {
                        return Some(v);
                    }
                }
            }
        }
        from = start + 1;
    }
    None
}

/// Content between the first pair of quotes (single or double).
fn first_quoted(text: &str) -> Option<String> {
    let start = text.find(['"', '\''])?;
    let rest = &text[start + 1..];
    let end = rest.find(['"', '\''])?;
    let inner = &rest[..end];
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio_stream::StreamExt;

    use crate::embedding::{EmbeddingBackend, EmbeddingGateway, TaggedEmbedding};
    use crate::error::{RaglineError, Result};
    use crate::models::ChatResponse;
    use crate::store::VectorStore;

    /// Replays a fixed sequence of chat replies (or failures).
    struct ScriptedChat {
        replies: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedChat {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
            })
        }
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
                .expect("script exhausted");
            next.map(|content| ChatResponse {
                content,
                tool_calls: Vec::new(),
                usage: Default::default(),
            })
        }
    }

    struct FixedSearch {
        result: String,
    }

    #[async_trait]
    impl SearchBackend for FixedSearch {
        async fn search(&self, _query: &str) -> String {
            self.result.clone()
        }
    }

    struct StubEmbeddings;

    #[async_trait]
    impl EmbeddingBackend for StubEmbeddings {
        async fn embed_group(&self, texts: &[String]) -> Result<Vec<TaggedEmbedding>> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, t)| TaggedEmbedding {
                    index: i,
                    embedding: vec![t.chars().count() as f32, 1.0],
                })
                .collect())
        }
    }

    fn services(chat: Arc<ScriptedChat>, search_result: &str) -> Arc<Services> {
        Arc::new(Services {
            chat,
            search: Arc::new(FixedSearch {
                result: search_result.to_string(),
            }),
            rag: Arc::new(RagPipeline::new(
                EmbeddingGateway::new(Arc::new(StubEmbeddings), 10),
                VectorStore::new(),
            )),
        })
    }

    fn request(query: &str) -> AgentRequest {
        serde_json::from_value(serde_json::json!({"query": query})).unwrap()
    }

    async fn collect(services: Arc<Services>, req: AgentRequest) -> Vec<StepEvent> {
        run_agent(services, req).collect().await
    }

    fn decision(action: &str, input: &str) -> String {
        format!(
            "{{\"thought\": \"t\", \"action\": \"{action}\", \"action_input\": \"{input}\"}}"
        )
    }

    fn kinds(events: &[StepEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn test_finish_on_first_round() {
        let chat = ScriptedChat::new(vec![Ok(decision("finish", "the answer"))]);
        let events = collect(services(chat, ""), request("q")).await;
        assert_eq!(
            kinds(&events),
            vec![EventKind::System, EventKind::Think, EventKind::Result]
        );
        assert_eq!(events[2].content, "the answer");
        assert!(events[2].label.contains("1 rounds"));
    }

    #[tokio::test]
    async fn test_search_then_finish() {
        let chat = ScriptedChat::new(vec![
            Ok(decision("web_search", "rust async")),
            Ok(decision("finish", "done")),
        ]);
        let events = collect(services(chat, "[1] hit\nSource: x"), request("q")).await;
        assert_eq!(
            kinds(&events),
            vec![
                EventKind::System,
                EventKind::Think,
                EventKind::Tool,
                EventKind::Observe,
                EventKind::Think,
                EventKind::Result,
            ]
        );
        assert!(events[2].content.contains("rust async"));
        assert!(events[3].content.contains("[1] hit"));
    }

    #[tokio::test]
    async fn test_long_observation_truncated() {
        let chat = ScriptedChat::new(vec![
            Ok(decision("web_search", "q1")),
            Ok(decision("finish", "done")),
        ]);
        let long = "x".repeat(5000);
        let events = collect(services(chat, &long), request("q")).await;
        let observe = events.iter().find(|e| e.kind == EventKind::Observe).unwrap();
        assert!(observe.content.ends_with("..."));
        assert_eq!(observe.content.chars().count(), OBSERVE_LIMIT + 3);
    }

    #[tokio::test]
    async fn test_duplicate_query_skipped() {
        let chat = ScriptedChat::new(vec![
            Ok(decision("web_search", "same")),
            Ok(decision("web_search", "same")),
            Ok(decision("finish", "done")),
        ]);
        let events = collect(services(chat, "result"), request("q")).await;
        let tool_count = events.iter().filter(|e| e.kind == EventKind::Tool).count();
        assert_eq!(tool_count, 1);
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Think && e.label == "duplicate query"));
        assert_eq!(events.last().unwrap().kind, EventKind::Result);
    }

    #[tokio::test]
    async fn test_forced_synthesis_after_round_limit() {
        let chat = ScriptedChat::new(vec![
            Ok(decision("web_search", "q1")),
            Ok(decision("web_search", "q2")),
            Ok(decision("web_search", "q3")),
            Ok("synthesized answer".to_string()),
        ]);
        let events = collect(services(chat, "result"), request("q")).await;
        let results: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Result).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "synthesized answer");
        assert!(results[0].label.contains("limit reached"));
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Think && e.label == "round limit reached"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_becomes_final_answer() {
        let raw = "The capital of France is Paris.";
        let chat = ScriptedChat::new(vec![Ok(raw.to_string())]);
        let events = collect(services(chat, ""), request("q")).await;
        assert_eq!(events.last().unwrap().kind, EventKind::Result);
        assert_eq!(events.last().unwrap().content, raw);
    }

    #[tokio::test]
    async fn test_chat_failure_ends_stream_with_error() {
        let chat = ScriptedChat::new(vec![Err(RaglineError::Timeout {
            service: "chat",
            secs: 120,
        })]);
        let events = collect(services(chat, ""), request("q")).await;
        assert_eq!(kinds(&events), vec![EventKind::System, EventKind::Error]);
        assert!(events[1].content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_knowledge_base_round() {
        let chat = ScriptedChat::new(vec![
            Ok(decision("knowledge_base", "topic")),
            Ok(decision("finish", "done")),
        ]);
        let svc = services(chat, "");
        svc.rag
            .index_document("default", "some indexed content about the topic", 300, 0)
            .await
            .unwrap();
        let events = collect(svc, request("q")).await;
        let observe = events.iter().find(|e| e.kind == EventKind::Observe).unwrap();
        assert!(observe.content.starts_with("[score "));
        // system event should advertise the knowledge base
        assert!(events[0].content.contains("knowledge_base"));
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_not_advertised() {
        let chat = ScriptedChat::new(vec![Ok(decision("finish", "a"))]);
        let events = collect(services(chat, ""), request("q")).await;
        assert!(!events[0].content.contains("knowledge_base"));
    }

    #[test]
    fn test_parse_json_decision_with_prose() {
        let text = "Sure, here is my decision:\n\
                    {\"thought\": \"need facts\", \"action\": \"web_search\", \"action_input\": \"rust 1.80\"}\n\
                    hope that helps";
        let d = parse_decision(text);
        assert_eq!(d.thought, "need facts");
        assert_eq!(d.action, AgentAction::WebSearch("rust 1.80".to_string()));
    }

    #[test]
    fn test_parse_keyword_fallback() {
        let d = parse_decision("I should call web_search with 'rust testing'.");
        assert_eq!(d.action, AgentAction::WebSearch("rust testing".to_string()));

        let d = parse_decision("let me check the knowledge_base for \"embeddings\"");
        assert_eq!(d.action, AgentAction::KnowledgeBase("embeddings".to_string()));
    }

    #[test]
    fn test_parse_default_is_finish_with_raw_text() {
        let d = parse_decision("just a plain answer");
        assert_eq!(d.thought, "just a plain answer");
        assert_eq!(d.action, AgentAction::Finish("just a plain answer".to_string()));
    }

    #[test]
    fn test_parse_unknown_action() {
        let d = parse_decision("{\"thought\": \"hm\", \"action\": \"teleport\", \"action_input\": \"x\"}");
        assert_eq!(d.action, AgentAction::Unknown("teleport".to_string()));
    }

    #[test]
    fn test_parse_malformed_json_falls_through() {
        // Braces present but not valid JSON; web_search keyword wins.
        let d = parse_decision("{\"thought\": broken} use web_search for \"q\"");
        assert_eq!(d.action, AgentAction::WebSearch("thought".to_string()));
    }
}
