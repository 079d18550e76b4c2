//! ragline: a compact agentic-RAG backend.
//!
//! The pieces compose bottom-up: [`chunk`] splits documents, [`embedding`]
//! turns chunks into vectors through a batched order-preserving gateway,
//! [`store`] holds them for cosine top-k retrieval, and [`agent`] drives a
//! capped reason/act/observe loop over the chat model, web search, and the
//! local knowledge base, streaming its trace as ordered events. [`server`]
//! exposes all of it over HTTP.

pub mod agent;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;
pub mod store;
pub mod web;

pub use agent::{run_agent, Services};
pub use config::{load_config, Config};
pub use error::{RaglineError, Result};
pub use rag::RagPipeline;
