use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use ragline::agent::{run_agent, Services};
use ragline::chunk::chunk_text;
use ragline::config::{load_or_default, Config};
use ragline::embedding::{EmbeddingGateway, HttpEmbeddingBackend};
use ragline::llm::HttpChatClient;
use ragline::models::AgentRequest;
use ragline::rag::RagPipeline;
use ragline::server::{self, AppState};
use ragline::store::VectorStore;
use ragline::web::HttpWebClient;

#[derive(Parser)]
#[command(name = "ragline", version, about = "Agentic RAG backend and CLI")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,

    /// Chunk a text file and print the pieces
    Chunk {
        path: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Index a text file and run a similarity query against it
    Search {
        path: PathBuf,
        query: String,
        #[arg(long, default_value_t = 3)]
        top_k: i64,
    },

    /// Ask the agent a question, optionally grounding it on a document
    Ask {
        query: String,
        /// Text file to index as the knowledge base before the run
        #[arg(long)]
        doc: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
    },
}

fn build_services(config: &Config) -> anyhow::Result<(Arc<Services>, Arc<HttpWebClient>)> {
    let chat = Arc::new(HttpChatClient::new(&config.llm)?);
    let web = Arc::new(HttpWebClient::new(&config.search)?);
    let backend = Arc::new(HttpEmbeddingBackend::new(&config.embedding)?);
    let gateway = EmbeddingGateway::new(backend, config.embedding.batch_size);
    let rag = Arc::new(RagPipeline::new(gateway, VectorStore::new()));
    let services = Arc::new(Services {
        chat,
        search: web.clone(),
        rag,
    });
    Ok((services, web))
}

fn read_doc(path: &PathBuf) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;

    match cli.command {
        Command::Serve => {
            let (services, web) = build_services(&config)?;
            server::serve(AppState {
                config: Arc::new(config),
                services,
                web,
            })
            .await
        }

        Command::Chunk {
            path,
            chunk_size,
            chunk_overlap,
        } => {
            let content = read_doc(&path)?;
            let size = chunk_size.unwrap_or(config.chunking.chunk_size);
            let overlap = chunk_overlap.unwrap_or(config.chunking.chunk_overlap);
            let chunks = chunk_text(&content, size, overlap);
            println!("{} chunks (size {size}, overlap {overlap})", chunks.len());
            for (i, c) in chunks.iter().enumerate() {
                println!("\n--- chunk {i} ({} chars) ---\n{c}", c.chars().count());
            }
            Ok(())
        }

        Command::Search { path, query, top_k } => {
            let (services, _) = build_services(&config)?;
            let content = read_doc(&path)?;
            let summary = services
                .rag
                .index_document(
                    "default",
                    &content,
                    config.chunking.chunk_size,
                    config.chunking.chunk_overlap,
                )
                .await?;
            println!("indexed {} chunks", summary.total_chunks);

            let results = services.rag.search("default", &query, top_k).await?;
            for r in results {
                println!("\n[score {:.4}] (chunk {})\n{}", r.score, r.chunk_id, r.text);
            }
            Ok(())
        }

        Command::Ask { query, doc, model } => {
            let (services, _) = build_services(&config)?;
            if let Some(path) = doc {
                let content = read_doc(&path)?;
                let summary = services
                    .rag
                    .index_document(
                        "default",
                        &content,
                        config.chunking.chunk_size,
                        config.chunking.chunk_overlap,
                    )
                    .await?;
                println!("indexed {} chunks from {}", summary.total_chunks, path.display());
            }

            let req = AgentRequest {
                query,
                doc_id: "default".to_string(),
                model,
            };
            let mut stream = run_agent(services, req);
            while let Some(event) = stream.next().await {
                println!("\n[{:?}] {}", event.kind, event.label);
                println!("{}", event.content);
            }
            Ok(())
        }
    }
}
