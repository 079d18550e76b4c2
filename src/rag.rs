//! Retrieval pipeline: chunk → embed → index, and embed → search.
//!
//! [`RagPipeline`] owns the embedding gateway and the vector store and is
//! the single entry point for both the HTTP handlers and the agent's
//! knowledge-base tool.

use serde::Serialize;

use crate::chunk::chunk_text;
use crate::embedding::EmbeddingGateway;
use crate::error::{RaglineError, Result};
use crate::models::{IndexedChunk, SearchResult};
use crate::store::VectorStore;

/// Leading slice of an embedding returned in index summaries, enough to
/// eyeball the vector without shipping all dimensions.
const EMBEDDING_PREVIEW_DIMS: usize = 12;

#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    pub chunk_id: usize,
    pub text: String,
    pub char_count: usize,
    pub token_estimate: usize,
    pub embedding_preview: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct IndexSummary {
    pub doc_id: String,
    pub total_chunks: usize,
    pub chunks: Vec<ChunkSummary>,
}

pub struct RagPipeline {
    gateway: EmbeddingGateway,
    store: VectorStore,
}

impl RagPipeline {
    pub fn new(gateway: EmbeddingGateway, store: VectorStore) -> Self {
        Self { gateway, store }
    }

    pub fn gateway(&self) -> &EmbeddingGateway {
        &self.gateway
    }

    /// Chunk `content`, embed every chunk, and replace the `doc_id`
    /// collection with the result. Returns a per-chunk summary.
    pub async fn index_document(
        &self,
        doc_id: &str,
        content: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IndexSummary> {
        let texts = chunk_text(content, chunk_size, chunk_overlap);
        if texts.is_empty() {
            return Err(RaglineError::Validation(
                "content produced no indexable chunks".to_string(),
            ));
        }

        tracing::info!(doc_id, chunks = texts.len(), "indexing document");
        let vectors = self.gateway.embed_batch(&texts).await?;

        let chunks: Vec<IndexedChunk> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, embedding))| IndexedChunk::new(i, text, embedding))
            .collect();

        let summaries: Vec<ChunkSummary> = chunks
            .iter()
            .map(|c| ChunkSummary {
                chunk_id: c.chunk_id,
                text: c.text.clone(),
                char_count: c.char_count,
                token_estimate: c.token_estimate,
                embedding_preview: c
                    .embedding
                    .iter()
                    .take(EMBEDDING_PREVIEW_DIMS)
                    .copied()
                    .collect(),
            })
            .collect();

        let total_chunks = chunks.len();
        self.store.index(doc_id, chunks);

        Ok(IndexSummary {
            doc_id: doc_id.to_string(),
            total_chunks,
            chunks: summaries,
        })
    }

    /// Embed `query` and run top-k cosine search over the `doc_id`
    /// collection. `top_k` below 1 is rejected before any network call.
    pub async fn search(&self, doc_id: &str, query: &str, top_k: i64) -> Result<Vec<SearchResult>> {
        Ok(self.search_detailed(doc_id, query, top_k).await?.1)
    }

    /// Like [`search`](Self::search), but also returns the query embedding.
    /// The query is embedded exactly once.
    pub async fn search_detailed(
        &self,
        doc_id: &str,
        query: &str,
        top_k: i64,
    ) -> Result<(Vec<f32>, Vec<SearchResult>)> {
        if top_k < 1 {
            return Err(RaglineError::Validation("top_k must be >= 1".to_string()));
        }
        if query.trim().is_empty() {
            return Err(RaglineError::Validation("query must not be empty".to_string()));
        }
        // Nothing indexed under this id: skip the embedding call entirely.
        if self.store.collection_len(doc_id) == 0 {
            return Ok((Vec::new(), Vec::new()));
        }
        let query_vec = self.gateway.embed(query).await?;
        let results = self.store.search(doc_id, &query_vec, top_k as usize);
        Ok((query_vec, results))
    }

    pub fn collection_len(&self, doc_id: &str) -> usize {
        self.store.collection_len(doc_id)
    }
}

/// Build the grounded-generation prompt: numbered reference snippets
/// followed by the user question.
pub fn assemble_prompt(query: &str, snippets: &[String]) -> String {
    let context = snippets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Answer the user's question based on the reference material below. \
         If the material does not contain the relevant information, say so \
         honestly.\n\n[Reference material]\n{context}\n\n[User question]\n{query}"
    )
}
