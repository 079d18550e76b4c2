//! In-memory vector store: per-document collections with brute-force
//! cosine top-k search.
//!
//! Collections are keyed by `doc_id` and replaced wholesale on re-index;
//! there are no partial updates. Search is a linear scan over the collection
//! — appropriate at demo scale, not a production index. A single `RwLock`
//! over the collection map keeps reads consistent: a search sees either the
//! old or the new collection, never a mix.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{IndexedChunk, SearchResult};

pub struct VectorStore {
    collections: RwLock<HashMap<String, Vec<IndexedChunk>>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the collection under `doc_id` as a single assignment.
    pub fn index(&self, doc_id: &str, chunks: Vec<IndexedChunk>) {
        let mut collections = self.collections.write().unwrap();
        collections.insert(doc_id.to_string(), chunks);
    }

    /// Number of chunks indexed under `doc_id` (0 for unknown ids).
    pub fn collection_len(&self, doc_id: &str) -> usize {
        let collections = self.collections.read().unwrap();
        collections.get(doc_id).map(Vec::len).unwrap_or(0)
    }

    /// Top-k cosine search over the collection, sorted by descending score.
    /// Equal scores keep the chunks' original indexing order (stable sort).
    /// Unknown or empty `doc_id` yields an empty result set.
    pub fn search(&self, doc_id: &str, query_vec: &[f32], top_k: usize) -> Vec<SearchResult> {
        let collections = self.collections.read().unwrap();
        let Some(chunks) = collections.get(doc_id) else {
            return Vec::new();
        };

        let mut results: Vec<SearchResult> = chunks
            .iter()
            .map(|c| SearchResult {
                chunk_id: c.chunk_id,
                text: c.text.clone(),
                score: round4(cosine_similarity(query_vec, &c.embedding)),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        results
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn round4(v: f32) -> f32 {
    (v * 10_000.0).round() / 10_000.0
}
