//! Query-time retrieval: embed the question, then look it up in the index.

use std::sync::Arc;
use tracing::debug;

use crate::embedding::{embed_query, Embedder};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::ScoredChunk;

#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }

    /// The `top_k` chunks most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        let results = self.index.query(&vector, self.top_k)?;
        debug!(
            results = results.len(),
            best = results.first().map(|r| r.score),
            "retrieved context"
        );
        Ok(results)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}
