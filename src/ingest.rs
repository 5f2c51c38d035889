//! Index construction pipeline.
//!
//! Coordinates corpus → chunking → embedding → storage. Runs at most once
//! per cold start: when a persisted index is present it is reused as-is,
//! even if the corpus has changed since (a fingerprint mismatch is only
//! logged). `ragchat index rebuild` is the explicit way to refresh it.

use tracing::{info, warn};

use crate::chunk::split_text;
use crate::config::{ChunkingConfig, Config};
use crate::corpus::{corpus_fingerprint, load_corpus};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{BuildParams, VectorIndex};
use crate::models::{Chunk, Document};

/// Split every document into chunks, preserving document order.
pub fn chunk_corpus(documents: &[Document], chunking: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for doc in documents {
        chunks.extend(split_text(
            &doc.source_id,
            &doc.text,
            chunking.chunk_size,
            chunking.overlap,
        )?);
    }
    Ok(chunks)
}

/// Load the persisted index, building it from the corpus if it is missing
/// or unreadable.
///
/// # Errors
///
/// Fails if a rebuild is needed and the corpus cannot be loaded, or if the
/// rebuild's embedding calls fail.
pub async fn open_or_build_index(config: &Config, embedder: &dyn Embedder) -> Result<VectorIndex> {
    let dir = &config.index.dir;
    match VectorIndex::load(dir).await {
        Ok(index) => {
            check_fingerprint(config, &index);
            Ok(index)
        }
        Err(e) if e.is_index_missing_or_corrupt() => {
            warn!(dir = %dir.display(), error = %e, "building vector index");
            rebuild_index(config, embedder).await
        }
        Err(e) => Err(e),
    }
}

/// Build a fresh index from the corpus and swap it in for the persisted one.
///
/// The persisted index is replaced only once the new one is fully written,
/// so a failed rebuild leaves it loadable.
pub async fn rebuild_index(config: &Config, embedder: &dyn Embedder) -> Result<VectorIndex> {
    let documents = load_corpus(&config.corpus)?;
    let chunks = chunk_corpus(&documents, &config.chunking)?;
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "chunked corpus"
    );

    let params = BuildParams {
        batch_size: config.index.batch_size,
        chunk_size: config.chunking.chunk_size,
        overlap: config.chunking.overlap,
        corpus_fingerprint: corpus_fingerprint(&documents),
    };

    VectorIndex::build(&config.index.dir, chunks, embedder, &params).await
}

fn check_fingerprint(config: &Config, index: &VectorIndex) {
    // The index must load even when the corpus is gone.
    let documents = match load_corpus(&config.corpus) {
        Ok(docs) => docs,
        Err(e) => {
            info!(error = %e, "corpus unavailable; using persisted index");
            return;
        }
    };
    if corpus_fingerprint(&documents) != index.manifest().corpus_fingerprint {
        warn!(
            built_at = %index.manifest().built_at,
            "corpus has changed since the index was built; run `ragchat index rebuild` to refresh"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;

    #[test]
    fn test_chunk_corpus_keeps_document_order() {
        let docs = vec![
            Document {
                source_id: "a.txt".into(),
                text: "alpha ".repeat(50),
            },
            Document {
                source_id: "b.txt".into(),
                text: "beta".into(),
            },
        ];
        let chunking = ChunkingConfig {
            chunk_size: 100,
            overlap: 20,
        };
        let chunks = chunk_corpus(&docs, &chunking).unwrap();
        assert!(chunks.len() > 2);
        assert_eq!(chunks.last().unwrap().source_id, "b.txt");
        assert!(chunks[..chunks.len() - 1]
            .iter()
            .all(|c| c.source_id == "a.txt"));
    }

    #[test]
    fn test_chunk_corpus_rejects_bad_params() {
        let docs = vec![Document {
            source_id: "a.txt".into(),
            text: "text".into(),
        }];
        let chunking = ChunkingConfig {
            chunk_size: 10,
            overlap: 10,
        };
        let err = chunk_corpus(&docs, &chunking).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
