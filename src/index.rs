//! Persistent vector index.
//!
//! Maps chunk embeddings to chunk text. The index is built once (when no
//! persisted copy exists), written to `<dir>/index.sqlite`, and afterwards
//! loaded as-is on every start. It is immutable once constructed; share it
//! through `Arc` and query it without locking.
//!
//! # On-disk layout
//!
//! | Table | Contents |
//! |-------|----------|
//! | `manifest` | key/value build metadata (model, dims, chunking, corpus fingerprint, build time) |
//! | `chunks` | one row per chunk: offsets, text, hash, little-endian `f32` vector BLOB |
//!
//! A build writes to `index.sqlite.tmp` and renames it into place, so an
//! interrupted build never leaves a half-written `index.sqlite`.
//!
//! # Queries
//!
//! [`VectorIndex::query`] is an exact scan by cosine similarity. Results are
//! sorted by descending score; equal scores keep insertion order.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{RagError, Result};
use crate::migrate::{self, SCHEMA_VERSION};
use crate::models::{Chunk, ScoredChunk};

const INDEX_FILE: &str = "index.sqlite";
const BUILD_FILE: &str = "index.sqlite.tmp";
/// Leftovers from an earlier index file; stale once a new one is renamed in.
const SIDECAR_FILES: [&str; 3] = [
    "index.sqlite-journal",
    "index.sqlite-wal",
    "index.sqlite-shm",
];

/// Build metadata persisted alongside the vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexManifest {
    pub model: String,
    pub dims: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    /// See [`corpus_fingerprint`](crate::corpus::corpus_fingerprint).
    pub corpus_fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub chunk_count: usize,
}

/// Inputs to [`VectorIndex::build`] beyond the chunks themselves.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub batch_size: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub corpus_fingerprint: String,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// True if `dir` exists and contains anything at all.
    pub fn exists(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Embed `chunks` in batches and persist them under `dir`.
    ///
    /// Every embedding call completes before anything is written, so an
    /// embedding failure leaves the directory untouched.
    pub async fn build(
        dir: &Path,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        params: &BuildParams,
    ) -> Result<Self> {
        let mut vectors = Vec::with_capacity(chunks.len());
        let total = chunks.len();

        for (batch_no, batch) in chunks.chunks(params.batch_size.max(1)).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
            debug!(
                batch = batch_no,
                embedded = vectors.len(),
                total,
                "embedded chunk batch"
            );
        }

        let manifest = IndexManifest {
            model: embedder.model_name().to_string(),
            dims: embedder.dims(),
            chunk_size: params.chunk_size,
            overlap: params.overlap,
            corpus_fingerprint: params.corpus_fingerprint.clone(),
            built_at: Utc::now(),
            chunk_count: chunks.len(),
        };

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        let index = Self { manifest, entries };
        index.persist(dir).await?;

        info!(
            dir = %dir.display(),
            chunks = index.len(),
            model = %index.manifest.model,
            "built vector index"
        );

        Ok(index)
    }

    async fn persist(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| RagError::io(dir, e))?;
        let tmp_path = dir.join(BUILD_FILE);
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path).map_err(|e| RagError::io(&tmp_path, e))?;
        }

        let pool = db::connect(&tmp_path, true).await?;
        migrate::create_schema(&pool).await?;
        let written = self.write_rows(&pool).await;
        pool.close().await;
        written?;

        let final_path = dir.join(INDEX_FILE);
        std::fs::rename(&tmp_path, &final_path).map_err(|e| RagError::io(&final_path, e))?;
        for name in SIDECAR_FILES {
            let path = dir.join(name);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| RagError::io(&path, e))?;
            }
        }
        Ok(())
    }

    async fn write_rows(&self, pool: &SqlitePool) -> Result<()> {
        let mut tx = pool.begin().await?;

        let m = &self.manifest;
        let pairs = [
            ("schema_version", SCHEMA_VERSION.to_string()),
            ("model", m.model.clone()),
            ("dims", m.dims.to_string()),
            ("chunk_size", m.chunk_size.to_string()),
            ("overlap", m.overlap.to_string()),
            ("corpus_fingerprint", m.corpus_fingerprint.clone()),
            ("built_at", m.built_at.to_rfc3339()),
            ("chunk_count", m.chunk_count.to_string()),
        ];
        for (key, value) in pairs {
            sqlx::query("INSERT INTO manifest (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        for (position, entry) in self.entries.iter().enumerate() {
            let c = &entry.chunk;
            sqlx::query(
                "INSERT INTO chunks (position, id, source_id, chunk_index, start_offset, end_offset, text, hash, vector)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(position as i64)
            .bind(&c.id)
            .bind(&c.source_id)
            .bind(c.chunk_index)
            .bind(c.start as i64)
            .bind(c.end as i64)
            .bind(&c.text)
            .bind(&c.hash)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Reconstruct a persisted index without re-embedding.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if `dir` is absent or empty.
    /// - [`RagError::IndexCorrupt`] if `dir` has content but no readable,
    ///   self-consistent index.
    pub async fn load(dir: &Path) -> Result<Self> {
        if !Self::exists(dir) {
            return Err(RagError::IndexNotFound(dir.to_path_buf()));
        }

        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            return Err(corrupt(dir, format!("{} is missing", INDEX_FILE)));
        }

        let pool = db::connect(&path, false)
            .await
            .map_err(|e| corrupt(dir, e.to_string()))?;
        let loaded = read_index(&pool, dir).await;
        pool.close().await;
        let index = loaded?;

        info!(
            dir = %dir.display(),
            chunks = index.len(),
            model = %index.manifest.model,
            built_at = %index.manifest.built_at,
            "loaded vector index"
        );
        Ok(index)
    }

    /// Return at most `k` chunks most similar to `vector`, best first.
    ///
    /// # Errors
    ///
    /// [`RagError::Retrieval`] if `vector` does not match the index's
    /// dimensionality (e.g. the embedding model changed since the build).
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.manifest.dims {
            return Err(RagError::Retrieval(format!(
                "query vector has {} dimensions, index has {}",
                vector.len(),
                self.manifest.dims
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.vector)))
            .collect();

        // `sort_by` is stable, so equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

fn corrupt(dir: &Path, reason: impl Into<String>) -> RagError {
    RagError::IndexCorrupt {
        path: dir.to_path_buf(),
        reason: reason.into(),
    }
}

async fn read_index(pool: &SqlitePool, dir: &Path) -> Result<VectorIndex> {
    let manifest = read_manifest(pool, dir).await?;

    let rows = sqlx::query(
        "SELECT id, source_id, chunk_index, start_offset, end_offset, text, hash, vector
         FROM chunks ORDER BY position",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| corrupt(dir, e.to_string()))?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let entry = decode_row(&row).map_err(|e| corrupt(dir, e.to_string()))?;
        if entry.vector.len() != manifest.dims {
            return Err(corrupt(
                dir,
                format!(
                    "chunk {} has a {}-dimensional vector, manifest says {}",
                    entry.chunk.id,
                    entry.vector.len(),
                    manifest.dims
                ),
            ));
        }
        entries.push(entry);
    }

    if entries.len() != manifest.chunk_count {
        return Err(corrupt(
            dir,
            format!(
                "manifest lists {} chunks, found {}",
                manifest.chunk_count,
                entries.len()
            ),
        ));
    }

    Ok(VectorIndex { manifest, entries })
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> std::result::Result<IndexEntry, sqlx::Error> {
    let start: i64 = row.try_get("start_offset")?;
    let end: i64 = row.try_get("end_offset")?;
    let vector: Vec<u8> = row.try_get("vector")?;
    Ok(IndexEntry {
        chunk: Chunk {
            id: row.try_get("id")?,
            source_id: row.try_get("source_id")?,
            chunk_index: row.try_get("chunk_index")?,
            start: start as usize,
            end: end as usize,
            text: row.try_get("text")?,
            hash: row.try_get("hash")?,
        },
        vector: blob_to_vec(&vector),
    })
}

async fn read_manifest(pool: &SqlitePool, dir: &Path) -> Result<IndexManifest> {
    let rows = sqlx::query("SELECT key, value FROM manifest")
        .fetch_all(pool)
        .await
        .map_err(|e| corrupt(dir, e.to_string()))?;

    let mut values = std::collections::HashMap::new();
    for row in rows {
        let key: String = row.try_get("key").map_err(|e| corrupt(dir, e.to_string()))?;
        let value: String = row
            .try_get("value")
            .map_err(|e| corrupt(dir, e.to_string()))?;
        values.insert(key, value);
    }

    let get = |key: &str| -> Result<String> {
        values
            .get(key)
            .cloned()
            .ok_or_else(|| corrupt(dir, format!("manifest is missing '{}'", key)))
    };
    let get_usize = |key: &str| -> Result<usize> {
        get(key)?
            .parse::<usize>()
            .map_err(|e| corrupt(dir, format!("manifest '{}': {}", key, e)))
    };

    let version: i64 = get("schema_version")?
        .parse()
        .map_err(|e| corrupt(dir, format!("manifest 'schema_version': {}", e)))?;
    if version != SCHEMA_VERSION {
        return Err(corrupt(
            dir,
            format!("unsupported schema version {}", version),
        ));
    }

    let built_at = DateTime::parse_from_rfc3339(&get("built_at")?)
        .map_err(|e| corrupt(dir, format!("manifest 'built_at': {}", e)))?
        .with_timezone(&Utc);

    Ok(IndexManifest {
        model: get("model")?,
        dims: get_usize("dims")?,
        chunk_size: get_usize("chunk_size")?,
        overlap: get_usize("overlap")?,
        corpus_fingerprint: get("corpus_fingerprint")?,
        built_at,
        chunk_count: get_usize("chunk_count")?,
    })
}

/// Path of the persisted index file inside `dir`.
pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}
