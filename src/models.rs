//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chunks, retrieval results, and
//! conversation turns that flow between the corpus loader, vector index,
//! history store, and orchestrator.

/// A pre-extracted plain-text document. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path of the source file relative to the corpus directory.
    pub source_id: String,
    /// Page texts joined by blank lines, delimiter lines removed.
    pub text: String,
}

/// A contiguous byte range of a document's text.
///
/// Identity is `(source_id, start..end)`; `id` is that pair rendered as a
/// string. `text == document.text[start..end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The tag used for this role in the persisted history file.
    pub fn history_tag(self) -> &'static str {
        match self {
            Role::User => "human",
            Role::Assistant => "ai",
        }
    }

    pub fn from_history_tag(tag: &str) -> Option<Self> {
        match tag {
            "human" => Some(Role::User),
            "ai" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// Zero-based position in the full history.
    pub position: usize,
}
