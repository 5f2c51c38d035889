//! Corpus loader.
//!
//! Reads the pre-extracted plain-text documents once at startup. Each file
//! holds the pages of one source document, each page followed by a
//! delimiter line of exactly 80 `=` characters. Only a line consisting of
//! the delimiter and nothing else splits pages; the same characters
//! anywhere else are kept as content.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{RagError, Result};
use crate::models::Document;

/// Width of the page delimiter line written by the extraction step.
pub const PAGE_DELIMITER_WIDTH: usize = 80;

/// Load every matching document under the corpus directory.
///
/// Documents are sorted by `source_id` for deterministic chunk order.
/// Files whose text is empty after removing delimiters are skipped.
pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<Document>> {
    let root = &config.dir;
    if !root.is_dir() {
        return Err(RagError::Corpus(format!(
            "corpus directory does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| RagError::Corpus(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_document(path, &rel_str)? {
            Some(doc) => documents.push(doc),
            None => debug!(source = %rel_str, "skipping empty document"),
        }
    }

    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    info!(
        dir = %root.display(),
        documents = documents.len(),
        "loaded corpus"
    );

    Ok(documents)
}

fn read_document(path: &Path, source_id: &str) -> Result<Option<Document>> {
    let raw = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    let text = join_pages(&raw);
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(Document {
        source_id: source_id.to_string(),
        text,
    }))
}

/// Split extracted text into pages on delimiter lines and rejoin the
/// non-empty pages with blank lines, so page breaks become paragraph breaks
/// for the chunker.
pub fn join_pages(raw: &str) -> String {
    let mut pages: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        if is_delimiter_line(line) {
            pages.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    pages.push(current);

    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn is_delimiter_line(line: &str) -> bool {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.len() == PAGE_DELIMITER_WIDTH && line.bytes().all(|b| b == b'=')
}

/// SHA-256 over every document's id and text, in order.
///
/// Recorded in the index manifest so a reused index can report that the
/// corpus has changed since it was built.
pub fn corpus_fingerprint(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.source_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::config(format!("invalid glob set: {}", e)))
}
