//! Operator views of persisted state.
//!
//! Backs `ragchat index status` and `ragchat history show`: what is indexed,
//! when it was built, whether the corpus has drifted since, and what the
//! conversation looks like so far.

use anyhow::Result;

use crate::config::Config;
use crate::corpus::{corpus_fingerprint, load_corpus};
use crate::error::RagError;
use crate::history::HistoryStore;
use crate::index::{index_file, VectorIndex};

/// Run `index status`: load the index manifest and print a summary.
pub async fn run_index_status(config: &Config) -> Result<()> {
    let dir = &config.index.dir;

    println!("ragchat index status");
    println!("====================");
    println!();
    println!("  Directory:   {}", dir.display());

    let index = match VectorIndex::load(dir).await {
        Ok(index) => index,
        Err(RagError::IndexNotFound(_)) => {
            println!("  State:       not built (will be built on next start)");
            println!();
            return Ok(());
        }
        Err(e @ RagError::IndexCorrupt { .. }) => {
            println!("  State:       unreadable ({})", e);
            println!("               run `ragchat index rebuild` to replace it");
            println!();
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let size = std::fs::metadata(index_file(dir))
        .map(|m| m.len())
        .unwrap_or(0);
    let m = index.manifest();

    println!("  Size:        {}", format_bytes(size));
    println!();
    println!("  Chunks:      {}", index.len());
    println!("  Model:       {} ({} dims)", m.model, m.dims);
    println!("  Chunking:    {} / {} overlap", m.chunk_size, m.overlap);
    println!(
        "  Built:       {} ({})",
        m.built_at.format("%Y-%m-%d %H:%M"),
        format_ts_relative(m.built_at.timestamp())
    );

    let corpus_state = match load_corpus(&config.corpus) {
        Ok(docs) if corpus_fingerprint(&docs) == m.corpus_fingerprint => {
            format!("unchanged ({} documents)", docs.len())
        }
        Ok(docs) => format!(
            "CHANGED since build ({} documents); run `ragchat index rebuild`",
            docs.len()
        ),
        Err(e) => format!("unavailable ({})", e),
    };
    println!("  Corpus:      {}", corpus_state);
    println!();

    Ok(())
}

/// Run `history show`: print the last `limit` turns.
pub fn run_history_show(config: &Config, limit: usize) -> Result<()> {
    let history = HistoryStore::load(&config.history.path);

    if history.is_empty() {
        println!("No conversation history at {}", history.path().display());
        return Ok(());
    }

    let recent = history.recent(limit);
    println!(
        "Showing {} of {} turns from {}",
        recent.len(),
        history.len(),
        history.path().display()
    );
    println!();

    for turn in recent {
        let speaker = match turn.role {
            crate::models::Role::User => "user",
            crate::models::Role::Assistant => "assistant",
        };
        println!("[{}] {}:", turn.position, speaker);
        for line in turn.text.lines() {
            println!("    {}", line);
        }
        println!();
    }

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return "in the future".to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
