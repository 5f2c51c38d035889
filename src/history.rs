//! Conversation history persisted as a JSON file.
//!
//! The file is an array of `{ "type": "human" | "ai", "content": string }`
//! entries in turn order, written with four-space indentation. On load an
//! entry with any other `type`, or with non-string content, is skipped on its
//! own; a missing `content` reads as empty. A missing file is a cold start;
//! an unreadable file or one that is not a JSON array is logged and treated
//! as empty.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::models::{Role, Turn};

#[derive(Debug, Serialize)]
struct EntryRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    content: &'a str,
}

/// Ordered turn sequence backed by a file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    turns: Vec<Turn>,
}

impl HistoryStore {
    /// Load history from `path`. Never fails.
    pub fn load(path: &Path) -> Self {
        let turns = match read_turns(path) {
            Ok(Some(turns)) => {
                debug!(path = %path.display(), turns = turns.len(), "loaded history");
                turns
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "starting with empty history");
                Vec::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            turns,
        }
    }

    pub fn append(&mut self, role: Role, text: impl Into<String>) {
        let position = self.turns.len();
        self.turns.push(Turn {
            role,
            text: text.into(),
            position,
        });
    }

    /// Overwrite the history file with the full sequence.
    ///
    /// Writes a sibling temp file and renames it over the target, so a
    /// crash mid-write leaves the previous file intact.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
            }
        }

        let entries: Vec<EntryRef<'_>> = self
            .turns
            .iter()
            .map(|t| EntryRef {
                kind: t.role.history_tag(),
                content: &t.text,
            })
            .collect();

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        entries
            .serialize(&mut ser)
            .map_err(|e| RagError::io(&self.path, std::io::Error::other(e)))?;

        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, &buf).map_err(|e| RagError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| RagError::io(&self.path, e))?;
        Ok(())
    }

    /// The last `n` turns in order (all of them if there are fewer).
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// `Ok(None)` for a missing file.
fn read_turns(path: &Path) -> Result<Option<Vec<Turn>>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RagError::HistoryCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let entries: Vec<Value> =
        serde_json::from_str(&raw).map_err(|e| RagError::HistoryCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut turns = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match parse_entry(entry) {
            Some((role, text)) => turns.push(Turn {
                role,
                text,
                position: turns.len(),
            }),
            None => debug!(entry = i, "skipping unusable history entry"),
        }
    }
    Ok(Some(turns))
}

fn parse_entry(entry: &Value) -> Option<(Role, String)> {
    let role = Role::from_history_tag(entry.get("type")?.as_str()?)?;
    let text = match entry.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return None,
    };
    Some((role, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = HistoryStore::load(&tmp.path().join("history.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_order_and_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("history.json");

        let mut store = HistoryStore::load(&path);
        store.append(Role::User, "What does it cost?");
        store.append(Role::Assistant, "  Prices vary.\nSee below: \"quoted\" ");
        store.append(Role::User, "");
        store.persist().unwrap();

        let reloaded = HistoryStore::load(&path);
        assert_eq!(reloaded.turns(), store.turns());
        assert_eq!(reloaded.turns()[2].position, 2);
        assert!(!path.with_file_name("history.json.tmp").exists());
    }

    #[test]
    fn test_round_trip_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        HistoryStore::load(&path).persist().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
        assert!(HistoryStore::load(&path).is_empty());
    }

    #[test]
    fn test_file_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        let mut store = HistoryStore::load(&path);
        store.append(Role::User, "hi");
        store.append(Role::Assistant, "hello");
        store.persist().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            "[\n    {\n        \"type\": \"human\",\n        \"content\": \"hi\"\n    },\n    {\n        \"type\": \"ai\",\n        \"content\": \"hello\"\n    }\n]"
        );
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        for garbage in [
            "{not json",
            "{\"type\": \"human\"}",
            "\"text\"",
            "[{\"type\": 1}]",
        ] {
            std::fs::write(&path, garbage).unwrap();
            assert!(HistoryStore::load(&path).is_empty(), "{}", garbage);
        }
    }

    #[test]
    fn test_unknown_types_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"type":"system","content":"x"},{"type":"human","content":"q"},{"type":"ai","content":"a"}]"#,
        )
        .unwrap();
        let store = HistoryStore::load(&path);
        assert_eq!(store.len(), 2);
        assert_eq!(store.turns()[0].role, Role::User);
        assert_eq!(store.turns()[0].position, 0);
        assert_eq!(store.turns()[1].text, "a");
    }

    #[test]
    fn test_bad_entries_skipped_individually() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        std::fs::write(
            &path,
            r#"[
                {"type": "human", "content": "first"},
                {"type": 1, "content": "numeric type"},
                {"type": "ai"},
                "not an object",
                {"type": "human", "content": 42},
                {"content": "no type"},
                {"type": "ai", "content": "last"}
            ]"#,
        )
        .unwrap();

        let store = HistoryStore::load(&path);
        let got: Vec<(Role, &str, usize)> = store
            .turns()
            .iter()
            .map(|t| (t.role, t.text.as_str(), t.position))
            .collect();
        assert_eq!(
            got,
            vec![
                (Role::User, "first", 0),
                (Role::Assistant, "", 1),
                (Role::Assistant, "last", 2),
            ]
        );
    }

    #[test]
    fn test_recent_window() {
        let tmp = TempDir::new().unwrap();
        let mut store = HistoryStore::load(&tmp.path().join("h.json"));
        store.append(Role::User, "1");
        store.append(Role::Assistant, "2");
        store.append(Role::User, "3");

        let texts = |turns: &[Turn]| turns.iter().map(|t| t.text.clone()).collect::<Vec<_>>();
        assert_eq!(texts(store.recent(4)), vec!["1", "2", "3"]);
        assert_eq!(texts(store.recent(2)), vec!["2", "3"]);
        assert!(store.recent(0).is_empty());
        assert_eq!(store.len(), 3);
    }
}
