//! Append-only JSONL dialogue checkpoints.
//!
//! Each `(thread, agent variant)` pair owns an isolated checkpoint file:
//! agents participating in the same session never see each other's
//! dialogue history.  Every line is one JSON-encoded message.
//!
//! Includes an in-memory write-through cache to avoid re-reading from
//! disk every turn.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sage_domain::error::{Error, Result};
use sage_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Namespace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identifies one agent's slice of a thread's dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointNamespace {
    thread_id: String,
    agent: String,
}

impl CheckpointNamespace {
    pub fn new(thread_id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            agent: agent.into(),
        }
    }

    /// The logical key, `threadId:agentVariant`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.thread_id, self.agent)
    }

    fn file_name(&self) -> String {
        format!(
            "{}__{}.jsonl",
            sanitize(&self.thread_id),
            sanitize(&self.agent)
        )
    }
}

/// Keep file names portable: anything outside `[A-Za-z0-9_-]` becomes `-`.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One checkpointed message.  Only the inbound user message and the
/// final assistant text of a turn are checkpointed; intra-turn tool
/// traffic is not replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointLine {
    pub timestamp: String,
    pub role: String,
    pub content: String,
}

impl CheckpointLine {
    pub fn now(role: &str, content: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            role: role.to_owned(),
            content: content.to_owned(),
        }
    }
}

/// Dialogue continuity interface the orchestrator depends on.  The
/// runtime passes only freshly assembled context plus the new user
/// message each turn; prior turns come from here.
pub trait CheckpointStore: Send + Sync {
    fn append(&self, ns: &CheckpointNamespace, lines: &[CheckpointLine]) -> Result<()>;
    fn read(&self, ns: &CheckpointNamespace) -> Result<Vec<CheckpointLine>>;
}

/// JSONL files under `base_dir`, one per namespace, with an in-memory
/// write-through cache so reads never hit disk after the first load.
pub struct JsonlCheckpointStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<CheckpointLine>>>,
}

impl JsonlCheckpointStore {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn write_to_disk(&self, ns: &CheckpointNamespace, lines: &[CheckpointLine]) -> Result<()> {
        let path = self.base_dir.join(ns.file_name());
        let buf = serialize_lines(lines)?;

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        file.write_all(buf.as_bytes()).map_err(Error::Io)?;
        Ok(())
    }

    fn read_from_disk(&self, ns: &CheckpointNamespace) -> Result<Vec<CheckpointLine>> {
        read_jsonl_file(&self.base_dir.join(ns.file_name()), &ns.key())
    }
}

impl CheckpointStore for JsonlCheckpointStore {
    /// Append lines to a namespace.  Writes through to both the
    /// in-memory cache and disk; the cache is only updated when I/O
    /// succeeds.
    fn append(&self, ns: &CheckpointNamespace, lines: &[CheckpointLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        self.write_to_disk(ns, lines)?;

        {
            let mut cache = self.cache.write();
            cache
                .entry(ns.key())
                .or_default()
                .extend(lines.iter().cloned());
        }

        TraceEvent::CheckpointAppend {
            namespace: ns.key(),
            lines: lines.len(),
        }
        .emit();

        Ok(())
    }

    /// Read back a namespace.  Returns cached lines if available,
    /// otherwise loads from disk and populates the cache.
    fn read(&self, ns: &CheckpointNamespace) -> Result<Vec<CheckpointLine>> {
        {
            let cache = self.cache.read();
            if let Some(lines) = cache.get(&ns.key()) {
                return Ok(lines.clone());
            }
        }

        let lines = self.read_from_disk(ns)?;
        {
            let mut cache = self.cache.write();
            cache.insert(ns.key(), lines.clone());
        }
        Ok(lines)
    }
}

/// Serialize checkpoint lines to a JSONL string.
fn serialize_lines(lines: &[CheckpointLine]) -> Result<String> {
    let mut buf = String::new();
    for line in lines {
        let json = serde_json::to_string(line)
            .map_err(|e| Error::Store(format!("serializing checkpoint line: {e}")))?;
        buf.push_str(&json);
        buf.push('\n');
    }
    Ok(buf)
}

/// Read and parse a JSONL checkpoint file, skipping malformed lines.
fn read_jsonl_file(path: &Path, namespace: &str) -> Result<Vec<CheckpointLine>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut lines = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CheckpointLine>(line) {
            Ok(cl) => lines.push(cl),
            Err(e) => {
                tracing::warn!(
                    namespace = namespace,
                    error = %e,
                    "skipping malformed checkpoint line"
                );
            }
        }
    }
    Ok(lines)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlCheckpointStore::new(dir.path()).unwrap();
        let ns = CheckpointNamespace::new("thread-1", "teacher");

        store
            .append(
                &ns,
                &[
                    CheckpointLine::now("user", "what is a graph?"),
                    CheckpointLine::now("assistant", "a set of vertices and edges"),
                ],
            )
            .unwrap();

        let lines = store.read(&ns).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].role, "user");
        assert_eq!(lines[1].content, "a set of vertices and edges");
    }

    #[test]
    fn namespaces_are_isolated_per_agent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlCheckpointStore::new(dir.path()).unwrap();
        let planner = CheckpointNamespace::new("thread-1", "planner");
        let teacher = CheckpointNamespace::new("thread-1", "teacher");

        store
            .append(&planner, &[CheckpointLine::now("user", "plan please")])
            .unwrap();

        assert_eq!(store.read(&planner).unwrap().len(), 1);
        assert!(store.read(&teacher).unwrap().is_empty());
    }

    #[test]
    fn reads_survive_a_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let ns = CheckpointNamespace::new("thread-9", "psychotherapist");
        {
            let store = JsonlCheckpointStore::new(dir.path()).unwrap();
            store
                .append(&ns, &[CheckpointLine::now("user", "hello")])
                .unwrap();
        }

        let store = JsonlCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(store.read(&ns).unwrap().len(), 1);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ns = CheckpointNamespace::new("thread-2", "teacher");
        let store = JsonlCheckpointStore::new(dir.path()).unwrap();
        store
            .append(&ns, &[CheckpointLine::now("user", "first")])
            .unwrap();

        // Corrupt the file by hand, then force a disk read.
        let path = dir.path().join("thread-2__teacher.jsonl");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{not json}\n");
        std::fs::write(&path, raw).unwrap();

        let fresh = JsonlCheckpointStore::new(dir.path()).unwrap();
        let lines = fresh.read(&ns).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].content, "first");
    }
}
