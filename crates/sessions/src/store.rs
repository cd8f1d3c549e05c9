//! JSON-backed domain store.
//!
//! All mutable tutoring/therapy state lives behind one `RwLock`.  Every
//! semantic mutation (completion toggle, plan insert, record upsert) is a
//! single read-modify-write under the write half: resolve the target,
//! apply the change, append the audit row, recompute the session
//! aggregate, persist.  Concurrent turns can never interleave inside a
//! tool application.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sage_domain::error::{Error, Result};
use sage_domain::trace::TraceEvent;

use crate::model::{
    ChatMessage, ChatRole, DomainItem, ItemKind, NewItem, Phase, Profile, ProgressEntry,
    RecordFields, RecordStatus, Session, SessionKind, SessionStatus, StructuredRecord,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repository trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of a completion toggle: the item after mutation plus the
/// recomputed session aggregate.
#[derive(Debug, Clone)]
pub struct ToggleOutcome {
    pub item: DomainItem,
    pub completed: usize,
    pub total: usize,
    pub rate: f32,
    pub session_status: SessionStatus,
}

/// Narrow repository interface the orchestrator works against.
///
/// Mutating methods are transactional units; reads return clones of the
/// current state.  `set_item_completion` returns `Ok(None)` when no item
/// of the given kind exists in the session — the caller turns that into
/// a graceful reply, and no audit row is written.
pub trait DomainStore: Send + Sync {
    // ── sessions ──────────────────────────────────────────────────
    fn create_session(&self, user_id: &str, profile: Profile) -> Result<Session>;
    fn get_session(&self, id: Uuid) -> Option<Session>;
    fn list_sessions(&self) -> Vec<Session>;
    fn set_phase(&self, id: Uuid, phase: Phase) -> Result<Session>;

    // ── domain items ──────────────────────────────────────────────
    fn insert_items(
        &self,
        session_id: Uuid,
        items: Vec<NewItem>,
        actor: &str,
    ) -> Result<Vec<DomainItem>>;
    fn list_items(&self, session_id: Uuid) -> Vec<DomainItem>;
    fn set_item_completion(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        kind: ItemKind,
        completed: bool,
        feedback: Option<String>,
        actor: &str,
    ) -> Result<Option<ToggleOutcome>>;

    // ── structured records ────────────────────────────────────────
    fn upsert_record(
        &self,
        session_id: Uuid,
        fields: RecordFields,
        actor: &str,
    ) -> Result<StructuredRecord>;
    fn open_record(&self, session_id: Uuid) -> Option<StructuredRecord>;
    fn list_records(&self, session_id: Uuid) -> Vec<StructuredRecord>;

    // ── history & chat log ────────────────────────────────────────
    fn list_history(&self, session_id: Uuid) -> Vec<ProgressEntry>;
    fn append_message(
        &self,
        thread_id: &str,
        role: ChatRole,
        agent: Option<String>,
        content: &str,
    ) -> Result<ChatMessage>;
    fn list_messages(&self, thread_id: &str) -> Vec<ChatMessage>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON-file implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Serialize, Deserialize)]
struct DomainState {
    #[serde(default)]
    sessions: HashMap<Uuid, Session>,
    #[serde(default)]
    items: HashMap<Uuid, DomainItem>,
    #[serde(default)]
    records: HashMap<Uuid, StructuredRecord>,
    #[serde(default)]
    history: Vec<ProgressEntry>,
    #[serde(default)]
    messages: HashMap<String, Vec<ChatMessage>>,
}

/// Domain store backed by a single `domain.json` under the data dir.
pub struct JsonDomainStore {
    path: PathBuf,
    state: RwLock<DomainState>,
}

impl JsonDomainStore {
    /// Load or create the store at `data_dir/domain.json`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(Error::Io)?;

        let path = data_dir.join("domain.json");
        let state: DomainState = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            DomainState::default()
        };

        tracing::info!(
            sessions = state.sessions.len(),
            items = state.items.len(),
            path = %path.display(),
            "domain store loaded"
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn flush_locked(&self, state: &DomainState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Store(format!("serializing domain state: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)?;
        Ok(())
    }
}

/// Recompute a session's aggregate over the flat set of primary items.
/// Returns `(completed, total, rate, status)`.
fn recompute_locked(
    state: &mut DomainState,
    session_id: Uuid,
) -> Option<(usize, usize, f32, SessionStatus)> {
    let primary = ItemKind::primary_for(state.sessions.get(&session_id)?.kind());

    let mut completed = 0usize;
    let mut total = 0usize;
    for item in state.items.values() {
        if item.session_id == session_id && item.kind == primary {
            total += 1;
            if item.completed {
                completed += 1;
            }
        }
    }
    let rate = if total == 0 {
        0.0
    } else {
        100.0 * completed as f32 / total as f32
    };
    let status = if total > 0 && completed == total {
        SessionStatus::Completed
    } else {
        SessionStatus::Active
    };

    let session = state.sessions.get_mut(&session_id)?;
    session.completion_rate = rate;
    session.status = status;
    session.updated_at = Utc::now();

    TraceEvent::ProgressRecomputed {
        session_id: session_id.to_string(),
        completed,
        total,
        rate,
    }
    .emit();

    Some((completed, total, rate, status))
}

fn push_history(
    state: &mut DomainState,
    session_id: Uuid,
    item_id: Option<Uuid>,
    actor: &str,
    action: String,
    note: Option<String>,
) {
    state.history.push(ProgressEntry {
        id: Uuid::new_v4(),
        session_id,
        item_id,
        actor: actor.to_owned(),
        action,
        note,
        created_at: Utc::now(),
    });
}

/// "3 concepts, 1 task" from a batch of new items.
fn describe_batch(items: &[DomainItem]) -> String {
    let mut parts = Vec::new();
    for kind in [
        ItemKind::Concept,
        ItemKind::Task,
        ItemKind::Goal,
        ItemKind::Exercise,
    ] {
        let n = items.iter().filter(|i| i.kind == kind).count();
        if n == 1 {
            parts.push(format!("1 {}", kind.as_str()));
        } else if n > 1 {
            parts.push(format!("{n} {}s", kind.as_str()));
        }
    }
    parts.join(", ")
}

impl DomainStore for JsonDomainStore {
    fn create_session(&self, user_id: &str, profile: Profile) -> Result<Session> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let kind = profile.kind();
        let phase = match kind {
            SessionKind::Learning => Phase::NeedsPlan,
            SessionKind::Therapy => Phase::Assessment,
        };
        let session = Session {
            id,
            user_id: user_id.to_owned(),
            thread_id: format!("thread-{id}"),
            profile,
            phase,
            completion_rate: 0.0,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write();
        state.sessions.insert(id, session.clone());
        self.flush_locked(&state)?;

        TraceEvent::SessionResolved {
            session_id: id.to_string(),
            kind: match kind {
                SessionKind::Learning => "learning".into(),
                SessionKind::Therapy => "therapy".into(),
            },
            is_new: true,
        }
        .emit();

        Ok(session)
    }

    fn get_session(&self, id: Uuid) -> Option<Session> {
        self.state.read().sessions.get(&id).cloned()
    }

    fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<_> = self.state.read().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    fn set_phase(&self, id: Uuid, phase: Phase) -> Result<Session> {
        let mut state = self.state.write();
        let old = {
            let session = state
                .sessions
                .get_mut(&id)
                .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
            let old = session.phase;
            session.phase = phase;
            session.updated_at = Utc::now();
            old
        };
        self.flush_locked(&state)?;

        if old != phase {
            TraceEvent::PhaseChanged {
                session_id: id.to_string(),
                from: old.as_str().to_owned(),
                to: phase.as_str().to_owned(),
            }
            .emit();
        }

        Ok(state.sessions[&id].clone())
    }

    fn insert_items(
        &self,
        session_id: Uuid,
        items: Vec<NewItem>,
        actor: &str,
    ) -> Result<Vec<DomainItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.write();
        if !state.sessions.contains_key(&session_id) {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }

        // Resolve positional parent references before any insert so a
        // bad index fails the whole batch.
        let now = Utc::now();
        let ids: Vec<Uuid> = items.iter().map(|_| Uuid::new_v4()).collect();
        let mut created = Vec::with_capacity(items.len());
        for (i, input) in items.into_iter().enumerate() {
            let parent_id = match input.parent {
                None => None,
                Some(p) if p < i => Some(ids[p]),
                Some(p) => {
                    return Err(Error::Store(format!(
                        "item {i} references parent index {p}, which is not an earlier entry"
                    )))
                }
            };
            created.push(DomainItem {
                id: ids[i],
                session_id,
                parent_id,
                kind: input.kind,
                title: input.title,
                detail: input.detail,
                feedback: None,
                completed: false,
                completed_at: None,
                created_at: now,
            });
        }

        for item in &created {
            state.items.insert(item.id, item.clone());
        }
        push_history(
            &mut state,
            session_id,
            None,
            actor,
            "created items".into(),
            Some(describe_batch(&created)),
        );
        recompute_locked(&mut state, session_id);
        self.flush_locked(&state)?;

        Ok(created)
    }

    fn list_items(&self, session_id: Uuid) -> Vec<DomainItem> {
        let mut items: Vec<_> = self
            .state
            .read()
            .items
            .values()
            .filter(|i| i.session_id == session_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.title.cmp(&b.title)));
        items
    }

    fn set_item_completion(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        kind: ItemKind,
        completed: bool,
        feedback: Option<String>,
        actor: &str,
    ) -> Result<Option<ToggleOutcome>> {
        let mut state = self.state.write();

        // The item must exist, be of the kind the tool handles, and
        // belong to the session bound to this turn.  Anything else is
        // "not found" — no mutation, no audit row.
        let item = match state.items.get_mut(&item_id) {
            Some(i) if i.kind == kind && i.session_id == session_id => i,
            _ => return Ok(None),
        };

        item.completed = completed;
        item.completed_at = if completed { Some(Utc::now()) } else { None };
        if let Some(fb) = feedback {
            if !fb.trim().is_empty() {
                item.feedback = Some(fb);
            }
        }
        let snapshot = item.clone();

        let verb = if completed { "completed" } else { "reopened" };
        push_history(
            &mut state,
            session_id,
            Some(item_id),
            actor,
            format!("{verb} {}", kind.as_str()),
            Some(snapshot.title.clone()),
        );

        let (done, total, rate, session_status) = recompute_locked(&mut state, session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        self.flush_locked(&state)?;

        Ok(Some(ToggleOutcome {
            item: snapshot,
            completed: done,
            total,
            rate,
            session_status,
        }))
    }

    fn upsert_record(
        &self,
        session_id: Uuid,
        fields: RecordFields,
        actor: &str,
    ) -> Result<StructuredRecord> {
        let mut state = self.state.write();
        if !state.sessions.contains_key(&session_id) {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }

        let now = Utc::now();
        let open_id = state
            .records
            .values()
            .filter(|r| r.session_id == session_id && r.status == RecordStatus::InProgress)
            .max_by_key(|r| r.created_at)
            .map(|r| r.id);

        let normalize = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let (record, created) = match open_id {
            Some(id) => {
                // Continue the open record: incoming fields overwrite,
                // absent fields keep their stored values.
                let record = state
                    .records
                    .get_mut(&id)
                    .ok_or_else(|| Error::Store(format!("record {id} vanished during upsert")))?;
                if let Some(v) = normalize(fields.activating_event) {
                    record.activating_event = Some(v);
                }
                if let Some(v) = normalize(fields.beliefs) {
                    record.beliefs = Some(v);
                }
                if let Some(v) = normalize(fields.consequences) {
                    record.consequences = Some(v);
                }
                if let Some(v) = normalize(fields.disputation) {
                    record.disputation = Some(v);
                }
                if let Some(v) = normalize(fields.alternative_belief) {
                    record.alternative_belief = Some(v);
                }
                record.status = record.derive_status();
                record.updated_at = now;
                (record.clone(), false)
            }
            None => {
                let mut record = StructuredRecord {
                    id: Uuid::new_v4(),
                    session_id,
                    activating_event: normalize(fields.activating_event),
                    beliefs: normalize(fields.beliefs),
                    consequences: normalize(fields.consequences),
                    disputation: normalize(fields.disputation),
                    alternative_belief: normalize(fields.alternative_belief),
                    status: RecordStatus::InProgress,
                    created_at: now,
                    updated_at: now,
                };
                record.status = record.derive_status();
                state.records.insert(record.id, record.clone());
                (record, true)
            }
        };

        let action = if created {
            "started structured record"
        } else if record.status == RecordStatus::Completed {
            "completed structured record"
        } else {
            "updated structured record"
        };
        push_history(&mut state, session_id, None, actor, action.into(), None);

        {
            let session = state
                .sessions
                .get_mut(&session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
            session.updated_at = now;
        }
        self.flush_locked(&state)?;

        Ok(record)
    }

    fn open_record(&self, session_id: Uuid) -> Option<StructuredRecord> {
        self.state
            .read()
            .records
            .values()
            .filter(|r| r.session_id == session_id && r.status == RecordStatus::InProgress)
            .max_by_key(|r| r.created_at)
            .cloned()
    }

    fn list_records(&self, session_id: Uuid) -> Vec<StructuredRecord> {
        let mut records: Vec<_> = self
            .state
            .read()
            .records
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    fn list_history(&self, session_id: Uuid) -> Vec<ProgressEntry> {
        self.state
            .read()
            .history
            .iter()
            .filter(|h| h.session_id == session_id)
            .cloned()
            .collect()
    }

    fn append_message(
        &self,
        thread_id: &str,
        role: ChatRole,
        agent: Option<String>,
        content: &str,
    ) -> Result<ChatMessage> {
        let msg = ChatMessage {
            id: Uuid::new_v4(),
            thread_id: thread_id.to_owned(),
            role,
            agent,
            content: content.to_owned(),
            created_at: Utc::now(),
        };

        let mut state = self.state.write();
        state
            .messages
            .entry(thread_id.to_owned())
            .or_default()
            .push(msg.clone());
        self.flush_locked(&state)?;

        Ok(msg)
    }

    fn list_messages(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.state
            .read()
            .messages
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
