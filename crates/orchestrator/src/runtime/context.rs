//! Context assembly — the per-turn snapshot of session-relevant domain
//! facts handed to an agent.
//!
//! Snapshots are rebuilt from the store on every agent invocation, never
//! cached across turns.  A tool call made mid-turn is therefore visible
//! to the next agent in the same turn without any invalidation logic.

use std::fmt::Write as _;

use sage_sessions::{DomainItem, DomainStore, ItemKind, Session, StructuredRecord};

/// Everything an agent sees about the session: the profile, the full
/// current item set with ids and completion flags, and the open thought
/// record if one exists.  Item ids double as the allow-list for tool
/// calls; the tool layer still re-validates them.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub session: Session,
    pub items: Vec<DomainItem>,
    pub open_record: Option<StructuredRecord>,
}

impl ContextSnapshot {
    /// Read a fresh snapshot for `session` from the store.
    pub fn assemble(store: &dyn DomainStore, session: &Session) -> Self {
        Self {
            session: session.clone(),
            items: store.list_items(session.id),
            open_record: store.open_record(session.id),
        }
    }

    /// The topic or concern this session is about.
    pub fn subject(&self) -> &str {
        self.session.profile.subject()
    }

    /// `(completed, total)` over the kind that drives the session's
    /// aggregate rate (concepts for learning, goals for therapy).
    pub fn primary_counts(&self) -> (usize, usize) {
        let primary = ItemKind::primary_for(self.session.kind());
        let total = self.items.iter().filter(|i| i.kind == primary).count();
        let completed = self
            .items
            .iter()
            .filter(|i| i.kind == primary && i.completed)
            .count();
        (completed, total)
    }

    fn of_kind(&self, kind: ItemKind) -> impl Iterator<Item = &DomainItem> {
        self.items.iter().filter(move |i| i.kind == kind)
    }

    fn children_of(&self, parent: &DomainItem) -> impl Iterator<Item = &DomainItem> {
        let parent_id = parent.id;
        self.items
            .iter()
            .filter(move |i| i.parent_id == Some(parent_id))
    }

    // ── Rendering ─────────────────────────────────────────────────

    /// Serialize the snapshot into the context block appended to an
    /// agent's system prompt.
    pub fn render(&self) -> String {
        let mut out = String::from("Session context:\n");
        let (completed, total) = self.primary_counts();

        match &self.session.profile {
            sage_sessions::Profile::Learning {
                topic,
                teaching_style,
                response_style,
            } => {
                let _ = writeln!(out, "- kind: learning");
                let _ = writeln!(out, "- topic: {topic}");
                if let Some(style) = teaching_style {
                    let _ = writeln!(out, "- teaching style: {style}");
                }
                if let Some(style) = response_style {
                    let _ = writeln!(out, "- response style: {style}");
                }
                let _ = writeln!(
                    out,
                    "- progress: {completed} of {total} concepts completed ({:.0}%)",
                    self.session.completion_rate
                );
                self.render_tree(&mut out, "Concepts", ItemKind::Concept);
            }
            sage_sessions::Profile::Therapy {
                concern,
                goal,
                style,
                session_type,
            } => {
                let _ = writeln!(out, "- kind: therapy");
                let _ = writeln!(out, "- concern: {concern}");
                if let Some(goal) = goal {
                    let _ = writeln!(out, "- overall aim: {goal}");
                }
                if let Some(style) = style {
                    let _ = writeln!(out, "- style: {style}");
                }
                if let Some(kind) = session_type {
                    let _ = writeln!(out, "- session type: {kind}");
                }
                let _ = writeln!(
                    out,
                    "- progress: {completed} of {total} goals completed ({:.0}%)",
                    self.session.completion_rate
                );
                self.render_tree(&mut out, "Goals", ItemKind::Goal);
                self.render_flat(&mut out, "Exercises", ItemKind::Exercise);
                self.render_record(&mut out);
            }
        }

        out
    }

    /// Top-level items of `kind` with their child tasks indented below.
    fn render_tree(&self, out: &mut String, heading: &str, kind: ItemKind) {
        let top: Vec<&DomainItem> = self
            .of_kind(kind)
            .filter(|i| i.parent_id.is_none())
            .collect();
        if top.is_empty() {
            let _ = writeln!(out, "\n{heading}: none yet.");
            return;
        }

        let _ = writeln!(out, "\n{heading}:");
        for item in top {
            let _ = writeln!(out, "- {} {} (id {})", checkbox(item), item.title, item.id);
            for child in self.children_of(item) {
                let _ = writeln!(
                    out,
                    "    - {} {}: {} (id {})",
                    checkbox(child),
                    child.kind.as_str(),
                    child.title,
                    child.id
                );
            }
        }
    }

    fn render_flat(&self, out: &mut String, heading: &str, kind: ItemKind) {
        let items: Vec<&DomainItem> = self.of_kind(kind).collect();
        if items.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n{heading}:");
        for item in items {
            let _ = writeln!(out, "- {} {} (id {})", checkbox(item), item.title, item.id);
        }
    }

    fn render_record(&self, out: &mut String) {
        let Some(record) = &self.open_record else {
            return;
        };
        let _ = writeln!(out, "\nThought record in progress:");
        for (label, value) in [
            ("activating event", &record.activating_event),
            ("beliefs", &record.beliefs),
            ("consequences", &record.consequences),
            ("disputation", &record.disputation),
            ("alternative belief", &record.alternative_belief),
        ] {
            match value {
                Some(text) => {
                    let _ = writeln!(out, "- {label}: {}", truncate(text, 160));
                }
                None => {
                    let _ = writeln!(out, "- {label}: (not yet discussed)");
                }
            }
        }
    }
}

fn checkbox(item: &DomainItem) -> &'static str {
    if item.completed {
        "[x]"
    } else {
        "[ ]"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_sessions::{JsonDomainStore, NewItem, Profile};

    fn learning_store() -> (tempfile::TempDir, JsonDomainStore, Session) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDomainStore::new(dir.path()).unwrap();
        let session = store
            .create_session(
                "u1",
                Profile::Learning {
                    topic: "Graph Theory".into(),
                    teaching_style: Some("visual".into()),
                    response_style: None,
                },
            )
            .unwrap();
        (dir, store, session)
    }

    #[test]
    fn render_lists_items_with_ids_and_flags() {
        let (_dir, store, session) = learning_store();
        let created = store
            .insert_items(
                session.id,
                vec![
                    NewItem {
                        kind: ItemKind::Concept,
                        title: "Graph basics".into(),
                        detail: None,
                        parent: None,
                    },
                    NewItem {
                        kind: ItemKind::Task,
                        title: "Draw K5".into(),
                        detail: None,
                        parent: Some(0),
                    },
                ],
                "Planner",
            )
            .unwrap();
        store
            .set_item_completion(session.id, created[0].id, ItemKind::Concept, true, None, "Teacher")
            .unwrap();

        let session = store.get_session(session.id).unwrap();
        let ctx = ContextSnapshot::assemble(&store, &session);
        let rendered = ctx.render();

        assert!(rendered.contains("topic: Graph Theory"));
        assert!(rendered.contains("teaching style: visual"));
        assert!(rendered.contains(&format!("[x] Graph basics (id {})", created[0].id)));
        assert!(rendered.contains(&format!("[ ] task: Draw K5 (id {})", created[1].id)));
        assert!(rendered.contains("1 of 1 concepts completed (100%)"));
    }

    #[test]
    fn snapshot_counts_only_the_primary_kind() {
        let (_dir, store, session) = learning_store();
        store
            .insert_items(
                session.id,
                vec![
                    NewItem {
                        kind: ItemKind::Concept,
                        title: "BFS".into(),
                        detail: None,
                        parent: None,
                    },
                    NewItem {
                        kind: ItemKind::Task,
                        title: "Trace BFS by hand".into(),
                        detail: None,
                        parent: Some(0),
                    },
                ],
                "Planner",
            )
            .unwrap();

        let session = store.get_session(session.id).unwrap();
        let ctx = ContextSnapshot::assemble(&store, &session);
        assert_eq!(ctx.primary_counts(), (0, 1));
    }

    #[test]
    fn open_record_is_rendered_with_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDomainStore::new(dir.path()).unwrap();
        let session = store
            .create_session(
                "u1",
                Profile::Therapy {
                    concern: "work stress".into(),
                    goal: None,
                    style: None,
                    session_type: None,
                },
            )
            .unwrap();
        store
            .upsert_record(
                session.id,
                sage_sessions::RecordFields {
                    activating_event: Some("Missed a deadline".into()),
                    ..Default::default()
                },
                "Reframing Guide",
            )
            .unwrap();

        let session = store.get_session(session.id).unwrap();
        let rendered = ContextSnapshot::assemble(&store, &session).render();
        assert!(rendered.contains("activating event: Missed a deadline"));
        assert!(rendered.contains("disputation: (not yet discussed)"));
    }
}
