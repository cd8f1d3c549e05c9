//! Session state for Sage.
//!
//! Holds the persisted entities of the tutoring/therapy domain (sessions,
//! concepts/tasks/goals/exercises, structured records, progress history,
//! chat messages), the `DomainStore` repository trait with its JSON-backed
//! implementation, and the per-agent dialogue checkpoint store.

pub mod checkpoint;
pub mod model;
pub mod store;

pub use checkpoint::{CheckpointLine, CheckpointNamespace, CheckpointStore, JsonlCheckpointStore};
pub use model::{
    ChatMessage, ChatRole, DomainItem, ItemKind, NewItem, Phase, Profile, ProgressEntry,
    RecordFields, RecordStatus, Session, SessionKind, SessionStatus, StructuredRecord,
};
pub use store::{DomainStore, JsonDomainStore, ToggleOutcome};
