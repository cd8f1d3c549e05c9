//! Tool definitions and dispatch.
//!
//! Every tool returns `(text, is_error)`; the text goes back to the
//! model as the tool result and the flag marks it as an error result.
//! Nothing in here returns `Err` to the reasoning loop: a missing item,
//! a malformed id, or a store failure all come back as plain strings so
//! the agent can explain and move on.
//!
//! Policy is enforced twice: the definitions offered to the model are
//! filtered per agent, and dispatch re-checks the same policy before
//! touching the store.

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use sage_domain::{ToolDefinition, TraceEvent};
use sage_sessions::{
    DomainStore, ItemKind, NewItem, RecordFields, RecordStatus, Session, SessionStatus,
    StructuredRecord,
};

use crate::runtime::agent::AgentKind;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The tool surface offered to `agent`, filtered by its policy.
pub fn build_tool_definitions(agent: AgentKind) -> Vec<ToolDefinition> {
    let policy = agent.tool_policy();
    all_definitions()
        .into_iter()
        .filter(|def| policy.allows(&def.name))
        .collect()
}

fn all_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "create_learning_plan".into(),
            description: "Store the learning plan for this session: an ordered list of concepts, \
                          each with optional practice tasks. Call once, when the plan is agreed."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "concepts": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": { "type": "string" },
                                "detail": { "type": "string" },
                                "tasks": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "properties": {
                                            "title": { "type": "string" },
                                            "detail": { "type": "string" }
                                        },
                                        "required": ["title"]
                                    }
                                }
                            },
                            "required": ["title"]
                        }
                    }
                },
                "required": ["concepts"]
            }),
        },
        ToolDefinition {
            name: "mark_concept_progress".into(),
            description: "Mark a concept as completed (or reopen it). Use the concept id from \
                          the session context."
                .into(),
            parameters: mark_schema("conceptId", "Concept id from the session context", false),
        },
        ToolDefinition {
            name: "mark_task_progress".into(),
            description: "Mark a practice task as completed (or reopen it).".into(),
            parameters: mark_schema("taskId", "Task id from the session context", false),
        },
        ToolDefinition {
            name: "create_therapy_goals".into(),
            description: "Store the goals agreed during intake. Call once, when the user has \
                          confirmed them."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "goals": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": { "type": "string" },
                                "detail": { "type": "string" }
                            },
                            "required": ["title"]
                        }
                    }
                },
                "required": ["goals"]
            }),
        },
        ToolDefinition {
            name: "mark_goal_progress".into(),
            description: "Mark a therapy goal as completed (or reopen it).".into(),
            parameters: mark_schema("goalId", "Goal id from the session context", false),
        },
        ToolDefinition {
            name: "mark_exercise_progress".into(),
            description: "Mark a between-session exercise as completed (or reopen it), with an \
                          optional note on how it went."
                .into(),
            parameters: mark_schema("exerciseId", "Exercise id from the session context", true),
        },
        ToolDefinition {
            name: "create_exercise".into(),
            description: "Store a between-session exercise the user agreed to try.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "detail": { "type": "string" }
                },
                "required": ["title"]
            }),
        },
        ToolDefinition {
            name: "record_structured_exercise".into(),
            description: "Save progress on the A-B-C-D-E thought record. Send only the fields \
                          discussed so far; later calls merge into the same open record."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sessionId": { "type": "string", "description": "Id of the current session" },
                    "activatingEvent": { "type": "string" },
                    "beliefs": { "type": "string" },
                    "consequences": { "type": "string" },
                    "disputation": { "type": "string" },
                    "alternativeBelief": { "type": "string" }
                },
                "required": ["sessionId"]
            }),
        },
    ]
}

fn mark_schema(id_field: &str, id_desc: &str, with_feedback: bool) -> Value {
    let mut properties = json!({
        id_field: { "type": "string", "description": id_desc },
        "isCompleted": { "type": "boolean" }
    });
    if with_feedback {
        properties["feedback"] = json!({
            "type": "string",
            "description": "Optional note about how the exercise went"
        });
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": [id_field, "isCompleted"]
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn dispatch_tool(
    store: &dyn DomainStore,
    session: &Session,
    agent: AgentKind,
    tool_name: &str,
    arguments: &Value,
) -> (String, bool) {
    if !agent.tool_policy().allows(tool_name) {
        return (
            format!("tool '{tool_name}' is not available to this agent"),
            true,
        );
    }

    let actor = agent.display_name();
    let (text, is_error) = match tool_name {
        "create_learning_plan" => create_learning_plan(store, session, arguments, actor),
        "mark_concept_progress" => mark_item(store, session, arguments, ItemKind::Concept, actor),
        "mark_task_progress" => mark_item(store, session, arguments, ItemKind::Task, actor),
        "create_therapy_goals" => create_therapy_goals(store, session, arguments, actor),
        "mark_goal_progress" => mark_item(store, session, arguments, ItemKind::Goal, actor),
        "mark_exercise_progress" => mark_item(store, session, arguments, ItemKind::Exercise, actor),
        "create_exercise" => create_exercise(store, session, arguments, actor),
        "record_structured_exercise" => record_exercise(store, session, arguments, actor),
        other => (format!("unknown tool '{other}'"), true),
    };

    TraceEvent::ToolApplied {
        session_id: session.id.to_string(),
        tool: tool_name.to_string(),
        target: target_of(arguments),
        ok: !is_error,
    }
    .emit();

    (text, is_error)
}

/// First id-like argument, for tracing only.
fn target_of(arguments: &Value) -> Option<String> {
    ["conceptId", "taskId", "goalId", "exerciseId", "sessionId"]
        .iter()
        .find_map(|key| arguments.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

// ── Plan and goal creation ────────────────────────────────────────

#[derive(Deserialize)]
struct PlanArgs {
    concepts: Vec<ConceptArg>,
}

#[derive(Deserialize)]
struct ConceptArg {
    title: String,
    detail: Option<String>,
    #[serde(default)]
    tasks: Vec<TitledArg>,
}

#[derive(Deserialize)]
struct TitledArg {
    title: String,
    detail: Option<String>,
}

fn create_learning_plan(
    store: &dyn DomainStore,
    session: &Session,
    arguments: &Value,
    actor: &str,
) -> (String, bool) {
    let args: PlanArgs = match serde_json::from_value(arguments.clone()) {
        Ok(args) => args,
        Err(err) => return (format!("invalid arguments: {err}"), true),
    };
    if args.concepts.is_empty() {
        return (
            "The plan needs at least one concept. Send the list of concepts to cover.".into(),
            true,
        );
    }

    let mut items = Vec::new();
    for concept in args.concepts {
        let parent = items.len();
        items.push(NewItem {
            kind: ItemKind::Concept,
            title: concept.title,
            detail: concept.detail,
            parent: None,
        });
        for task in concept.tasks {
            items.push(NewItem {
                kind: ItemKind::Task,
                title: task.title,
                detail: task.detail,
                parent: Some(parent),
            });
        }
    }

    match store.insert_items(session.id, items, actor) {
        Ok(created) => {
            let concepts = created.iter().filter(|i| i.kind == ItemKind::Concept).count();
            let tasks = created.iter().filter(|i| i.kind == ItemKind::Task).count();
            (
                format!(
                    "Saved the learning plan: {concepts} concepts and {tasks} practice tasks. \
                     Teaching starts with the first concept."
                ),
                false,
            )
        }
        Err(err) => store_trouble("saving the plan", &err),
    }
}

#[derive(Deserialize)]
struct GoalsArgs {
    goals: Vec<TitledArg>,
}

fn create_therapy_goals(
    store: &dyn DomainStore,
    session: &Session,
    arguments: &Value,
    actor: &str,
) -> (String, bool) {
    let args: GoalsArgs = match serde_json::from_value(arguments.clone()) {
        Ok(args) => args,
        Err(err) => return (format!("invalid arguments: {err}"), true),
    };
    if args.goals.is_empty() {
        return (
            "At least one goal is needed. Send the goals the user agreed to work toward.".into(),
            true,
        );
    }

    let items = args
        .goals
        .into_iter()
        .map(|goal| NewItem {
            kind: ItemKind::Goal,
            title: goal.title,
            detail: goal.detail,
            parent: None,
        })
        .collect::<Vec<_>>();

    match store.insert_items(session.id, items, actor) {
        Ok(created) => (
            format!("Saved {} goals for this session.", created.len()),
            false,
        ),
        Err(err) => store_trouble("saving the goals", &err),
    }
}

fn create_exercise(
    store: &dyn DomainStore,
    session: &Session,
    arguments: &Value,
    actor: &str,
) -> (String, bool) {
    let args: TitledArg = match serde_json::from_value(arguments.clone()) {
        Ok(args) => args,
        Err(err) => return (format!("invalid arguments: {err}"), true),
    };

    let item = NewItem {
        kind: ItemKind::Exercise,
        title: args.title,
        detail: args.detail,
        parent: None,
    };
    match store.insert_items(session.id, vec![item], actor) {
        Ok(created) => (
            format!("Saved the exercise '{}'.", created[0].title),
            false,
        ),
        Err(err) => store_trouble("saving the exercise", &err),
    }
}

// ── Progress marking ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkArgs {
    concept_id: Option<String>,
    task_id: Option<String>,
    goal_id: Option<String>,
    exercise_id: Option<String>,
    is_completed: bool,
    feedback: Option<String>,
}

impl MarkArgs {
    fn id_for(&self, kind: ItemKind) -> Option<&str> {
        match kind {
            ItemKind::Concept => self.concept_id.as_deref(),
            ItemKind::Task => self.task_id.as_deref(),
            ItemKind::Goal => self.goal_id.as_deref(),
            ItemKind::Exercise => self.exercise_id.as_deref(),
        }
    }
}

fn mark_item(
    store: &dyn DomainStore,
    session: &Session,
    arguments: &Value,
    kind: ItemKind,
    actor: &str,
) -> (String, bool) {
    let args: MarkArgs = match serde_json::from_value(arguments.clone()) {
        Ok(args) => args,
        Err(err) => return (format!("invalid arguments: {err}"), true),
    };
    let Some(raw_id) = args.id_for(kind) else {
        return (format!("invalid arguments: missing {} id", kind.as_str()), true);
    };
    // An unparsable id cannot match anything, same outcome as not found.
    let Ok(item_id) = Uuid::parse_str(raw_id) else {
        return (not_found(kind), true);
    };

    let feedback = args.feedback.filter(|f| !f.trim().is_empty());
    match store.set_item_completion(session.id, item_id, kind, args.is_completed, feedback, actor) {
        Ok(Some(outcome)) => {
            let unit = ItemKind::primary_for(session.kind()).as_str();
            let mut text = if args.is_completed {
                format!(
                    "Marked '{}' as completed. Overall progress is now {:.0}% ({} of {} {unit}s).",
                    outcome.item.title, outcome.rate, outcome.completed, outcome.total
                )
            } else {
                format!(
                    "Reopened '{}'. Overall progress is now {:.0}% ({} of {} {unit}s).",
                    outcome.item.title, outcome.rate, outcome.completed, outcome.total
                )
            };
            if outcome.session_status == SessionStatus::Completed {
                text.push_str(" That was the last one; the whole plan is complete.");
            }
            (text, false)
        }
        Ok(None) => (not_found(kind), true),
        Err(err) => store_trouble("updating progress", &err),
    }
}

fn not_found(kind: ItemKind) -> String {
    format!(
        "I couldn't find that {} in the current plan, so nothing was changed. \
         Check the id against the session context.",
        kind.as_str()
    )
}

// ── Thought records ───────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordArgs {
    session_id: String,
    activating_event: Option<String>,
    beliefs: Option<String>,
    consequences: Option<String>,
    disputation: Option<String>,
    alternative_belief: Option<String>,
}

fn record_exercise(
    store: &dyn DomainStore,
    session: &Session,
    arguments: &Value,
    actor: &str,
) -> (String, bool) {
    let args: RecordArgs = match serde_json::from_value(arguments.clone()) {
        Ok(args) => args,
        Err(err) => return (format!("invalid arguments: {err}"), true),
    };
    // The model echoes the session id from its prompt; anything else
    // would cross-write another session's record.
    if Uuid::parse_str(&args.session_id).ok() != Some(session.id) {
        return (
            "That thought record belongs to a different session, so I left it untouched.".into(),
            true,
        );
    }

    let clean = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let fields = RecordFields {
        activating_event: clean(args.activating_event),
        beliefs: clean(args.beliefs),
        consequences: clean(args.consequences),
        disputation: clean(args.disputation),
        alternative_belief: clean(args.alternative_belief),
    };
    if fields.is_empty() {
        return (
            "A thought record update needs at least one field: the activating event, beliefs, \
             consequences, disputation, or an alternative belief."
                .into(),
            true,
        );
    }

    match store.upsert_record(session.id, fields, actor) {
        Ok(record) if record.status == RecordStatus::Completed => (
            "Thought record complete: all five columns are filled in. Walk the user through \
             the shift from the original belief to the alternative."
                .into(),
            false,
        ),
        Ok(record) => (
            format!(
                "Thought record saved. Still to cover: {}.",
                missing_fields(&record).join(", ")
            ),
            false,
        ),
        Err(err) => store_trouble("saving the thought record", &err),
    }
}

fn missing_fields(record: &StructuredRecord) -> Vec<&'static str> {
    let blank = |f: &Option<String>| f.as_deref().map_or(true, |s| s.trim().is_empty());
    let mut missing = Vec::new();
    if blank(&record.activating_event) {
        missing.push("activating event");
    }
    if blank(&record.beliefs) {
        missing.push("beliefs");
    }
    if blank(&record.consequences) {
        missing.push("consequences");
    }
    if blank(&record.disputation) {
        missing.push("disputation");
    }
    if blank(&record.alternative_belief) {
        missing.push("alternative belief");
    }
    missing
}

fn store_trouble(doing: &str, err: &sage_domain::Error) -> (String, bool) {
    tracing::warn!(%err, "store failure during tool call");
    (
        format!("I hit a snag {doing}; nothing was changed. Let's try that again in a moment."),
        true,
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sage_sessions::{JsonDomainStore, Profile};

    fn learning_fixture() -> (tempfile::TempDir, JsonDomainStore, Session) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDomainStore::new(dir.path()).unwrap();
        let session = store
            .create_session(
                "u1",
                Profile::Learning {
                    topic: "Graph Theory".into(),
                    teaching_style: None,
                    response_style: None,
                },
            )
            .unwrap();
        (dir, store, session)
    }

    fn therapy_fixture() -> (tempfile::TempDir, JsonDomainStore, Session) {
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
        (dir, store, session)
    }

    #[test]
    fn definitions_are_filtered_by_agent_policy() {
        let planner: Vec<String> = build_tool_definitions(AgentKind::Planner)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(planner, vec!["create_learning_plan"]);

        let teacher: Vec<String> = build_tool_definitions(AgentKind::Teacher)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(teacher, vec!["mark_concept_progress", "mark_task_progress"]);
    }

    #[test]
    fn dispatch_rejects_tools_outside_the_policy() {
        let (_dir, store, session) = learning_fixture();
        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Teacher,
            "create_learning_plan",
            &json!({ "concepts": [{ "title": "x" }] }),
        );
        assert!(is_error);
        assert!(text.contains("not available"));
        assert!(store.list_items(session.id).is_empty());
    }

    #[test]
    fn plan_creation_links_tasks_to_their_concept() {
        let (_dir, store, session) = learning_fixture();
        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Planner,
            "create_learning_plan",
            &json!({
                "concepts": [
                    { "title": "Graph basics", "tasks": [{ "title": "Draw K5" }] },
                    { "title": "Breadth-first search" }
                ]
            }),
        );
        assert!(!is_error, "{text}");
        assert!(text.contains("2 concepts"));

        let items = store.list_items(session.id);
        let basics = items.iter().find(|i| i.title == "Graph basics").unwrap();
        let task = items.iter().find(|i| i.title == "Draw K5").unwrap();
        assert_eq!(task.parent_id, Some(basics.id));
    }

    #[test]
    fn marking_an_unknown_concept_is_a_soft_error() {
        let (_dir, store, session) = learning_fixture();
        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Teacher,
            "mark_concept_progress",
            &json!({ "conceptId": Uuid::new_v4().to_string(), "isCompleted": true }),
        );
        assert!(is_error);
        assert!(text.contains("couldn't find that concept"));
    }

    #[test]
    fn marking_a_concept_reports_the_new_rate() {
        let (_dir, store, session) = learning_fixture();
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
                        kind: ItemKind::Concept,
                        title: "BFS".into(),
                        detail: None,
                        parent: None,
                    },
                ],
                "Planner",
            )
            .unwrap();

        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Teacher,
            "mark_concept_progress",
            &json!({ "conceptId": created[0].id.to_string(), "isCompleted": true }),
        );
        assert!(!is_error, "{text}");
        assert!(text.contains("50% (1 of 2 concepts)"), "{text}");
    }

    #[test]
    fn record_updates_merge_and_complete() {
        let (_dir, store, session) = therapy_fixture();

        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Restructuring,
            "record_structured_exercise",
            &json!({
                "sessionId": session.id.to_string(),
                "activatingEvent": "Missed a deadline",
                "beliefs": "I'm going to be fired"
            }),
        );
        assert!(!is_error, "{text}");
        assert!(text.contains("disputation"));

        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Restructuring,
            "record_structured_exercise",
            &json!({
                "sessionId": session.id.to_string(),
                "consequences": "Panic, avoidance",
                "disputation": "One missed deadline in three years",
                "alternativeBelief": "A single slip doesn't erase my track record"
            }),
        );
        assert!(!is_error, "{text}");
        assert!(text.contains("complete"));
        assert_eq!(
            store.list_records(session.id)[0].status,
            RecordStatus::Completed
        );
    }

    #[test]
    fn record_for_a_foreign_session_is_refused() {
        let (_dir, store, session) = therapy_fixture();
        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Restructuring,
            "record_structured_exercise",
            &json!({ "sessionId": Uuid::new_v4().to_string(), "beliefs": "x" }),
        );
        assert!(is_error);
        assert!(text.contains("different session"));
        assert!(store.list_records(session.id).is_empty());
    }

    #[test]
    fn empty_record_update_is_refused() {
        let (_dir, store, session) = therapy_fixture();
        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Restructuring,
            "record_structured_exercise",
            &json!({ "sessionId": session.id.to_string() }),
        );
        assert!(is_error);
        assert!(text.contains("at least one field"));
    }

    #[test]
    fn exercise_feedback_is_stored() {
        let (_dir, store, session) = therapy_fixture();
        let created = store
            .insert_items(
                session.id,
                vec![NewItem {
                    kind: ItemKind::Exercise,
                    title: "Evening walk".into(),
                    detail: None,
                    parent: None,
                }],
                "Psychotherapist",
            )
            .unwrap();

        let (text, is_error) = dispatch_tool(
            &store,
            &session,
            AgentKind::Psychotherapist,
            "mark_exercise_progress",
            &json!({
                "exerciseId": created[0].id.to_string(),
                "isCompleted": true,
                "feedback": "Managed it four nights out of five"
            }),
        );
        assert!(!is_error, "{text}");

        let items = store.list_items(session.id);
        assert_eq!(
            items[0].feedback.as_deref(),
            Some("Managed it four nights out of five")
        );
    }
}
