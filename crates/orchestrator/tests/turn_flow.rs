//! End-to-end turn flows against a scripted provider: phase routing,
//! multi-part replies, tool effects on the store, and every fallback
//! path a turn can take.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use sage_domain::config::Config;
use sage_domain::{ContentPart, MessageContent};
use sage_orchestrator::router::Orchestrator;
use sage_orchestrator::runtime::guard::OutputGuard;
use sage_orchestrator::runtime::limiter::FixedWindowLimiter;
use sage_orchestrator::runtime::turn::STEP_CAP_REPLY;
use sage_orchestrator::state::CoreState;
use sage_providers::{LlmProvider, MockProvider};
use sage_sessions::{
    ChatRole, ItemKind, JsonDomainStore, JsonlCheckpointStore, NewItem, Phase, Profile,
    RecordStatus, Session,
};

// ── Fixtures ──────────────────────────────────────────────────────

fn core(dir: &TempDir, config: Config, provider: Option<Arc<dyn LlmProvider>>) -> CoreState {
    let config = Arc::new(config);
    let store = JsonDomainStore::new(dir.path()).expect("store");
    let checkpoints =
        JsonlCheckpointStore::new(&dir.path().join("checkpoints")).expect("checkpoints");
    CoreState {
        config: config.clone(),
        store: Arc::new(store),
        checkpoints: Arc::new(checkpoints),
        provider,
        limiter: Arc::new(FixedWindowLimiter::from_config(&config.limits)),
        guard: Arc::new(OutputGuard::from_config(&config.guard)),
    }
}

fn mocked(dir: &TempDir) -> (Arc<MockProvider>, Orchestrator) {
    mocked_with(dir, Config::default())
}

fn mocked_with(dir: &TempDir, config: Config) -> (Arc<MockProvider>, Orchestrator) {
    let mock = Arc::new(MockProvider::new());
    let provider: Arc<dyn LlmProvider> = mock.clone();
    let state = core(dir, config, Some(provider));
    (mock, Orchestrator::new(state))
}

fn learning_session(orch: &Orchestrator, topic: &str) -> Session {
    orch.state
        .store
        .create_session(
            "u1",
            Profile::Learning {
                topic: topic.into(),
                teaching_style: None,
                response_style: None,
            },
        )
        .expect("create session")
}

fn therapy_session(orch: &Orchestrator, concern: &str) -> Session {
    orch.state
        .store
        .create_session(
            "u1",
            Profile::Therapy {
                concern: concern.into(),
                goal: None,
                style: None,
                session_type: None,
            },
        )
        .expect("create session")
}

fn seed_items(orch: &Orchestrator, session_id: Uuid, kind: ItemKind, titles: &[&str]) -> Vec<Uuid> {
    let items = titles
        .iter()
        .map(|t| NewItem {
            kind,
            title: t.to_string(),
            detail: None,
            parent: None,
        })
        .collect();
    orch.state
        .store
        .insert_items(session_id, items, "Planner")
        .expect("seed items")
        .into_iter()
        .map(|i| i.id)
        .collect()
}

fn phase_of(orch: &Orchestrator, session_id: Uuid) -> Phase {
    orch.state.store.get_session(session_id).expect("session").phase
}

// ── Learning flows ────────────────────────────────────────────────

#[tokio::test]
async fn first_learning_turn_plans_then_teaches() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = learning_session(&orch, "graph theory");

    mock.push_tool_call(
        "create_learning_plan",
        json!({
            "concepts": [
                { "title": "Graph basics", "tasks": [{ "title": "Draw K5 and K3,3" }] },
                { "title": "Breadth-first search" }
            ]
        }),
    );
    mock.push_text("Here's the plan I put together for graph theory.");
    mock.push_text("Let's start with what a graph actually is: vertices and edges.");

    let outcome = orch
        .respond_learning(session.id, "u1", "I want to learn graph theory", "")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 2);
    assert_eq!(outcome.parts[0].agent, "Planner");
    assert_eq!(outcome.parts[1].agent, "Teacher");
    assert!(outcome.text.contains("⸻ handing over to Teacher ⸻"));
    assert_eq!(phase_of(&orch, session.id), Phase::Teaching);

    let items = orch.state.store.list_items(session.id);
    let concepts: Vec<_> = items.iter().filter(|i| i.kind == ItemKind::Concept).collect();
    let tasks: Vec<_> = items.iter().filter(|i| i.kind == ItemKind::Task).collect();
    assert_eq!(concepts.len(), 2);
    assert_eq!(tasks.len(), 1);
    let basics = concepts.iter().find(|c| c.title == "Graph basics").unwrap();
    assert_eq!(tasks[0].parent_id, Some(basics.id));

    // Three model calls: planner tool round, planner text, teacher text.
    let calls = mock.calls();
    assert_eq!(calls.len(), 3);

    // Each agent only sees its own tools.
    let planner_tools: Vec<&str> = calls[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(planner_tools, ["create_learning_plan"]);
    let teacher_tools: Vec<&str> = calls[2].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(teacher_tools, ["mark_concept_progress", "mark_task_progress"]);

    // The teacher's prompt was rebuilt after the plan landed.
    let teacher_prompt = calls[2].messages[0].content.joined_text();
    assert!(teacher_prompt.contains("Graph basics"));
    assert!(teacher_prompt.contains("Breadth-first search"));
}

#[tokio::test]
async fn planless_first_turn_stays_in_needs_plan() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = learning_session(&orch, "linear algebra");

    mock.push_text("Before we plan: what do you already know about matrices?");

    let outcome = orch
        .respond_learning(session.id, "u1", "teach me linear algebra", "")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 1);
    assert_eq!(outcome.parts[0].agent, "Planner");
    assert_eq!(phase_of(&orch, session.id), Phase::NeedsPlan);
    assert!(orch.state.store.list_items(session.id).is_empty());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn teaching_phase_routes_to_the_teacher_alone() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = learning_session(&orch, "graph theory");
    seed_items(&orch, session.id, ItemKind::Concept, &["Adjacency lists"]);
    orch.state
        .store
        .set_phase(session.id, Phase::Teaching)
        .unwrap();

    mock.push_text("Adjacency lists store each vertex's neighbours compactly.");

    let outcome = orch
        .respond_learning(session.id, "u1", "how do adjacency lists work?", "")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 1);
    assert_eq!(outcome.parts[0].agent, "Teacher");
    assert_eq!(mock.call_count(), 1);

    let system = mock.calls()[0].messages[0].content.joined_text();
    assert!(system.contains("Session context"));
    assert!(system.contains("Adjacency lists"));
}

#[tokio::test]
async fn marking_a_concept_updates_progress_and_audit_history() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = learning_session(&orch, "graph theory");
    let ids = seed_items(
        &orch,
        session.id,
        ItemKind::Concept,
        &["Graph basics", "Breadth-first search"],
    );
    orch.state
        .store
        .set_phase(session.id, Phase::Teaching)
        .unwrap();

    mock.push_tool_call(
        "mark_concept_progress",
        json!({ "conceptId": ids[0].to_string(), "isCompleted": true }),
    );
    mock.push_text("Great work on graph basics. Next up is breadth-first search.");

    let outcome = orch
        .respond_learning(session.id, "u1", "we finished graph basics", "")
        .await;

    assert!(outcome.success);
    let session = orch.state.store.get_session(session.id).unwrap();
    assert_eq!(session.completion_rate, 50.0);
    assert_eq!(orch.state.store.list_history(session.id).len(), 1);
}

#[tokio::test]
async fn unknown_item_id_keeps_the_turn_alive() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = learning_session(&orch, "graph theory");
    seed_items(&orch, session.id, ItemKind::Concept, &["Graph basics"]);
    orch.state
        .store
        .set_phase(session.id, Phase::Teaching)
        .unwrap();

    mock.push_tool_call(
        "mark_concept_progress",
        json!({ "conceptId": Uuid::new_v4().to_string(), "isCompleted": true }),
    );
    mock.push_text("Hmm, let me double-check which concept that was.");

    let outcome = orch
        .respond_learning(session.id, "u1", "mark the last one done", "")
        .await;

    // The bad id never aborts the turn; the agent gets a plain error
    // result and answers anyway.
    assert!(outcome.success);
    assert!(orch.state.store.list_history(session.id).is_empty());

    let second_call = &mock.calls()[1];
    let saw_error_result = second_call.messages.iter().any(|m| match &m.content {
        MessageContent::Parts(parts) => parts.iter().any(|p| {
            matches!(
                p,
                ContentPart::ToolResult { content, is_error: true, .. }
                    if content.contains("couldn't find")
            )
        }),
        _ => false,
    });
    assert!(saw_error_result);
}

#[tokio::test]
async fn missing_provider_serves_on_topic_template() {
    let dir = tempfile::tempdir().unwrap();
    let state = core(&dir, Config::default(), None);
    let orch = Orchestrator::new(state);
    let session = learning_session(&orch, "graph theory");

    let outcome = orch
        .respond_learning(session.id, "u1", "where should I start?", "t-custom")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 1);
    assert!(outcome.text.contains("graph theory"));
    assert_eq!(phase_of(&orch, session.id), Phase::NeedsPlan);

    // The turn is persisted on the caller's thread like any other.
    let messages = orch.state.store.list_messages("t-custom");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[1].role, ChatRole::Assistant);
    assert_eq!(messages[1].agent.as_deref(), Some("Planner"));
}

#[tokio::test]
async fn rate_limited_user_gets_an_explicit_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.limits.user_calls_per_window = 1;
    let (mock, orch) = mocked_with(&dir, config);
    let session = learning_session(&orch, "graph theory");

    mock.push_text("Plenty of ground to cover; tell me what you know so far.");

    let first = orch
        .respond_learning(session.id, "u1", "let's get started", "")
        .await;
    assert!(first.success);

    let second = orch
        .respond_learning(session.id, "u1", "and another thing", "")
        .await;
    assert!(!second.success);
    assert!(second.error.as_deref().unwrap_or("").contains("rate limit"));
    assert!(second.parts.is_empty());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn wrong_domain_entry_point_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = core(&dir, Config::default(), None);
    let orch = Orchestrator::new(state);
    let session = learning_session(&orch, "graph theory");

    let outcome = orch
        .respond_therapy(session.id, "u1", "how are we doing?", "")
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap_or("").contains("learning"));
    assert!(outcome.parts.is_empty());
}

// ── Therapy flows ─────────────────────────────────────────────────

#[tokio::test]
async fn first_therapy_turn_assesses_then_counsels() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = therapy_session(&orch, "insomnia and stress");

    mock.push_tool_call(
        "create_therapy_goals",
        json!({ "goals": [{ "title": "Sleep routine" }, { "title": "Daily walk" }] }),
    );
    mock.push_text("Thanks for sharing all that. I've noted two goals we agreed on.");
    mock.push_text("Let's talk about what tends to be on your mind at bedtime.");

    let outcome = orch
        .respond_therapy(
            session.id,
            "u1",
            "I barely sleep and work is crushing me",
            "",
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 2);
    assert_eq!(outcome.parts[0].agent, "Intake Counselor");
    assert_eq!(outcome.parts[1].agent, "Psychotherapist");
    assert!(outcome.text.contains("⸻ handing over to Psychotherapist ⸻"));
    assert_eq!(phase_of(&orch, session.id), Phase::Therapy);

    let goals: Vec<_> = orch
        .state
        .store
        .list_items(session.id)
        .into_iter()
        .filter(|i| i.kind == ItemKind::Goal)
        .collect();
    assert_eq!(goals.len(), 2);
}

#[tokio::test]
async fn reframing_keywords_enter_the_exercise_on_the_same_turn() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = therapy_session(&orch, "fear of public speaking");
    seed_items(&orch, session.id, ItemKind::Goal, &["Give one talk"]);
    orch.state
        .store
        .set_phase(session.id, Phase::Therapy)
        .unwrap();

    // Turn 1: the user names a negative thought; the reframing guide
    // answers directly and opens a record.
    mock.push_tool_call(
        "record_structured_exercise",
        json!({
            "sessionId": session.id.to_string(),
            "activatingEvent": "Upcoming presentation",
            "beliefs": "I'll fail and everyone will see"
        }),
    );
    mock.push_text("Let's look at the evidence for that belief together.");

    let outcome = orch
        .respond_therapy(
            session.id,
            "u1",
            "I keep having this negative thought that I'll fail. Can we reframe it?",
            "",
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 1);
    assert_eq!(outcome.parts[0].agent, "Reframing Guide");
    assert_eq!(phase_of(&orch, session.id), Phase::CognitiveRestructuring);
    let open = orch.state.store.open_record(session.id).expect("open record");
    assert_eq!(open.activating_event.as_deref(), Some("Upcoming presentation"));

    // Turn 2: the record gets its last two columns; completion returns
    // the session to general therapy.
    mock.push_tool_call(
        "record_structured_exercise",
        json!({
            "sessionId": session.id.to_string(),
            "consequences": "Dread, procrastination",
            "disputation": "Past talks went fine",
            "alternativeBelief": "One rough talk wouldn't undo my reputation"
        }),
    );
    mock.push_text("Notice how the dread eases when the belief shifts.");

    let outcome = orch
        .respond_therapy(
            session.id,
            "u1",
            "I suppose one bad talk wouldn't actually ruin everything.",
            "",
        )
        .await;

    assert!(outcome.success);
    assert_eq!(phase_of(&orch, session.id), Phase::Therapy);
    assert!(orch.state.store.open_record(session.id).is_none());
    let records = orch.state.store.list_records(session.id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Completed);
}

#[tokio::test]
async fn handoff_marker_is_stripped_and_takes_effect_next_turn() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = therapy_session(&orch, "burnout");
    seed_items(&orch, session.id, ItemKind::Goal, &["Protect one evening"]);
    orch.state
        .store
        .set_phase(session.id, Phase::Therapy)
        .unwrap();

    mock.push_text(
        "It sounds like that belief deserves a closer look. <<handoff:restructuring>>",
    );

    let outcome = orch
        .respond_therapy(session.id, "u1", "everything I do at work feels doomed", "")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 1);
    assert_eq!(outcome.parts[0].agent, "Psychotherapist");
    assert!(!outcome.text.contains("<<handoff"));
    assert_eq!(phase_of(&orch, session.id), Phase::CognitiveRestructuring);
}

#[tokio::test]
async fn asking_to_stop_the_exercise_returns_to_the_counselor() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = therapy_session(&orch, "burnout");
    seed_items(&orch, session.id, ItemKind::Goal, &["Protect one evening"]);
    orch.state
        .store
        .set_phase(session.id, Phase::CognitiveRestructuring)
        .unwrap();

    mock.push_text("Of course. Let's step back and talk about how the week went.");

    let outcome = orch
        .respond_therapy(session.id, "u1", "let's stop the exercise for now", "")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 1);
    assert_eq!(outcome.parts[0].agent, "Psychotherapist");
    assert_eq!(phase_of(&orch, session.id), Phase::Therapy);
}

// ── Loop and guard limits ─────────────────────────────────────────

#[tokio::test]
async fn exhausted_step_budget_serves_the_step_cap_reply() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.limits.max_reasoning_steps = 2;
    let (mock, orch) = mocked_with(&dir, config);
    let session = learning_session(&orch, "graph theory");
    let ids = seed_items(
        &orch,
        session.id,
        ItemKind::Concept,
        &["Basics", "BFS", "DFS"],
    );
    orch.state
        .store
        .set_phase(session.id, Phase::Teaching)
        .unwrap();

    mock.push_tool_call(
        "mark_concept_progress",
        json!({ "conceptId": ids[0].to_string(), "isCompleted": true }),
    );
    mock.push_tool_call(
        "mark_concept_progress",
        json!({ "conceptId": ids[1].to_string(), "isCompleted": true }),
    );

    let outcome = orch
        .respond_learning(session.id, "u1", "mark the first two done", "")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.text, STEP_CAP_REPLY);
    assert_eq!(mock.call_count(), 2);
    // The work done before the cap is kept.
    assert_eq!(orch.state.store.list_history(session.id).len(), 2);
}

#[tokio::test]
async fn corrupted_model_output_falls_back_to_a_template() {
    let dir = tempfile::tempdir().unwrap();
    let (mock, orch) = mocked(&dir);
    let session = learning_session(&orch, "graph theory");
    seed_items(&orch, session.id, ItemKind::Concept, &["Basics"]);
    orch.state
        .store
        .set_phase(session.id, Phase::Teaching)
        .unwrap();

    mock.push_text("hm");

    let outcome = orch
        .respond_learning(session.id, "u1", "go on", "")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.parts.len(), 1);
    assert_eq!(outcome.parts[0].agent, "Teacher");
    assert_ne!(outcome.text, "hm");
    assert!(outcome.text.contains("graph theory"));
}
