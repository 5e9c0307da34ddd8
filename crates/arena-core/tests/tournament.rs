//! Coordinator lifecycle: fan-out, isolation, finalization, winner override.

use std::sync::Arc;
use std::time::Duration;

use arena_core::{
    ArenaConfig, ArenaError, ArenaServices, EngineTurn, HackathonContext, ProjectDetails,
    ScriptedEngineFactory, ScriptedTurn, Sponsor, StaticCatalog, ToolInvocation,
    TournamentCoordinator,
};
use arena_sandbox::fakes::{FakeProvider, ScriptedCommand};
use arena_sandbox::ExecutionEnvironmentManager;
use arena_state::{
    AgentRunStatus, MemoryTournamentStore, NewAgentRun, StepKind, SurrealTournamentStore,
    TournamentStatus, TournamentStore,
};
use serde_json::json;

const HACKATHON: &str = "spring-hack";
const REPO: &str = "https://github.com/acme/weather-bot";

fn catalog(sponsors: Vec<Sponsor>) -> Arc<StaticCatalog> {
    Arc::new(
        StaticCatalog::new()
            .with_hackathon(HackathonContext {
                hackathon_id: HACKATHON.to_string(),
                name: "Spring Hack".to_string(),
                sponsors,
            })
            .with_project(ProjectDetails {
                id: "p1".to_string(),
                name: "Weather Bot".to_string(),
                description: Some("chat bot for weather alerts".to_string()),
                github_urls: vec![REPO.to_string()],
                devpost_url: None,
                readme: Some("npm run build".to_string()),
                is_winner: false,
            })
            .with_docs("s1", "GET /v1/tiles"),
    )
}

fn acme() -> Sponsor {
    Sponsor {
        id: "s1".to_string(),
        name: "Acme Maps".to_string(),
        description: Some("map tiles".to_string()),
        doc_urls: vec![],
    }
}

fn plan(project_id: &str, summary: &str) -> serde_json::Value {
    json!({
        "project_id": project_id,
        "sponsor_id": "s1",
        "project_name": "Weather Bot",
        "sponsor_name": "Acme Maps",
        "plan_summary": summary,
        "integration_approach": "render Acme tiles under the forecast",
        "files_to_modify": ["src/maps.ts"]
    })
}

/// Full agent run ending in a validation with `test_command`.
fn script(test_command: &str) -> Vec<ScriptedTurn> {
    vec![
        ScriptedTurn::Turn(EngineTurn {
            text: Some("Looking for a weather project.".to_string()),
            tool_calls: vec![ToolInvocation::new(
                "search_projects",
                json!({"query": "weather"}),
            )],
        }),
        ScriptedTurn::call("get_project_details", json!({"project_id": "p1"})),
        ScriptedTurn::call("fetch_sponsor_docs", json!({"sponsor_id": "s1"})),
        ScriptedTurn::call("submit_plan", plan("p1", "Add a map of alerts")),
        ScriptedTurn::call(
            "write_and_test_code",
            json!({
                "git_url": REPO,
                "files": [{"path": "src/maps.ts", "content": "export const tiles = 1;"}],
                "test_command": test_command
            }),
        ),
    ]
}

fn provider() -> FakeProvider {
    FakeProvider::new()
        .with_file("package.json")
        .with_command("npm run build", ScriptedCommand::exit(0).with_stdout("built"))
        .with_command("npm test", ScriptedCommand::exit(1).with_stderr("1 failing"))
}

struct Harness {
    coordinator: TournamentCoordinator,
    store: Arc<MemoryTournamentStore>,
}

fn harness(
    agent_count: u32,
    engines: ScriptedEngineFactory,
    provider: FakeProvider,
    sponsors: Vec<Sponsor>,
) -> Harness {
    let store = Arc::new(MemoryTournamentStore::new());
    let mut config = ArenaConfig::default();
    config.tournament.agent_count = agent_count;
    config.executor.final_write_backoff_ms = 1;
    let catalog = catalog(sponsors);
    let coordinator = TournamentCoordinator::new(
        ArenaServices {
            store: store.clone(),
            projects: catalog.clone(),
            sponsors: catalog,
            engines: Arc::new(engines),
            environments: Arc::new(ExecutionEnvironmentManager::new(
                Arc::new(provider),
                config.environment.clone(),
            )),
        },
        config,
    );
    Harness { coordinator, store }
}

#[tokio::test]
async fn test_roster_matches_agent_count() {
    let h = harness(
        10,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![acme()],
    );
    let launch = h.coordinator.start_tournament(HACKATHON).await.unwrap();
    let summary = launch.join.await.unwrap().unwrap();

    let view = h
        .coordinator
        .tournament_status(&summary.tournament_id)
        .await
        .unwrap();
    let numbers: Vec<u32> = view.agents.iter().map(|a| a.agent_number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    assert_eq!(view.tournament.agent_count, 10);
    assert_eq!(view.agents[0].personality, "The Pragmatist");
    assert_eq!(view.agents[9].personality, "The Wildcard");
    assert!(view.tournament.started_at.is_some());
    assert!(view.tournament.completed_at.is_some());
}

#[tokio::test]
async fn test_four_of_ten_pass_lowest_number_wins() {
    let mut engines = ScriptedEngineFactory::new(script("npm test"));
    for n in [9, 5, 2, 7] {
        engines = engines.with_script(n, script("npm run build"));
    }
    let h = harness(10, engines, provider(), vec![acme()]);

    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.status, TournamentStatus::Completed);
    assert_eq!(summary.completed_count, 4);

    let view = h
        .coordinator
        .tournament_status(&summary.tournament_id)
        .await
        .unwrap();
    assert_eq!(view.tournament.status, TournamentStatus::Completed);
    assert_eq!(view.completed_count, 4);
    let winner = view
        .agents
        .iter()
        .find(|a| Some(&a.agent_run_id) == view.tournament.winner_agent_run_id.as_ref())
        .expect("winner is on the roster");
    assert_eq!(winner.agent_number, 2);

    for agent in &view.agents {
        assert!(agent.status.is_terminal());
        if agent.status == AgentRunStatus::Completed {
            let validation = agent.validation.as_ref().expect("completed has validation");
            assert!(validation.success);
            assert_eq!(agent.selected_project_id.as_deref(), Some("p1"));
        } else {
            assert!(agent.error.as_deref().is_some_and(|e| !e.is_empty()));
            assert!(!agent.validation.as_ref().expect("validation ran").success);
        }
    }
}

#[tokio::test]
async fn test_one_engine_error_is_isolated() {
    let engines = ScriptedEngineFactory::new(script("npm run build")).with_script(
        3,
        vec![
            ScriptedTurn::call("search_projects", json!({"query": "weather"})),
            ScriptedTurn::fail("upstream model overloaded"),
        ],
    );
    let h = harness(10, engines, provider(), vec![acme()]);

    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.status, TournamentStatus::Completed);
    assert_eq!(summary.completed_count, 9);

    let view = h
        .coordinator
        .tournament_status(&summary.tournament_id)
        .await
        .unwrap();
    for agent in &view.agents {
        if agent.agent_number == 3 {
            assert_eq!(agent.status, AgentRunStatus::Failed);
            let error = agent.error.as_deref().unwrap_or_default();
            assert!(error.contains("upstream model overloaded"), "{error}");
        } else {
            assert_eq!(agent.status, AgentRunStatus::Completed);
        }
    }
}

#[tokio::test]
async fn test_panics_and_missing_engines_are_recorded_as_failures() {
    let engines = ScriptedEngineFactory::new(script("npm run build"))
        .with_script(
            1,
            vec![ScriptedTurn::Panic {
                message: "engine bug".to_string(),
            }],
        )
        .with_unavailable(2);
    let h = harness(3, engines, provider(), vec![acme()]);

    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.completed_count, 1);

    let view = h
        .coordinator
        .tournament_status(&summary.tournament_id)
        .await
        .unwrap();
    let by_number = |n: u32| {
        view.agents
            .iter()
            .find(|a| a.agent_number == n)
            .expect("agent on roster")
    };
    assert_eq!(by_number(1).status, AgentRunStatus::Failed);
    assert!(by_number(1)
        .error
        .as_deref()
        .is_some_and(|e| e.contains("panicked") && e.contains("engine bug")));
    assert_eq!(by_number(2).status, AgentRunStatus::Failed);
    assert!(by_number(2)
        .error
        .as_deref()
        .is_some_and(|e| e.contains("unavailable")));
    assert_eq!(by_number(3).status, AgentRunStatus::Completed);
    assert_eq!(
        view.tournament.winner_agent_run_id.as_ref(),
        Some(&by_number(3).agent_run_id)
    );
}

#[tokio::test]
async fn test_no_agent_passes_fails_tournament() {
    let h = harness(
        3,
        ScriptedEngineFactory::new(script("npm test")),
        provider(),
        vec![acme()],
    );
    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.status, TournamentStatus::Failed);
    assert_eq!(summary.winner_agent_run_id, None);
    assert_eq!(summary.completed_count, 0);
}

#[tokio::test]
async fn test_zero_sponsors_creates_nothing() {
    let h = harness(
        10,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![],
    );
    let err = h
        .coordinator
        .start_tournament(HACKATHON)
        .await
        .err()
        .expect("must fail");
    assert!(matches!(err, ArenaError::NoEligibleCandidates { .. }));
    assert_eq!(h.store.tournament_count(), 0);
    assert_eq!(h.store.agent_run_count(), 0);
}

#[tokio::test]
async fn test_unknown_hackathon() {
    let h = harness(
        2,
        ScriptedEngineFactory::new(vec![]),
        provider(),
        vec![acme()],
    );
    let err = h
        .coordinator
        .start_tournament("winter-hack")
        .await
        .err()
        .expect("must fail");
    assert!(matches!(err, ArenaError::HackathonNotFound(_)));
    assert_eq!(h.store.tournament_count(), 0);
}

#[tokio::test]
async fn test_override_winner_is_idempotent() {
    let mut engines = ScriptedEngineFactory::new(script("npm test"));
    for n in [2, 4] {
        engines = engines.with_script(n, script("npm run build"));
    }
    let h = harness(5, engines, provider(), vec![acme()]);
    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    let tid = summary.tournament_id.clone();

    let view = h.coordinator.tournament_status(&tid).await.unwrap();
    let fourth = view.agents[3].agent_run_id.clone();
    let first = view.agents[0].agent_run_id.clone();

    let once = h.coordinator.override_winner(&tid, &fourth).await.unwrap();
    let twice = h.coordinator.override_winner(&tid, &fourth).await.unwrap();
    assert_eq!(once.winner_agent_run_id, Some(fourth.clone()));
    assert_eq!(twice.winner_agent_run_id, once.winner_agent_run_id);
    assert_eq!(twice.status, TournamentStatus::Completed);

    let err = h
        .coordinator
        .override_winner(&tid, &first)
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::IneligibleWinner { .. }));

    let detail = h.coordinator.agent_run_detail(&tid, &fourth).await.unwrap();
    assert!(detail.is_winner);
}

#[tokio::test]
async fn test_override_rejected_while_running_or_foreign() {
    let h = harness(
        1,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![acme()],
    );
    let running = h
        .store
        .create_tournament(HACKATHON, 1, json!({}))
        .await
        .unwrap();
    let runs = h
        .store
        .create_agent_runs(
            &running.tournament_id,
            vec![NewAgentRun {
                agent_number: 1,
                personality: "The Pragmatist".to_string(),
            }],
        )
        .await
        .unwrap();
    h.store
        .start_tournament(&running.tournament_id)
        .await
        .unwrap();

    let err = h
        .coordinator
        .override_winner(&running.tournament_id, &runs[0].agent_run_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::TournamentNotFinished { .. }));

    let finished = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    let err = h
        .coordinator
        .override_winner(&finished.tournament_id, &runs[0].agent_run_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::ForeignAgentRun { .. }));
}

#[tokio::test]
async fn test_progress_is_ordered_per_agent() {
    let h = harness(
        4,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![acme()],
    );
    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();

    let entries = h
        .coordinator
        .recent_progress(&summary.tournament_id, None);
    // 1 reasoning output + 5 tool calls per agent
    assert_eq!(entries.len(), 24);
    for n in 1..=4 {
        let seqs: Vec<u64> = entries
            .iter()
            .filter(|e| e.agent_number == n)
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, (1..=6).collect::<Vec<_>>());
    }

    let limited = h
        .coordinator
        .recent_progress(&summary.tournament_id, Some(1));
    assert_eq!(limited.len(), 24, "limit is clamped up to the minimum");
    assert!(!h.coordinator.progress().is_open(&summary.tournament_id));
}

#[tokio::test]
async fn test_agent_detail_lists_steps_in_order() {
    let h = harness(
        1,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![acme()],
    );
    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    let run_id = summary.agents[0].agent_run_id.clone();

    let detail = h
        .coordinator
        .agent_run_detail(&summary.tournament_id, &run_id)
        .await
        .unwrap();
    assert!(detail.is_winner);
    assert_eq!(detail.run.status, AgentRunStatus::Completed);
    let seqs: Vec<u64> = detail.steps.iter().map(|s| s.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(detail.steps[0].kind, StepKind::ReasoningOutput);
    assert_eq!(
        detail.steps[5].tool_name.as_deref(),
        Some("write_and_test_code")
    );
    assert_eq!(detail.steps[5].output.as_ref().unwrap()["success"], true);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_finalizes_without_slow_agents() {
    let provider = provider().with_command(
        "npm run slow",
        ScriptedCommand::exit(0).with_delay(Duration::from_secs(50)),
    );
    let engines =
        ScriptedEngineFactory::new(script("npm run build")).with_script(1, script("npm run slow"));
    let store = Arc::new(MemoryTournamentStore::new());
    let mut config = ArenaConfig::default();
    config.tournament.agent_count = 2;
    config.tournament.timeout_secs = 5;
    let catalog = catalog(vec![acme()]);
    let coordinator = TournamentCoordinator::new(
        ArenaServices {
            store: store.clone(),
            projects: catalog.clone(),
            sponsors: catalog,
            engines: Arc::new(engines),
            environments: Arc::new(ExecutionEnvironmentManager::new(
                Arc::new(provider),
                config.environment.clone(),
            )),
        },
        config,
    );

    let summary = coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.status, TournamentStatus::Completed);
    assert!(summary.agents.is_empty());

    let view = coordinator
        .tournament_status(&summary.tournament_id)
        .await
        .unwrap();
    let winner = view.tournament.winner_agent_run_id.expect("winner");
    assert_eq!(winner, view.agents[1].agent_run_id);
}

#[tokio::test]
async fn test_runs_against_surreal_store() {
    let store = Arc::new(SurrealTournamentStore::in_memory().await.expect("surreal mem"));
    let mut config = ArenaConfig::default();
    config.tournament.agent_count = 3;
    let catalog = catalog(vec![acme()]);
    let engines = ScriptedEngineFactory::new(script("npm test")).with_script(2, script("npm run build"));
    let coordinator = TournamentCoordinator::new(
        ArenaServices {
            store: store.clone(),
            projects: catalog.clone(),
            sponsors: catalog,
            engines: Arc::new(engines),
            environments: Arc::new(ExecutionEnvironmentManager::new(
                Arc::new(provider()),
                config.environment.clone(),
            )),
        },
        config,
    );

    let summary = coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.completed_count, 1);
    let tournament = store.get_tournament(&summary.tournament_id).await.unwrap();
    assert_eq!(tournament.status, TournamentStatus::Completed);
    let runs = store
        .list_agent_runs(&summary.tournament_id)
        .await
        .unwrap();
    let winner = runs
        .iter()
        .find(|r| r.agent_number == 2)
        .expect("agent 2");
    assert_eq!(tournament.winner_agent_run_id.as_ref(), Some(&winner.agent_run_id));
    assert_eq!(store.list_steps(&winner.agent_run_id).await.unwrap().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_outcomes_already_joined() {
    let provider = provider().with_command(
        "npm run slow",
        ScriptedCommand::exit(0).with_delay(Duration::from_secs(50)),
    );
    let engines =
        ScriptedEngineFactory::new(script("npm run build")).with_script(2, script("npm run slow"));
    let store = Arc::new(MemoryTournamentStore::new());
    let mut config = ArenaConfig::default();
    config.tournament.agent_count = 2;
    config.tournament.timeout_secs = 5;
    let catalog = catalog(vec![acme()]);
    let coordinator = TournamentCoordinator::new(
        ArenaServices {
            store: store.clone(),
            projects: catalog.clone(),
            sponsors: catalog,
            engines: Arc::new(engines),
            environments: Arc::new(ExecutionEnvironmentManager::new(
                Arc::new(provider),
                config.environment.clone(),
            )),
        },
        config,
    );

    let summary = coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.status, TournamentStatus::Completed);
    assert_eq!(summary.agents.len(), 1);
    assert_eq!(summary.agents[0].agent_number, 1);
    assert_eq!(summary.agents[0].status, AgentRunStatus::Completed);
    assert_eq!(
        summary.winner_agent_run_id.as_ref(),
        Some(&summary.agents[0].agent_run_id)
    );
}

#[tokio::test]
async fn test_finalize_retries_transient_store_failures() {
    let h = harness(
        2,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![acme()],
    );
    h.store.fail_next_finalizes(2);
    let summary = h.coordinator.run_tournament(HACKATHON).await.unwrap();
    assert_eq!(summary.status, TournamentStatus::Completed);

    let tournament = h.store.get_tournament(&summary.tournament_id).await.unwrap();
    assert_eq!(tournament.status, TournamentStatus::Completed);
    assert!(!h.coordinator.progress().is_open(&summary.tournament_id));
}

#[tokio::test]
async fn test_finalize_failure_still_closes_progress() {
    let h = harness(
        2,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![acme()],
    );
    h.store.fail_next_finalizes(100);
    let launch = h.coordinator.start_tournament(HACKATHON).await.unwrap();
    let tid = launch.tournament_id.clone();

    let err = launch.join.await.unwrap().err().expect("finalize must fail");
    assert!(matches!(err, ArenaError::Storage(_)));
    assert!(!h.coordinator.progress().is_open(&tid));
    let tournament = h.store.get_tournament(&tid).await.unwrap();
    assert_eq!(tournament.status, TournamentStatus::Running);
}

#[tokio::test]
async fn test_setup_failure_marks_tournament_failed() {
    let h = harness(
        3,
        ScriptedEngineFactory::new(script("npm run build")),
        provider(),
        vec![acme()],
    );
    h.store.fail_next_rosters(1);
    let err = h
        .coordinator
        .start_tournament(HACKATHON)
        .await
        .err()
        .expect("roster insert must fail");
    assert!(matches!(err, ArenaError::Storage(_)));

    let tournaments = h.store.tournaments();
    assert_eq!(tournaments.len(), 1);
    assert_eq!(tournaments[0].status, TournamentStatus::Failed);
    assert!(tournaments[0].completed_at.is_some());
    assert_eq!(tournaments[0].winner_agent_run_id, None);
    assert_eq!(h.store.agent_run_count(), 0);
    assert!(!h.coordinator.progress().is_open(&tournaments[0].tournament_id));
}
