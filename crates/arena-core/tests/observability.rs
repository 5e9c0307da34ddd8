//! Observability tests for tournament lifecycle tracing.
//!
//! These exercise the structured events and spans emitted around a
//! tournament: start, agent finish, finalization, overrides and failures.

use std::sync::Arc;

use arena_core::{
    emit_agent_finished, emit_step_recorded, emit_store_write_failed, emit_tournament_finalized,
    emit_tournament_started, emit_winner_overridden, metrics::METRICS, ArenaConfig,
    ArenaServices, HackathonContext, ScriptedEngineFactory, Sponsor, StaticCatalog,
    TournamentCoordinator, TournamentSpan,
};
use arena_sandbox::fakes::FakeProvider;
use arena_sandbox::ExecutionEnvironmentManager;
use arena_state::MemoryTournamentStore;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_tournament_started() {
    emit_tournament_started("t-123", "spring-hack", 10);
}

#[traced_test]
#[test]
fn test_emit_agent_finished() {
    emit_agent_finished("run-456", 3, "failed", 12);
}

#[traced_test]
#[test]
fn test_emit_tournament_finalized_without_winner() {
    emit_tournament_finalized("t-789", "failed", 0, None, 42_000);
}

#[traced_test]
#[test]
fn test_emit_winner_overridden() {
    emit_winner_overridden("t-1", "run-5");
}

#[traced_test]
#[test]
fn test_emit_step_and_write_failure() {
    emit_step_recorded("run-1", 7, "tool_invocation", Some("submit_plan"));
    emit_store_write_failed("run-1", "update", &"database connection failed");
}

#[traced_test]
#[test]
fn test_tournament_span_enter() {
    let span = TournamentSpan::enter("t-span");
    drop(span);
}

#[traced_test]
#[tokio::test]
async fn test_failed_tournament_counts_steps() {
    let catalog = Arc::new(StaticCatalog::new().with_hackathon(HackathonContext {
        hackathon_id: "h1".to_string(),
        name: "Hack".to_string(),
        sponsors: vec![Sponsor {
            id: "s1".to_string(),
            name: "Acme".to_string(),
            description: None,
            doc_urls: vec![],
        }],
    }));
    let mut config = ArenaConfig::default();
    config.tournament.agent_count = 2;
    let coordinator = TournamentCoordinator::new(
        ArenaServices {
            store: Arc::new(MemoryTournamentStore::new()),
            projects: catalog.clone(),
            sponsors: catalog,
            engines: Arc::new(ScriptedEngineFactory::new(vec![
                arena_core::ScriptedTurn::call(
                    "fetch_sponsor_docs",
                    serde_json::json!({"sponsor_id": "s1"}),
                ),
            ])),
            environments: Arc::new(ExecutionEnvironmentManager::new(
                Arc::new(FakeProvider::new()),
                config.environment.clone(),
            )),
        },
        config,
    );

    let before = METRICS.steps_emitted();
    let summary = coordinator.run_tournament("h1").await.unwrap();
    assert_eq!(summary.completed_count, 0);
    // Other tests share the global counters; they only grow.
    assert!(METRICS.steps_emitted() >= before + 2);
}
