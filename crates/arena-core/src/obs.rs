//! Structured observability hooks for tournament lifecycle events.
//!
//! This module provides:
//! - Tournament-scoped tracing spans via the `TournamentSpan` RAII guard
//! - Emission functions for lifecycle events: start, agent finish,
//!   finalization, winner override, step recording and store write failures
//!
//! Events are emitted at `info!` level, failures at `warn!`.

use tracing::{info, warn};

/// RAII guard that enters a tournament-scoped span.
///
/// ```ignore
/// let _span = TournamentSpan::enter("t-123");
/// // tracing calls on this thread now carry tournament_id = "t-123"
/// ```
pub struct TournamentSpan {
    _span: tracing::span::EnteredSpan,
}

impl TournamentSpan {
    pub fn enter(tournament_id: &str) -> Self {
        let span = tracing::info_span!("arena.tournament", tournament_id = %tournament_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: tournament launched with its roster size.
pub fn emit_tournament_started(tournament_id: &str, hackathon_id: &str, agent_count: u32) {
    info!(
        event = "tournament.started",
        tournament_id = %tournament_id,
        hackathon_id = %hackathon_id,
        agent_count = agent_count,
    );
}

/// Emit event: one agent run reached a terminal status.
pub fn emit_agent_finished(agent_run_id: &str, agent_number: u32, status: &str, steps: u64) {
    info!(
        event = "agent.finished",
        agent_run_id = %agent_run_id,
        agent_number = agent_number,
        status = %status,
        steps = steps,
    );
}

/// Emit event: tournament finalized.
pub fn emit_tournament_finalized(
    tournament_id: &str,
    status: &str,
    completed_count: usize,
    winner: Option<&str>,
    duration_ms: u64,
) {
    info!(
        event = "tournament.finalized",
        tournament_id = %tournament_id,
        status = %status,
        completed_count = completed_count,
        winner = winner.unwrap_or("none"),
        duration_ms = duration_ms,
    );
}

/// Emit event: winner set by an administrator.
pub fn emit_winner_overridden(tournament_id: &str, agent_run_id: &str) {
    info!(
        event = "winner.overridden",
        tournament_id = %tournament_id,
        agent_run_id = %agent_run_id,
    );
}

/// Emit event: one step recorded for an agent run.
pub fn emit_step_recorded(agent_run_id: &str, seq: u64, kind: &str, tool: Option<&str>) {
    tracing::debug!(
        event = "step.recorded",
        agent_run_id = %agent_run_id,
        seq = seq,
        kind = %kind,
        tool = tool.unwrap_or("-"),
    );
}

/// Emit event: a best-effort store write failed (warning level).
pub fn emit_store_write_failed(agent_run_id: &str, op: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "store.write_failed",
        agent_run_id = %agent_run_id,
        op = %op,
        error = %error,
    );
}
