//! In-memory fakes for storage traits
//!
//! `MemoryTournamentStore` satisfies the [`TournamentStore`] contract without
//! any external dependencies. Besides tests it backs the CLI when no database
//! URL is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryTournamentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    tournaments: HashMap<TournamentId, TournamentRecord>,
    runs: HashMap<AgentRunId, AgentRunRecord>,
    steps: HashMap<AgentRunId, Vec<StepRecord>>,
}

/// In-memory tournament store.
///
/// Supports fault injection: the next `n` agent-run updates, step appends,
/// roster inserts or tournament finalizations can be made to fail with a
/// transient backend error.
#[derive(Debug, Default)]
pub struct MemoryTournamentStore {
    tables: Mutex<Tables>,
    failing_updates: AtomicU32,
    failing_steps: AtomicU32,
    failing_rosters: AtomicU32,
    failing_finalizes: AtomicU32,
}

impl MemoryTournamentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `update_agent_run` fail.
    pub fn fail_next_updates(&self, n: u32) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `append_step` fail.
    pub fn fail_next_steps(&self, n: u32) {
        self.failing_steps.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `create_agent_runs` fail.
    pub fn fail_next_rosters(&self, n: u32) {
        self.failing_rosters.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `finalize_tournament` fail.
    pub fn fail_next_finalizes(&self, n: u32) {
        self.failing_finalizes.store(n, Ordering::SeqCst);
    }

    /// Number of tournaments created so far.
    pub fn tournament_count(&self) -> usize {
        self.lock().tournaments.len()
    }

    /// Snapshot of every tournament, oldest first.
    pub fn tournaments(&self) -> Vec<TournamentRecord> {
        let mut all: Vec<TournamentRecord> = self.lock().tournaments.values().cloned().collect();
        all.sort_by_key(|t| t.created_at);
        all
    }

    /// Number of agent runs across all tournaments.
    pub fn agent_run_count(&self) -> usize {
        self.lock().runs.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn tournament_not_found(id: &TournamentId) -> StorageError {
    StorageError::TournamentNotFound {
        tournament_id: id.0.clone(),
    }
}

fn run_not_found(id: &AgentRunId) -> StorageError {
    StorageError::AgentRunNotFound {
        agent_run_id: id.0.clone(),
    }
}

#[async_trait]
impl TournamentStore for MemoryTournamentStore {
    async fn create_tournament(
        &self,
        hackathon_id: &str,
        agent_count: u32,
        config: serde_json::Value,
    ) -> StorageResult<TournamentRecord> {
        let record = TournamentRecord {
            tournament_id: TournamentId::new(),
            hackathon_id: hackathon_id.to_string(),
            status: TournamentStatus::Pending,
            agent_count,
            config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            winner_agent_run_id: None,
        };
        self.lock()
            .tournaments
            .insert(record.tournament_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_tournament(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<TournamentRecord> {
        self.lock()
            .tournaments
            .get(tournament_id)
            .cloned()
            .ok_or_else(|| tournament_not_found(tournament_id))
    }

    async fn start_tournament(&self, tournament_id: &TournamentId) -> StorageResult<()> {
        let mut tables = self.lock();
        let record = tables
            .tournaments
            .get_mut(tournament_id)
            .ok_or_else(|| tournament_not_found(tournament_id))?;
        if record.status != TournamentStatus::Pending {
            return Err(StorageError::InvalidTournamentState {
                tournament_id: tournament_id.0.clone(),
                status: record.status.to_string(),
                expected: TournamentStatus::Pending.to_string(),
            });
        }
        record.status = TournamentStatus::Running;
        record.started_at = Some(Utc::now());
        Ok(())
    }

    async fn finalize_tournament(
        &self,
        tournament_id: &TournamentId,
        status: TournamentStatus,
        winner: Option<&AgentRunId>,
    ) -> StorageResult<()> {
        if Self::take_fault(&self.failing_finalizes) {
            return Err(StorageError::Backend("injected finalize failure".into()));
        }
        if !status.is_terminal() {
            return Err(StorageError::InvalidTournamentTarget {
                status: status.to_string(),
            });
        }
        let mut tables = self.lock();
        if let Some(winner) = winner {
            let run = tables.runs.get(winner).ok_or_else(|| run_not_found(winner))?;
            check_winner(tournament_id, run)?;
        }
        let record = tables
            .tournaments
            .get_mut(tournament_id)
            .ok_or_else(|| tournament_not_found(tournament_id))?;
        if record.status != TournamentStatus::Running {
            return Err(StorageError::InvalidTournamentState {
                tournament_id: tournament_id.0.clone(),
                status: record.status.to_string(),
                expected: TournamentStatus::Running.to_string(),
            });
        }
        record.status = status;
        record.completed_at = Some(Utc::now());
        record.winner_agent_run_id = winner.cloned();
        Ok(())
    }

    async fn set_winner(
        &self,
        tournament_id: &TournamentId,
        winner: &AgentRunId,
    ) -> StorageResult<()> {
        let mut tables = self.lock();
        let run = tables.runs.get(winner).ok_or_else(|| run_not_found(winner))?;
        check_winner(tournament_id, run)?;
        let record = tables
            .tournaments
            .get_mut(tournament_id)
            .ok_or_else(|| tournament_not_found(tournament_id))?;
        record.winner_agent_run_id = Some(winner.clone());
        Ok(())
    }

    async fn create_agent_runs(
        &self,
        tournament_id: &TournamentId,
        roster: Vec<NewAgentRun>,
    ) -> StorageResult<Vec<AgentRunRecord>> {
        if Self::take_fault(&self.failing_rosters) {
            return Err(StorageError::Backend("injected roster failure".into()));
        }
        let mut tables = self.lock();
        let tournament = tables
            .tournaments
            .get(tournament_id)
            .ok_or_else(|| tournament_not_found(tournament_id))?;
        if tournament.status != TournamentStatus::Pending {
            return Err(StorageError::InvalidTournamentState {
                tournament_id: tournament_id.0.clone(),
                status: tournament.status.to_string(),
                expected: TournamentStatus::Pending.to_string(),
            });
        }

        let mut taken: Vec<u32> = tables
            .runs
            .values()
            .filter(|r| r.tournament_id == *tournament_id)
            .map(|r| r.agent_number)
            .collect();
        for entry in &roster {
            if taken.contains(&entry.agent_number) {
                return Err(StorageError::DuplicateAgentNumber {
                    tournament_id: tournament_id.0.clone(),
                    agent_number: entry.agent_number,
                });
            }
            taken.push(entry.agent_number);
        }

        let now = Utc::now();
        let mut created: Vec<AgentRunRecord> = roster
            .into_iter()
            .map(|entry| AgentRunRecord {
                agent_run_id: AgentRunId::new(),
                tournament_id: tournament_id.clone(),
                agent_number: entry.agent_number,
                personality: entry.personality,
                status: AgentRunStatus::Pending,
                selected_project_id: None,
                selected_sponsor_id: None,
                plan: None,
                code_changes: None,
                validation: None,
                error: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        created.sort_by_key(|r| r.agent_number);
        for record in &created {
            tables
                .runs
                .insert(record.agent_run_id.clone(), record.clone());
        }
        Ok(created)
    }

    async fn get_agent_run(&self, agent_run_id: &AgentRunId) -> StorageResult<AgentRunRecord> {
        self.lock()
            .runs
            .get(agent_run_id)
            .cloned()
            .ok_or_else(|| run_not_found(agent_run_id))
    }

    async fn list_agent_runs(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<AgentRunRecord>> {
        let tables = self.lock();
        if !tables.tournaments.contains_key(tournament_id) {
            return Err(tournament_not_found(tournament_id));
        }
        let mut runs: Vec<AgentRunRecord> = tables
            .runs
            .values()
            .filter(|r| r.tournament_id == *tournament_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.agent_number);
        Ok(runs)
    }

    async fn update_agent_run(
        &self,
        agent_run_id: &AgentRunId,
        update: AgentRunUpdate,
    ) -> StorageResult<()> {
        if Self::take_fault(&self.failing_updates) {
            return Err(StorageError::Backend("injected update failure".into()));
        }
        let mut tables = self.lock();
        let record = tables
            .runs
            .get_mut(agent_run_id)
            .ok_or_else(|| run_not_found(agent_run_id))?;
        check_run_transition(agent_run_id, record.status, update.status)?;
        update.apply_to(record);
        Ok(())
    }

    async fn append_step(&self, step: StepRecord) -> StorageResult<()> {
        if Self::take_fault(&self.failing_steps) {
            return Err(StorageError::Backend("injected step failure".into()));
        }
        let mut tables = self.lock();
        if !tables.runs.contains_key(&step.agent_run_id) {
            return Err(run_not_found(&step.agent_run_id));
        }
        let log = tables.steps.entry(step.agent_run_id.clone()).or_default();
        if log.iter().any(|s| s.seq == step.seq) {
            return Err(StorageError::DuplicateStep {
                agent_run_id: step.agent_run_id.0.clone(),
                seq: step.seq,
            });
        }
        log.push(step);
        Ok(())
    }

    async fn list_steps(&self, agent_run_id: &AgentRunId) -> StorageResult<Vec<StepRecord>> {
        let tables = self.lock();
        if !tables.runs.contains_key(agent_run_id) {
            return Err(run_not_found(agent_run_id));
        }
        let mut steps = tables.steps.get(agent_run_id).cloned().unwrap_or_default();
        steps.sort_by_key(|s| s.seq);
        Ok(steps)
    }
}
