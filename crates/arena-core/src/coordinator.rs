//! Tournament Coordinator
//!
//! Creates the roster, launches one executor task per agent, joins them and
//! finalizes the tournament. Per-agent failures (engine errors, panics,
//! missing engines) are recorded on that agent and never reach siblings.

use std::sync::Arc;
use std::time::Instant;

use arena_sandbox::ExecutionEnvironmentManager;
use arena_state::{
    AgentRunId, AgentRunRecord, AgentRunStatus, AgentRunUpdate, NewAgentRun, StepRecord,
    StorageError, StorageResult, TournamentId, TournamentRecord, TournamentStatus,
    TournamentStore,
};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, instrument, warn, Instrument};

use crate::config::ArenaConfig;
use crate::domain::{personality_for, ArenaError, ArenaResult};
use crate::engine::EngineFactory;
use crate::executor::{AgentOutcome, AgentRunExecutor};
use crate::metrics::METRICS;
use crate::obs;
use crate::progress::{ProgressEntry, ProgressStore};
use crate::tools::{CatalogError, ProjectCatalog, SponsorCatalog, ToolBox};
use crate::writer::{finalize_tournament, write_terminal, FinalWritePolicy};

pub const DEFAULT_PROGRESS_LIMIT: usize = 800;
pub const MIN_PROGRESS_LIMIT: usize = 50;
pub const MAX_PROGRESS_LIMIT: usize = 2000;

/// External collaborators of the coordinator.
pub struct ArenaServices {
    pub store: Arc<dyn TournamentStore>,
    pub projects: Arc<dyn ProjectCatalog>,
    pub sponsors: Arc<dyn SponsorCatalog>,
    pub engines: Arc<dyn EngineFactory>,
    pub environments: Arc<ExecutionEnvironmentManager>,
}

/// Handle on a launched tournament.
pub struct TournamentLaunch {
    pub tournament_id: TournamentId,
    /// Resolves once every agent is joined and the tournament is finalized
    pub join: JoinHandle<ArenaResult<TournamentSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TournamentSummary {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
    pub winner_agent_run_id: Option<AgentRunId>,
    pub completed_count: usize,
    /// Outcomes of the agents joined before finalization
    pub agents: Vec<AgentOutcome>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TournamentStatusView {
    pub tournament: TournamentRecord,
    pub agents: Vec<AgentRunRecord>,
    pub completed_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRunDetail {
    pub run: AgentRunRecord,
    /// Sorted by sequence number, one entry per sequence number
    pub steps: Vec<StepRecord>,
    pub is_winner: bool,
}

struct AgentTask {
    agent_run_id: AgentRunId,
    agent_number: u32,
    handle: JoinHandle<ArenaResult<AgentOutcome>>,
}

#[derive(Clone)]
pub struct TournamentCoordinator {
    store: Arc<dyn TournamentStore>,
    projects: Arc<dyn ProjectCatalog>,
    sponsors: Arc<dyn SponsorCatalog>,
    engines: Arc<dyn EngineFactory>,
    environments: Arc<ExecutionEnvironmentManager>,
    progress: Arc<ProgressStore>,
    config: Arc<ArenaConfig>,
}

impl TournamentCoordinator {
    pub fn new(services: ArenaServices, config: ArenaConfig) -> Self {
        Self {
            store: services.store,
            projects: services.projects,
            sponsors: services.sponsors,
            engines: services.engines,
            environments: services.environments,
            progress: Arc::new(ProgressStore::new(config.progress.clone())),
            config: Arc::new(config),
        }
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    fn final_write_policy(&self) -> FinalWritePolicy {
        FinalWritePolicy {
            attempts: self.config.executor.final_write_attempts,
            backoff_base: std::time::Duration::from_millis(
                self.config.executor.final_write_backoff_ms,
            ),
        }
    }

    /// Create the tournament and its roster and launch every agent.
    ///
    /// Fails before creating any record when the hackathon is unknown or
    /// has no sponsors.
    #[instrument(skip(self), fields(agent_count = self.config.tournament.agent_count))]
    pub async fn start_tournament(&self, hackathon_id: &str) -> ArenaResult<TournamentLaunch> {
        let hackathon = self
            .sponsors
            .hackathon(hackathon_id)
            .await
            .map_err(|e| match e {
                CatalogError::HackathonNotFound(id) => ArenaError::HackathonNotFound(id),
                other => ArenaError::Catalog(other.to_string()),
            })?;
        if hackathon.sponsors.is_empty() {
            return Err(ArenaError::NoEligibleCandidates {
                hackathon_id: hackathon_id.to_string(),
            });
        }

        let agent_count = self.config.tournament.agent_count;
        let snapshot = serde_json::to_value(self.config.as_ref())?;
        let tournament = self
            .store
            .create_tournament(hackathon_id, agent_count, snapshot)
            .await?;
        let tournament_id = tournament.tournament_id;

        let runs = match self.enroll(&tournament_id, agent_count).await {
            Ok(runs) => runs,
            Err(e) => {
                self.abandon(&tournament_id, &e).await;
                return Err(e.into());
            }
        };

        self.progress.sweep_expired();
        self.progress.open(&tournament_id);
        obs::emit_tournament_started(&tournament_id.0, hackathon_id, agent_count);

        let tools = Arc::new(ToolBox::new(
            Arc::new(hackathon),
            self.projects.clone(),
            self.sponsors.clone(),
            self.environments.clone(),
        ));
        let executor = Arc::new(AgentRunExecutor::new(
            self.store.clone(),
            self.progress.clone(),
            tools,
            self.config.executor.clone(),
        ));

        let mut tasks = Vec::with_capacity(runs.len());
        for run in runs {
            let executor = executor.clone();
            let engines = self.engines.clone();
            let span = tracing::info_span!(
                "arena.agent",
                tournament_id = %tournament_id,
                agent_number = run.agent_number
            );
            let agent_run_id = run.agent_run_id.clone();
            let agent_number = run.agent_number;
            let handle = tokio::spawn(
                async move {
                    let engine = engines
                        .create(run.agent_number, personality_for(run.agent_number))
                        .map_err(|e| ArenaError::EngineUnavailable {
                            agent_number: run.agent_number,
                            reason: e.to_string(),
                        })?;
                    executor.execute(&run, engine).await
                }
                .instrument(span),
            );
            tasks.push(AgentTask {
                agent_run_id,
                agent_number,
                handle,
            });
        }

        let this = self.clone();
        let id = tournament_id.clone();
        let started = Instant::now();
        let join = tokio::spawn(
            async move { this.join_and_finalize(id, tasks, started).await }.instrument(
                tracing::info_span!("arena.tournament", tournament_id = %tournament_id),
            ),
        );
        Ok(TournamentLaunch {
            tournament_id,
            join,
        })
    }

    /// Create the roster and move the tournament to `running`.
    async fn enroll(
        &self,
        tournament_id: &TournamentId,
        agent_count: u32,
    ) -> StorageResult<Vec<AgentRunRecord>> {
        let roster = (1..=agent_count)
            .map(|n| NewAgentRun {
                agent_number: n,
                personality: personality_for(n).name.to_string(),
            })
            .collect();
        let runs = self.store.create_agent_runs(tournament_id, roster).await?;
        self.store.start_tournament(tournament_id).await?;
        Ok(runs)
    }

    /// Best-effort: mark a tournament that never launched as `failed`, along
    /// with any agent runs already created for it.
    async fn abandon(&self, tournament_id: &TournamentId, cause: &StorageError) {
        warn!(tournament_id = %tournament_id, error = %cause, "tournament setup failed, abandoning");
        let result: StorageResult<()> = async {
            let runs = self.store.list_agent_runs(tournament_id).await?;
            for run in runs.iter().filter(|r| !r.status.is_terminal()) {
                self.store
                    .update_agent_run(
                        &run.agent_run_id,
                        AgentRunUpdate::failed(format!("tournament setup failed: {cause}")),
                    )
                    .await?;
            }
            let tournament = self.store.get_tournament(tournament_id).await?;
            if tournament.status == TournamentStatus::Pending {
                self.store.start_tournament(tournament_id).await?;
            }
            self.store
                .finalize_tournament(tournament_id, TournamentStatus::Failed, None)
                .await
        }
        .await;
        if let Err(e) = result {
            error!(tournament_id = %tournament_id, error = %e, "could not mark abandoned tournament failed");
        }
    }

    /// Start a tournament and wait for its summary.
    pub async fn run_tournament(&self, hackathon_id: &str) -> ArenaResult<TournamentSummary> {
        let launch = self.start_tournament(hackathon_id).await?;
        launch
            .join
            .await
            .map_err(|e| ArenaError::Task(e.to_string()))?
    }

    async fn join_and_finalize(
        self,
        tournament_id: TournamentId,
        tasks: Vec<AgentTask>,
        started: Instant,
    ) -> ArenaResult<TournamentSummary> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        let joined = self.join_agents(tasks, &mut outcomes);
        match self.config.tournament.timeout() {
            None => joined.await,
            Some(limit) => {
                if tokio::time::timeout(limit, joined).await.is_err() {
                    warn!(
                        tournament_id = %tournament_id,
                        limit_secs = limit.as_secs(),
                        joined = outcomes.len(),
                        "tournament timeout elapsed, finalizing without waiting for remaining agents"
                    );
                }
            }
        }
        self.finalize(&tournament_id, outcomes, started).await
    }

    /// Await each agent in roster order, pushing outcomes as they land so a
    /// timeout keeps the ones already joined.
    async fn join_agents(&self, tasks: Vec<AgentTask>, outcomes: &mut Vec<AgentOutcome>) {
        for task in tasks {
            let outcome = match task.handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    self.record_failure(task.agent_run_id, task.agent_number, e.to_string())
                        .await
                }
                Err(join_err) => {
                    let message = join_error_message(join_err);
                    error!(agent_number = task.agent_number, error = %message, "agent task aborted");
                    self.record_failure(task.agent_run_id, task.agent_number, message)
                        .await
                }
            };
            outcomes.push(outcome);
        }
    }

    /// Mark an agent `failed` on behalf of an executor that could not.
    async fn record_failure(
        &self,
        agent_run_id: AgentRunId,
        agent_number: u32,
        message: String,
    ) -> AgentOutcome {
        warn!(agent_run_id = %agent_run_id, agent_number, error = %message, "agent failed");
        if let Ok(current) = self.store.get_agent_run(&agent_run_id).await {
            if current.status.is_terminal() {
                return AgentOutcome {
                    agent_run_id,
                    agent_number,
                    status: current.status,
                    error: current.error.or(Some(message)),
                    steps: 0,
                };
            }
        }
        let update = AgentRunUpdate::failed(message.clone());
        if let Err(e) = write_terminal(
            self.store.as_ref(),
            &agent_run_id,
            update,
            self.final_write_policy(),
        )
        .await
        {
            error!(agent_run_id = %agent_run_id, error = %e, "could not record agent failure");
        }
        obs::emit_agent_finished(&agent_run_id.0, agent_number, "failed", 0);
        AgentOutcome {
            agent_run_id,
            agent_number,
            status: AgentRunStatus::Failed,
            error: Some(message),
            steps: 0,
        }
    }

    async fn finalize(
        &self,
        tournament_id: &TournamentId,
        outcomes: Vec<AgentOutcome>,
        started: Instant,
    ) -> ArenaResult<TournamentSummary> {
        let mut completed: Vec<(u32, AgentRunId)> =
            match self.store.list_agent_runs(tournament_id).await {
                Ok(runs) => runs
                    .into_iter()
                    .filter(|r| r.status == AgentRunStatus::Completed)
                    .map(|r| (r.agent_number, r.agent_run_id))
                    .collect(),
                Err(e) => {
                    warn!(tournament_id = %tournament_id, error = %e, "roster read failed, using joined outcomes");
                    outcomes
                        .iter()
                        .filter(|o| o.status == AgentRunStatus::Completed)
                        .map(|o| (o.agent_number, o.agent_run_id.clone()))
                        .collect()
                }
            };
        completed.sort_by_key(|(number, _)| *number);

        let winner = completed.first().map(|(_, id)| id.clone());
        let status = if winner.is_some() {
            TournamentStatus::Completed
        } else {
            TournamentStatus::Failed
        };
        let finalized = finalize_tournament(
            self.store.as_ref(),
            tournament_id,
            status,
            winner.as_ref(),
            self.final_write_policy(),
        )
        .await;
        self.progress.close(tournament_id);
        finalized?;

        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_tournament_finalized(
            &tournament_id.0,
            status.as_str(),
            completed.len(),
            winner.as_ref().map(|w| w.0.as_str()),
            duration_ms,
        );
        METRICS.flush();

        Ok(TournamentSummary {
            tournament_id: tournament_id.clone(),
            status,
            winner_agent_run_id: winner,
            completed_count: completed.len(),
            agents: outcomes,
            duration_ms,
        })
    }

    pub async fn tournament_status(
        &self,
        tournament_id: &TournamentId,
    ) -> ArenaResult<TournamentStatusView> {
        let tournament = self.store.get_tournament(tournament_id).await?;
        let agents = self.store.list_agent_runs(tournament_id).await?;
        let completed_count = agents
            .iter()
            .filter(|a| a.status == AgentRunStatus::Completed)
            .count();
        Ok(TournamentStatusView {
            tournament,
            agents,
            completed_count,
        })
    }

    /// Most recent progress entries, oldest first. `limit` defaults to
    /// [`DEFAULT_PROGRESS_LIMIT`] and is clamped to
    /// [`MIN_PROGRESS_LIMIT`]..=[`MAX_PROGRESS_LIMIT`].
    pub fn recent_progress(
        &self,
        tournament_id: &TournamentId,
        limit: Option<usize>,
    ) -> Vec<ProgressEntry> {
        let limit = limit
            .unwrap_or(DEFAULT_PROGRESS_LIMIT)
            .clamp(MIN_PROGRESS_LIMIT, MAX_PROGRESS_LIMIT);
        self.progress.read(tournament_id, limit)
    }

    /// Set the winner by hand. Idempotent; the last call wins.
    #[instrument(skip(self), fields(tournament_id = %tournament_id, agent_run_id = %agent_run_id))]
    pub async fn override_winner(
        &self,
        tournament_id: &TournamentId,
        agent_run_id: &AgentRunId,
    ) -> ArenaResult<TournamentRecord> {
        let tournament = self.store.get_tournament(tournament_id).await?;
        if !tournament.status.is_terminal() {
            return Err(ArenaError::TournamentNotFinished {
                tournament_id: tournament_id.to_string(),
                status: tournament.status.to_string(),
            });
        }
        let run = self.store.get_agent_run(agent_run_id).await?;
        if run.tournament_id != *tournament_id {
            return Err(ArenaError::ForeignAgentRun {
                tournament_id: tournament_id.to_string(),
                agent_run_id: agent_run_id.to_string(),
            });
        }
        if run.status != AgentRunStatus::Completed {
            return Err(ArenaError::IneligibleWinner {
                agent_run_id: agent_run_id.to_string(),
                status: run.status.to_string(),
            });
        }

        self.store.set_winner(tournament_id, agent_run_id).await?;
        obs::emit_winner_overridden(&tournament_id.0, &agent_run_id.0);
        info!("winner overridden");
        Ok(self.store.get_tournament(tournament_id).await?)
    }

    pub async fn agent_run_detail(
        &self,
        tournament_id: &TournamentId,
        agent_run_id: &AgentRunId,
    ) -> ArenaResult<AgentRunDetail> {
        let tournament = self.store.get_tournament(tournament_id).await?;
        let run = self.store.get_agent_run(agent_run_id).await?;
        if run.tournament_id != *tournament_id {
            return Err(ArenaError::ForeignAgentRun {
                tournament_id: tournament_id.to_string(),
                agent_run_id: agent_run_id.to_string(),
            });
        }
        let mut steps = self.store.list_steps(agent_run_id).await?;
        steps.sort_by_key(|s| s.seq);
        steps.dedup_by_key(|s| s.seq);
        Ok(AgentRunDetail {
            is_winner: tournament.winner_agent_run_id.as_ref() == Some(agent_run_id),
            run,
            steps,
        })
    }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "agent task was cancelled".to_string();
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("agent task panicked: {detail}")
}
