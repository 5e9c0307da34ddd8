//! SurrealDB-backed TournamentStore implementation
//!
//! Uses the row types in `schema`, converting to/from `storage_traits` types
//! at the boundary.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{AgentRunRow, StepRow, TournamentRow};
use crate::storage_traits::*;

/// Default location of the embedded database when nothing else is configured.
pub const DEFAULT_LOCAL_PATH: &str = ".arena/db";

/// SurrealDB-backed implementation of [`TournamentStore`].
pub struct SurrealTournamentStore {
    db: Surreal<Any>,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn parse_enum<T: DeserializeOwned>(value: &str) -> StorageResult<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| StorageError::Backend(format!("unknown stored value: {value}")))
}

impl SurrealTournamentStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `arena/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`,
    /// `ws://host:port`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns("arena")
            .use_db("main")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!(url = %url, "SurrealTournamentStore connected");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Uses `SURREALDB_URL` when set, otherwise local persistence under
    /// [`DEFAULT_LOCAL_PATH`].
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return Self::connect(&url).await;
        }

        std::fs::create_dir_all(DEFAULT_LOCAL_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                DEFAULT_LOCAL_PATH, e
            ))
        })?;
        let url = format!("surrealkv://{}", DEFAULT_LOCAL_PATH);
        info!("No SURREALDB_URL found, using local persistence: {}", url);
        Self::connect(&url).await
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_tournament(&self, tid: &TournamentId) -> StorageResult<TournamentRow> {
        let mut res = self
            .db
            .query("SELECT * FROM tournaments WHERE tournament_id = $tid")
            .bind(("tid", tid.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<TournamentRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::TournamentNotFound {
                tournament_id: tid.0.clone(),
            })
    }

    async fn fetch_run(&self, rid: &AgentRunId) -> StorageResult<AgentRunRow> {
        let mut res = self
            .db
            .query("SELECT * FROM agent_runs WHERE agent_run_id = $rid")
            .bind(("rid", rid.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<AgentRunRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::AgentRunNotFound {
                agent_run_id: rid.0.clone(),
            })
    }

    async fn write_tournament(&self, row: TournamentRow) -> StorageResult<()> {
        let tid = row.tournament_id.clone();
        self.db
            .query("UPDATE tournaments CONTENT $row WHERE tournament_id = $tid")
            .bind(("row", row))
            .bind(("tid", tid))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn write_run(&self, row: AgentRunRow) -> StorageResult<()> {
        let rid = row.agent_run_id.clone();
        self.db
            .query("UPDATE agent_runs CONTENT $row WHERE agent_run_id = $rid")
            .bind(("row", row))
            .bind(("rid", rid))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn check_winner_row(
        &self,
        tid: &TournamentId,
        winner: &AgentRunId,
    ) -> StorageResult<()> {
        let run = Self::run_to_record(self.fetch_run(winner).await?)?;
        check_winner(tid, &run)
    }

    fn tournament_to_record(row: TournamentRow) -> StorageResult<TournamentRecord> {
        Ok(TournamentRecord {
            tournament_id: TournamentId(row.tournament_id),
            hackathon_id: row.hackathon_id,
            status: parse_enum(&row.status)?,
            agent_count: row.agent_count,
            config: row.config,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            winner_agent_run_id: row.winner_agent_run_id.map(AgentRunId),
        })
    }

    fn run_to_record(row: AgentRunRow) -> StorageResult<AgentRunRecord> {
        let validation = row
            .validation
            .map(serde_json::from_value::<ValidationSnapshot>)
            .transpose()?;
        Ok(AgentRunRecord {
            agent_run_id: AgentRunId(row.agent_run_id),
            tournament_id: TournamentId(row.tournament_id),
            agent_number: row.agent_number,
            personality: row.personality,
            status: parse_enum(&row.status)?,
            selected_project_id: row.selected_project_id,
            selected_sponsor_id: row.selected_sponsor_id,
            plan: row.plan,
            code_changes: row.code_changes,
            validation,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Write a domain record back over its row, keeping the SurrealDB id.
    fn record_into_row(record: AgentRunRecord, row: &mut AgentRunRow) -> StorageResult<()> {
        row.status = record.status.as_str().to_string();
        row.selected_project_id = record.selected_project_id;
        row.selected_sponsor_id = record.selected_sponsor_id;
        row.plan = record.plan;
        row.code_changes = record.code_changes;
        row.validation = record
            .validation
            .map(|v| serde_json::to_value(&v))
            .transpose()?;
        row.error = record.error;
        row.updated_at = record.updated_at;
        Ok(())
    }

    fn step_to_record(row: StepRow) -> StorageResult<StepRecord> {
        Ok(StepRecord {
            agent_run_id: AgentRunId(row.agent_run_id),
            seq: row.seq,
            kind: parse_enum(&row.kind)?,
            tool_name: row.tool_name,
            input: row.input,
            output: row.output,
            duration_ms: row.duration_ms,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl TournamentStore for SurrealTournamentStore {
    async fn create_tournament(
        &self,
        hackathon_id: &str,
        agent_count: u32,
        config: serde_json::Value,
    ) -> StorageResult<TournamentRecord> {
        let tid = TournamentId::new();
        let row = TournamentRow::new(tid.0.clone(), hackathon_id.to_string(), agent_count, config);

        debug!(tournament_id = %tid, "creating tournament");

        let _created: Option<TournamentRow> = self
            .db
            .create("tournaments")
            .content(row.clone())
            .await
            .map_err(backend)?;

        Self::tournament_to_record(row)
    }

    async fn get_tournament(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<TournamentRecord> {
        Self::tournament_to_record(self.fetch_tournament(tournament_id).await?)
    }

    async fn start_tournament(&self, tournament_id: &TournamentId) -> StorageResult<()> {
        let mut row = self.fetch_tournament(tournament_id).await?;
        if row.status != TournamentStatus::Pending.as_str() {
            return Err(StorageError::InvalidTournamentState {
                tournament_id: tournament_id.0.clone(),
                status: row.status,
                expected: TournamentStatus::Pending.to_string(),
            });
        }
        row.status = TournamentStatus::Running.as_str().to_string();
        row.started_at = Some(chrono::Utc::now());
        self.write_tournament(row).await
    }

    async fn finalize_tournament(
        &self,
        tournament_id: &TournamentId,
        status: TournamentStatus,
        winner: Option<&AgentRunId>,
    ) -> StorageResult<()> {
        if !status.is_terminal() {
            return Err(StorageError::InvalidTournamentTarget {
                status: status.to_string(),
            });
        }
        let mut row = self.fetch_tournament(tournament_id).await?;
        if row.status != TournamentStatus::Running.as_str() {
            return Err(StorageError::InvalidTournamentState {
                tournament_id: tournament_id.0.clone(),
                status: row.status,
                expected: TournamentStatus::Running.to_string(),
            });
        }
        if let Some(winner) = winner {
            self.check_winner_row(tournament_id, winner).await?;
        }
        row.status = status.as_str().to_string();
        row.completed_at = Some(chrono::Utc::now());
        row.winner_agent_run_id = winner.map(|w| w.0.clone());
        self.write_tournament(row).await
    }

    async fn set_winner(
        &self,
        tournament_id: &TournamentId,
        winner: &AgentRunId,
    ) -> StorageResult<()> {
        let mut row = self.fetch_tournament(tournament_id).await?;
        self.check_winner_row(tournament_id, winner).await?;
        row.winner_agent_run_id = Some(winner.0.clone());
        self.write_tournament(row).await
    }

    async fn create_agent_runs(
        &self,
        tournament_id: &TournamentId,
        roster: Vec<NewAgentRun>,
    ) -> StorageResult<Vec<AgentRunRecord>> {
        let tournament = self.fetch_tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::Pending.as_str() {
            return Err(StorageError::InvalidTournamentState {
                tournament_id: tournament_id.0.clone(),
                status: tournament.status,
                expected: TournamentStatus::Pending.to_string(),
            });
        }

        let existing = self.list_agent_runs(tournament_id).await?;
        let mut taken: Vec<u32> = existing.iter().map(|r| r.agent_number).collect();
        for entry in &roster {
            if taken.contains(&entry.agent_number) {
                return Err(StorageError::DuplicateAgentNumber {
                    tournament_id: tournament_id.0.clone(),
                    agent_number: entry.agent_number,
                });
            }
            taken.push(entry.agent_number);
        }

        let mut created = Vec::with_capacity(roster.len());
        for entry in roster {
            let row = AgentRunRow::new(
                AgentRunId::new().0,
                tournament_id.0.clone(),
                entry.agent_number,
                entry.personality,
            );
            let _created: Option<AgentRunRow> = self
                .db
                .create("agent_runs")
                .content(row.clone())
                .await
                .map_err(backend)?;
            created.push(Self::run_to_record(row)?);
        }
        created.sort_by_key(|r| r.agent_number);
        debug!(tournament_id = %tournament_id, count = created.len(), "created agent runs");
        Ok(created)
    }

    async fn get_agent_run(&self, agent_run_id: &AgentRunId) -> StorageResult<AgentRunRecord> {
        Self::run_to_record(self.fetch_run(agent_run_id).await?)
    }

    async fn list_agent_runs(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<AgentRunRecord>> {
        self.fetch_tournament(tournament_id).await?;

        let mut res = self
            .db
            .query("SELECT * FROM agent_runs WHERE tournament_id = $tid ORDER BY agent_number ASC")
            .bind(("tid", tournament_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<AgentRunRow> = res.take(0).map_err(backend)?;

        let mut runs = rows
            .into_iter()
            .map(Self::run_to_record)
            .collect::<StorageResult<Vec<_>>>()?;
        runs.sort_by_key(|r| r.agent_number);
        Ok(runs)
    }

    async fn update_agent_run(
        &self,
        agent_run_id: &AgentRunId,
        update: AgentRunUpdate,
    ) -> StorageResult<()> {
        let mut row = self.fetch_run(agent_run_id).await?;
        let mut record = Self::run_to_record(row.clone())?;
        check_run_transition(agent_run_id, record.status, update.status)?;
        update.apply_to(&mut record);
        Self::record_into_row(record, &mut row)?;
        self.write_run(row).await
    }

    async fn append_step(&self, step: StepRecord) -> StorageResult<()> {
        self.fetch_run(&step.agent_run_id).await?;

        let mut res = self
            .db
            .query("SELECT * FROM agent_steps WHERE agent_run_id = $rid AND seq = $seq")
            .bind(("rid", step.agent_run_id.0.clone()))
            .bind(("seq", step.seq))
            .await
            .map_err(backend)?;
        let existing: Vec<StepRow> = res.take(0).map_err(backend)?;
        if !existing.is_empty() {
            return Err(StorageError::DuplicateStep {
                agent_run_id: step.agent_run_id.0,
                seq: step.seq,
            });
        }

        let row = StepRow {
            id: None,
            agent_run_id: step.agent_run_id.0,
            seq: step.seq,
            kind: step.kind.as_str().to_string(),
            tool_name: step.tool_name,
            input: step.input,
            output: step.output,
            duration_ms: step.duration_ms,
            created_at: step.created_at,
        };
        let _created: Option<StepRow> = self
            .db
            .create("agent_steps")
            .content(row)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_steps(&self, agent_run_id: &AgentRunId) -> StorageResult<Vec<StepRecord>> {
        self.fetch_run(agent_run_id).await?;

        let mut res = self
            .db
            .query("SELECT * FROM agent_steps WHERE agent_run_id = $rid ORDER BY seq ASC")
            .bind(("rid", agent_run_id.0.clone()))
            .await
            .map_err(backend)?;
        let rows: Vec<StepRow> = res.take(0).map_err(backend)?;

        rows.into_iter().map(Self::step_to_record).collect()
    }
}
