//! Storage trait definitions for the arena
//!
//! `TournamentStore` is the durable-storage boundary of the orchestrator:
//! tournaments, their agent runs, and the append-only step log of every run.
//!
//! The trait is async and backend-agnostic. An in-memory fake lives in the
//! `fakes` module and a SurrealDB backend in `surreal_store`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a tournament
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TournamentId(pub String);

impl TournamentId {
    /// Generate a new random TournamentId
    pub fn new() -> Self {
        TournamentId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TournamentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TournamentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one agent's attempt within a tournament
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentRunId(pub String);

impl AgentRunId {
    /// Generate a new random AgentRunId
    pub fn new() -> Self {
        AgentRunId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AgentRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of a path → content map, independent of insertion order.
    pub fn of_changes(changes: &BTreeMap<String, String>) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        for (path, content) in changes {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
            hasher.update([0u8]);
        }
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle of a tournament.
///
/// Legal transitions: `Pending → Running → Completed | Failed`.
/// `Evaluating` is a reserved value kept for schema compatibility; no store
/// accepts it as a transition target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Pending,
    Running,
    Evaluating,
    Completed,
    Failed,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Pending => "pending",
            TournamentStatus::Running => "running",
            TournamentStatus::Evaluating => "evaluating",
            TournamentStatus::Completed => "completed",
            TournamentStatus::Failed => "failed",
        }
    }

    /// Terminal statuses never change again (winner override aside).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TournamentStatus::Completed | TournamentStatus::Failed)
    }
}

impl std::fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of one agent run.
///
/// Ordered by [`AgentRunStatus::rank`]:
/// `pending < {selecting, researching, planning, coding} < testing < {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Pending,
    Selecting,
    Researching,
    Planning,
    Coding,
    Testing,
    Completed,
    Failed,
}

impl AgentRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRunStatus::Pending => "pending",
            AgentRunStatus::Selecting => "selecting",
            AgentRunStatus::Researching => "researching",
            AgentRunStatus::Planning => "planning",
            AgentRunStatus::Coding => "coding",
            AgentRunStatus::Testing => "testing",
            AgentRunStatus::Completed => "completed",
            AgentRunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentRunStatus::Completed | AgentRunStatus::Failed)
    }

    /// Position in the partial order. Statuses sharing a rank are unordered
    /// with respect to each other.
    pub fn rank(&self) -> u8 {
        match self {
            AgentRunStatus::Pending => 0,
            AgentRunStatus::Selecting
            | AgentRunStatus::Researching
            | AgentRunStatus::Planning
            | AgentRunStatus::Coding => 1,
            AgentRunStatus::Testing => 2,
            AgentRunStatus::Completed | AgentRunStatus::Failed => 3,
        }
    }

    /// Whether a run currently in `self` may be moved to `next`.
    pub fn can_advance_to(&self, next: AgentRunStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ToolInvocation,
    ReasoningOutput,
    Error,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ToolInvocation => "tool_invocation",
            StepKind::ReasoningOutput => "reasoning_output",
            StepKind::Error => "error",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One contest instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub tournament_id: TournamentId,
    /// Hackathon this tournament runs against
    pub hackathon_id: String,
    pub status: TournamentStatus,
    pub agent_count: u32,
    /// Snapshot of the configuration the tournament was launched with
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub winner_agent_run_id: Option<AgentRunId>,
}

/// Snapshot of one validation attempt, kept on the agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSnapshot {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub runtime: String,
    pub environment_id: String,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub duration_ms: u64,
    /// Digest of the file changes that were validated
    #[serde(default)]
    pub changes_digest: Option<ContentDigest>,
}

/// One agent's attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunRecord {
    pub agent_run_id: AgentRunId,
    pub tournament_id: TournamentId,
    /// Ordinal position, 1..=N, unique within the tournament
    pub agent_number: u32,
    pub personality: String,
    pub status: AgentRunStatus,
    pub selected_project_id: Option<String>,
    pub selected_sponsor_id: Option<String>,
    pub plan: Option<String>,
    pub code_changes: Option<BTreeMap<String, String>>,
    pub validation: Option<ValidationSnapshot>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Roster entry used when creating agent runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgentRun {
    pub agent_number: u32,
    pub personality: String,
}

/// Partial update of an agent run. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentRunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_sponsor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_changes: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentRunUpdate {
    /// Update that only moves the status.
    pub fn status(status: AgentRunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Terminal `failed` update carrying an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(AgentRunStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Apply this patch to a record in place.
    pub fn apply_to(self, record: &mut AgentRunRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(v) = self.selected_project_id {
            record.selected_project_id = Some(v);
        }
        if let Some(v) = self.selected_sponsor_id {
            record.selected_sponsor_id = Some(v);
        }
        if let Some(v) = self.plan {
            record.plan = Some(v);
        }
        if let Some(v) = self.code_changes {
            record.code_changes = Some(v);
        }
        if let Some(v) = self.validation {
            record.validation = Some(v);
        }
        if let Some(v) = self.error {
            record.error = Some(v);
        }
        record.updated_at = Utc::now();
    }
}

/// One atomic unit of agent activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub agent_run_id: AgentRunId,
    /// Strictly increasing within one agent run
    pub seq: u64,
    pub kind: StepKind,
    pub tool_name: Option<String>,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// TournamentStore
// ---------------------------------------------------------------------------

/// Durable tournament storage.
///
/// Guarantees:
/// - Tournaments move `Pending → Running → Completed | Failed` only.
/// - A recorded winner is always a `Completed` run of the same tournament.
/// - Agent numbers are unique within a tournament.
/// - Agent runs never leave a terminal status, and never move down in rank.
/// - `(agent_run_id, seq)` is unique in the step log; `list_steps` is sorted by seq.
#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Create a tournament in `Pending`.
    async fn create_tournament(
        &self,
        hackathon_id: &str,
        agent_count: u32,
        config: serde_json::Value,
    ) -> StorageResult<TournamentRecord>;

    /// Retrieve a tournament by ID.
    async fn get_tournament(&self, tournament_id: &TournamentId)
        -> StorageResult<TournamentRecord>;

    /// Move a pending tournament to `Running` and stamp `started_at`.
    async fn start_tournament(&self, tournament_id: &TournamentId) -> StorageResult<()>;

    /// Move a running tournament to a terminal status, stamping `completed_at`
    /// and recording the default winner.
    async fn finalize_tournament(
        &self,
        tournament_id: &TournamentId,
        status: TournamentStatus,
        winner: Option<&AgentRunId>,
    ) -> StorageResult<()>;

    /// Overwrite the recorded winner (last write wins).
    async fn set_winner(
        &self,
        tournament_id: &TournamentId,
        winner: &AgentRunId,
    ) -> StorageResult<()>;

    /// Create the roster of a pending tournament. Returns records ordered by
    /// agent number.
    async fn create_agent_runs(
        &self,
        tournament_id: &TournamentId,
        roster: Vec<NewAgentRun>,
    ) -> StorageResult<Vec<AgentRunRecord>>;

    /// Retrieve an agent run by ID.
    async fn get_agent_run(&self, agent_run_id: &AgentRunId) -> StorageResult<AgentRunRecord>;

    /// All runs of a tournament ordered by agent number.
    async fn list_agent_runs(
        &self,
        tournament_id: &TournamentId,
    ) -> StorageResult<Vec<AgentRunRecord>>;

    /// Apply a partial update. Fails if the run is already terminal or the
    /// status would move down in rank.
    async fn update_agent_run(
        &self,
        agent_run_id: &AgentRunId,
        update: AgentRunUpdate,
    ) -> StorageResult<()>;

    /// Append a step to the run's log.
    async fn append_step(&self, step: StepRecord) -> StorageResult<()>;

    /// All steps of a run ordered by seq.
    async fn list_steps(&self, agent_run_id: &AgentRunId) -> StorageResult<Vec<StepRecord>>;
}

/// Check a status change against the run's current status.
pub(crate) fn check_run_transition(
    agent_run_id: &AgentRunId,
    current: AgentRunStatus,
    next: Option<AgentRunStatus>,
) -> StorageResult<()> {
    if current.is_terminal() {
        return Err(StorageError::InvalidRunState {
            agent_run_id: agent_run_id.0.clone(),
            status: current.to_string(),
        });
    }
    if let Some(next) = next {
        if !current.can_advance_to(next) {
            return Err(StorageError::InvalidTransition {
                agent_run_id: agent_run_id.0.clone(),
                from: current.to_string(),
                to: next.to_string(),
            });
        }
    }
    Ok(())
}

/// Check that `winner` may be recorded as the winner of `tournament_id`.
pub(crate) fn check_winner(
    tournament_id: &TournamentId,
    winner: &AgentRunRecord,
) -> StorageResult<()> {
    if winner.tournament_id != *tournament_id {
        return Err(StorageError::InvalidWinner {
            tournament_id: tournament_id.0.clone(),
            agent_run_id: winner.agent_run_id.0.clone(),
            reason: "agent run belongs to another tournament".to_string(),
        });
    }
    if winner.status != AgentRunStatus::Completed {
        return Err(StorageError::InvalidWinner {
            tournament_id: tournament_id.0.clone(),
            agent_run_id: winner.agent_run_id.0.clone(),
            reason: format!("agent run is {}, not completed", winner.status),
        });
    }
    Ok(())
}
