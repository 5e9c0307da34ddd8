//! Error taxonomy for arena orchestration.

use arena_state::StorageError;

/// Arena orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("hackathon {hackathon_id} has no eligible sponsors")]
    NoEligibleCandidates { hackathon_id: String },

    #[error("hackathon not found: {0}")]
    HackathonNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(
        "final status write for agent run {agent_run_id} failed after {attempts} attempt(s): {reason}"
    )]
    FinalWrite {
        agent_run_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("reasoning engine unavailable for agent {agent_number}: {reason}")]
    EngineUnavailable { agent_number: u32, reason: String },

    #[error("agent run {agent_run_id} does not belong to tournament {tournament_id}")]
    ForeignAgentRun {
        tournament_id: String,
        agent_run_id: String,
    },

    #[error("tournament {tournament_id} is {status}; winner override needs a finished tournament")]
    TournamentNotFinished {
        tournament_id: String,
        status: String,
    },

    #[error("agent run {agent_run_id} is {status}; only completed runs can win")]
    IneligibleWinner { agent_run_id: String, status: String },

    #[error("background task failed: {0}")]
    Task(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for arena operations.
pub type ArenaResult<T> = std::result::Result<T, ArenaError>;
