//! Error types for arena-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by [`crate::TournamentStore`] operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("tournament not found: {tournament_id}")]
    TournamentNotFound { tournament_id: String },

    #[error("agent run not found: {agent_run_id}")]
    AgentRunNotFound { agent_run_id: String },

    #[error("tournament {tournament_id} is {status}, expected {expected}")]
    InvalidTournamentState {
        tournament_id: String,
        status: String,
        expected: String,
    },

    #[error("tournament status {status} is not a valid transition target")]
    InvalidTournamentTarget { status: String },

    #[error("agent run {agent_run_id} is already {status}")]
    InvalidRunState { agent_run_id: String, status: String },

    #[error("agent run {agent_run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        agent_run_id: String,
        from: String,
        to: String,
    },

    #[error("agent run {agent_run_id} cannot win tournament {tournament_id}: {reason}")]
    InvalidWinner {
        tournament_id: String,
        agent_run_id: String,
        reason: String,
    },

    #[error("agent number {agent_number} already exists in tournament {tournament_id}")]
    DuplicateAgentNumber {
        tournament_id: String,
        agent_number: u32,
    },

    #[error("step {seq} already recorded for agent run {agent_run_id}")]
    DuplicateStep { agent_run_id: String, seq: u64 },

    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the same call could succeed.
    ///
    /// Only backend failures are transient; every other variant reflects the
    /// stored state and would fail again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}
