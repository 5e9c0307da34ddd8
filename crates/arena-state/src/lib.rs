//! Arena-State: durable storage for agent tournaments
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: data integrity and the lifecycle rules of tournaments, agent runs
//! and their step logs.
//!
//! ## Key Components
//!
//! - `TournamentStore`: async storage trait
//! - `MemoryTournamentStore`: in-memory implementation with fault injection
//! - `SurrealTournamentStore`: SurrealDB implementation (`mem://`, `surrealkv://`, `ws://`)

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use fakes::MemoryTournamentStore;
pub use storage_traits::{
    AgentRunId, AgentRunRecord, AgentRunStatus, AgentRunUpdate, ContentDigest, NewAgentRun,
    StepKind, StepRecord, StorageResult, TournamentId, TournamentRecord, TournamentStatus,
    TournamentStore, ValidationSnapshot,
};
pub use surreal_store::SurrealTournamentStore;

/// Result type for arena-state connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
