//! Arena Core Library
//!
//! Orchestration of agent tournaments: the coordinator that fans out one
//! executor per agent, the per-agent phase machine, the live progress log
//! and the tools agents call.
//!
//! ## Layer 1 - Orchestration
//!
//! ## Key Components
//!
//! - `TournamentCoordinator`: start, join, finalize, winner override
//! - `AgentRunExecutor`: bounded tool-calling loop of one agent
//! - `ProgressStore`: bounded per-tournament step log for pollers
//! - `ToolBox`: typed tool dispatch over catalogs and the environment manager

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod executor;
pub mod metrics;
pub mod obs;
pub mod phase;
pub mod progress;
pub mod prompts;
pub mod telemetry;
pub mod tools;
pub mod writer;

pub use config::{ArenaConfig, ExecutorConfig, ProgressConfig, TournamentConfig};
pub use coordinator::{
    AgentRunDetail, ArenaServices, TournamentCoordinator, TournamentLaunch, TournamentStatusView,
    TournamentSummary,
};
pub use domain::{
    personality_for, ArenaError, ArenaResult, HackathonContext, Personality, ProjectDetails,
    ProjectSummary, Sponsor, PERSONALITIES,
};
pub use engine::{
    EngineError, EngineFactory, EngineTurn, ReasoningEngine, ScriptedEngine,
    ScriptedEngineFactory, ScriptedTurn, ToolInvocation, TranscriptEntry,
};
pub use executor::{AgentOutcome, AgentRunExecutor};
pub use obs::{
    emit_agent_finished, emit_step_recorded, emit_store_write_failed, emit_tournament_finalized,
    emit_tournament_started, emit_winner_overridden, TournamentSpan,
};
pub use phase::{next_status, CallPhase};
pub use progress::{ProgressEntry, ProgressStore};
pub use tools::{
    tool_specs, CatalogError, HttpSponsorDocs, ProjectCatalog, SponsorCatalog, StaticCatalog,
    ToolBox, ToolCall, ToolError, ToolKind, ToolOutput, ToolSpec,
};
pub use writer::{FinalWritePolicy, RunWriter};
