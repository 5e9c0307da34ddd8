//! Domain models for the arena.
//!
//! - `Personality`: static behavioral profile by ordinal
//! - `HackathonContext`, `Sponsor`, `ProjectDetails`: what agents work on
//! - `ArenaError`: orchestration error taxonomy

pub mod error;
pub mod hackathon;
pub mod personality;

pub use error::{ArenaError, ArenaResult};
pub use hackathon::{HackathonContext, ProjectDetails, ProjectSummary, Sponsor};
pub use personality::{personality_for, Personality, PERSONALITIES};
