//! Arena configuration (TOML).
//!
//! Every field has a default; a missing file yields [`ArenaConfig::default`].

use std::path::Path;
use std::time::Duration;

use arena_sandbox::EnvironmentConfig;
use serde::{Deserialize, Serialize};

use crate::domain::{ArenaError, ArenaResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub tournament: TournamentConfig,
    pub executor: ExecutorConfig,
    pub progress: ProgressConfig,
    pub environment: EnvironmentConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub agent_count: u32,
    /// Overall wall-clock bound in seconds; 0 waits for every agent
    pub timeout_secs: u64,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            agent_count: 10,
            timeout_secs: 0,
        }
    }
}

impl TournamentConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Reasoning turns per agent
    pub max_steps: u32,
    /// Characters kept from each reasoning output
    pub reasoning_output_limit: usize,
    pub final_write_attempts: u32,
    pub final_write_backoff_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            reasoning_output_limit: 2000,
            final_write_attempts: 3,
            final_write_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub high_water: usize,
    pub low_water: usize,
    /// How long a closed bucket stays readable
    pub grace_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            high_water: 5000,
            low_water: 2500,
            grace_secs: 900,
        }
    }
}

impl ArenaConfig {
    pub fn validate(&self) -> ArenaResult<()> {
        let invalid = |msg: &str| Err(ArenaError::InvalidConfig(msg.to_string()));
        if self.tournament.agent_count == 0 {
            return invalid("tournament.agent_count must be >= 1");
        }
        if self.executor.max_steps == 0 {
            return invalid("executor.max_steps must be >= 1");
        }
        if self.executor.final_write_attempts == 0 {
            return invalid("executor.final_write_attempts must be >= 1");
        }
        if self.progress.low_water >= self.progress.high_water {
            return invalid("progress.low_water must be < progress.high_water");
        }
        let env = &self.environment;
        if env.lifetime_secs == 0 || env.install_secs == 0 || env.verify_secs == 0 {
            return invalid("environment timeouts must be > 0");
        }
        if env.output_limit == 0 {
            return invalid("environment.output_limit must be > 0");
        }
        Ok(())
    }

    pub fn from_toml(text: &str) -> ArenaResult<Self> {
        let config: ArenaConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> ArenaResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}
