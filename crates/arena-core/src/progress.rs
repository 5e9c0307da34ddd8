//! Progress Store
//!
//! In-process, per-tournament ordered buffer of step events. Executors write
//! concurrently; pollers read the most recent entries for live status.
//!
//! Buckets follow the tournament lifecycle: [`ProgressStore::open`] at
//! start, [`ProgressStore::close`] at finalization, removal by
//! [`ProgressStore::sweep_expired`] once closed for longer than the grace
//! period. Everything here is best-effort and lost on restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arena_state::{AgentRunId, AgentRunStatus, StepKind, TournamentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::config::ProgressConfig;
use crate::metrics::METRICS;

/// One step event as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub agent_run_id: AgentRunId,
    pub agent_number: u32,
    pub seq: u64,
    pub kind: StepKind,
    pub tool_name: Option<String>,
    /// Agent status after the step
    pub status: AgentRunStatus,
    /// Short human-readable rendering of the step output
    pub summary: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Bucket {
    entries: VecDeque<ProgressEntry>,
    highest_seq: HashMap<AgentRunId, u64>,
    closed_at: Option<Instant>,
}

/// Registry of per-tournament progress buckets.
#[derive(Debug)]
pub struct ProgressStore {
    config: ProgressConfig,
    buckets: Mutex<HashMap<TournamentId, Bucket>>,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(ProgressConfig::default())
    }
}

impl ProgressStore {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TournamentId, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open an empty bucket. Reopening a known tournament keeps its entries.
    pub fn open(&self, tournament_id: &TournamentId) {
        let mut buckets = self.lock();
        let bucket = buckets.entry(tournament_id.clone()).or_default();
        bucket.closed_at = None;
    }

    /// Append an entry. Returns `false` when it was dropped: unknown
    /// tournament, or a sequence number not above the highest already
    /// recorded for that agent run.
    pub fn record(&self, tournament_id: &TournamentId, entry: ProgressEntry) -> bool {
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(tournament_id) else {
            METRICS.inc_progress_dropped();
            return false;
        };

        let highest = bucket.highest_seq.get(&entry.agent_run_id).copied();
        if highest.is_some_and(|h| entry.seq <= h) {
            METRICS.inc_progress_dropped();
            return false;
        }
        bucket
            .highest_seq
            .insert(entry.agent_run_id.clone(), entry.seq);
        bucket.entries.push_back(entry);

        if bucket.entries.len() > self.config.high_water {
            let excess = bucket.entries.len() - self.config.low_water;
            bucket.entries.drain(..excess);
            debug!(tournament_id = %tournament_id, evicted = excess, "progress bucket trimmed");
        }
        true
    }

    /// The most recent `limit` entries, oldest first.
    pub fn read(&self, tournament_id: &TournamentId, limit: usize) -> Vec<ProgressEntry> {
        let buckets = self.lock();
        let Some(bucket) = buckets.get(tournament_id) else {
            return Vec::new();
        };
        let skip = bucket.entries.len().saturating_sub(limit);
        bucket.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self, tournament_id: &TournamentId) -> usize {
        self.lock()
            .get(tournament_id)
            .map_or(0, |bucket| bucket.entries.len())
    }

    pub fn is_open(&self, tournament_id: &TournamentId) -> bool {
        self.lock()
            .get(tournament_id)
            .is_some_and(|bucket| bucket.closed_at.is_none())
    }

    /// Mark a bucket closed. It stays readable until swept.
    pub fn close(&self, tournament_id: &TournamentId) {
        if let Some(bucket) = self.lock().get_mut(tournament_id) {
            bucket.closed_at.get_or_insert_with(Instant::now);
        }
    }

    /// Remove buckets closed for longer than the grace period. Returns the
    /// number removed.
    pub fn sweep_expired(&self) -> usize {
        let grace = Duration::from_secs(self.config.grace_secs);
        let now = Instant::now();
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| match bucket.closed_at {
            Some(closed_at) => now.duration_since(closed_at) < grace,
            None => true,
        });
        before - buckets.len()
    }
}
