//! Per-run asynchronous write queue.
//!
//! Status and step writes of one agent run go through a single queue so they
//! reach the store in emission order without blocking the agent loop.
//! Intermediate writes are fire-and-forget: failures are logged and counted.
//! The terminal write goes through the same queue, is retried with
//! exponential backoff and is awaited by [`RunWriter::finish`].

use std::sync::Arc;
use std::time::Duration;

use arena_state::{
    AgentRunId, AgentRunUpdate, StepRecord, TournamentId, TournamentStatus, TournamentStore,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{ArenaError, ArenaResult};
use crate::metrics::METRICS;
use crate::obs;

/// Retry policy of the terminal write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalWritePolicy {
    pub attempts: u32,
    pub backoff_base: Duration,
}

impl Default for FinalWritePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base: Duration::from_millis(200),
        }
    }
}

enum WriteOp {
    Update(AgentRunUpdate),
    Step(StepRecord),
    Final {
        update: AgentRunUpdate,
        ack: oneshot::Sender<ArenaResult<()>>,
    },
}

/// Write queue bound to one agent run.
pub struct RunWriter {
    agent_run_id: AgentRunId,
    tx: mpsc::UnboundedSender<WriteOp>,
    worker: JoinHandle<()>,
}

impl RunWriter {
    pub fn spawn(
        store: Arc<dyn TournamentStore>,
        agent_run_id: AgentRunId,
        policy: FinalWritePolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(drain(store, agent_run_id.clone(), policy, rx));
        Self {
            agent_run_id,
            tx,
            worker,
        }
    }

    pub fn update(&self, update: AgentRunUpdate) {
        self.send(WriteOp::Update(update));
    }

    pub fn step(&self, step: StepRecord) {
        self.send(WriteOp::Step(step));
    }

    fn send(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            METRICS.inc_store_write_failures();
            obs::emit_store_write_failed(&self.agent_run_id.0, "enqueue", &"writer stopped");
        }
    }

    /// Enqueue the terminal update behind every earlier write and wait until
    /// it is stored.
    pub async fn finish(self, update: AgentRunUpdate) -> ArenaResult<()> {
        let (ack, done) = oneshot::channel();
        let stopped = |reason: &str| ArenaError::FinalWrite {
            agent_run_id: self.agent_run_id.to_string(),
            attempts: 0,
            reason: reason.to_string(),
        };
        self.tx
            .send(WriteOp::Final { update, ack })
            .map_err(|_| stopped("writer stopped"))?;
        let result = done.await.map_err(|_| stopped("writer dropped the final write"))?;
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!(agent_run_id = %self.agent_run_id, error = %e, "run writer task failed");
        }
        result
    }
}

async fn drain(
    store: Arc<dyn TournamentStore>,
    agent_run_id: AgentRunId,
    policy: FinalWritePolicy,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Update(update) => {
                if let Err(e) = store.update_agent_run(&agent_run_id, update).await {
                    METRICS.inc_store_write_failures();
                    obs::emit_store_write_failed(&agent_run_id.0, "update", &e);
                }
            }
            WriteOp::Step(step) => {
                let seq = step.seq;
                match store.append_step(step).await {
                    Ok(()) => debug!(agent_run_id = %agent_run_id, seq, "step stored"),
                    Err(e) => {
                        METRICS.inc_store_write_failures();
                        obs::emit_store_write_failed(&agent_run_id.0, "append_step", &e);
                    }
                }
            }
            WriteOp::Final { update, ack } => {
                let result = write_terminal(store.as_ref(), &agent_run_id, update, policy).await;
                let _ = ack.send(result);
                break;
            }
        }
    }
}

/// Store a terminal update, retrying transient failures with exponential
/// backoff.
pub async fn write_terminal(
    store: &dyn TournamentStore,
    agent_run_id: &AgentRunId,
    update: AgentRunUpdate,
    policy: FinalWritePolicy,
) -> ArenaResult<()> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match store.update_agent_run(agent_run_id, update.clone()).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_transient() && attempt < attempts => {
                METRICS.inc_store_write_failures();
                let delay = policy.backoff_base * 2u32.pow(attempt - 1);
                warn!(
                    agent_run_id = %agent_run_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "terminal write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                METRICS.inc_store_write_failures();
                obs::emit_store_write_failed(&agent_run_id.0, "final", &e);
                return Err(ArenaError::FinalWrite {
                    agent_run_id: agent_run_id.to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Record the tournament's final status, retrying transient failures with
/// the same backoff as [`write_terminal`].
pub async fn finalize_tournament(
    store: &dyn TournamentStore,
    tournament_id: &TournamentId,
    status: TournamentStatus,
    winner: Option<&AgentRunId>,
    policy: FinalWritePolicy,
) -> ArenaResult<()> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match store
            .finalize_tournament(tournament_id, status, winner)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < attempts => {
                METRICS.inc_store_write_failures();
                let delay = policy.backoff_base * 2u32.pow(attempt - 1);
                warn!(
                    tournament_id = %tournament_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "tournament finalization failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                METRICS.inc_store_write_failures();
                obs::emit_store_write_failed(&tournament_id.0, "finalize", &e);
                return Err(e.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_state::{
        AgentRunStatus, MemoryTournamentStore, NewAgentRun, StepKind, StorageError, TournamentId,
    };
    use chrono::Utc;

    async fn seeded() -> (Arc<MemoryTournamentStore>, TournamentId, AgentRunId) {
        let store = Arc::new(MemoryTournamentStore::new());
        let t = store
            .create_tournament("h1", 1, serde_json::json!({}))
            .await
            .unwrap();
        let runs = store
            .create_agent_runs(
                &t.tournament_id,
                vec![NewAgentRun {
                    agent_number: 1,
                    personality: "The Pragmatist".to_string(),
                }],
            )
            .await
            .unwrap();
        store.start_tournament(&t.tournament_id).await.unwrap();
        (store, t.tournament_id, runs[0].agent_run_id.clone())
    }

    fn step(run: &AgentRunId, seq: u64) -> StepRecord {
        StepRecord {
            agent_run_id: run.clone(),
            seq,
            kind: StepKind::ReasoningOutput,
            tool_name: None,
            input: None,
            output: Some(serde_json::json!({"text": "hi"})),
            duration_ms: None,
            created_at: Utc::now(),
        }
    }

    fn fast() -> FinalWritePolicy {
        FinalWritePolicy {
            attempts: 3,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_writes_land_before_final() {
        let (store, _, run) = seeded().await;
        let writer = RunWriter::spawn(store.clone(), run.clone(), fast());
        writer.update(AgentRunUpdate::status(AgentRunStatus::Selecting));
        writer.step(step(&run, 1));
        writer.update(AgentRunUpdate::status(AgentRunStatus::Coding));
        writer.step(step(&run, 2));
        writer
            .finish(AgentRunUpdate::status(AgentRunStatus::Completed))
            .await
            .unwrap();

        let record = store.get_agent_run(&run).await.unwrap();
        assert_eq!(record.status, AgentRunStatus::Completed);
        let seqs: Vec<u64> = store
            .list_steps(&run)
            .await
            .unwrap()
            .iter()
            .map(|s| s.seq)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_final_write_retries_transient_failures() {
        let (store, _, run) = seeded().await;
        store.fail_next_updates(2);
        write_terminal(store.as_ref(), &run, AgentRunUpdate::failed("boom"), fast())
            .await
            .unwrap();
        let record = store.get_agent_run(&run).await.unwrap();
        assert_eq!(record.status, AgentRunStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_final_write_gives_up_after_attempts() {
        let (store, _, run) = seeded().await;
        store.fail_next_updates(5);
        let err = write_terminal(store.as_ref(), &run, AgentRunUpdate::failed("x"), fast())
            .await
            .unwrap_err();
        match err {
            ArenaError::FinalWrite { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_final_write_does_not_retry_rejections() {
        let (store, _, run) = seeded().await;
        store
            .update_agent_run(&run, AgentRunUpdate::status(AgentRunStatus::Completed))
            .await
            .unwrap();
        let err = write_terminal(store.as_ref(), &run, AgentRunUpdate::failed("late"), fast())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::FinalWrite { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_failed_intermediate_writes_do_not_block() {
        let (store, _, run) = seeded().await;
        store.fail_next_steps(1);
        let writer = RunWriter::spawn(store.clone(), run.clone(), fast());
        writer.step(step(&run, 1));
        writer.step(step(&run, 2));
        writer
            .finish(AgentRunUpdate::status(AgentRunStatus::Completed))
            .await
            .unwrap();
        let steps = store.list_steps(&run).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].seq, 2);
        // Backend failures are transient; rejections are not.
        assert!(StorageError::Backend("x".into()).is_transient());
    }

    #[tokio::test]
    async fn test_finalize_retries_transient_failures() {
        let (store, tid, _) = seeded().await;
        store.fail_next_finalizes(2);
        finalize_tournament(store.as_ref(), &tid, TournamentStatus::Failed, None, fast())
            .await
            .unwrap();
        let t = store.get_tournament(&tid).await.unwrap();
        assert_eq!(t.status, TournamentStatus::Failed);
        assert!(t.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_finalize_gives_up_after_attempts() {
        let (store, tid, _) = seeded().await;
        store.fail_next_finalizes(5);
        let err = finalize_tournament(store.as_ref(), &tid, TournamentStatus::Failed, None, fast())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::Storage(StorageError::Backend(_))));
        let t = store.get_tournament(&tid).await.unwrap();
        assert_eq!(t.status, TournamentStatus::Running);
    }
}
