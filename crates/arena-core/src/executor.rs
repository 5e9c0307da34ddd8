//! Agent Run Executor
//!
//! Drives one agent's bounded tool-calling loop. Every tool call and every
//! reasoning text becomes one step; tool calls move the agent status through
//! [`next_status`]. The run completes only when a validation passes after a
//! plan was submitted; any other ending fails the run with a message.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arena_sandbox::truncate_chars;
use arena_state::{
    AgentRunId, AgentRunRecord, AgentRunStatus, AgentRunUpdate, ContentDigest, StepKind,
    StepRecord, TournamentStore, ValidationSnapshot,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::config::ExecutorConfig;
use crate::domain::{personality_for, ArenaResult};
use crate::engine::{ReasoningEngine, ToolInvocation, TranscriptEntry};
use crate::metrics::METRICS;
use crate::obs;
use crate::phase::{next_status, CallPhase};
use crate::progress::{ProgressEntry, ProgressStore};
use crate::prompts::{system_prompt, INITIAL_PROMPT};
use crate::tools::{tool_specs, ToolBox, ToolCall, ToolOutput};
use crate::writer::{FinalWritePolicy, RunWriter};

const PROGRESS_SUMMARY_LIMIT: usize = 200;

/// Terminal result of one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentOutcome {
    pub agent_run_id: AgentRunId,
    pub agent_number: u32,
    pub status: AgentRunStatus,
    pub error: Option<String>,
    pub steps: u64,
}

enum Ending {
    Validated,
    EngineStopped,
    EngineFailed(String),
    BudgetExhausted,
}

pub struct AgentRunExecutor {
    store: Arc<dyn TournamentStore>,
    progress: Arc<ProgressStore>,
    tools: Arc<ToolBox>,
    config: ExecutorConfig,
}

impl AgentRunExecutor {
    pub fn new(
        store: Arc<dyn TournamentStore>,
        progress: Arc<ProgressStore>,
        tools: Arc<ToolBox>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            progress,
            tools,
            config,
        }
    }

    /// Run the agent to a terminal status.
    ///
    /// Returns an error only when the terminal status could not be stored.
    #[instrument(
        skip_all,
        fields(agent_run_id = %run.agent_run_id, agent_number = run.agent_number)
    )]
    pub async fn execute(
        &self,
        run: &AgentRunRecord,
        mut engine: Box<dyn ReasoningEngine>,
    ) -> ArenaResult<AgentOutcome> {
        let writer = RunWriter::spawn(
            self.store.clone(),
            run.agent_run_id.clone(),
            FinalWritePolicy {
                attempts: self.config.final_write_attempts,
                backoff_base: Duration::from_millis(self.config.final_write_backoff_ms),
            },
        );
        let mut state = RunState {
            executor: self,
            run,
            writer,
            status: run.status,
            seq: 0,
            plan_recorded: false,
            code_changes: BTreeMap::new(),
            durable: AgentRunUpdate::default(),
            passed_after_plan: false,
            last_failure: None,
        };

        let prompt = system_prompt(personality_for(run.agent_number), self.tools.hackathon());
        let declared = tool_specs();
        let mut transcript = vec![TranscriptEntry::User {
            text: INITIAL_PROMPT.to_string(),
        }];

        let mut ending = Ending::BudgetExhausted;
        for turn_idx in 0..self.config.max_steps {
            let turn = match engine.next_turn(&prompt, &declared, &transcript).await {
                Ok(turn) => turn,
                Err(e) => {
                    let message = e.to_string();
                    state.emit_step(StepKind::Error, None, None, json!({ "error": message }), None);
                    ending = Ending::EngineFailed(message);
                    break;
                }
            };

            if let Some(text) = turn.text.as_deref().filter(|t| !t.trim().is_empty()) {
                let text = truncate_chars(text, self.config.reasoning_output_limit);
                state.emit_step(
                    StepKind::ReasoningOutput,
                    None,
                    None,
                    json!({ "text": text }),
                    None,
                );
            }
            transcript.push(TranscriptEntry::Assistant {
                text: turn.text.clone(),
                tool_calls: turn.tool_calls.clone(),
            });

            if turn.tool_calls.is_empty() {
                debug!(turn = turn_idx, "engine ended the run");
                ending = Ending::EngineStopped;
                break;
            }
            for call in &turn.tool_calls {
                let (output, is_error) = state.handle_call(call).await;
                transcript.push(TranscriptEntry::ToolResult {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output,
                    is_error,
                });
                if state.passed_after_plan {
                    break;
                }
            }
            if state.passed_after_plan {
                ending = Ending::Validated;
                break;
            }
        }

        let final_update = match ending {
            Ending::Validated => AgentRunUpdate {
                status: Some(AgentRunStatus::Completed),
                ..state.durable.clone()
            },
            Ending::EngineFailed(message) => AgentRunUpdate::failed(message),
            Ending::EngineStopped => AgentRunUpdate::failed(state.stop_reason()),
            Ending::BudgetExhausted => AgentRunUpdate::failed(format!(
                "step budget of {} turns exhausted without a passing validation",
                self.config.max_steps
            )),
        };
        let status = final_update.status.unwrap_or(AgentRunStatus::Failed);
        let error = final_update.error.clone();
        let steps = state.seq;
        state.writer.finish(final_update).await?;

        obs::emit_agent_finished(&run.agent_run_id.0, run.agent_number, status.as_str(), steps);
        Ok(AgentOutcome {
            agent_run_id: run.agent_run_id.clone(),
            agent_number: run.agent_number,
            status,
            error,
            steps,
        })
    }
}

/// Mutable bookkeeping of one run in progress.
struct RunState<'a> {
    executor: &'a AgentRunExecutor,
    run: &'a AgentRunRecord,
    writer: RunWriter,
    status: AgentRunStatus,
    seq: u64,
    plan_recorded: bool,
    code_changes: BTreeMap<String, String>,
    /// Plan and latest validation fields, repeated in the terminal write so a
    /// `completed` run always carries its passing validation
    durable: AgentRunUpdate,
    passed_after_plan: bool,
    last_failure: Option<String>,
}

impl RunState<'_> {
    fn stop_reason(&self) -> String {
        let base = if self.plan_recorded {
            "agent stopped without a passing validation"
        } else {
            "agent stopped before submitting a plan"
        };
        match &self.last_failure {
            Some(failure) => format!("{base} (last failure: {failure})"),
            None => base.to_string(),
        }
    }

    /// Run one tool call. Returns the output handed back to the engine and
    /// whether it is an error.
    async fn handle_call(&mut self, invocation: &ToolInvocation) -> (Value, bool) {
        let call = match ToolCall::parse(&invocation.name, &invocation.input) {
            Ok(call) => call,
            Err(e) => {
                let output = json!({ "error": e.to_string() });
                self.emit_step(
                    StepKind::Error,
                    Some(&invocation.name),
                    Some(invocation.input.clone()),
                    output.clone(),
                    None,
                );
                self.last_failure = Some(e.to_string());
                return (output, true);
            }
        };

        let kind = call.kind();
        let started = next_status(self.status, kind, CallPhase::Start);
        if started != self.status {
            self.status = started;
            self.writer.update(AgentRunUpdate::status(started));
        }

        let clock = Instant::now();
        let result = self.executor.tools.invoke(&call).await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let mut update = self.side_effects(&call, &output);
                let finished = next_status(self.status, kind, CallPhase::Success);
                if finished != self.status {
                    self.status = finished;
                    update.status = Some(finished);
                }
                if update != AgentRunUpdate::default() {
                    self.writer.update(update);
                }
                let json = output.to_json();
                self.emit_step(
                    StepKind::ToolInvocation,
                    Some(kind.name()),
                    Some(invocation.input.clone()),
                    json.clone(),
                    Some(duration_ms),
                );
                (json, false)
            }
            Err(e) => {
                let output = json!({ "error": e.to_string() });
                self.emit_step(
                    StepKind::Error,
                    Some(kind.name()),
                    Some(invocation.input.clone()),
                    output.clone(),
                    Some(duration_ms),
                );
                self.last_failure = Some(e.to_string());
                (output, true)
            }
        }
    }

    /// Fields recorded on the run after a successful call.
    fn side_effects(&mut self, call: &ToolCall, output: &ToolOutput) -> AgentRunUpdate {
        let mut update = AgentRunUpdate::default();
        match (call, output) {
            (ToolCall::SubmitPlan(plan), _) => {
                if self.plan_recorded {
                    debug!(agent_run_id = %self.run.agent_run_id, "later plan ignored");
                    return update;
                }
                self.plan_recorded = true;
                update.selected_project_id = Some(plan.project_id.clone());
                update.selected_sponsor_id = Some(plan.sponsor_id.clone());
                update.plan = Some(
                    serde_json::to_string_pretty(plan)
                        .unwrap_or_else(|_| plan.plan_summary.clone()),
                );
                self.durable.selected_project_id = update.selected_project_id.clone();
                self.durable.selected_sponsor_id = update.selected_sponsor_id.clone();
                self.durable.plan = update.plan.clone();
                info!(
                    agent_run_id = %self.run.agent_run_id,
                    project_id = %plan.project_id,
                    sponsor_id = %plan.sponsor_id,
                    "plan recorded"
                );
            }
            (ToolCall::WriteAndTestCode(input), ToolOutput::Validation(result)) => {
                let changes = input.changes();
                let digest = ContentDigest::of_changes(&changes);
                self.code_changes.extend(changes);
                update.code_changes = Some(self.code_changes.clone());
                update.validation = Some(ValidationSnapshot {
                    success: result.success,
                    exit_code: result.exit_code,
                    stdout: result.stdout.clone(),
                    stderr: result.stderr.clone(),
                    runtime: result.runtime.as_str().to_string(),
                    environment_id: result.environment_id.clone(),
                    timed_out: result.timed_out,
                    duration_ms: result.duration_ms,
                    changes_digest: Some(digest),
                });
                self.durable.code_changes = update.code_changes.clone();
                self.durable.validation = update.validation.clone();
                if result.success && self.plan_recorded {
                    self.passed_after_plan = true;
                } else if !result.success {
                    self.last_failure = Some(format!(
                        "validation exited with code {}{}",
                        result.exit_code,
                        if result.timed_out { " (timed out)" } else { "" }
                    ));
                } else {
                    self.last_failure =
                        Some("validation passed before a plan was submitted".to_string());
                }
            }
            _ => {}
        }
        update
    }

    fn emit_step(
        &mut self,
        kind: StepKind,
        tool_name: Option<&str>,
        input: Option<Value>,
        output: Value,
        duration_ms: Option<u64>,
    ) {
        self.seq += 1;
        let now = Utc::now();
        let summary = summarize(&output);
        self.executor.progress.record(
            &self.run.tournament_id,
            ProgressEntry {
                agent_run_id: self.run.agent_run_id.clone(),
                agent_number: self.run.agent_number,
                seq: self.seq,
                kind,
                tool_name: tool_name.map(str::to_string),
                status: self.status,
                summary,
                recorded_at: now,
            },
        );
        self.writer.step(StepRecord {
            agent_run_id: self.run.agent_run_id.clone(),
            seq: self.seq,
            kind,
            tool_name: tool_name.map(str::to_string),
            input,
            output: Some(output),
            duration_ms,
            created_at: now,
        });
        METRICS.inc_steps_emitted();
        obs::emit_step_recorded(&self.run.agent_run_id.0, self.seq, kind.as_str(), tool_name);
    }
}

/// One-line rendering of a step output for pollers.
fn summarize(output: &Value) -> Option<String> {
    let text = if let Some(error) = output.get("error").and_then(Value::as_str) {
        format!("error: {error}")
    } else if let Some(text) = output.get("text").and_then(Value::as_str) {
        text.to_string()
    } else if let Some(count) = output.get("count") {
        format!("{count} project(s) found")
    } else if let Some(success) = output.get("success").and_then(Value::as_bool) {
        let code = output.get("exit_code").cloned().unwrap_or(Value::Null);
        format!("validation {} (exit {code})", if success { "passed" } else { "failed" })
    } else if let Some(status) = output.get("status").and_then(Value::as_str) {
        status.to_string()
    } else if let Some(name) = output
        .get("sponsor_name")
        .or_else(|| output.get("name"))
        .and_then(Value::as_str)
    {
        name.to_string()
    } else {
        return None;
    };
    Some(truncate_chars(&text, PROGRESS_SUMMARY_LIMIT))
}
