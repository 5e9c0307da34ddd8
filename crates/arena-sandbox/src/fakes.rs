//! Scriptable in-memory provider for tests
//!
//! `FakeProvider` records every provision, write, command and teardown so
//! tests can assert on the environment lifecycle without git or containers.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EnvError, EnvResult};
use crate::provider::{CommandOutput, CommandSpec, Environment, EnvironmentProvider, ProvisionSpec};
use crate::runtime::Runtime;

/// Lifecycle event observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Provisioned { env_id: String, runtime: Runtime },
    Wrote { env_id: String, path: String },
    Ran { env_id: String, command: String },
    TornDown { env_id: String },
}

/// Scripted result of one command
#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Simulated run time; a delay longer than the timeout times out
    pub delay: Duration,
    pub panic: bool,
}

impl ScriptedCommand {
    pub fn exit(exit_code: i32) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            delay: Duration::ZERO,
            panic: false,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Panic inside `Environment::run`.
    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::exit(0)
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    repo_files: BTreeSet<String>,
    commands: HashMap<String, ScriptedCommand>,
    provision_error: Option<String>,
    events: Vec<FakeEvent>,
    next_id: u32,
}

/// In-memory [`EnvironmentProvider`]
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the cloned repository contains `path`.
    pub fn with_file(self, path: &str) -> Self {
        self.state.lock().unwrap().repo_files.insert(path.to_string());
        self
    }

    /// Script the result of a command line (e.g. `"npm run build"`).
    /// Unscripted commands exit 0 with empty output.
    pub fn with_command(self, line: &str, result: ScriptedCommand) -> Self {
        self.state
            .lock()
            .unwrap()
            .commands
            .insert(line.to_string(), result);
        self
    }

    /// Make every provision fail.
    pub fn failing_provision(self, reason: &str) -> Self {
        self.state.lock().unwrap().provision_error = Some(reason.to_string());
        self
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Runtimes provisioned, in order.
    pub fn provisions(&self) -> Vec<Runtime> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Provisioned { runtime, .. } => Some(runtime),
                _ => None,
            })
            .collect()
    }

    pub fn teardown_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, FakeEvent::TornDown { .. }))
            .count()
    }

    /// Command lines run, in order.
    pub fn commands_run(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Ran { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: FakeEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl EnvironmentProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn provision(&self, spec: &ProvisionSpec) -> EnvResult<Box<dyn Environment>> {
        let env_id = {
            let mut state = self.state.lock().unwrap();
            if let Some(reason) = &state.provision_error {
                return Err(EnvError::Provision {
                    source_url: spec.source_url.clone(),
                    reason: reason.clone(),
                });
            }
            state.next_id += 1;
            format!("fake-{}", state.next_id)
        };
        self.record(FakeEvent::Provisioned {
            env_id: env_id.clone(),
            runtime: spec.runtime,
        });
        Ok(Box::new(FakeEnvironment {
            id: env_id,
            runtime: spec.runtime,
            provider: self.clone(),
            torn_down: Mutex::new(false),
        }))
    }
}

#[derive(Debug)]
struct FakeEnvironment {
    id: String,
    runtime: Runtime,
    provider: FakeProvider,
    torn_down: Mutex<bool>,
}

#[async_trait]
impl Environment for FakeEnvironment {
    fn id(&self) -> &str {
        &self.id
    }

    fn runtime(&self) -> Runtime {
        self.runtime
    }

    async fn file_exists(&self, path: &str) -> EnvResult<bool> {
        Ok(self.provider.state.lock().unwrap().repo_files.contains(path))
    }

    async fn write_file(&self, path: &Path, _content: &str) -> EnvResult<()> {
        let path = path.to_string_lossy().to_string();
        self.provider.state.lock().unwrap().repo_files.insert(path.clone());
        self.provider.record(FakeEvent::Wrote {
            env_id: self.id.clone(),
            path,
        });
        Ok(())
    }

    async fn run(&self, command: &CommandSpec, timeout: Duration) -> EnvResult<CommandOutput> {
        let line = command.to_string();
        self.provider.record(FakeEvent::Ran {
            env_id: self.id.clone(),
            command: line.clone(),
        });
        let scripted = self
            .provider
            .state
            .lock()
            .unwrap()
            .commands
            .get(&line)
            .cloned()
            .unwrap_or_else(|| ScriptedCommand::exit(0));

        if scripted.panic {
            panic!("scripted panic in `{line}`");
        }
        if scripted.delay > timeout {
            tokio::time::sleep(timeout).await;
            return Ok(CommandOutput::timed_out(timeout, timeout.as_millis() as u64));
        }
        tokio::time::sleep(scripted.delay).await;
        Ok(CommandOutput {
            exit_code: scripted.exit_code,
            stdout: scripted.stdout,
            stderr: scripted.stderr,
            timed_out: false,
            duration_ms: scripted.delay.as_millis() as u64,
        })
    }

    async fn teardown(&self) -> EnvResult<()> {
        let mut torn_down = self.torn_down.lock().unwrap();
        if !*torn_down {
            *torn_down = true;
            self.provider.record(FakeEvent::TornDown {
                env_id: self.id.clone(),
            });
        }
        Ok(())
    }
}
