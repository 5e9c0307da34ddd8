//! Execution Environment Manager
//!
//! One [`ExecutionEnvironmentManager::validate`] call provisions a fresh
//! environment, settles its runtime, installs dependencies, applies the file
//! changes, runs the verification command and tears the environment down.
//!
//! Teardown happens on every exit path: success, error, timeout and panic.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{EnvError, EnvResult};
use crate::provider::{
    normalize_path, truncate_chars, CommandOutput, CommandSpec, Environment, EnvironmentProvider,
    ProvisionSpec,
};
use crate::runtime::{detect_runtime, install_command, Runtime};

/// Time and size bounds for validations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Upper bound on one environment's life, provisioning included
    pub lifetime_secs: u64,
    pub install_secs: u64,
    pub verify_secs: u64,
    /// Characters kept from each of stdout and stderr
    pub output_limit: usize,
    pub install_dependencies: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: 300,
            install_secs: 120,
            verify_secs: 60,
            output_limit: 4000,
            install_dependencies: true,
        }
    }
}

/// One file to write before verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

/// Input of [`ExecutionEnvironmentManager::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub source_url: String,
    pub files: Vec<FileChange>,
    pub command: String,
}

/// Outcome of one validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub runtime: Runtime,
    pub environment_id: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Runs validations in disposable environments
pub struct ExecutionEnvironmentManager {
    provider: Arc<dyn EnvironmentProvider>,
    config: EnvironmentConfig,
}

impl ExecutionEnvironmentManager {
    pub fn new(provider: Arc<dyn EnvironmentProvider>, config: EnvironmentConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Validate file changes against a repository.
    ///
    /// Errors: invalid command or paths (before provisioning) and
    /// provisioning failures. Install failures are logged and ignored;
    /// verification failures and timeouts are reported in the result.
    #[instrument(
        skip(self, request),
        fields(provider = self.provider.name(), source = %request.source_url, files = request.files.len())
    )]
    pub async fn validate(&self, request: ValidationRequest) -> EnvResult<ExecutionResult> {
        let command = CommandSpec::parse(&request.command)?;
        if request.files.is_empty() {
            return Err(EnvError::NoFiles);
        }
        let files = request
            .files
            .iter()
            .map(|f| Ok((normalize_path(&f.path)?, f.content.as_str())))
            .collect::<EnvResult<Vec<(PathBuf, &str)>>>()?;

        let started = Instant::now();
        let lifetime = Duration::from_secs(self.config.lifetime_secs);

        let mut env = self.provision(&request.source_url, Runtime::Node).await?;

        let detected = match guarded(env.as_ref(), detect_runtime(env.as_ref())).await {
            Ok(runtime) => runtime,
            Err(e) => {
                teardown(env).await;
                return Err(e);
            }
        };
        if detected != env.runtime() {
            info!(from = %env.runtime(), to = %detected, "re-provisioning for detected runtime");
            teardown(env).await;
            env = self.provision(&request.source_url, detected).await?;
        }

        let remaining = lifetime.saturating_sub(started.elapsed());
        let work = self.prepare_and_verify(env.as_ref(), &files, &command);
        let outcome = guarded(env.as_ref(), async {
            match tokio::time::timeout(remaining, work).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    warn!(limit_secs = lifetime.as_secs(), "environment lifetime exceeded");
                    Ok(CommandOutput::timed_out(lifetime, 0))
                }
            }
        })
        .await;

        let runtime = env.runtime();
        let environment_id = env.id().to_string();
        teardown(env).await;

        let output = outcome?;
        let limit = self.config.output_limit;
        let result = ExecutionResult {
            success: output.success(),
            exit_code: output.exit_code,
            stdout: truncate_chars(&output.stdout, limit),
            stderr: truncate_chars(&output.stderr, limit),
            runtime,
            environment_id,
            timed_out: output.timed_out,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            success = result.success,
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            runtime = %result.runtime,
            "validation finished"
        );
        Ok(result)
    }

    async fn provision(&self, source_url: &str, runtime: Runtime) -> EnvResult<Box<dyn Environment>> {
        let spec = ProvisionSpec {
            source_url: source_url.to_string(),
            runtime,
            lifetime: Duration::from_secs(self.config.lifetime_secs),
        };
        self.provider.provision(&spec).await.inspect_err(|e| {
            warn!(error = %e, runtime = %runtime, "provisioning failed");
        })
    }

    async fn prepare_and_verify(
        &self,
        env: &dyn Environment,
        files: &[(PathBuf, &str)],
        command: &CommandSpec,
    ) -> EnvResult<CommandOutput> {
        if self.config.install_dependencies {
            self.install(env).await;
        }

        for (path, content) in files {
            env.write_file(path, content).await?;
        }
        debug!(count = files.len(), "file changes written");

        let verify = Duration::from_secs(self.config.verify_secs);
        match env.run(command, verify).await {
            Ok(output) => Ok(output),
            // A command that cannot start is a failed verification, not an error.
            Err(EnvError::Spawn { command, reason }) => Ok(CommandOutput {
                exit_code: 127,
                stdout: String::new(),
                stderr: format!("failed to start `{command}`: {reason}"),
                timed_out: false,
                duration_ms: 0,
            }),
            Err(e) => Err(e),
        }
    }

    async fn install(&self, env: &dyn Environment) {
        let command = match install_command(env).await {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "cannot determine install command");
                return;
            }
        };
        let limit = Duration::from_secs(self.config.install_secs);
        match env.run(&command, limit).await {
            Ok(out) if out.success() => debug!(command = %command, "dependencies installed"),
            Ok(out) => warn!(
                command = %command,
                exit_code = out.exit_code,
                timed_out = out.timed_out,
                "dependency install failed, continuing"
            ),
            Err(e) => warn!(command = %command, error = %e, "dependency install failed, continuing"),
        }
    }
}

/// Await `fut`; if it panics, tear `env` down before resuming the panic.
async fn guarded<T>(env: &dyn Environment, fut: impl Future<Output = EnvResult<T>>) -> EnvResult<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            warn!(env_id = %env.id(), "panic during validation, tearing down");
            if let Err(e) = env.teardown().await {
                warn!(env_id = %env.id(), error = %e, "teardown failed");
            }
            std::panic::resume_unwind(panic)
        }
    }
}

async fn teardown(env: Box<dyn Environment>) {
    match env.teardown().await {
        Ok(()) => debug!(env_id = %env.id(), "environment torn down"),
        Err(e) => warn!(env_id = %env.id(), error = %e, "teardown failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeEvent, FakeProvider, ScriptedCommand};

    fn manager(provider: &FakeProvider) -> ExecutionEnvironmentManager {
        ExecutionEnvironmentManager::new(Arc::new(provider.clone()), EnvironmentConfig::default())
    }

    fn request(command: &str) -> ValidationRequest {
        ValidationRequest {
            source_url: "https://github.com/acme/app".to_string(),
            files: vec![FileChange {
                path: "src/index.js".to_string(),
                content: "console.log('hi')".to_string(),
            }],
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn test_node_repo_is_not_reprovisioned() {
        let provider = FakeProvider::new()
            .with_file("package.json")
            .with_command("npm run build", ScriptedCommand::exit(0).with_stdout("built"));

        let result = manager(&provider).validate(request("npm run build")).await.unwrap();

        assert!(result.success);
        assert_eq!(result.runtime, Runtime::Node);
        assert_eq!(result.stdout, "built");
        assert_eq!(provider.provisions(), vec![Runtime::Node]);
        assert_eq!(provider.teardown_count(), 1);
        assert_eq!(
            provider.commands_run(),
            vec!["npm install --legacy-peer-deps", "npm run build"]
        );
    }

    #[tokio::test]
    async fn test_python_repo_tears_down_node_before_reprovisioning() {
        let provider = FakeProvider::new().with_file("requirements.txt");

        let result = manager(&provider).validate(request("pytest")).await.unwrap();

        assert_eq!(result.runtime, Runtime::Python);
        let events = provider.events();
        let lifecycle: Vec<&FakeEvent> = events
            .iter()
            .filter(|e| !matches!(e, FakeEvent::Ran { .. } | FakeEvent::Wrote { .. }))
            .collect();
        assert_eq!(
            lifecycle,
            vec![
                &FakeEvent::Provisioned {
                    env_id: "fake-1".into(),
                    runtime: Runtime::Node
                },
                &FakeEvent::TornDown {
                    env_id: "fake-1".into()
                },
                &FakeEvent::Provisioned {
                    env_id: "fake-2".into(),
                    runtime: Runtime::Python
                },
                &FakeEvent::TornDown {
                    env_id: "fake-2".into()
                },
            ]
        );
        assert_eq!(result.environment_id, "fake-2");
        assert_eq!(
            provider.commands_run(),
            vec!["pip install -r requirements.txt", "pytest"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_timeout_is_failed_result() {
        let provider = FakeProvider::new().with_file("package.json").with_command(
            "npm test",
            ScriptedCommand::exit(0).with_delay(Duration::from_secs(600)),
        );

        let result = manager(&provider).validate(request("npm test")).await.unwrap();

        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.exit_code, -1);
        assert_eq!(provider.teardown_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifetime_bounds_install_plus_verify() {
        let provider = FakeProvider::new()
            .with_file("package.json")
            .with_command(
                "npm install --legacy-peer-deps",
                ScriptedCommand::exit(0).with_delay(Duration::from_secs(110)),
            )
            .with_command(
                "npm test",
                ScriptedCommand::exit(0).with_delay(Duration::from_secs(50)),
            );
        let config = EnvironmentConfig {
            lifetime_secs: 120,
            ..EnvironmentConfig::default()
        };
        let manager = ExecutionEnvironmentManager::new(Arc::new(provider.clone()), config);

        let result = manager.validate(request("npm test")).await.unwrap();

        assert!(result.timed_out);
        assert!(!result.success);
        assert_eq!(provider.teardown_count(), 1);
    }

    #[tokio::test]
    async fn test_install_failure_is_tolerated() {
        let provider = FakeProvider::new()
            .with_file("package.json")
            .with_command(
                "npm install --legacy-peer-deps",
                ScriptedCommand::exit(1).with_stderr("ERESOLVE"),
            );

        let result = manager(&provider).validate(request("npm run build")).await.unwrap();

        assert!(result.success);
    }

    #[tokio::test]
    async fn test_verification_failure_is_data() {
        let provider = FakeProvider::new().with_command(
            "npm run build",
            ScriptedCommand::exit(2).with_stderr("x".repeat(5000)),
        );

        let result = manager(&provider).validate(request("npm run build")).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stderr.chars().count(), 4000);
    }

    #[tokio::test]
    async fn test_provision_failure_propagates() {
        let provider = FakeProvider::new().failing_provision("repository not found");

        let err = manager(&provider)
            .validate(request("npm run build"))
            .await
            .unwrap_err();

        assert!(matches!(err, EnvError::Provision { .. }));
        assert_eq!(provider.teardown_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_provisioning() {
        let provider = FakeProvider::new();
        let manager = manager(&provider);

        let err = manager.validate(request("")).await.unwrap_err();
        assert!(matches!(err, EnvError::InvalidCommand(_)));

        let mut escaping = request("npm test");
        escaping.files[0].path = "../../etc/passwd".to_string();
        let err = manager.validate(escaping).await.unwrap_err();
        assert!(matches!(err, EnvError::InvalidPath { .. }));

        let mut empty = request("npm test");
        empty.files.clear();
        assert!(matches!(
            manager.validate(empty).await.unwrap_err(),
            EnvError::NoFiles
        ));

        assert!(provider.events().is_empty());
    }

    #[tokio::test]
    async fn test_panic_still_tears_down() {
        let provider = FakeProvider::new()
            .with_file("package.json")
            .with_command("npm test", ScriptedCommand::panicking());
        let manager = manager(&provider);

        let joined = tokio::spawn(async move { manager.validate(request("npm test")).await }).await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(provider.teardown_count(), 1);
    }
}
