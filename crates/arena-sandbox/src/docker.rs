//! Container provider
//!
//! Clones on the host, bind-mounts the clone at [`WORKSPACE_ROOT`] inside a
//! runtime image and runs commands through `docker exec`. The container is
//! started with `sleep <lifetime>` so it never outlives its lifetime even if
//! teardown is missed.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::error::{EnvError, EnvResult};
use crate::process::{run_with_timeout, shallow_clone};
use crate::provider::{
    CommandOutput, CommandSpec, Environment, EnvironmentProvider, ProvisionSpec, WORKSPACE_ROOT,
};
use crate::runtime::Runtime;

const DOCKER_CLI_TIMEOUT: Duration = Duration::from_secs(60);

/// Provisions environments as containers
#[derive(Debug, Clone)]
pub struct DockerProvider {
    docker: String,
    git: String,
}

impl Default for DockerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerProvider {
    pub fn new() -> Self {
        Self {
            docker: "docker".to_string(),
            git: "git".to_string(),
        }
    }

    /// Use another docker-compatible CLI (e.g. `podman`).
    pub fn with_cli(mut self, cli: impl Into<String>) -> Self {
        self.docker = cli.into();
        self
    }

    async fn start_container(
        &self,
        name: &str,
        host_dir: &Path,
        spec: &ProvisionSpec,
    ) -> EnvResult<String> {
        let mut cmd = Command::new(&self.docker);
        cmd.args(["run", "--detach", "--rm", "--name", name])
            .arg("--volume")
            .arg(format!("{}:{}", host_dir.display(), WORKSPACE_ROOT))
            .args(["--workdir", WORKSPACE_ROOT])
            .arg(spec.runtime.image())
            .args(["sleep", &spec.lifetime.as_secs().to_string()]);

        let output = run_with_timeout(cmd, "docker run", DOCKER_CLI_TIMEOUT).await?;
        if !output.success() {
            return Err(EnvError::Provision {
                source_url: spec.source_url.clone(),
                reason: format!("docker run failed: {}", output.stderr.trim()),
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

#[async_trait]
impl EnvironmentProvider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn provision(&self, spec: &ProvisionSpec) -> EnvResult<Box<dyn Environment>> {
        let dir = tempfile::Builder::new()
            .prefix("arena-docker-")
            .tempdir()
            .map_err(|e| EnvError::Provision {
                source_url: spec.source_url.clone(),
                reason: format!("cannot create work dir: {e}"),
            })?;

        shallow_clone(&self.git, &spec.source_url, dir.path(), spec.lifetime).await?;

        let name = format!("arena-{}", uuid::Uuid::new_v4());
        let container_id = self.start_container(&name, dir.path(), spec).await?;

        info!(
            env_id = %name,
            container = %container_id,
            image = spec.runtime.image(),
            "container environment provisioned"
        );
        Ok(Box::new(DockerEnvironment {
            docker: self.docker.clone(),
            name,
            runtime: spec.runtime,
            host_root: dir.path().to_path_buf(),
            dir: Mutex::new(Some(dir)),
        }))
    }
}

/// Environment backed by a running container
#[derive(Debug)]
pub struct DockerEnvironment {
    docker: String,
    name: String,
    runtime: Runtime,
    host_root: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

#[async_trait]
impl Environment for DockerEnvironment {
    fn id(&self) -> &str {
        &self.name
    }

    fn runtime(&self) -> Runtime {
        self.runtime
    }

    async fn file_exists(&self, path: &str) -> EnvResult<bool> {
        Ok(tokio::fs::try_exists(self.host_root.join(path)).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> EnvResult<()> {
        let target = self.host_root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        Ok(())
    }

    async fn run(&self, command: &CommandSpec, timeout: Duration) -> EnvResult<CommandOutput> {
        let mut cmd = Command::new(&self.docker);
        cmd.args(["exec", &self.name, &command.program])
            .args(&command.args);
        run_with_timeout(cmd, &command.to_string(), timeout).await
    }

    async fn teardown(&self) -> EnvResult<()> {
        let dir = self
            .dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(dir) = dir else {
            return Ok(());
        };

        let mut cmd = Command::new(&self.docker);
        cmd.args(["rm", "--force", &self.name]);
        let removed = run_with_timeout(cmd, "docker rm", DOCKER_CLI_TIMEOUT).await;
        match removed {
            Ok(out) if out.success() => debug!(env_id = %self.name, "container removed"),
            Ok(out) => warn!(env_id = %self.name, stderr = %out.stderr.trim(), "docker rm failed"),
            Err(e) => warn!(env_id = %self.name, error = %e, "docker rm failed"),
        }

        // Files created by the container may be owned by root; leftovers are
        // reported rather than failing teardown.
        work_dir_removed(
            &self.name,
            tokio::task::spawn_blocking(move || dir.close()).await,
        );
        Ok(())
    }
}

/// Log how removal of the host work directory went. Returns whether it was
/// fully removed.
fn work_dir_removed(env_id: &str, cleanup: Result<std::io::Result<()>, JoinError>) -> bool {
    match cleanup {
        Ok(Ok(())) => {
            debug!(env_id = %env_id, "work dir removed");
            true
        }
        Ok(Err(e)) => {
            warn!(env_id = %env_id, error = %e, "work dir left behind");
            false
        }
        Err(e) => {
            warn!(env_id = %env_id, error = %e, "work dir cleanup panicked");
            false
        }
    }
}
