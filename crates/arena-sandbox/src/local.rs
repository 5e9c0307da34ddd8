//! Host-process provider
//!
//! Each environment is a temporary directory holding a shallow clone.
//! Commands run as host processes with the clone as working directory.
//! Isolation is limited to the filesystem; use [`crate::DockerProvider`] when
//! agent code must not touch the host.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EnvError, EnvResult};
use crate::process::{run_with_timeout, shallow_clone};
use crate::provider::{CommandOutput, CommandSpec, Environment, EnvironmentProvider, ProvisionSpec};
use crate::runtime::Runtime;

/// Provisions environments as temporary directories on the host
#[derive(Debug, Clone)]
pub struct LocalProvider {
    git: String,
    parent_dir: Option<PathBuf>,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProvider {
    pub fn new() -> Self {
        Self {
            git: "git".to_string(),
            parent_dir: None,
        }
    }

    /// Create environments under `dir` instead of the system temp dir.
    pub fn with_parent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.parent_dir = Some(dir.into());
        self
    }

    fn tempdir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("arena-env-");
        match &self.parent_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl EnvironmentProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn provision(&self, spec: &ProvisionSpec) -> EnvResult<Box<dyn Environment>> {
        let dir = self.tempdir().map_err(|e| EnvError::Provision {
            source_url: spec.source_url.clone(),
            reason: format!("cannot create work dir: {e}"),
        })?;

        // On failure `dir` is dropped here, which removes the partial clone.
        shallow_clone(&self.git, &spec.source_url, dir.path(), spec.lifetime).await?;

        let env = LocalEnvironment {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            runtime: spec.runtime,
            root: dir.path().to_path_buf(),
            dir: Mutex::new(Some(dir)),
        };
        info!(env_id = %env.id, runtime = %env.runtime, "local environment provisioned");
        Ok(Box::new(env))
    }
}

/// Environment backed by a temporary directory
#[derive(Debug)]
pub struct LocalEnvironment {
    id: String,
    runtime: Runtime,
    root: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl LocalEnvironment {
    fn take_dir(&self) -> Option<TempDir> {
        self.dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Environment for LocalEnvironment {
    fn id(&self) -> &str {
        &self.id
    }

    fn runtime(&self) -> Runtime {
        self.runtime
    }

    async fn file_exists(&self, path: &str) -> EnvResult<bool> {
        Ok(tokio::fs::try_exists(self.root.join(path)).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> EnvResult<()> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        debug!(env_id = %self.id, path = %path.display(), "file written");
        Ok(())
    }

    async fn run(&self, command: &CommandSpec, timeout: Duration) -> EnvResult<CommandOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).current_dir(&self.root);
        run_with_timeout(cmd, &command.to_string(), timeout).await
    }

    async fn teardown(&self) -> EnvResult<()> {
        let Some(dir) = self.take_dir() else {
            return Ok(());
        };
        let id = self.id.clone();
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| EnvError::Io(std::io::Error::other(e.to_string())))??;
        debug!(env_id = %id, "local environment removed");
        Ok(())
    }
}
