//! Runtime detection
//!
//! The runtime is inferred from manifest files at the repository root.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EnvResult;
use crate::provider::{CommandSpec, Environment};

/// Language runtime of an execution environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    #[default]
    Node,
    Python,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Node => "node",
            Runtime::Python => "python",
        }
    }

    /// Container image used by [`crate::DockerProvider`]
    pub fn image(&self) -> &'static str {
        match self {
            Runtime::Node => "node:24",
            Runtime::Python => "python:3.13",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest files checked in priority order
const MANIFESTS: [(&str, Runtime); 3] = [
    ("package.json", Runtime::Node),
    ("requirements.txt", Runtime::Python),
    ("pyproject.toml", Runtime::Python),
];

/// Detect the runtime of a provisioned environment, defaulting to node.
pub async fn detect_runtime(env: &dyn Environment) -> EnvResult<Runtime> {
    for (manifest, runtime) in MANIFESTS {
        if env.file_exists(manifest).await? {
            debug!(manifest, runtime = %runtime, "runtime detected");
            return Ok(runtime);
        }
    }
    debug!("no manifest found, defaulting to node");
    Ok(Runtime::Node)
}

/// Dependency install command for a runtime.
pub async fn install_command(env: &dyn Environment) -> EnvResult<CommandSpec> {
    Ok(match env.runtime() {
        Runtime::Node => CommandSpec::new("npm", ["install", "--legacy-peer-deps"]),
        Runtime::Python => {
            if env.file_exists("requirements.txt").await? {
                CommandSpec::new("pip", ["install", "-r", "requirements.txt"])
            } else {
                CommandSpec::new("pip", ["install", "."])
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeProvider;
    use crate::provider::{EnvironmentProvider, ProvisionSpec};
    use std::time::Duration;

    async fn provision(provider: &FakeProvider, runtime: Runtime) -> Box<dyn Environment> {
        provider
            .provision(&ProvisionSpec {
                source_url: "https://github.com/acme/app".into(),
                runtime,
                lifetime: Duration::from_secs(300),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_package_json_wins_over_python_manifests() {
        let provider = FakeProvider::new()
            .with_file("package.json")
            .with_file("requirements.txt");
        let env = provision(&provider, Runtime::Node).await;
        assert_eq!(detect_runtime(env.as_ref()).await.unwrap(), Runtime::Node);
    }

    #[tokio::test]
    async fn test_pyproject_is_python() {
        let provider = FakeProvider::new().with_file("pyproject.toml");
        let env = provision(&provider, Runtime::Node).await;
        assert_eq!(detect_runtime(env.as_ref()).await.unwrap(), Runtime::Python);
    }

    #[tokio::test]
    async fn test_no_manifest_defaults_to_node() {
        let provider = FakeProvider::new();
        let env = provision(&provider, Runtime::Node).await;
        assert_eq!(detect_runtime(env.as_ref()).await.unwrap(), Runtime::Node);
    }

    #[tokio::test]
    async fn test_python_install_falls_back_to_project_install() {
        let provider = FakeProvider::new().with_file("pyproject.toml");
        let env = provision(&provider, Runtime::Python).await;
        let cmd = install_command(env.as_ref()).await.unwrap();
        assert_eq!(cmd.to_string(), "pip install .");

        let provider = FakeProvider::new().with_file("requirements.txt");
        let env = provision(&provider, Runtime::Python).await;
        let cmd = install_command(env.as_ref()).await.unwrap();
        assert_eq!(cmd.to_string(), "pip install -r requirements.txt");
    }

    #[test]
    fn test_images() {
        assert_eq!(Runtime::Node.image(), "node:24");
        assert_eq!(Runtime::Python.image(), "python:3.13");
    }
}
