//! Arena-Sandbox: disposable execution environments
//!
//! Validates an agent's code changes by cloning the target repository into a
//! fresh environment, installing dependencies, writing the changes and
//! running a verification command.
//!
//! ## Layer 2 - Environment/Tooling
//!
//! Focus: isolation, bounded execution time and guaranteed teardown.
//!
//! ## Key Components
//!
//! - `ExecutionEnvironmentManager`: one `validate` call per request
//! - `EnvironmentProvider` / `Environment`: provisioning seam
//! - `LocalProvider`, `DockerProvider`: real providers; `fakes::FakeProvider` for tests

pub mod docker;
pub mod error;
pub mod fakes;
pub mod local;
pub mod manager;
mod process;
pub mod provider;
pub mod runtime;

pub use docker::DockerProvider;
pub use error::{EnvError, EnvResult};
pub use local::LocalProvider;
pub use manager::{
    EnvironmentConfig, ExecutionEnvironmentManager, ExecutionResult, FileChange,
    ValidationRequest,
};
pub use provider::{
    normalize_path, truncate_chars, CommandOutput, CommandSpec, Environment, EnvironmentProvider,
    ProvisionSpec, WORKSPACE_ROOT,
};
pub use runtime::{detect_runtime, Runtime};
