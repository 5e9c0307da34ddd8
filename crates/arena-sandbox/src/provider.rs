//! Environment provider traits
//!
//! An [`EnvironmentProvider`] creates isolated [`Environment`]s from a git
//! source. Each environment exposes the cloned repository under a logical
//! root ([`WORKSPACE_ROOT`]) regardless of where it physically lives.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EnvError, EnvResult};
use crate::runtime::Runtime;

/// Logical root of the repository inside every environment
pub const WORKSPACE_ROOT: &str = "/workspace";

/// What to provision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSpec {
    /// Git URL cloned with depth 1
    pub source_url: String,
    pub runtime: Runtime,
    /// Upper bound on the environment's life
    pub lifetime: Duration,
}

/// A command split into program and arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a command line with shell-word rules (quotes, escapes).
    ///
    /// No shell is involved when the command runs; pipes and redirections
    /// are passed through as literal arguments.
    pub fn parse(line: &str) -> EnvResult<Self> {
        let words = shlex::split(line)
            .ok_or_else(|| EnvError::InvalidCommand(format!("unbalanced quotes in `{line}`")))?;
        let mut words = words.into_iter();
        let program = words
            .next()
            .ok_or_else(|| EnvError::InvalidCommand("command is empty".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// `-1` when the command was killed or timed out
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Output for a command that exceeded its time bound.
    pub fn timed_out(limit: Duration, duration_ms: u64) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("timed out after {}s", limit.as_secs()),
            timed_out: true,
            duration_ms,
        }
    }
}

/// A live, isolated environment holding one cloned repository.
///
/// Paths passed to the file methods are relative to the repository root,
/// already normalized with [`normalize_path`].
#[async_trait]
pub trait Environment: Send + Sync {
    /// Unique identifier of this environment instance
    fn id(&self) -> &str;

    /// Runtime the environment was provisioned with
    fn runtime(&self) -> Runtime;

    async fn file_exists(&self, path: &str) -> EnvResult<bool>;

    /// Write `content` at `path`, creating parent directories and replacing
    /// any existing file.
    async fn write_file(&self, path: &Path, content: &str) -> EnvResult<()>;

    /// Run a command in the repository root. Exceeding `timeout` kills the
    /// process and yields [`CommandOutput::timed_out`], not an error.
    async fn run(&self, command: &CommandSpec, timeout: Duration) -> EnvResult<CommandOutput>;

    /// Release every resource held by the environment. Idempotent.
    async fn teardown(&self) -> EnvResult<()>;
}

/// Creates environments
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Clone `spec.source_url` into a fresh environment. Partial state is
    /// cleaned up before an error is returned.
    async fn provision(&self, spec: &ProvisionSpec) -> EnvResult<Box<dyn Environment>>;
}

/// Normalize a file-change path to a relative path under the repository root.
///
/// Relative paths are resolved against the root; absolute paths are accepted
/// only when they lie under [`WORKSPACE_ROOT`]. Any path that would escape
/// the root is rejected.
pub fn normalize_path(path: &str) -> EnvResult<PathBuf> {
    let invalid = |reason: &str| EnvError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let raw = Path::new(path);
    let relative = if raw.is_absolute() {
        raw.strip_prefix(WORKSPACE_ROOT)
            .map_err(|_| invalid("absolute path outside the workspace"))?
    } else {
        raw
    };

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(invalid("path escapes the workspace"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("unexpected root component"));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(invalid("path names the workspace root"));
    }
    Ok(normalized)
}

/// Truncate to at most `limit` characters.
pub fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_respects_quotes() {
        let cmd = CommandSpec::parse(r#"npm run "build:prod" -- --flag='a b'"#).unwrap();
        assert_eq!(cmd.program, "npm");
        assert_eq!(cmd.args, vec!["run", "build:prod", "--", "--flag=a b"]);
    }

    #[test]
    fn test_parse_rejects_empty_and_unbalanced() {
        assert!(matches!(
            CommandSpec::parse("   "),
            Err(EnvError::InvalidCommand(_))
        ));
        assert!(matches!(
            CommandSpec::parse("echo \"oops"),
            Err(EnvError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_normalize_relative_paths() {
        assert_eq!(
            normalize_path("src/./lib/../index.js").unwrap(),
            PathBuf::from("src/index.js")
        );
        assert_eq!(
            normalize_path("/workspace/app/main.py").unwrap(),
            PathBuf::from("app/main.py")
        );
    }

    #[test]
    fn test_normalize_rejects_escapes() {
        for bad in ["../secrets", "a/../../b", "/etc/passwd", "/workspace/../etc", "", "."] {
            assert!(
                matches!(normalize_path(bad), Err(EnvError::InvalidPath { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_truncate_is_char_based() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
