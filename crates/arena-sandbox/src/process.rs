//! Host process helpers shared by the local and docker providers.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{EnvError, EnvResult};
use crate::provider::CommandOutput;

/// Run a prepared command, killing it once `timeout` elapses.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    label: &str,
    timeout: Duration,
) -> EnvResult<CommandOutput> {
    let start = Instant::now();

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| EnvError::Spawn {
            command: label.to_string(),
            reason: e.to_string(),
        })?;

    // Dropping the child on timeout kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_elapsed) => {
            warn!(command = %label, limit_secs = timeout.as_secs(), "command timed out");
            return Ok(CommandOutput::timed_out(
                timeout,
                start.elapsed().as_millis() as u64,
            ));
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(command = %label, exit_code, duration_ms, "command finished");

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        timed_out: false,
        duration_ms,
    })
}

/// `git clone --depth 1 <source_url> <dest>`
pub(crate) async fn shallow_clone(
    git: &str,
    source_url: &str,
    dest: &Path,
    timeout: Duration,
) -> EnvResult<()> {
    let mut command = Command::new(git);
    command
        .args(["clone", "--depth", "1", "--quiet", source_url])
        .arg(dest);

    let label = format!("{git} clone --depth 1 {source_url}");
    let provision_error = |reason: String| EnvError::Provision {
        source_url: source_url.to_string(),
        reason,
    };

    let output = run_with_timeout(command, &label, timeout)
        .await
        .map_err(|e| provision_error(e.to_string()))?;

    if output.timed_out {
        return Err(provision_error(format!(
            "clone timed out after {}s",
            timeout.as_secs()
        )));
    }
    if output.exit_code != 0 {
        return Err(provision_error(output.stderr.trim().to_string()));
    }
    Ok(())
}
