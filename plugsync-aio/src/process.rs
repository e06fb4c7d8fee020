// plugsync-aio/src/process.rs
use std::path::PathBuf;
use std::process::Output as StdOutput;
use std::process::Stdio;
use std::sync::Arc;

use plugsync_common::error::{PlugsyncError, Result};
use tokio::process::Command;
use tracing::{debug, error};

/// Asynchronously runs an external command and captures its output.
pub async fn run_command_async(
    command: &str,
    args: &[String],
    cwd: Option<PathBuf>,
) -> Result<StdOutput> {
    debug!("Running command: {} {:?} (cwd: {:?})", command, args, cwd);

    let mut cmd = Command::new(command);
    cmd.args(args);
    cmd.kill_on_drop(true);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null()); // Prevent hanging on stdin

    match cmd.output().await {
        Ok(output) => {
            if !output.status.success() {
                debug!("Command failed with status: {}", output.status);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stdout.trim().is_empty() {
                    debug!("Stdout:\n{}", stdout.trim());
                }
                if !stderr.trim().is_empty() {
                    debug!("Stderr:\n{}", stderr.trim());
                }
            } else {
                debug!("Command finished successfully.");
            }
            Ok(output)
        }
        Err(e) => {
            error!("Failed to execute command {}: {}", command, e);
            Err(PlugsyncError::Io(Arc::new(e)))
        }
    }
}

/// Like `run_command_async` but turns a non-zero exit into an error.
pub async fn run_command_checked(
    command: &str,
    args: &[String],
    cwd: Option<PathBuf>,
) -> Result<StdOutput> {
    let output = run_command_async(command, args, cwd).await?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(PlugsyncError::CommandExecError(format!(
            "{command} {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
