//! Builder for executing external tool commands with timeout and
//! cancellation support.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8). Empty for streamed runs.
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// ```no_run
/// use rf_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> rf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-hide_banner")
///     .arg("-encoders")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`rf_core::Error::Tool`] if spawning fails or the process exits
    ///   non-zero (message includes stderr).
    /// - [`rf_core::Error::Timeout`] if the process outlives the timeout.
    pub async fn execute(&self) -> rf_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| rf_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(rf_core::Error::tool(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(rf_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(rf_core::Error::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Execute the command, handing each stderr line to `on_line` as it
    /// arrives.
    ///
    /// The child is killed when `cancel` fires or the timeout expires.
    ///
    /// # Errors
    ///
    /// - [`rf_core::Error::Cancelled`] when `cancel` fired.
    /// - [`rf_core::Error::Timeout`] when the timeout expired.
    /// - [`rf_core::Error::Tool`] on spawn failure or non-zero exit. The
    ///   message carries only the exit status; callers that need the
    ///   diagnostic output collect it from `on_line`.
    pub async fn execute_with_stderr_callback(
        &self,
        mut on_line: impl FnMut(&str),
        cancel: Option<CancellationToken>,
    ) -> rf_core::Result<ToolOutput> {
        let program_name = self.program_name();
        let cancel = cancel.unwrap_or_default();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| rf_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| rf_core::Error::tool(&program_name, "stderr was not captured"))?;
        let mut lines = BufReader::new(stderr).lines();

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => on_line(line.trim_end()),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("{program_name}: stderr read error: {e}");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(rf_core::Error::Cancelled(format!("{program_name} terminated")));
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(rf_core::Error::Timeout { secs: self.timeout.as_secs() });
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| {
                rf_core::Error::tool(&program_name, format!("I/O error waiting for process: {e}"))
            })?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(rf_core::Error::Cancelled(format!("{program_name} terminated")));
            }
        };

        if !status.success() {
            return Err(rf_core::Error::tool(
                program_name,
                format!("exited with status {status}"),
            ));
        }

        Ok(ToolOutput {
            status,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}
