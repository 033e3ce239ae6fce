//! Subprocess execution with an enforced wall-clock limit.
//!
//! Every external tool (office converter, scripts, ffprobe, pdftoppm) goes
//! through [`ProcessRunner`], so all of them share one timeout policy.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::ConversionError;

/// Stderr lines retained by [`ProcessRunner::run_streaming`].
const STDERR_TAIL_LINES: usize = 50;

/// A fully specified external invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shell-like rendering for logs and error diagnostics.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| quote(&part.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn quote(part: &str) -> String {
    if part.is_empty() || part.contains(char::is_whitespace) || part.contains('"') {
        format!("\"{}\"", part.replace('"', "\\\""))
    } else {
        part.to_string()
    }
}

/// Captured outcome of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub command: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Fails with `ExternalToolFailure` on a non-zero exit.
    pub fn ensure_success(self, tool: &str) -> Result<Self, ConversionError> {
        if self.status.success() {
            return Ok(self);
        }
        Err(ConversionError::tool_failed(
            format!("{tool} exited with code: {:?}", self.status.code()),
            self.command.clone(),
            Some(self.stderr.clone()),
        ))
    }
}

/// Runs external commands with a timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `spec` to completion. A child still running when the limit
    /// expires is killed and the call fails with `Timeout`.
    pub async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ConversionError> {
        let command = spec.display();
        debug!(command = %command, timeout_secs = self.timeout.as_secs(), "Running external tool");

        let start = Instant::now();
        let child = spec
            .command()
            .spawn()
            .map_err(|e| spawn_error(&spec.program, &command, e))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ConversionError::tool_failed(
                    format!("Failed to wait for {}: {e}", spec.program.display()),
                    command,
                    None,
                ))
            }
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "External tool timed out");
                return Err(ConversionError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                    command: Some(command),
                });
            }
        };

        let result = ProcessOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            command,
            elapsed: start.elapsed(),
        };
        debug!(
            command = %result.command,
            code = ?result.status.code(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "External tool finished"
        );
        if !result.stderr.trim().is_empty() {
            debug!(stderr = %result.stderr.trim(), "External tool stderr");
        }
        Ok(result)
    }

    /// Runs `spec`, handing every stderr line to `on_line` as it arrives.
    ///
    /// Stdout is discarded. The returned `stderr` holds only the last
    /// lines, since long-running tools can be very chatty.
    pub async fn run_streaming<F>(
        &self,
        spec: &CommandSpec,
        mut on_line: F,
    ) -> Result<ProcessOutput, ConversionError>
    where
        F: FnMut(&str) + Send,
    {
        let command = spec.display();
        debug!(command = %command, timeout_secs = self.timeout.as_secs(), "Running external tool");

        let start = Instant::now();
        let mut cmd = spec.command();
        cmd.stdout(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(&spec.program, &command, e))?;
        let Some(stderr) = child.stderr.take() else {
            return Err(ConversionError::tool_failed(
                "stderr was not captured",
                command,
                None,
            ));
        };
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let outcome = timeout(self.timeout, async {
            while let Some(line) = lines.next_line().await? {
                on_line(&line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            child.wait().await
        })
        .await;

        let status = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ConversionError::tool_failed(
                    format!("Failed to read from {}: {e}", spec.program.display()),
                    command,
                    None,
                ))
            }
            Err(_) => {
                let _ = child.kill().await;
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "External tool timed out");
                return Err(ConversionError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                    command: Some(command),
                });
            }
        };

        let elapsed = start.elapsed();
        debug!(
            command = %command,
            code = ?status.code(),
            elapsed_ms = elapsed.as_millis() as u64,
            "External tool finished"
        );
        Ok(ProcessOutput {
            status,
            stdout: String::new(),
            stderr: Vec::from(tail).join("\n"),
            command,
            elapsed,
        })
    }

    /// Checks that `program` starts and answers a version probe.
    pub async fn probe_version(&self, program: &Path, flag: &str) -> Result<String, ConversionError> {
        let spec = CommandSpec::new(program).arg(flag);
        let output = self.run(&spec).await?.ensure_success(&program.display().to_string())?;
        let text = if output.stdout.trim().is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }
}

pub(crate) fn spawn_error(program: &Path, command: &str, e: std::io::Error) -> ConversionError {
    let reason = if e.kind() == std::io::ErrorKind::NotFound {
        format!("Tool not found at path: {}", program.display())
    } else {
        format!("Failed to start {}: {e}", program.display())
    };
    ConversionError::tool_failed(reason, command, None)
}

/// Runs CPU-bound conversion work off the async workers.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, ConversionError>
where
    F: FnOnce() -> Result<T, ConversionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ConversionError::external(format!("Conversion worker failed: {e}")))?
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::converter::ErrorKind;

    #[test]
    fn test_display_quotes_spaces() {
        let spec = CommandSpec::new("soffice")
            .args(["--convert-to", "pdf"])
            .arg("/tmp/my file.docx");
        assert_eq!(
            spec.display(),
            "soffice --convert-to pdf \"/tmp/my file.docx\""
        );
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let runner = ProcessRunner::new(Duration::from_secs(10));
        let spec = CommandSpec::new("/bin/sh").args(["-c", "echo out; echo err >&2"]);
        let output = runner.run(&spec).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_tool_failure() {
        let runner = ProcessRunner::new(Duration::from_secs(10));
        let spec = CommandSpec::new("/bin/sh").args(["-c", "echo broken >&2; exit 3"]);
        let err = runner
            .run(&spec)
            .await
            .unwrap()
            .ensure_success("sh")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
        assert!(err.underlying_command().unwrap().starts_with("/bin/sh"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let spec = CommandSpec::new("/bin/sh").args(["-c", "sleep 5"]);
        let start = Instant::now();
        let err = runner.run(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_run_streaming_sees_every_line() {
        let runner = ProcessRunner::new(Duration::from_secs(10));
        let spec = CommandSpec::new("/bin/sh")
            .args(["-c", "i=0; while [ $i -lt 60 ]; do echo line$i >&2; i=$((i+1)); done"]);
        let mut seen = 0;
        let output = runner.run_streaming(&spec, |_| seen += 1).await.unwrap();
        assert_eq!(seen, 60);
        assert_eq!(output.stderr.lines().count(), STDERR_TAIL_LINES);
        assert!(output.stderr.ends_with("line59"));
    }

    #[tokio::test]
    async fn test_run_streaming_timeout() {
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let spec = CommandSpec::new("/bin/sh").args(["-c", "echo start >&2; sleep 5"]);
        let err = runner.run_streaming(&spec, |_| {}).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = ProcessRunner::new(Duration::from_secs(1));
        let spec = CommandSpec::new("/nonexistent/tool");
        let err = runner.run(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
        assert!(err.to_string().contains("Tool not found"));
    }
}
