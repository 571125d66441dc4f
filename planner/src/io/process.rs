//! Run service commands with a timeout and bounded output capture.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Last line of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// Spawn `argv`, feed `input` on stdin, and wait at most `timeout`.
///
/// stdout and stderr are drained concurrently while the child runs so a chatty
/// child cannot block on a full pipe. At most `output_limit_bytes` of each are
/// kept; the rest is counted and discarded. A child still running at the
/// deadline is killed and reported with `timed_out = true`.
#[instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or(""), timeout_secs = timeout.as_secs()))]
pub fn run_with_timeout(
    argv: &[String],
    input: &[u8],
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty service command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning service process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn service command");
            return Err(e).with_context(|| format!("spawn {program}"));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A service that exits without reading its request closes the pipe early;
        // its exit status tells the real story.
        if let Err(e) = child_stdin.write_all(input) {
            warn!(err = %e, "service closed stdin before reading the request");
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for service")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "service call timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill service")?;
            child.wait().context("wait service after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "service output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "service process finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn echoes_stdin_to_stdout() {
        let output = run_with_timeout(&sh("cat"), b"{\"ok\":true}", Duration::from_secs(5), 1024)
            .expect("run");
        assert!(output.succeeded());
        assert_eq!(output.stdout, b"{\"ok\":true}");
    }

    #[test]
    fn bounds_captured_output() {
        let output = run_with_timeout(&sh("printf 'abcdef'"), b"", Duration::from_secs(5), 4)
            .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 2);
    }

    #[test]
    fn kills_child_after_timeout() {
        let output =
            run_with_timeout(&sh("sleep 5"), b"", Duration::from_millis(100), 1024).expect("run");
        assert!(output.timed_out);
        assert!(!output.succeeded());
    }

    #[test]
    fn reports_stderr_tail_on_failure() {
        let output = run_with_timeout(
            &sh("echo first >&2; echo 'no route' >&2; exit 3"),
            b"",
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert!(!output.succeeded());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_tail(), "no route");
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = run_with_timeout(&[], b"", Duration::from_secs(1), 16).unwrap_err();
        assert!(err.to_string().contains("empty service command"));
    }
}
