//! Subprocess plumbing shared by the external rasterizer and recognition engines.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("process exceeded timeout ({timeout:?}); stderr: {stderr}")]
    Timeout { timeout: Duration, stderr: String },

    #[error("process failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reader thread panicked")]
    ReaderPanicked,

    #[error("{program} exited ({status})")]
    Exited { program: String, status: String },
}

fn spawn_piped(cmd: &mut Command, program: &str) -> Result<Child, ProcessError> {
    match cmd.spawn() {
        Ok(child) => Ok(child),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ProcessError::NotFound(program.to_string()))
        }
        Err(e) => Err(ProcessError::Io(e)),
    }
}

/// Spawn `cmd`, feed `stdin`, and collect its output. A non-zero exit is an error.
///
/// With a timeout, the child is killed once the deadline passes.
pub fn run_with_input(
    mut cmd: Command,
    stdin: &[u8],
    timeout: Option<Duration>,
) -> Result<Output, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("spawn {program} timeout={timeout:?}");

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = spawn_piped(&mut cmd, &program)?;

    if let Some(mut pipe) = child.stdin.take() {
        // The child may exit before reading everything; that surfaces as its exit status.
        if let Err(e) = pipe.write_all(stdin) {
            debug!("{program}: stdin write failed: {e}");
        }
    }

    let output = match timeout {
        Some(limit) => wait_with_timeout(&mut child, limit)?,
        None => child.wait_with_output()?,
    };

    if !output.status.success() {
        return Err(ProcessError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Whether `exe` can be launched with `arg` and exits successfully.
pub fn probe_binary(exe: &Path, arg: &str) -> bool {
    Command::new(exe)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// A long-lived child answering one line on stdout per line written to stdin.
///
/// Dropping the session kills the child.
pub struct LineSession {
    program: String,
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
}

impl LineSession {
    /// Spawn `cmd`. With `log_stderr`, the child's stderr is forwarded to `debug!`;
    /// otherwise it is discarded.
    pub fn spawn(mut cmd: Command, log_stderr: bool) -> Result<Self, ProcessError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        debug!("spawn session {program}");

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(if log_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = spawn_piped(&mut cmd, &program)?;
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Io(std::io::Error::other(
                    "child stdio was not captured",
                )));
            }
        };

        let (tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        if let Some(stderr) = child.stderr.take() {
            let name = program.clone();
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!("{name}: {line}");
                }
            });
        }

        Ok(Self {
            program,
            child,
            stdin,
            lines,
        })
    }

    /// Write `line` and wait for the next line of output.
    pub fn request(
        &mut self,
        line: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ProcessError> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        self.read_line(timeout)
    }

    /// Wait for the next line of output. Blank lines are skipped.
    pub fn read_line(&mut self, timeout: Option<Duration>) -> Result<String, ProcessError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let received = match deadline {
                Some(deadline) => self
                    .lines
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self.lines.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        return Ok(line);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("{} timed out after {:?}", self.program, timeout);
                    return Err(ProcessError::Timeout {
                        timeout: timeout.unwrap_or_default(),
                        stderr: String::new(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let status = match self.child.wait() {
                        Ok(status) => status.to_string(),
                        Err(e) => e.to_string(),
                    };
                    return Err(ProcessError::Exited {
                        program: self.program.clone(),
                        status,
                    });
                }
            }
        }
    }
}

impl Drop for LineSession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output, ProcessError> {
    // Drain pipes while waiting so a chatty child can't block on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf)?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf)?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| ProcessError::ReaderPanicked)??;
            let stderr = stderr_thread
                .join()
                .map_err(|_| ProcessError::ReaderPanicked)??;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait()?;
            let _ = stdout_thread.join();
            let stderr = stderr_thread
                .join()
                .map_err(|_| ProcessError::ReaderPanicked)??;
            return Err(ProcessError::Timeout {
                timeout,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        std::thread::sleep(Duration::from_millis(20));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_not_found() {
        let cmd = Command::new("definitely-not-a-real-binary-4f1c");
        let err = run_with_input(cmd, b"", None).unwrap_err();
        assert!(matches!(err, ProcessError::NotFound(_)));
    }

    #[test]
    fn missing_session_binary_is_not_found() {
        let cmd = Command::new("definitely-not-a-real-binary-4f1c");
        assert!(matches!(
            LineSession::spawn(cmd, false),
            Err(ProcessError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn session_answers_each_line() {
        let mut session = LineSession::spawn(Command::new("cat"), false).unwrap();
        let timeout = Some(Duration::from_secs(10));
        assert_eq!(session.request("first", timeout).unwrap(), "first");
        assert_eq!(session.request("second", timeout).unwrap(), "second");
    }

    #[cfg(unix)]
    #[test]
    fn session_times_out_on_silent_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let mut session = LineSession::spawn(cmd, false).unwrap();
        let err = session
            .request("ping", Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn session_reports_exited_child() {
        let mut session = LineSession::spawn(Command::new("true"), false).unwrap();
        let err = session
            .read_line(Some(Duration::from_secs(10)))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Exited { .. }));
    }

    #[test]
    fn probe_missing_binary_is_false() {
        assert!(!probe_binary(
            Path::new("definitely-not-a-real-binary-4f1c"),
            "--version"
        ));
    }
}
