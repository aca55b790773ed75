//! Subprocess execution with a deadline
//!
//! Both pipes are drained on helper threads so a chatty child can never block
//! on a full pipe while we wait for it. Output is buffered in full; nothing is
//! parsed until the process has exited.

use crate::core::error::{ToolError, VcsError, VcsResult};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Captured result of a finished subprocess
#[derive(Debug)]
pub(crate) struct ToolOutput {
  pub command: String,
  pub status: ExitStatus,
  pub stdout: Vec<u8>,
  pub stderr: Vec<u8>,
}

impl ToolOutput {
  pub fn success(&self) -> bool {
    self.status.success()
  }

  /// stdout followed by stderr, lossily decoded
  pub fn combined(&self) -> String {
    let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&self.stderr));
    text
  }

  pub fn stdout_str(&self) -> String {
    String::from_utf8_lossy(&self.stdout).into_owned()
  }

  /// Whether stdout or stderr contains any of the given fragments
  pub fn mentions(&self, needles: &[&str]) -> bool {
    let text = self.combined();
    needles.iter().any(|n| text.contains(n))
  }

  pub fn into_error(self) -> VcsError {
    let output = self.combined();
    VcsError::Tool(ToolError::CommandFailed {
      command: self.command,
      status: self.status.code(),
      output,
    })
  }

  /// Turn a non-zero exit into `ToolError::CommandFailed`
  pub fn checked(self) -> VcsResult<Self> {
    if self.success() { Ok(self) } else { Err(self.into_error()) }
  }
}

/// Command with an isolated environment
///
/// Only PATH and HOME are passed through, so user shell settings (pagers,
/// locales, GIT_DIR and friends) cannot change the output we parse.
pub(crate) fn isolated_command(binary: &str) -> Command {
  let mut cmd = Command::new(binary);
  cmd.env_clear();
  for key in ["PATH", "HOME"] {
    if let Ok(value) = std::env::var(key) {
      cmd.env(key, value);
    }
  }
  cmd
}

/// Render a command the way a user would type it
pub(crate) fn describe(cmd: &Command) -> String {
  let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
  parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
  parts.join(" ")
}

/// Run a command to completion, killing it once `timeout` has elapsed
pub(crate) fn run(mut cmd: Command, timeout: Option<Duration>) -> VcsResult<ToolOutput> {
  let command = describe(&cmd);
  cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

  let started = Instant::now();
  let mut child = cmd.spawn().map_err(|source| {
    VcsError::Tool(ToolError::Spawn {
      command: command.clone(),
      source,
    })
  })?;

  let stdout = child.stdout.take().map(|pipe| thread::spawn(move || drain(pipe)));
  let stderr = child.stderr.take().map(|pipe| thread::spawn(move || drain(pipe)));

  let status = match timeout {
    None => child.wait()?,
    Some(limit) => {
      let mut pause = Duration::from_millis(2);
      loop {
        if let Some(status) = child.try_wait()? {
          break status;
        }
        if started.elapsed() >= limit {
          if let Err(e) = child.kill() {
            warn!(%command, error = %e, "failed to kill timed out process");
          }
          let _ = child.wait();
          debug!(%command, elapsed_ms = started.elapsed().as_millis() as u64, "subprocess timed out");
          return Err(VcsError::Tool(ToolError::Timeout { command, after: limit }));
        }
        thread::sleep(pause);
        pause = (pause * 2).min(Duration::from_millis(50));
      }
    }
  };

  let stdout = join(stdout)?;
  let stderr = join(stderr)?;

  debug!(
    %command,
    status = ?status.code(),
    elapsed_ms = started.elapsed().as_millis() as u64,
    stdout_bytes = stdout.len(),
    "subprocess finished"
  );

  Ok(ToolOutput {
    command,
    status,
    stdout,
    stderr,
  })
}

fn drain(mut pipe: impl Read) -> std::io::Result<Vec<u8>> {
  let mut buf = Vec::new();
  pipe.read_to_end(&mut buf)?;
  Ok(buf)
}

fn join(handle: Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>) -> VcsResult<Vec<u8>> {
  match handle {
    None => Ok(Vec::new()),
    Some(h) => h
      .join()
      .map_err(|_| VcsError::message("subprocess output reader panicked"))?
      .map_err(VcsError::from),
  }
}
