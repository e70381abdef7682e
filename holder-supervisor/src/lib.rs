#![warn(missing_docs)]
//! Spawns, monitors, and terminates the child "holder" processes that
//! squat on a GPU for the lifetime of a reservation.
//!
//! A holder is a genuine OS process (the `gpu-holder` binary elsewhere in
//! this workspace), not a green thread — the broker's correctness
//! invariants hinge on holder liveness being observable independently of
//! the broker's own event loop. The handshake and shutdown protocol below
//! apply a container-lifecycle shape (spawn, wait for readiness, stop,
//! escalate to kill) to a plain child process plus a one-line stdio
//! handshake.

pub mod error;

use std::process::Stdio;
use std::time::Duration;

use snafu::{OptionExt, ResultExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};

pub use error::{HolderStartError, HolderStopError};

/// How long `stop` waits for an orderly exit before escalating to
/// `Child::kill`.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A live holder process: its OS pid, the reservation it belongs to, and
/// the handle used to ask it to exit.
pub struct Holder {
    child: Child,
    stdin: ChildStdin,
    pid: u32,
    device_index: u32,
    exclusive: bool,
}

impl Holder {
    /// The holder's OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The device index this holder occupies.
    pub fn index(&self) -> u32 {
        self.device_index
    }

    /// Whether this holder was started for an exclusive reservation.
    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    /// Non-blocking liveness probe.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the holder to exit and wait for it, escalating to a kill if it
    /// does not exit within `STOP_TIMEOUT`. Idempotent: a no-op if the
    /// holder is already dead.
    pub async fn stop(&mut self) -> Result<(), HolderStopError> {
        if !self.is_alive() {
            return Ok(());
        }
        // Best-effort: if the write fails the process is likely already
        // gone or wedged; either way fall through to the timeout/kill path.
        let _ = self.stdin.write_all(b"STOP\n").await;
        let _ = self.stdin.flush().await;

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(_wait_result) => Ok(()),
            Err(_elapsed) => {
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
                error::TimedOutAndKilled { pid: self.pid }.fail()
            }
        }
    }
}

/// Spawns and tracks holder child processes for a given `gpu-holder`
/// binary path.
#[derive(Clone)]
pub struct HolderSupervisor {
    holder_binary: std::path::PathBuf,
    extra_args: Vec<String>,
}

impl HolderSupervisor {
    /// `holder_binary` is the path to the `gpu-holder` executable this
    /// supervisor will spawn one instance of per reservation.
    pub fn new(holder_binary: impl Into<std::path::PathBuf>) -> Self {
        Self {
            holder_binary: holder_binary.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append fixed arguments to every future `spawn`, after `--index`
    /// and (if set) `--exclusive`. Exists so test doubles for
    /// `holder_binary` can be steered without reaching into `spawn`
    /// itself — production callers never need this.
    pub fn with_extra_args(mut self, extra_args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args = extra_args.into_iter().collect();
        self
    }

    /// Spawn a holder for `device_index`. Blocks the caller until the
    /// child has either reported successful attach, reported a device
    /// error, or died — this synchronous-startup contract is what makes
    /// it possible to guarantee a `Reservation` is never recorded without
    /// first observing its holder alive.
    pub async fn spawn(
        &self,
        device_index: u32,
        exclusive: bool,
    ) -> Result<Holder, HolderStartError> {
        let mut command = Command::new(&self.holder_binary);
        command
            .arg("--index")
            .arg(device_index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if exclusive {
            command.arg("--exclusive");
        }
        command.args(&self.extra_args);

        let mut child = command.spawn().context(error::Spawn { device_index })?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let mut lines = BufReader::new(stdout).lines();
        let status_line = lines
            .next_line()
            .await
            .context(error::ReadStatus { device_index })?
            .context(error::DiedBeforeAttach { device_index })?;

        if status_line != "OK" {
            let message = status_line
                .strip_prefix("ERR ")
                .unwrap_or(&status_line)
                .to_string();
            let _ = child.start_kill();
            let _ = child.wait().await;
            return error::AttachFailed {
                device_index,
                message,
            }
            .fail();
        }

        let pid = child.id().context(error::DiedBeforeAttach { device_index })?;

        Ok(Holder {
            child,
            stdin,
            pid,
            device_index,
            exclusive,
        })
    }
}
