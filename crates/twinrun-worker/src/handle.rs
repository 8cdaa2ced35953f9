//! Parent side of a worker session.
//!
//! [`WorkerHandle::spawn`] starts the worker with all three standard streams
//! piped and waits for the ready sentinel. stdin/stdout become the framed
//! channel. stderr is read only if the handshake fails and is closed as soon
//! as it succeeds, so post-handshake output can never fill an unread pipe
//! and block the worker.
//!
//! Frames from the worker are read by a pump thread and forwarded over an
//! `mpsc` channel, which lets the handshake and each request wait with a
//! timeout. A timed-out worker is killed; the handle is unusable afterwards.

use std::io::{self, BufReader, BufWriter, Read};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use twinrun_snapshot::request::GenerationRequest;

use crate::channel::{FrameReader, FrameWriter};
use crate::config::WorkerConfig;
use crate::protocol::{WorkerReply, READY};
use crate::{ChannelError, WorkerError};

/// How long a closing worker gets to exit before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for an exit status after the worker closed its stdout.
const EXIT_STATUS_GRACE: Duration = Duration::from_millis(200);

type Frame = Result<Vec<u8>, ChannelError>;

/// A running worker process.
pub struct WorkerHandle {
    child: Child,
    /// `None` once the worker was killed or shut down.
    writer: Option<FrameWriter<BufWriter<ChildStdin>>>,
    frames: Receiver<Frame>,
    pump: Option<JoinHandle<()>>,
    request_timeout: Option<Duration>,
}

impl WorkerHandle {
    /// Start a worker and complete the handshake.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::Spawn`] if the process cannot be started.
    /// - [`WorkerError::StartupFailure`] if the worker closes the channel or
    ///   sends anything other than the ready sentinel. The worker's stderr
    ///   output is attached.
    /// - [`WorkerError::Timeout`] if no message arrives within
    ///   [`WorkerConfig::handshake_timeout_ms`].
    pub fn spawn(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let program = config.resolved_program().map_err(|source| WorkerError::Spawn {
            program: config.program.clone(),
            source,
        })?;
        let spawn_error = |source: io::Error| WorkerError::Spawn {
            program: program.clone(),
            source,
        };

        let mut child = Command::new(&program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            reap(&mut child);
            return Err(spawn_error(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "worker stdio was not captured",
            )));
        };

        let (tx, frames) = mpsc::channel();
        let pump = match thread::Builder::new()
            .name("twinrun-frame-pump".to_owned())
            .spawn(move || pump_frames(stdout, tx))
        {
            Ok(pump) => pump,
            Err(e) => {
                reap(&mut child);
                return Err(spawn_error(e));
            }
        };

        tracing::debug!(
            pid = child.id(),
            program = %program.display(),
            args = ?config.args,
            "spawned worker"
        );

        let mut handle = Self {
            child,
            writer: Some(FrameWriter::new(BufWriter::new(stdin))),
            frames,
            pump: Some(pump),
            request_timeout: config.request_timeout(),
        };
        handle.handshake(stderr, config.handshake_timeout())?;
        Ok(handle)
    }

    fn handshake(
        &mut self,
        stderr: ChildStderr,
        timeout: Option<Duration>,
    ) -> Result<(), WorkerError> {
        match self.next_frame(timeout) {
            Ok(frame) => {
                let message: serde_json::Value = serde_json::from_slice(&frame)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&frame).into_owned().into());
                if message == READY {
                    // Post-handshake diagnostics stay inside the worker.
                    drop(stderr);
                    tracing::debug!(pid = self.pid(), "worker ready");
                    Ok(())
                } else {
                    self.kill();
                    Err(WorkerError::StartupFailure {
                        reason: format!("expected the ready sentinel, got {message}"),
                        diagnostics: drain(stderr),
                    })
                }
            }
            Err(WorkerError::Channel(ChannelError::Closed)) | Err(WorkerError::Exited { .. }) => {
                self.kill();
                Err(WorkerError::StartupFailure {
                    reason: "worker closed the channel before signalling ready".to_owned(),
                    diagnostics: drain(stderr),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Send one request and block for its reply.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::Channel`] / [`WorkerError::Exited`] if the worker is
    ///   gone.
    /// - [`WorkerError::Timeout`] if the configured request timeout expires
    ///   (the worker is killed).
    /// - [`WorkerError::UnexpectedMessage`] if the reply is not a tagged
    ///   worker reply.
    pub fn request(&mut self, request: &GenerationRequest) -> Result<WorkerReply, WorkerError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(WorkerError::Channel(ChannelError::Closed))?;
        if let Err(e) = writer.send(request) {
            return Err(match e {
                ChannelError::Io(ref source) if source.kind() == io::ErrorKind::BrokenPipe => {
                    self.closed_error()
                }
                other => other.into(),
            });
        }

        let frame = self.next_frame(self.request_timeout)?;
        serde_json::from_slice(&frame).map_err(|e| {
            let preview: String = String::from_utf8_lossy(&frame).chars().take(200).collect();
            WorkerError::UnexpectedMessage(format!("{e}: {preview}"))
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// True while the worker process has not exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the worker and reap it.
    pub fn kill(&mut self) {
        self.writer = None;
        if let Err(e) = self.child.kill() {
            tracing::debug!(pid = self.child.id(), error = %e, "kill failed, worker already gone");
        }
        let _ = self.child.wait();
    }

    fn next_frame(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, WorkerError> {
        let received = match timeout {
            Some(limit) => match self.frames.recv_timeout(limit) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(pid = self.pid(), ?limit, "worker timed out, killing it");
                    self.kill();
                    return Err(WorkerError::Timeout(limit));
                }
                Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Closed),
            },
            None => self.frames.recv().unwrap_or(Err(ChannelError::Closed)),
        };

        match received {
            Ok(frame) => Ok(frame),
            Err(ChannelError::Closed) => Err(self.closed_error()),
            Err(e) => Err(e.into()),
        }
    }

    /// Error for a worker whose channel closed: `Exited` when the exit status
    /// is available shortly, `Channel(Closed)` otherwise.
    fn closed_error(&mut self) -> WorkerError {
        self.writer = None;
        match self.wait_for_exit(EXIT_STATUS_GRACE) {
            Some(status) => WorkerError::Exited { status },
            None => WorkerError::Channel(ChannelError::Closed),
        }
    }

    fn wait_for_exit(&mut self, grace: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => return None,
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Closing stdin is the shutdown signal.
        self.writer = None;
        if self.wait_for_exit(SHUTDOWN_GRACE).is_none() {
            tracing::warn!(pid = self.child.id(), "worker ignored channel close, killing it");
            self.kill();
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("pid", &self.child.id())
            .field("open", &self.writer.is_some())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pump_frames(stdout: ChildStdout, tx: Sender<Frame>) {
    let mut reader = FrameReader::new(BufReader::new(stdout));
    loop {
        let frame = reader.read_frame();
        let done = frame.is_err();
        if tx.send(frame).is_err() || done {
            break;
        }
    }
}

/// Everything left in the worker's stderr. Invalid UTF-8 is replaced, not
/// dropped.
fn drain(mut stderr: impl Read) -> String {
    let mut bytes = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut bytes) {
        tracing::debug!(error = %e, "failed to read worker diagnostics");
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
