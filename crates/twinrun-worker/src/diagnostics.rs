//! Diagnostic capture for the worker process.
//!
//! Standard output belongs to the protocol, so nothing may log there. The
//! worker installs a `tracing` subscriber whose writer is a
//! [`DiagnosticSink`]. Until the handshake the sink forwards to stderr, which
//! the parent reads if startup fails. After the handshake the parent closes
//! its end of stderr, and the sink switches to an in-memory buffer that is
//! reset at the start of every attempt and attached to error replies.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug)]
enum Target {
    Stderr,
    Buffer(Vec<u8>),
}

/// Shared, switchable diagnostic writer.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    target: Arc<Mutex<Target>>,
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::stderr()
    }
}

impl DiagnosticSink {
    /// A sink that forwards to stderr.
    pub fn stderr() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Stderr)),
        }
    }

    /// A sink that captures from the start.
    pub fn capturing() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Buffer(Vec::new()))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Target> {
        // A panic while holding the lock leaves only a partial log line.
        self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Switch to in-memory capture. Idempotent.
    pub fn start_capture(&self) {
        let mut target = self.lock();
        if matches!(*target, Target::Stderr) {
            *target = Target::Buffer(Vec::new());
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(*self.lock(), Target::Buffer(_))
    }

    /// Discard anything captured so far.
    pub fn reset(&self) {
        if let Target::Buffer(buf) = &mut *self.lock() {
            buf.clear();
        }
    }

    /// Drain the captured text. Empty when not capturing.
    pub fn take(&self) -> String {
        match &mut *self.lock() {
            Target::Buffer(buf) => String::from_utf8_lossy(&std::mem::take(buf)).into_owned(),
            Target::Stderr => String::new(),
        }
    }
}

/// Writer handed out per `tracing` event.
#[derive(Debug)]
pub struct DiagnosticWriter {
    sink: DiagnosticSink,
}

impl Write for DiagnosticWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match &mut *self.sink.lock() {
            Target::Buffer(buf) => buf.extend_from_slice(data),
            // The read end may already be closed; diagnostics are best effort.
            Target::Stderr => {
                let _ = io::stderr().write_all(data);
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DiagnosticSink {
    type Writer = DiagnosticWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DiagnosticWriter { sink: self.clone() }
    }
}
