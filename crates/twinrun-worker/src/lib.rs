//! twinrun worker -- isolated generation worker and its framed protocol.
//!
//! A worker is a child process that hosts one generation engine instance and
//! answers generation requests over its standard input/output. A crash or
//! memory corruption inside the engine stays inside the worker; the calling
//! process only ever sees a reply or a closed channel.
//!
//! # Architecture
//!
//! - **[`channel`]**: length-prefixed JSON frames over any byte stream
//!   ([`FrameReader`], [`FrameWriter`]).
//! - **[`protocol`]**: the ready sentinel and the tagged [`WorkerReply`].
//! - **[`engine`]**: the [`GenerationEngine`] trait, the [`EngineHost`] that
//!   wires an engine to its legacy entry points and caches, and the
//!   [`EngineRegistry`] that resolves an engine locator.
//! - **[`legacy`]**: the injectable table of legacy entry points.
//! - **[`cache`]**: caches the worker evicts after every attempt.
//! - **[`diagnostics`]**: the `tracing` writer that routes worker logs away
//!   from the protocol stream.
//! - **[`worker`]**: the worker-side serve loop and process entry point.
//! - **[`handle`]**: the parent-side [`WorkerHandle`].
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use twinrun_worker::channel::{FrameReader, FrameWriter};
//!
//! let mut wire = Vec::new();
//! FrameWriter::new(&mut wire).send(&serde_json::json!({"seed": 7})).unwrap();
//!
//! let mut reader = FrameReader::new(Cursor::new(wire));
//! let value: serde_json::Value = reader.receive().unwrap();
//! assert_eq!(value["seed"], 7);
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod handle;
pub mod legacy;
pub mod protocol;
pub mod worker;

pub use cache::{CacheRegistry, EvictableCache};
pub use channel::{FrameReader, FrameWriter};
pub use config::WorkerConfig;
pub use diagnostics::DiagnosticSink;
pub use engine::{EngineContext, EngineHost, EngineRegistry, GenerationEngine};
pub use handle::WorkerHandle;
pub use legacy::{EntryPoint, LegacyEntryPoints, LegacyPolicy};
pub use protocol::{WorkerReply, READY};

use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the framed channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed the stream before a complete frame was available.
    /// This covers a clean EOF as well as a partial length prefix or body.
    #[error("channel closed by peer")]
    Closed,

    /// The underlying stream failed.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame payload could not be encoded or decoded.
    #[error("channel codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The payload does not fit the 32-bit length prefix.
    #[error("frame of {len} bytes does not fit a 32-bit length prefix")]
    FrameTooLarge { len: usize },
}

/// Errors produced by the parent side of a worker session.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker process could not be started.
    #[error("failed to spawn worker '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker did not complete the handshake.
    #[error("worker failed to start: {reason}\n{diagnostics}")]
    StartupFailure {
        reason: String,
        /// Diagnostic output the worker wrote before the handshake.
        diagnostics: String,
    },

    /// A reply could not be decoded as a tagged worker reply.
    #[error("unexpected message from worker: {0}")]
    UnexpectedMessage(String),

    /// The channel to the worker failed.
    #[error("worker channel failed: {0}")]
    Channel(#[from] ChannelError),

    /// The worker did not answer in time and was killed.
    #[error("worker did not answer within {0:?} and was killed")]
    Timeout(Duration),

    /// The worker process exited while a reply was expected.
    #[error("worker exited unexpectedly ({status})")]
    Exited { status: std::process::ExitStatus },
}

/// Errors produced by invoking a legacy entry point.
#[derive(Debug, thiserror::Error)]
pub enum LegacyCallError {
    /// The entry point is disabled by the active [`LegacyPolicy`].
    #[error("legacy entry point '{name}' is disabled")]
    Disabled { name: String },

    /// No entry point of that name was installed.
    #[error("unknown legacy entry point '{name}'")]
    Unknown { name: String },

    /// The entry point ran and failed.
    #[error("legacy entry point '{name}' failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors produced by the engine registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The locator does not name a registered engine.
    #[error("unknown engine '{locator}'. Registered engines: [{registered}]")]
    UnknownEngine { locator: String, registered: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::cache::{CacheRegistry, EvictableCache, EvictionStats};
    pub use crate::channel::{FrameReader, FrameWriter};
    pub use crate::config::WorkerConfig;
    pub use crate::diagnostics::DiagnosticSink;
    pub use crate::engine::{EngineContext, EngineHost, EngineRegistry, GenerationEngine};
    pub use crate::handle::WorkerHandle;
    pub use crate::legacy::{EntryPoint, LegacyEntryPoints, LegacyFn, LegacyPolicy};
    pub use crate::protocol::{WorkerReply, READY};
    pub use crate::{ChannelError, LegacyCallError, RegistryError, WorkerError};
}
