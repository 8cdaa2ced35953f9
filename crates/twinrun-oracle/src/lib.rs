//! twinrun oracle -- runs generation twice and tells you whether it agreed.
//!
//! The [`DeterminismOracle`] sits inside a fuzzing harness. For every
//! candidate input it runs generation once in the calling process and once
//! in an isolated worker, snapshots both results, diffs them, and maps the
//! outcome into the harness's classification.
//!
//! # Architecture
//!
//! - **[`oracle`]**: the per-attempt state machine ([`DeterminismOracle`],
//!   [`AttemptState`]).
//! - **[`outcome`]**: [`GenOutcome`], [`FailureCause`], [`DeterminismError`]
//!   and the final [`Verdict`].
//! - **[`classify`]**: outcome classifiers that sit beside the oracle in the
//!   outer pipeline.
//! - **[`config`]**: [`OracleConfig`], loadable from JSON.
//! - **[`reference`]**: a small seeded world generator used by the `twinrun`
//!   binary and the end-to-end tests.
//!
//! # Example
//!
//! ```no_run
//! use twinrun_oracle::prelude::*;
//! use twinrun_snapshot::request::{GenerationRequest, PlayerSettings};
//!
//! let registry = twinrun_oracle::engine_registry();
//! let mut host = EngineHost::new(registry.create("reference")?, &LegacyPolicy::default());
//! let mut oracle = DeterminismOracle::new(OracleConfig::default());
//!
//! let request = GenerationRequest::new(42).with_player(PlayerSettings::new("Alice", "Meadow"));
//! let verdict = oracle.run_attempt(&mut host, &request)?;
//! assert_eq!(verdict.outcome, GenOutcome::Success);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]

pub mod classify;
pub mod config;
pub mod oracle;
pub mod outcome;
pub mod reference;

pub use config::OracleConfig;
pub use oracle::{AttemptState, DeterminismOracle};
pub use outcome::{DeterminismError, FailureCause, GenOutcome, Verdict};

use std::path::PathBuf;

use twinrun_worker::engine::EngineRegistry;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that end an oracle attempt without a verdict.
///
/// None of these describe the system under test. A determinism problem is
/// reported through [`Verdict`], never through this type.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The worker session failed (spawn, handshake, transport, timeout).
    /// The worker is dropped and respawned on the next attempt.
    #[error(transparent)]
    Worker(#[from] twinrun_worker::WorkerError),

    /// The in-process result could not be snapshotted.
    #[error("failed to snapshot the in-process result: {0}")]
    Snapshot(#[from] twinrun_snapshot::SnapshotError),

    /// `after_generate` ran without a preceding `before_generate`.
    #[error("no captured request -- call before_generate before after_generate")]
    NoCapturedRequest,

    /// The configuration file could not be read or parsed.
    #[error("invalid oracle config '{}': {message}", path.display())]
    Config { path: PathBuf, message: String },
}

/// Engines the `twinrun` binary can host, by locator.
pub fn engine_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register(reference::LOCATOR, reference::ReferenceEngine::boxed);
    registry
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::classify::{LegacyEntryPointClassifier, MessageClassifier, OutcomeClassifier};
    pub use crate::config::OracleConfig;
    pub use crate::oracle::{AttemptState, DeterminismOracle};
    pub use crate::outcome::{DeterminismError, FailureCause, GenOutcome, Verdict};
    pub use crate::reference::ReferenceEngine;
    pub use crate::OracleError;
    pub use twinrun_worker::engine::{EngineHost, GenerationEngine};
    pub use twinrun_worker::legacy::LegacyPolicy;
}
