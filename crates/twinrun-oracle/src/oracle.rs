//! The determinism oracle.
//!
//! One attempt moves through these states:
//!
//! ```text
//! Idle -> CapturedInputs -> NoResult                          (nothing to verify)
//!                        -> HaveSnapshot -> WorkerError       (worker reply was an error)
//!                                        -> Match | Mismatch  (both snapshots diffed)
//! ```
//!
//! The hook-style API (`before_generate`, `after_generate`,
//! `reclassify_outcome`) mirrors the harness the oracle plugs into.
//! [`DeterminismOracle::run_attempt`] drives all three around an in-process
//! run for callers that do not have a harness of their own.
//!
//! The worker is spawned lazily on the first attempt that needs it and
//! reused afterwards. A transport failure drops it; the next attempt spawns
//! a fresh one.

use std::panic::{self, AssertUnwindSafe};

use twinrun_diff::compare_snapshots;
use twinrun_snapshot::catalog::GeneratorCatalog;
use twinrun_snapshot::graph::GenerationResult;
use twinrun_snapshot::request::GenerationRequest;
use twinrun_snapshot::snapshot::capture_snapshot;
use twinrun_worker::engine::EngineHost;
use twinrun_worker::handle::WorkerHandle;
use twinrun_worker::protocol::WorkerReply;
use twinrun_worker::worker::panic_message;

use crate::config::OracleConfig;
use crate::outcome::{DeterminismError, FailureCause, GenOutcome, Verdict};
use crate::OracleError;

/// Where the current attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    CapturedInputs,
    /// The in-process run produced no result; nothing was verified.
    NoResult,
    /// The in-process result is snapshotted; the worker run is pending.
    HaveSnapshot,
    /// The worker replied with an error.
    WorkerError,
    Match,
    Mismatch,
}

/// Runs every attempt twice and compares the results.
#[derive(Debug)]
pub struct DeterminismOracle {
    config: OracleConfig,
    worker: Option<WorkerHandle>,
    captured: Option<GenerationRequest>,
    pending: Option<DeterminismError>,
    state: AttemptState,
    snapshot_hash: Option<String>,
    workers_spawned: usize,
}

impl DeterminismOracle {
    /// Create an oracle. No worker is started until the first attempt that
    /// needs one.
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            worker: None,
            captured: None,
            pending: None,
            state: AttemptState::Idle,
            snapshot_hash: None,
            workers_spawned: 0,
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Number of worker processes this oracle has started.
    pub fn workers_spawned(&self) -> usize {
        self.workers_spawned
    }

    /// PID of the live worker, if any.
    pub fn worker_pid(&self) -> Option<u32> {
        self.worker.as_ref().map(WorkerHandle::pid)
    }

    /// Stop the worker. The next attempt that needs one starts a new one.
    pub fn shutdown_worker(&mut self) {
        self.worker = None;
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    /// Capture the request before the in-process run can touch it.
    pub fn before_generate(&mut self, request: &GenerationRequest) {
        self.captured = Some(request.clone());
        self.pending = None;
        self.snapshot_hash = None;
        self.state = AttemptState::CapturedInputs;
    }

    /// Verify the in-process result against a worker run of the captured
    /// request. `None` means the in-process run failed and there is nothing
    /// to verify.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoCapturedRequest`] without a prior
    ///   [`before_generate`](Self::before_generate).
    /// - [`OracleError::Snapshot`] if the in-process result cannot be
    ///   snapshotted.
    /// - [`OracleError::Worker`] if the worker session fails.
    pub fn after_generate(
        &mut self,
        result: Option<&GenerationResult>,
        catalog: &GeneratorCatalog,
    ) -> Result<AttemptState, OracleError> {
        let request = self.captured.take().ok_or(OracleError::NoCapturedRequest)?;
        let Some(result) = result else {
            tracing::debug!(seed = request.seed, "no in-process result, skipping verification");
            self.state = AttemptState::NoResult;
            return Ok(self.state);
        };

        let local = capture_snapshot(result, catalog)?;
        let local_hash = local.content_hash();
        self.snapshot_hash = Some(local_hash.clone());
        self.state = AttemptState::HaveSnapshot;

        match self.delegate(&request)? {
            WorkerReply::Error(detail) => {
                tracing::warn!(
                    seed = request.seed,
                    "worker failed where the in-process run succeeded"
                );
                self.pending = Some(DeterminismError::WorkerFailure { detail });
                self.state = AttemptState::WorkerError;
            }
            WorkerReply::Ok(remote) => {
                if self.config.hash_fast_path && remote.content_hash() == local_hash {
                    self.state = AttemptState::Match;
                } else {
                    let report = compare_snapshots(&local, &remote);
                    if report.is_empty() {
                        self.state = AttemptState::Match;
                    } else {
                        tracing::warn!(
                            seed = request.seed,
                            findings = report.finding_count(),
                            worst = ?report.worst_kind(),
                            "determinism mismatch"
                        );
                        self.pending = Some(DeterminismError::Mismatch { report });
                        self.state = AttemptState::Mismatch;
                    }
                }
            }
        }
        Ok(self.state)
    }

    /// Map the attempt's outcome into the harness classification.
    ///
    /// A determinism error always wins and becomes `Failure`. Otherwise an
    /// ordinary `Failure` becomes `OptionError`, so plain rejections are
    /// never mistaken for determinism failures downstream.
    pub fn reclassify_outcome(
        &mut self,
        outcome: GenOutcome,
        cause: Option<FailureCause>,
    ) -> (GenOutcome, Option<FailureCause>) {
        if let Some(error) = self.pending.take() {
            return (GenOutcome::Failure, Some(FailureCause::Determinism(error)));
        }
        match outcome {
            GenOutcome::Failure => (GenOutcome::OptionError, cause),
            other => (other, cause),
        }
    }

    // -----------------------------------------------------------------------
    // Driver
    // -----------------------------------------------------------------------

    /// Run one full attempt: in-process generation on `host`, then the
    /// hooks. Engine errors and panics become a `Failure` outcome.
    pub fn run_attempt(
        &mut self,
        host: &mut EngineHost,
        request: &GenerationRequest,
    ) -> Result<Verdict, OracleError> {
        let span = tracing::debug_span!("attempt", seed = request.seed);
        let _enter = span.enter();

        self.before_generate(request);

        let live = request.clone();
        let generated = panic::catch_unwind(AssertUnwindSafe(|| host.generate(&live)));
        let (result, outcome, cause) = match generated {
            Ok(Ok(result)) => (Some(result), GenOutcome::Success, None),
            Ok(Err(error)) => (
                None,
                GenOutcome::Failure,
                Some(FailureCause::from_engine_error(&error)),
            ),
            Err(payload) => (
                None,
                GenOutcome::Failure,
                Some(FailureCause::Generation {
                    message: format!("generation panicked: {}", panic_message(payload.as_ref())),
                    disabled_entry_point: None,
                }),
            ),
        };

        self.after_generate(result.as_ref(), host.catalog())?;
        let (outcome, cause) = self.reclassify_outcome(outcome, cause);
        tracing::debug!(%outcome, state = ?self.state, "attempt finished");

        Ok(Verdict {
            outcome,
            cause,
            snapshot_hash: self.snapshot_hash.clone(),
        })
    }

    /// Send `request` to the worker, spawning one if needed. A worker whose
    /// session failed is dropped.
    fn delegate(&mut self, request: &GenerationRequest) -> Result<WorkerReply, OracleError> {
        let mut worker = match self.worker.take() {
            Some(worker) => worker,
            None => {
                let worker = WorkerHandle::spawn(&self.config.worker)?;
                self.workers_spawned += 1;
                worker
            }
        };

        match worker.request(request) {
            Ok(reply) => {
                self.worker = Some(worker);
                Ok(reply)
            }
            Err(e) => {
                tracing::error!(error = %e, "worker session failed, dropping the worker");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_generate_requires_a_captured_request() {
        let mut oracle = DeterminismOracle::new(OracleConfig::default());
        let err = oracle
            .after_generate(None, &GeneratorCatalog::new())
            .unwrap_err();
        assert!(matches!(err, OracleError::NoCapturedRequest));
    }

    #[test]
    fn missing_result_skips_verification_and_spawns_nothing() {
        let mut oracle = DeterminismOracle::new(OracleConfig::default());
        oracle.before_generate(&GenerationRequest::new(1));
        let state = oracle.after_generate(None, &GeneratorCatalog::new()).unwrap();
        assert_eq!(state, AttemptState::NoResult);
        assert_eq!(oracle.workers_spawned(), 0);
    }

    #[test]
    fn ordinary_failure_becomes_option_error() {
        let mut oracle = DeterminismOracle::new(OracleConfig::default());
        let cause = FailureCause::Generation {
            message: "bad option".to_owned(),
            disabled_entry_point: None,
        };
        let (outcome, cause) = oracle.reclassify_outcome(GenOutcome::Failure, Some(cause));
        assert_eq!(outcome, GenOutcome::OptionError);
        assert_eq!(cause.unwrap().to_string(), "bad option");

        let (outcome, cause) = oracle.reclassify_outcome(GenOutcome::Success, None);
        assert_eq!(outcome, GenOutcome::Success);
        assert!(cause.is_none());
    }

    #[test]
    fn pending_determinism_error_wins() {
        let mut oracle = DeterminismOracle::new(OracleConfig::default());
        oracle.pending = Some(DeterminismError::WorkerFailure {
            detail: "no connected region".to_owned(),
        });
        let (outcome, cause) = oracle.reclassify_outcome(GenOutcome::Success, None);
        assert_eq!(outcome, GenOutcome::Failure);
        assert!(matches!(
            cause,
            Some(FailureCause::Determinism(DeterminismError::WorkerFailure { .. }))
        ));

        // Consumed: the next attempt starts clean.
        let (outcome, _) = oracle.reclassify_outcome(GenOutcome::Success, None);
        assert_eq!(outcome, GenOutcome::Success);
    }
}
