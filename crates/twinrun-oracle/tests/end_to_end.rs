//! End-to-end tests against real worker processes (the `twinrun` binary).

use serde_json::json;
use twinrun_oracle::prelude::*;
use twinrun_snapshot::request::{GenerationRequest, PlayerSettings};
use twinrun_worker::config::WorkerConfig;
use twinrun_worker::handle::WorkerHandle;
use twinrun_worker::protocol::WorkerReply;
use twinrun_worker::WorkerError;

fn worker_config() -> WorkerConfig {
    WorkerConfig::for_program(env!("CARGO_BIN_EXE_twinrun"), "reference")
}

fn oracle() -> DeterminismOracle {
    DeterminismOracle::new(OracleConfig {
        worker: worker_config(),
        ..OracleConfig::default()
    })
}

fn host() -> EngineHost {
    EngineHost::new(ReferenceEngine::boxed(), &LegacyPolicy::default())
}

fn request(seed: u64) -> GenerationRequest {
    GenerationRequest::new(seed)
        .with_player(PlayerSettings::new("Alice", "Meadow").with_option("area_count", json!(4)))
        .with_player(PlayerSettings::new("Bob", "Caverns").with_option("goal", json!("random")))
}

// ---------------------------------------------------------------------------
// Worker handle
// ---------------------------------------------------------------------------

#[test]
fn spawned_worker_answers_requests() {
    let mut worker = WorkerHandle::spawn(&worker_config()).unwrap();
    assert!(worker.is_running());

    match worker.request(&request(1)).unwrap() {
        WorkerReply::Ok(snapshot) => assert!(snapshot.location_count() > 0),
        WorkerReply::Error(e) => panic!("unexpected worker error: {e}"),
    }
}

#[test]
fn worker_reports_generation_failure_with_message() {
    let mut worker = WorkerHandle::spawn(&worker_config()).unwrap();
    let isolated = GenerationRequest::new(1).with_player(
        PlayerSettings::new("Alice", "Meadow").with_option("isolated_region", json!(true)),
    );
    match worker.request(&isolated).unwrap() {
        WorkerReply::Error(text) => assert!(text.contains("no connected region"), "{text}"),
        WorkerReply::Ok(_) => panic!("isolated region should not generate"),
    }
}

#[test]
fn worker_survives_an_engine_panic() {
    let mut worker = WorkerHandle::spawn(&worker_config()).unwrap();
    let pid = worker.pid();

    let exploding = request(1).with_setting("panic_message", json!("kaboom"));
    match worker.request(&exploding).unwrap() {
        WorkerReply::Error(text) => assert!(text.contains("kaboom"), "{text}"),
        WorkerReply::Ok(_) => panic!("panic should not produce a snapshot"),
    }

    assert!(matches!(worker.request(&request(2)).unwrap(), WorkerReply::Ok(_)));
    assert_eq!(worker.pid(), pid);
}

#[test]
fn unknown_engine_is_a_startup_failure() {
    let config = WorkerConfig::for_program(env!("CARGO_BIN_EXE_twinrun"), "no-such-engine");
    match WorkerHandle::spawn(&config) {
        Err(WorkerError::StartupFailure { diagnostics, .. }) => {
            assert!(diagnostics.contains("no-such-engine"), "{diagnostics}");
        }
        other => panic!("expected a startup failure, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

#[test]
fn deterministic_request_matches() {
    let mut oracle = oracle();
    let mut host = host();
    for seed in 0..3 {
        let verdict = oracle.run_attempt(&mut host, &request(seed)).unwrap();
        assert_eq!(verdict.outcome, GenOutcome::Success, "{verdict}");
        assert_eq!(oracle.state(), AttemptState::Match);
    }
    assert_eq!(oracle.workers_spawned(), 1);
}

#[test]
fn rejected_request_is_an_option_error_without_a_worker() {
    let mut oracle = oracle();
    let mut host = host();
    let bad = GenerationRequest::new(1)
        .with_player(PlayerSettings::new("Alice", "Meadow").with_option("goal", json!("nap")));

    let verdict = oracle.run_attempt(&mut host, &bad).unwrap();
    assert_eq!(verdict.outcome, GenOutcome::OptionError);
    assert!(!verdict.is_determinism_failure());
    assert_eq!(oracle.state(), AttemptState::NoResult);
    assert_eq!(oracle.workers_spawned(), 0);
}

#[test]
fn process_salted_seed_is_a_mismatch() {
    let mut oracle = oracle();
    let mut host = host();
    let salted = request(11).with_setting("salt_with_process_id", json!(true));

    let verdict = oracle.run_attempt(&mut host, &salted).unwrap();
    assert_eq!(verdict.outcome, GenOutcome::Failure);
    assert!(matches!(
        verdict.determinism_error(),
        Some(DeterminismError::Mismatch { .. })
    ));
    assert_eq!(oracle.state(), AttemptState::Mismatch);
}

#[test]
fn worker_failure_on_accepted_request_is_not_a_mismatch() {
    let mut oracle = oracle();
    let mut host = host();

    // The in-process engine sees a repaired copy; the worker gets the
    // captured original.
    let isolated = GenerationRequest::new(3).with_player(
        PlayerSettings::new("Alice", "Meadow").with_option("isolated_region", json!(true)),
    );
    let repaired = GenerationRequest::new(3).with_player(PlayerSettings::new("Alice", "Meadow"));

    oracle.before_generate(&isolated);
    let result = host.generate(&repaired).unwrap();
    let state = oracle.after_generate(Some(&result), host.catalog()).unwrap();
    assert_eq!(state, AttemptState::WorkerError);

    let (outcome, cause) = oracle.reclassify_outcome(GenOutcome::Success, None);
    assert_eq!(outcome, GenOutcome::Failure);
    match cause {
        Some(FailureCause::Determinism(DeterminismError::WorkerFailure { detail })) => {
            assert!(detail.contains("no connected region"), "{detail}");
        }
        other => panic!("expected a worker failure, got {other:?}"),
    }
}

#[test]
fn timed_out_worker_is_replaced() {
    let mut config = worker_config();
    config.request_timeout_ms = Some(500);
    let mut oracle = DeterminismOracle::new(OracleConfig {
        worker: config,
        ..OracleConfig::default()
    });

    // Only the worker stalls: the in-process host ignores the stall by
    // running a request without it.
    let stalled = request(4).with_setting("stall_ms", json!(5_000));
    let mut host = host();
    oracle.before_generate(&stalled);
    let result = host.generate(&request(4)).unwrap();
    let err = oracle.after_generate(Some(&result), host.catalog()).unwrap_err();
    assert!(matches!(err, OracleError::Worker(WorkerError::Timeout(_))), "{err}");
    assert_eq!(oracle.worker_pid(), None);

    let verdict = oracle.run_attempt(&mut host, &request(5)).unwrap();
    assert_eq!(verdict.outcome, GenOutcome::Success);
    assert_eq!(oracle.workers_spawned(), 2);
}

#[test]
fn disabled_entry_point_is_flagged_by_its_classifier() {
    let classifier = LegacyEntryPointClassifier::default();
    let mut host = EngineHost::new(ReferenceEngine::boxed(), &classifier.legacy_policy());
    let mut oracle = oracle();

    let legacy = request(6).with_setting("use_legacy_settings", json!(true));
    let verdict = oracle.run_attempt(&mut host, &legacy).unwrap();
    assert_eq!(verdict.outcome, GenOutcome::OptionError);
    assert_eq!(
        classifier.classify(verdict.outcome, verdict.cause.as_ref()),
        GenOutcome::Failure
    );
}
