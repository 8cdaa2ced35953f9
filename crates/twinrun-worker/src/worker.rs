//! Worker side of the protocol.
//!
//! [`serve`] is the whole worker: send the ready sentinel, then answer one
//! generation request per frame until the parent closes the channel. It is
//! generic over the byte streams so it can be driven in memory by tests;
//! [`worker_main`] binds it to the process's stdin/stdout.
//!
//! # Per-attempt contract
//!
//! 1. Reset the diagnostic buffer.
//! 2. Run the engine under `catch_unwind`. An engine error, a panic, or a
//!    snapshot failure becomes an `["error", text]` reply. Nothing an engine
//!    does can end the loop.
//! 3. Send the reply.
//! 4. Evict every registered cache.

use std::any::Any;
use std::backtrace::Backtrace;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use tracing_subscriber::EnvFilter;
use twinrun_snapshot::request::GenerationRequest;
use twinrun_snapshot::snapshot::capture_snapshot;

use crate::channel::{FrameReader, FrameWriter};
use crate::diagnostics::DiagnosticSink;
use crate::engine::{EngineHost, EngineRegistry};
use crate::legacy::LegacyPolicy;
use crate::protocol::{WorkerReply, READY};
use crate::ChannelError;

/// Counters reported when the serve loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub attempts: u64,
    pub failures: u64,
    pub evicted_entries: u64,
}

// ---------------------------------------------------------------------------
// Serve loop
// ---------------------------------------------------------------------------

/// Run the worker protocol until the parent closes the channel.
///
/// Returns `Ok` when the channel is closed, which is the only normal way for
/// a worker to stop.
///
/// # Errors
///
/// Any channel error other than [`ChannelError::Closed`] (a failed write of a
/// reply, for instance).
pub fn serve<R: Read, W: Write>(
    host: &mut EngineHost,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    sink: &DiagnosticSink,
) -> Result<ServeStats, ChannelError> {
    writer.send(READY)?;
    sink.start_capture();
    tracing::debug!(engine = host.engine_name(), "worker ready");

    let mut stats = ServeStats::default();
    loop {
        let payload = match reader.read_frame() {
            Ok(payload) => payload,
            Err(ChannelError::Closed) => return Ok(stats),
            Err(e) => return Err(e),
        };

        sink.reset();
        // A malformed request still arrived as a complete frame, so the
        // stream is in sync and the loop can go on.
        let reply = match serde_json::from_slice::<GenerationRequest>(&payload) {
            Ok(request) => attempt(host, &request, sink),
            Err(e) => {
                let error = anyhow::Error::new(e).context("malformed generation request");
                WorkerReply::Error(failure_text(&error, &sink.take()))
            }
        };

        stats.attempts += 1;
        if matches!(reply, WorkerReply::Error(_)) {
            stats.failures += 1;
        }
        writer.send(&reply)?;

        let evicted = host.evict_caches();
        stats.evicted_entries += evicted.entries as u64;
    }
}

fn attempt(
    host: &mut EngineHost,
    request: &GenerationRequest,
    sink: &DiagnosticSink,
) -> WorkerReply {
    let span = tracing::debug_span!(
        "attempt",
        seed = request.seed,
        players = request.players.len()
    );
    let _enter = span.enter();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| host.generate(request)));
    let error = match outcome {
        Ok(Ok(result)) => match capture_snapshot(&result, host.catalog()) {
            Ok(snapshot) => {
                tracing::debug!(locations = snapshot.location_count(), "generation succeeded");
                return WorkerReply::Ok(Box::new(snapshot));
            }
            Err(e) => anyhow::Error::new(e).context("failed to snapshot generation result"),
        },
        Ok(Err(e)) => e,
        Err(payload) => anyhow::anyhow!("generation panicked: {}", panic_message(payload.as_ref())),
    };

    tracing::debug!(error = %error, "generation failed");
    WorkerReply::Error(failure_text(&error, &sink.take()))
}

/// Error reply text: message, full cause chain, captured diagnostics.
pub fn failure_text(error: &anyhow::Error, diagnostics: &str) -> String {
    format!("{error}\n{error:?}\n{diagnostics}")
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Process entry point
// ---------------------------------------------------------------------------

/// Run a worker process for the engine registered under `locator`.
///
/// Installs the diagnostic subscriber and a panic hook that logs the
/// backtrace into the current attempt's diagnostics, then serves on
/// stdin/stdout. Exits the process with status 0 when the parent closes
/// the channel.
///
/// # Errors
///
/// Fails before the handshake if logging cannot be installed or the locator
/// is unknown. The error should be reported on stderr, where the parent
/// salvages it for its startup failure.
pub fn worker_main(locator: &str, registry: &EngineRegistry) -> anyhow::Result<()> {
    let sink = DiagnosticSink::stderr();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(sink.clone())
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install worker logging: {e}"))?;

    panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!(%info, %backtrace, "engine panicked");
    }));

    let engine = registry.create(locator)?;
    let mut host = EngineHost::new(engine, &LegacyPolicy::worker());

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = FrameReader::new(BufReader::new(stdin.lock()));
    let mut writer = FrameWriter::new(BufWriter::new(stdout.lock()));

    let stats = serve(&mut host, &mut reader, &mut writer, &sink)?;
    tracing::debug!(
        attempts = stats.attempts,
        failures = stats.failures,
        "channel closed, worker exiting"
    );
    std::process::exit(0)
}
