//! twinrun command line.
//!
//! ```text
//! twinrun check request.json --attempts 50
//! twinrun worker reference        # spawned by `check`, speaks the frame protocol
//! ```

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use twinrun_oracle::prelude::*;
use twinrun_snapshot::request::GenerationRequest;
use twinrun_worker::config::WorkerConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "twinrun: determinism oracle for procedural generation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as a worker process on stdin/stdout.
    Worker {
        /// Engine locator.
        engine: String,
    },

    /// Generate a request in-process and in a worker, and compare.
    Check {
        /// JSON file holding a generation request.
        request: PathBuf,

        /// Engine locator.
        #[arg(long, default_value = twinrun_oracle::reference::LOCATOR)]
        engine: String,

        /// Oracle configuration file (JSON).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of attempts; attempt `i` uses seed `seed + i`.
        #[arg(long, default_value_t = 1)]
        attempts: u64,

        /// Extra classifier to run beside the oracle.
        #[arg(long, value_enum)]
        classifier: Option<ClassifierKind>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ClassifierKind {
    /// Flag calls to deprecated legacy entry points.
    LegacyEntryPoints,
    /// Flag unreachable regions and broken entrances.
    UnreachableRegion,
}

impl ClassifierKind {
    fn build(self) -> Box<dyn OutcomeClassifier> {
        match self {
            ClassifierKind::LegacyEntryPoints => Box::new(LegacyEntryPointClassifier::default()),
            ClassifierKind::UnreachableRegion => Box::new(MessageClassifier::default()),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        // The worker installs its own capturing subscriber.
        Commands::Worker { engine } => {
            match twinrun_worker::worker::worker_main(&engine, &twinrun_oracle::engine_registry()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("twinrun worker: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Check {
            request,
            engine,
            config,
            attempts,
            classifier,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .with_writer(std::io::stderr)
                .init();

            let classifier = classifier.map(ClassifierKind::build);
            match check(&request, &engine, config.as_deref(), attempts, classifier.as_deref()) {
                Ok(false) => ExitCode::SUCCESS,
                Ok(true) => ExitCode::from(2),
                Err(e) => {
                    eprintln!("twinrun check: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Returns whether any attempt was a determinism failure.
fn check(
    request_path: &std::path::Path,
    engine: &str,
    config_path: Option<&std::path::Path>,
    attempts: u64,
    classifier: Option<&dyn OutcomeClassifier>,
) -> anyhow::Result<bool> {
    let text = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading {}", request_path.display()))?;
    let base: GenerationRequest = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", request_path.display()))?;

    let config = load_config(engine, config_path)?;

    let mut policy = config.legacy.clone();
    if let Some(classifier) = classifier {
        policy = policy.merged(&classifier.legacy_policy());
    }
    let registry = twinrun_oracle::engine_registry();
    let mut host = EngineHost::new(registry.create(engine)?, &policy);
    let mut oracle = DeterminismOracle::new(config);

    let mut determinism_failures = 0usize;
    for i in 0..attempts {
        let mut request = base.clone();
        request.seed = base.seed.wrapping_add(i);

        let verdict = oracle.run_attempt(&mut host, &request)?;
        println!("seed {}: {verdict}", request.seed);
        if verdict.is_determinism_failure() {
            determinism_failures += 1;
        }
        if let Some(classifier) = classifier {
            let flagged = classifier.classify(verdict.outcome, verdict.cause.as_ref());
            if flagged == GenOutcome::Failure {
                println!("seed {}: flagged by {}", request.seed, classifier.name());
            }
        }
    }

    tracing::info!(
        attempts,
        determinism_failures,
        workers = oracle.workers_spawned(),
        "check finished"
    );
    Ok(determinism_failures > 0)
}

/// The oracle configuration for `engine`. The worker always hosts the same
/// engine as the in-process run, whatever the file says.
fn load_config(
    engine: &str,
    config_path: Option<&std::path::Path>,
) -> Result<OracleConfig, OracleError> {
    let mut config = match config_path {
        Some(path) => OracleConfig::from_json_file(path)?,
        None => OracleConfig {
            worker: WorkerConfig::for_current_exe(engine),
            ..OracleConfig::default()
        },
    };
    if config.worker.locator() != Some(engine) {
        tracing::debug!(
            configured = ?config.worker.locator(),
            engine,
            "worker locator overridden by --engine"
        );
        config.worker.set_locator(engine);
    }
    Ok(config)
}
