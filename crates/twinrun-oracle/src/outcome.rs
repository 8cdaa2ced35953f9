//! Attempt outcomes and their causes.

use std::fmt;

use serde::{Deserialize, Serialize};
use twinrun_diff::DiffReport;
use twinrun_worker::LegacyCallError;

/// Classification of one fuzz attempt, as consumed by the outer harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenOutcome {
    Success,
    /// A hard failure. After reclassification this only means a determinism
    /// failure.
    Failure,
    /// The engine rejected the input (an ordinary, expected failure).
    OptionError,
}

impl fmt::Display for GenOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenOutcome::Success => write!(f, "success"),
            GenOutcome::Failure => write!(f, "failure"),
            GenOutcome::OptionError => write!(f, "option_error"),
        }
    }
}

/// A determinism problem found by the oracle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeterminismError {
    /// Both runs produced a result, and the results differ.
    #[error("determinism mismatch between the in-process and worker runs\n{report}")]
    Mismatch { report: DiffReport },

    /// The in-process run produced a result, the worker run failed.
    #[error("worker failed on a request the in-process run accepted\n{detail}")]
    WorkerFailure { detail: String },
}

/// Why an attempt did not simply succeed.
#[derive(Debug, Clone)]
pub enum FailureCause {
    /// The in-process generation failed.
    Generation {
        message: String,
        /// Set when the failure was a call to a disabled legacy entry point.
        disabled_entry_point: Option<String>,
    },
    Determinism(DeterminismError),
}

impl FailureCause {
    /// Describe an engine error, keeping track of disabled entry point calls
    /// anywhere in its cause chain.
    pub fn from_engine_error(error: &anyhow::Error) -> Self {
        let disabled_entry_point = error.chain().find_map(|cause| {
            match cause.downcast_ref::<LegacyCallError>() {
                Some(LegacyCallError::Disabled { name }) => Some(name.clone()),
                _ => None,
            }
        });
        FailureCause::Generation {
            message: format!("{error:#}"),
            disabled_entry_point,
        }
    }

    pub fn determinism(&self) -> Option<&DeterminismError> {
        match self {
            FailureCause::Determinism(error) => Some(error),
            FailureCause::Generation { .. } => None,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Generation { message, .. } => f.write_str(message),
            FailureCause::Determinism(error) => write!(f, "{error}"),
        }
    }
}

/// Final result of one attempt.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub outcome: GenOutcome,
    pub cause: Option<FailureCause>,
    /// Content hash of the in-process snapshot, when there was one.
    pub snapshot_hash: Option<String>,
}

impl Verdict {
    pub fn determinism_error(&self) -> Option<&DeterminismError> {
        self.cause.as_ref().and_then(FailureCause::determinism)
    }

    pub fn is_determinism_failure(&self) -> bool {
        self.determinism_error().is_some()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outcome)?;
        if let Some(hash) = &self.snapshot_hash {
            write!(f, " [{}]", &hash[..hash.len().min(16)])?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_entry_point_is_found_in_the_chain() {
        let error = anyhow::Error::new(LegacyCallError::Disabled {
            name: "get_settings".to_owned(),
        })
        .context("reading host settings");
        match FailureCause::from_engine_error(&error) {
            FailureCause::Generation {
                message,
                disabled_entry_point,
            } => {
                assert_eq!(disabled_entry_point.as_deref(), Some("get_settings"));
                assert_eq!(
                    message,
                    "reading host settings: legacy entry point 'get_settings' is disabled"
                );
            }
            other => panic!("unexpected cause {other:?}"),
        }
    }

    #[test]
    fn verdict_display_is_one_line_for_plain_outcomes() {
        let verdict = Verdict {
            outcome: GenOutcome::Success,
            cause: None,
            snapshot_hash: Some("0123456789abcdef0123".to_owned()),
        };
        assert_eq!(verdict.to_string(), "success [0123456789abcdef]");
        assert!(!verdict.is_determinism_failure());
    }
}
