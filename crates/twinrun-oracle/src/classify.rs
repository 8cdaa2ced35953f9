//! Outcome classifiers.
//!
//! Classifiers sit beside the determinism oracle in the outer pipeline. Each
//! one looks at a finished attempt and answers a narrower question than the
//! oracle does: "did the engine touch a deprecated entry point?", "did
//! generation fail with a known-interesting message?".

use twinrun_worker::legacy::LegacyPolicy;

use crate::outcome::{FailureCause, GenOutcome};

/// A pass/fail verdict over a finished attempt.
pub trait OutcomeClassifier {
    fn name(&self) -> &str;

    /// Legacy entry point policy the in-process engine must run under for
    /// this classifier to work.
    fn legacy_policy(&self) -> LegacyPolicy {
        LegacyPolicy::default()
    }

    /// `Failure` if the attempt is interesting to this classifier, else
    /// `Success`.
    fn classify(&self, outcome: GenOutcome, cause: Option<&FailureCause>) -> GenOutcome;
}

// ---------------------------------------------------------------------------
// LegacyEntryPointClassifier
// ---------------------------------------------------------------------------

/// Flags attempts in which the engine called a deprecated entry point.
#[derive(Debug, Clone)]
pub struct LegacyEntryPointClassifier {
    entry_points: Vec<String>,
}

impl Default for LegacyEntryPointClassifier {
    fn default() -> Self {
        Self::new(["get_settings", "get_options"])
    }
}

impl LegacyEntryPointClassifier {
    pub fn new<I, S>(entry_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entry_points: entry_points.into_iter().map(Into::into).collect(),
        }
    }
}

impl OutcomeClassifier for LegacyEntryPointClassifier {
    fn name(&self) -> &str {
        "legacy-entry-points"
    }

    fn legacy_policy(&self) -> LegacyPolicy {
        LegacyPolicy {
            silence: Vec::new(),
            disable: self.entry_points.clone(),
        }
    }

    fn classify(&self, _outcome: GenOutcome, cause: Option<&FailureCause>) -> GenOutcome {
        match cause {
            Some(FailureCause::Generation {
                disabled_entry_point: Some(name),
                ..
            }) if self.entry_points.contains(name) => GenOutcome::Failure,
            _ => GenOutcome::Success,
        }
    }
}

// ---------------------------------------------------------------------------
// MessageClassifier
// ---------------------------------------------------------------------------

/// Flags attempts whose failure text contains one of a set of needles
/// (case-insensitive).
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    needles: Vec<String>,
}

impl Default for MessageClassifier {
    /// Region graph failures: unreachable regions and broken entrances.
    fn default() -> Self {
        Self::new([
            "no connected region",
            "tried to search through an entrance",
        ])
    }
}

impl MessageClassifier {
    pub fn new<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles
                .into_iter()
                .map(|n| n.into().to_lowercase())
                .collect(),
        }
    }
}

impl OutcomeClassifier for MessageClassifier {
    fn name(&self) -> &str {
        "failure-message"
    }

    fn classify(&self, _outcome: GenOutcome, cause: Option<&FailureCause>) -> GenOutcome {
        let Some(cause) = cause else {
            return GenOutcome::Success;
        };
        let text = cause.to_string().to_lowercase();
        if self.needles.iter().any(|needle| text.contains(needle)) {
            GenOutcome::Failure
        } else {
            GenOutcome::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(message: &str, disabled: Option<&str>) -> FailureCause {
        FailureCause::Generation {
            message: message.to_owned(),
            disabled_entry_point: disabled.map(str::to_owned),
        }
    }

    #[test]
    fn legacy_classifier_only_flags_disabled_calls() {
        let classifier = LegacyEntryPointClassifier::default();
        assert_eq!(classifier.legacy_policy().disable, vec!["get_settings", "get_options"]);

        let hit = generation("legacy entry point 'get_settings' is disabled", Some("get_settings"));
        assert_eq!(classifier.classify(GenOutcome::Failure, Some(&hit)), GenOutcome::Failure);

        let other = generation("invalid value for option goal", None);
        assert_eq!(classifier.classify(GenOutcome::Failure, Some(&other)), GenOutcome::Success);
        assert_eq!(classifier.classify(GenOutcome::Success, None), GenOutcome::Success);
    }

    #[test]
    fn message_classifier_is_case_insensitive() {
        let classifier = MessageClassifier::default();
        let hit = generation("No Connected Region for player 1: Sealed Vault", None);
        assert_eq!(classifier.classify(GenOutcome::Failure, Some(&hit)), GenOutcome::Failure);

        let miss = generation("unknown game 'Swamp'", None);
        assert_eq!(classifier.classify(GenOutcome::Failure, Some(&miss)), GenOutcome::Success);
    }
}
