//! Policy for stages whose dependencies did not complete.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the scheduler reacts to a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Skip every transitive dependent of a failed stage; unrelated branches
    /// keep running.
    #[default]
    SkipDependents,
    /// Treat any terminal dependency as resolved and run dependents anyway.
    BestEffort,
    /// Launch nothing after the first failure; drain in-flight stages.
    FailFast,
}

impl FailureMode {
    /// Whether a stage may start when one of its dependencies did not complete.
    #[must_use]
    pub const fn runs_after_incomplete_dependency(&self) -> bool {
        matches!(self, Self::BestEffort)
    }

    /// Whether the first failure stops further launches.
    #[must_use]
    pub const fn halts_on_failure(&self) -> bool {
        matches!(self, Self::FailFast)
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipDependents => write!(f, "skip_dependents"),
            Self::BestEffort => write!(f, "best_effort"),
            Self::FailFast => write!(f, "fail_fast"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_skips_dependents() {
        let mode = FailureMode::default();
        assert_eq!(mode, FailureMode::SkipDependents);
        assert!(!mode.runs_after_incomplete_dependency());
        assert!(!mode.halts_on_failure());
    }

    #[test]
    fn test_policies() {
        assert!(FailureMode::BestEffort.runs_after_incomplete_dependency());
        assert!(FailureMode::FailFast.halts_on_failure());
        assert!(!FailureMode::FailFast.runs_after_incomplete_dependency());
    }

    #[test]
    fn test_serde_names() {
        let mode: FailureMode = serde_json::from_str(r#""fail_fast""#).unwrap();
        assert_eq!(mode, FailureMode::FailFast);
        assert_eq!(FailureMode::BestEffort.to_string(), "best_effort");
    }
}
