//! Outcome of one enrichment run.

use crate::core::{EnricherKind, EnricherSet, RunState, StageStatus};
use crate::errors::StageError;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Terminal outcome of one stage.
#[derive(Debug)]
pub struct StageOutcome {
    pub kind: EnricherKind,
    pub status: StageStatus,
    /// Wall time of the stage; `None` if it never started.
    pub duration: Option<Duration>,
    /// Set when the stage failed.
    pub error: Option<StageError>,
    /// Set when the stage was skipped.
    pub skip_reason: Option<String>,
}

/// Result of executing a plan.
///
/// Outcomes are listed in the order stages reached a terminal state.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub outcomes: Vec<StageOutcome>,
    /// The photo's completion marker after the run.
    pub enriched_with: EnricherSet,
    pub cancelled: bool,
    /// Set when a stop condition ended the run early.
    pub stop_reason: Option<String>,
    pub duration: Duration,
}

/// Serializable digest of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub completed: Vec<EnricherKind>,
    pub failed: Vec<EnricherKind>,
    pub skipped: Vec<EnricherKind>,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    fn kinds_with(&self, status: StageStatus) -> Vec<EnricherKind> {
        self.outcomes
            .iter()
            .filter(|o| o.status == status)
            .map(|o| o.kind)
            .collect()
    }

    /// Kinds that completed, in completion order.
    #[must_use]
    pub fn completed(&self) -> Vec<EnricherKind> {
        self.kinds_with(StageStatus::Completed)
    }

    /// Failed kinds with their errors.
    #[must_use]
    pub fn failures(&self) -> Vec<(EnricherKind, &StageError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (o.kind, e)))
            .collect()
    }

    /// Skipped kinds with the reason.
    #[must_use]
    pub fn skipped(&self) -> Vec<(EnricherKind, &str)> {
        self.outcomes
            .iter()
            .filter(|o| o.status == StageStatus::Skipped)
            .map(|o| (o.kind, o.skip_reason.as_deref().unwrap_or_default()))
            .collect()
    }

    /// Terminal status of `kind`, if it was planned.
    #[must_use]
    pub fn status_of(&self, kind: EnricherKind) -> Option<StageStatus> {
        self.outcomes.iter().find(|o| o.kind == kind).map(|o| o.status)
    }

    /// True if a stop condition ended the run.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// True if every planned stage completed and nothing ended the run early.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && !self.is_stopped()
            && self.outcomes.iter().all(|o| o.status.is_success())
    }

    /// Compact summary for logging and events.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            completed: self.completed(),
            failed: self.kinds_with(StageStatus::Failed),
            skipped: self.kinds_with(StageStatus::Skipped),
            cancelled: self.cancelled,
            stop_reason: self.stop_reason.clone(),
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(kind: EnricherKind, status: StageStatus) -> StageOutcome {
        StageOutcome {
            kind,
            status,
            duration: None,
            error: (status == StageStatus::Failed).then(|| StageError::MissingInput("preview")),
            skip_reason: (status == StageStatus::Skipped).then(|| "cancelled".to_string()),
        }
    }

    #[test]
    fn test_report_accessors() {
        let report = RunReport {
            run_id: Uuid::nil(),
            state: RunState::Drained,
            outcomes: vec![
                outcome(EnricherKind::Preview, StageStatus::Completed),
                outcome(EnricherKind::Analyze, StageStatus::Failed),
                outcome(EnricherKind::Tag, StageStatus::Skipped),
            ],
            enriched_with: EnricherSet::PREVIEW,
            cancelled: false,
            stop_reason: None,
            duration: Duration::from_millis(12),
        };

        assert_eq!(report.completed(), vec![EnricherKind::Preview]);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].0, EnricherKind::Analyze);
        assert_eq!(report.skipped(), vec![(EnricherKind::Tag, "cancelled")]);
        assert_eq!(report.status_of(EnricherKind::Tag), Some(StageStatus::Skipped));
        assert!(!report.is_success());

        let summary = report.summary();
        assert_eq!(summary.duration_ms, 12);
        assert_eq!(summary.failed, vec![EnricherKind::Analyze]);
        assert!(serde_json::to_value(&summary).unwrap().get("stop_reason").is_none());
    }

    #[test]
    fn test_stopped_run_is_not_success() {
        let report = RunReport {
            run_id: Uuid::nil(),
            state: RunState::Drained,
            outcomes: vec![outcome(EnricherKind::Preview, StageStatus::Completed)],
            enriched_with: EnricherSet::PREVIEW,
            cancelled: false,
            stop_reason: Some("duplicate photo detected".into()),
            duration: Duration::ZERO,
        };

        assert!(report.is_stopped());
        assert!(!report.is_success());
        assert_eq!(
            report.summary().stop_reason.as_deref(),
            Some("duplicate photo detected")
        );
    }
}
