//! Error types for the photoflow enrichment engine.
//!
//! Configuration problems (unknown dependencies, cycles, duplicate stages) are
//! reported as [`PipelineValidationError`] before any stage runs. Failures of an
//! individual enricher are captured as [`StageError`] and surfaced through the
//! run report instead of aborting the whole run.

use crate::core::EnricherKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for photoflow operations.
#[derive(Debug, Error)]
pub enum PhotoflowError {
    /// The stage graph failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Invalid configuration values.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run was cancelled before it could start.
    #[error("Enrichment cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the stage graph fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The enricher kinds involved in the error.
    pub stages: Vec<EnricherKind>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<EnricherKind>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// No active enrichers were supplied.
    #[must_use]
    pub fn empty() -> Self {
        Self::new("Enrichment pipeline has no active enrichers").with_error_info(
            ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot run an empty pipeline")
                .with_fix_hint("Register and activate at least one enricher."),
        )
    }

    /// Two stages were registered for the same kind.
    #[must_use]
    pub fn duplicate(kind: EnricherKind) -> Self {
        Self::new(format!("Enricher '{kind}' is registered more than once"))
            .with_stages(vec![kind])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-004-DUPLICATE",
                    format!("Duplicate enricher '{kind}'"),
                )
                .with_fix_hint("Register each enricher kind at most once per catalog."),
            )
    }

    /// A stage listed itself as a dependency.
    #[must_use]
    pub fn self_dependency(kind: EnricherKind) -> Self {
        Self::new(format!("Enricher '{kind}' cannot depend on itself"))
            .with_stages(vec![kind])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-004-SELF_DEP",
                    format!("Enricher '{kind}' depends on itself"),
                )
                .with_fix_hint("Remove the enricher from its own dependency list."),
            )
    }

    /// A stage depends on a kind that is not registered (or not active).
    #[must_use]
    pub fn missing_dependency(stage: EnricherKind, dependency: EnricherKind) -> Self {
        Self::new(format!(
            "Enricher '{stage}' depends on '{dependency}', which is not registered or not active"
        ))
        .with_stages(vec![stage, dependency])
        .with_error_info(
            ContractErrorInfo::new(
                "CONTRACT-004-MISSING_DEP",
                format!("Dependency '{dependency}' not found"),
            )
            .with_context_entry("stage", stage.as_str())
            .with_context_entry("dependency", dependency.as_str())
            .with_fix_hint("Register and activate the dependency, or remove it from the enricher."),
        )
    }
}

/// Error raised when a cycle is detected in the dependency graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected among enrichers: {}", format_path(cycle_path))]
pub struct CycleDetectedError {
    /// The path of enrichers forming the cycle, first element repeated at the end.
    pub cycle_path: Vec<EnricherKind>,
    /// Every enricher that could not be ordered.
    pub unresolved: Vec<EnricherKind>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<EnricherKind>, unresolved: Vec<EnricherKind>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Enricher graph contains a dependency cycle: {}", format_path(&cycle_path)),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            unresolved,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.unresolved.clone(),
            error_info: Some(err.error_info),
        }
    }
}

fn format_path(path: &[EnricherKind]) -> String {
    path.iter()
        .map(EnricherKind::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure of a single enricher.
///
/// Returned from [`crate::stages::Enricher::enrich`] and collected per stage by
/// the executor; it never aborts unrelated branches.
#[derive(Debug, Error)]
pub enum StageError {
    /// An external provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),

    /// A working-set input produced by an upstream enricher is absent.
    #[error("missing input '{0}'")]
    MissingInput(&'static str),

    /// A working-set slot was written twice.
    #[error("input '{0}' was already populated")]
    InputAlreadySet(&'static str),

    /// A dependency did not complete, so the stage was never started.
    #[error("dependency '{0}' did not complete")]
    DependencyNotCompleted(EnricherKind),

    /// The stage observed cancellation.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The stage task panicked.
    #[error("enricher panicked: {0}")]
    Panicked(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Short machine-friendly name of the error variant.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::MissingInput(_) => "missing_input",
            Self::InputAlreadySet(_) => "input_already_set",
            Self::DependencyNotCompleted(_) => "dependency_not_completed",
            Self::Cancelled(_) => "cancelled",
            Self::Panicked(_) => "panicked",
            Self::Other(_) => "other",
        }
    }

    /// Returns true if the error is transient and worth retrying inside the stage.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "tag");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"tag".to_string()));
    }

    #[test]
    fn test_missing_dependency_names_kind() {
        let err = PipelineValidationError::missing_dependency(EnricherKind::Tag, EnricherKind::Analyze);

        assert_eq!(err.code(), Some("CONTRACT-004-MISSING_DEP"));
        assert!(err.to_string().contains("analyze"));
        assert_eq!(err.stages, vec![EnricherKind::Tag, EnricherKind::Analyze]);
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(
            vec![EnricherKind::Preview, EnricherKind::Analyze, EnricherKind::Preview],
            vec![EnricherKind::Preview, EnricherKind::Analyze],
        );

        assert!(err.to_string().contains("preview -> analyze -> preview"));
        assert_eq!(err.error_info.code, "CONTRACT-004-CYCLE");

        let validation: PipelineValidationError = err.into();
        assert_eq!(validation.code(), Some("CONTRACT-004-CYCLE"));
        assert_eq!(validation.stages.len(), 2);
    }

    #[test]
    fn test_stage_error_retryable() {
        let transient = StageError::from(ProviderError::Transient("timeout".into()));
        let missing = StageError::MissingInput("preview");

        assert!(transient.is_retryable());
        assert!(!missing.is_retryable());
        assert_eq!(missing.error_type(), "missing_input");
    }
}
