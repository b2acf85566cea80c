//! Planning and execution of enricher graphs.
//!
//! This module provides:
//! - The stage catalog and its activation flags
//! - Graph validation and the execution plan
//! - The dependency executor and completion tracker
//! - Diffing of completion markers and the high-level pipeline facade

mod catalog;
mod diff;
mod enrichment;
mod executor;
mod failure;
mod plan;
mod report;
mod stop;
mod tracker;

pub use catalog::{StageCatalog, StageDescriptor};
pub use diff::EnrichmentDiff;
pub use enrichment::{BatchItem, EnrichmentPipeline};
pub use executor::DependencyExecutor;
pub use failure::FailureMode;
pub use plan::{ExecutionPlan, PlannedStage};
pub use report::{RunReport, RunSummary, StageOutcome};
pub use stop::{DuplicateStopCondition, FnStopCondition, StopCondition, StopContext};
pub use tracker::CompletionTracker;

use crate::cancellation::CancellationToken;
use crate::errors::PhotoflowError;
use crate::model::{Photo, SourceData};
use std::sync::Arc;

/// Validates the active stages of `catalog` and runs them on `photo` with the
/// default executor.
///
/// Fails only on configuration errors, before any stage starts. Stage
/// failures are reported in [`RunReport::failures`].
pub async fn run_all(
    catalog: &StageCatalog,
    photo: &mut Photo,
    source: SourceData,
) -> Result<RunReport, PhotoflowError> {
    let plan = ExecutionPlan::build(catalog)?;
    let cancel = Arc::new(CancellationToken::new());
    Ok(enrichment::execute_on(&DependencyExecutor::new(), &plan, photo, source, cancel).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EnricherKind::{Analyze, Preview, Tag};
    use crate::testing::{ExecutionLog, RecordingStage};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_all_chain() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Preview, &[], &log))
            .with(RecordingStage::new(Analyze, &[Preview], &log))
            .with(RecordingStage::new(Tag, &[Analyze], &log));
        let mut photo = Photo::new("a.jpg");

        let report = run_all(&catalog, &mut photo, SourceData::new("/a.jpg"))
            .await
            .unwrap();

        assert_eq!(report.completed(), vec![Preview, Analyze, Tag]);
        assert_eq!(photo.enriched_with.kinds(), vec![Preview, Analyze, Tag]);
    }

    #[tokio::test]
    async fn test_run_all_cycle_executes_nothing() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Analyze, &[Tag], &log))
            .with(RecordingStage::new(Tag, &[Analyze], &log));
        let mut photo = Photo::new("a.jpg");

        let err = run_all(&catalog, &mut photo, SourceData::new("/a.jpg"))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            PhotoflowError::Validation(e) if e.code() == Some("CONTRACT-004-CYCLE")
        ));
        assert!(log.entries().is_empty());
    }
}
