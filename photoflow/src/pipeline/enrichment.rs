//! High-level entry point: configured enrichment of one photo or a batch.

use super::catalog::StageCatalog;
use super::diff::EnrichmentDiff;
use super::executor::DependencyExecutor;
use super::plan::ExecutionPlan;
use super::report::RunReport;
use super::stop::{DuplicateStopCondition, StopCondition};
use crate::cancellation::CancellationToken;
use crate::config::EnrichmentConfig;
use crate::core::EnricherKind;
use crate::errors::PhotoflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::model::{Photo, SourceData};
use crate::stages::Providers;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one photo of a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub photo: Photo,
    pub result: Result<RunReport, PhotoflowError>,
}

/// A catalog bound to its configuration and event sink.
#[derive(Clone)]
pub struct EnrichmentPipeline {
    catalog: StageCatalog,
    config: EnrichmentConfig,
    sink: Arc<dyn EventSink>,
    stop_conditions: Vec<Arc<dyn StopCondition>>,
}

impl std::fmt::Debug for EnrichmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentPipeline")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .field("stop_conditions", &self.stop_conditions)
            .finish_non_exhaustive()
    }
}

impl EnrichmentPipeline {
    /// Validates `config` and applies its activation list to `catalog`.
    ///
    /// With `stop_on_duplicate` set, a [`DuplicateStopCondition`] is installed.
    pub fn new(mut catalog: StageCatalog, config: EnrichmentConfig) -> Result<Self, PhotoflowError> {
        config.validate()?;
        catalog.apply_config(&config);
        let mut stop_conditions: Vec<Arc<dyn StopCondition>> = Vec::new();
        if config.stop_on_duplicate {
            stop_conditions.push(Arc::new(DuplicateStopCondition));
        }
        Ok(Self {
            catalog,
            config,
            sink: Arc::new(NoOpEventSink),
            stop_conditions,
        })
    }

    /// Every standard enricher wired to `providers`.
    pub fn standard(providers: &Providers, config: EnrichmentConfig) -> Result<Self, PhotoflowError> {
        let catalog = StageCatalog::standard(providers, &config);
        Self::new(catalog, config)
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Adds a condition that can end runs early.
    #[must_use]
    pub fn with_stop_condition(mut self, condition: Arc<dyn StopCondition>) -> Self {
        self.stop_conditions.push(condition);
        self
    }

    #[must_use]
    pub const fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    fn executor(&self) -> DependencyExecutor {
        self.stop_conditions.iter().fold(
            DependencyExecutor::new()
                .with_max_concurrency(self.config.max_concurrency)
                .with_failure_mode(self.config.failure_mode)
                .with_log_timings(self.config.log_timings)
                .with_event_sink(Arc::clone(&self.sink)),
            |executor, condition| executor.with_stop_condition(Arc::clone(condition)),
        )
    }

    /// Runs every active enricher on `photo`.
    pub async fn run(&self, photo: &mut Photo, source: SourceData) -> Result<RunReport, PhotoflowError> {
        self.run_with_cancel(photo, source, Arc::new(CancellationToken::new()))
            .await
    }

    /// Like [`Self::run`], stopping cooperatively when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        photo: &mut Photo,
        source: SourceData,
        cancel: Arc<CancellationToken>,
    ) -> Result<RunReport, PhotoflowError> {
        let plan = ExecutionPlan::build(&self.catalog)?;
        Ok(execute_on(&self.executor(), &plan, photo, source, cancel).await)
    }

    /// Runs only the active enrichers missing from the photo's completion
    /// marker. Returns `None` when nothing is missing.
    pub async fn run_missing(
        &self,
        photo: &mut Photo,
        source: SourceData,
    ) -> Result<Option<RunReport>, PhotoflowError> {
        let missing = EnrichmentDiff::new(&self.catalog).missing(photo.enriched_with)?;
        if missing.is_empty() {
            debug!(photo_id = %photo.id, "All active enrichers already applied");
            return Ok(None);
        }

        let mut subset = self.catalog.clone();
        subset.activate_only(&missing.kinds());
        let plan = ExecutionPlan::build_with_satisfied(&subset, photo.enriched_with)?;
        let cancel = Arc::new(CancellationToken::new());
        Ok(Some(
            execute_on(&self.executor(), &plan, photo, source, cancel).await,
        ))
    }

    /// Re-runs `kinds` and all their dependencies from scratch.
    ///
    /// The data owned by those kinds is cleared first. If any of them does not
    /// complete, the photo is restored to its state before the call and the
    /// report describes the failed attempt.
    pub async fn reenrich(
        &self,
        photo: &mut Photo,
        source: SourceData,
        kinds: &[EnricherKind],
    ) -> Result<RunReport, PhotoflowError> {
        if kinds.is_empty() {
            return Err(PhotoflowError::Config(
                "no enrichers requested for re-enrichment".to_string(),
            ));
        }

        let expected = EnrichmentDiff::new(&self.catalog).expand_with_dependencies(kinds)?;
        let expected_kinds = expected.kinds();
        let mut subset = self.catalog.clone();
        subset.activate_only(&expected_kinds);
        let plan = ExecutionPlan::build(&subset)?;

        info!(photo_id = %photo.id, enrichers = ?expected_kinds, "Re-enriching photo");
        let before = photo.clone();
        for kind in &expected_kinds {
            photo.clear_enrichment(*kind);
        }

        let cancel = Arc::new(CancellationToken::new());
        let report = execute_on(&self.executor(), &plan, photo, source, cancel).await;

        if !report.enriched_with.contains(expected) {
            let missing = expected.difference(report.enriched_with);
            warn!(
                photo_id = %photo.id,
                missing = ?missing.kinds(),
                "Re-enrichment incomplete, restoring previous state"
            );
            *photo = before;
        }
        Ok(report)
    }

    /// Enriches several photos, at most `max_parallel_photos` at a time.
    ///
    /// Items are returned in completion order.
    pub async fn run_batch(&self, items: impl IntoIterator<Item = (Photo, SourceData)>) -> Vec<BatchItem> {
        self.run_batch_with_cancel(items, Arc::new(CancellationToken::new()))
            .await
    }

    /// Like [`Self::run_batch`]; every run shares `cancel`.
    pub async fn run_batch_with_cancel(
        &self,
        items: impl IntoIterator<Item = (Photo, SourceData)>,
        cancel: Arc<CancellationToken>,
    ) -> Vec<BatchItem> {
        let items: Vec<_> = items.into_iter().collect();
        info!(
            photos = items.len(),
            max_parallel = self.config.max_parallel_photos,
            "Batch enrichment started"
        );

        let results: Vec<BatchItem> = stream::iter(items)
            .map(|(mut photo, source)| {
                let cancel = Arc::clone(&cancel);
                async move {
                    let result = self.run_with_cancel(&mut photo, source, cancel).await;
                    BatchItem { photo, result }
                }
            })
            .buffer_unordered(self.config.max_parallel_photos.max(1))
            .collect()
            .await;

        let succeeded = results
            .iter()
            .filter(|item| matches!(&item.result, Ok(report) if report.is_success()))
            .count();
        info!(photos = results.len(), succeeded, "Batch enrichment finished");
        results
    }
}

/// Moves `photo` behind a lock for the run and back afterwards.
pub(crate) async fn execute_on(
    executor: &DependencyExecutor,
    plan: &ExecutionPlan,
    photo: &mut Photo,
    source: SourceData,
    cancel: Arc<CancellationToken>,
) -> RunReport {
    let lease = PhotoLease::new(photo);
    let report = executor
        .execute(plan, Arc::clone(&lease.shared), Arc::new(source), cancel)
        .await;
    drop(lease);
    report
}

/// The caller's photo, lent to a run.
///
/// Dropping the lease writes the shared photo back, with every patch applied
/// so far. This also happens when the run future is dropped mid-run.
struct PhotoLease<'a> {
    photo: &'a mut Photo,
    shared: Arc<RwLock<Photo>>,
}

impl<'a> PhotoLease<'a> {
    fn new(photo: &'a mut Photo) -> Self {
        let shared = Arc::new(RwLock::new(std::mem::take(photo)));
        Self { photo, shared }
    }
}

impl Drop for PhotoLease<'_> {
    fn drop(&mut self) {
        *self.photo = std::mem::take(&mut *self.shared.write());
    }
}
