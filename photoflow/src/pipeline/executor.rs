//! Dependency-ordered, concurrent execution of a plan.
//!
//! Every enricher runs in its own tokio task. One driver loop owns all
//! scheduling state: it launches ready stages, waits for any of them to
//! finish, applies the result through the [`CompletionTracker`], and releases
//! dependents whose last dependency just reached a terminal state.

use super::failure::FailureMode;
use super::plan::ExecutionPlan;
use super::report::{RunReport, StageOutcome};
use super::stop::{StopCondition, StopContext};
use super::tracker::CompletionTracker;
use crate::cancellation::CancellationToken;
use crate::core::{EnricherKind, RunState, StageStatus};
use crate::errors::StageError;
use crate::events::{EnrichmentEvent, EventSink, NoOpEventSink};
use crate::model::{Photo, SourceData};
use crate::stages::{EnrichContext, PhotoPatch};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

type StageFuture = BoxFuture<'static, (usize, Result<PhotoPatch, StageError>)>;

/// Runs an [`ExecutionPlan`] with maximum safe parallelism.
#[derive(Clone)]
pub struct DependencyExecutor {
    max_concurrency: Option<usize>,
    failure_mode: FailureMode,
    log_timings: bool,
    sink: Arc<dyn EventSink>,
    stop_conditions: Vec<Arc<dyn StopCondition>>,
}

impl Default for DependencyExecutor {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            failure_mode: FailureMode::default(),
            log_timings: true,
            sink: Arc::new(NoOpEventSink),
            stop_conditions: Vec::new(),
        }
    }
}

impl std::fmt::Debug for DependencyExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyExecutor")
            .field("max_concurrency", &self.max_concurrency)
            .field("failure_mode", &self.failure_mode)
            .field("log_timings", &self.log_timings)
            .field("stop_conditions", &self.stop_conditions)
            .finish_non_exhaustive()
    }
}

impl DependencyExecutor {
    /// Creates an executor with unbounded concurrency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of stages in flight at once. `None` means unbounded.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: Option<usize>) -> Self {
        self.max_concurrency = max.map(|m| m.max(1));
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Logs per-stage durations at info level instead of debug.
    #[must_use]
    pub fn with_log_timings(mut self, log_timings: bool) -> Self {
        self.log_timings = log_timings;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Adds a condition checked after stages complete.
    #[must_use]
    pub fn with_stop_condition(mut self, condition: Arc<dyn StopCondition>) -> Self {
        self.stop_conditions.push(condition);
        self
    }

    /// The configured failure policy.
    #[must_use]
    pub const fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Executes `plan` against the shared photo and working set.
    ///
    /// Never fails as a whole: stage errors are collected in the report and
    /// every planned stage ends `Completed`, `Failed` or `Skipped`.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        photo: Arc<RwLock<Photo>>,
        source: Arc<SourceData>,
        cancel: Arc<CancellationToken>,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let photo_id = photo.read().id;
        let span = info_span!("enrichment_run", %run_id, %photo_id);

        let driver = Driver::new(self, plan, run_id, photo, source, cancel);
        driver.run().instrument(span).await
    }
}

/// Scheduling state of one run. Lives on the driver loop only.
struct Driver<'a> {
    executor: &'a DependencyExecutor,
    plan: &'a ExecutionPlan,
    run_id: Uuid,
    photo: Arc<RwLock<Photo>>,
    source: Arc<SourceData>,
    cancel: Arc<CancellationToken>,
    tracker: CompletionTracker,
    status: Vec<StageStatus>,
    remaining: Vec<usize>,
    blocked_by: Vec<Option<EnricherKind>>,
    started: Vec<Option<Instant>>,
    ready: VecDeque<usize>,
    in_flight: FuturesUnordered<StageFuture>,
    tasks: AbortOnDrop,
    outcomes: Vec<StageOutcome>,
    halted: Option<String>,
    stop_reason: Option<String>,
    cancelled: bool,
}

impl<'a> Driver<'a> {
    fn new(
        executor: &'a DependencyExecutor,
        plan: &'a ExecutionPlan,
        run_id: Uuid,
        photo: Arc<RwLock<Photo>>,
        source: Arc<SourceData>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        let n = plan.len();
        let remaining: Vec<usize> = plan.stages().iter().map(|s| s.in_degree()).collect();
        let mut status = vec![StageStatus::Pending; n];
        let mut ready = VecDeque::new();
        for (i, &count) in remaining.iter().enumerate() {
            if count == 0 {
                status[i] = StageStatus::Ready;
                ready.push_back(i);
            }
        }

        Self {
            executor,
            plan,
            run_id,
            tracker: CompletionTracker::new(Arc::clone(&photo)),
            photo,
            source,
            cancel,
            status,
            remaining,
            blocked_by: vec![None; n],
            started: vec![None; n],
            ready,
            in_flight: FuturesUnordered::new(),
            tasks: AbortOnDrop((0..n).map(|_| None).collect()),
            outcomes: Vec::with_capacity(n),
            halted: None,
            stop_reason: None,
            cancelled: false,
        }
    }

    async fn run(mut self) -> RunReport {
        let start = Instant::now();
        debug!(stages = self.plan.len(), "Enrichment run started");

        loop {
            if self.halted.is_none() && self.cancel.is_cancelled() {
                self.on_cancelled();
            }
            if self.halted.is_none() {
                self.launch_ready();
            }
            if self.in_flight.is_empty() {
                break;
            }

            let cancel = Arc::clone(&self.cancel);
            let watching = self.halted.is_none();
            tokio::select! {
                biased;
                Some((i, result)) = self.in_flight.next() => self.on_finished(i, result),
                () = cancel.cancelled(), if watching => self.on_cancelled(),
                else => break,
            }
        }

        let reason = self
            .halted
            .clone()
            .unwrap_or_else(|| "not scheduled".to_string());
        for i in 0..self.plan.len() {
            if !self.status[i].is_terminal() {
                self.skip(i, reason.clone());
            }
        }

        self.finish(start.elapsed())
    }

    fn has_capacity(&self) -> bool {
        self.executor
            .max_concurrency
            .map_or(true, |max| self.in_flight.len() < max)
    }

    fn launch_ready(&mut self) {
        while self.has_capacity() {
            let Some(i) = self.ready.pop_front() else {
                break;
            };
            self.launch(i);
        }
    }

    fn launch(&mut self, i: usize) {
        let plan = self.plan;
        let stage = &plan.stages()[i];
        let kind = stage.kind();
        let enricher = Arc::clone(&stage.enricher);
        let ctx = EnrichContext::new(
            kind,
            self.run_id,
            Arc::clone(&self.photo),
            Arc::clone(&self.source),
            Arc::clone(&self.cancel),
        );

        self.status[i] = StageStatus::Running;
        self.started[i] = Some(Instant::now());
        debug!(enricher = %kind, "Enricher started");
        EnrichmentEvent::StageStarted {
            run_id: self.run_id,
            kind,
        }
        .emit_to(self.executor.sink.as_ref());

        let span = info_span!("enricher", %kind);
        let handle = tokio::spawn(async move { enricher.enrich(&ctx).await }.instrument(span));
        self.tasks.0[i] = Some(handle.abort_handle());
        self.in_flight.push(
            async move {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(StageError::Panicked(join_error_message(e))),
                };
                (i, result)
            }
            .boxed(),
        );
    }

    fn elapsed(&self, i: usize) -> Duration {
        self.started[i].map(|s| s.elapsed()).unwrap_or_default()
    }

    fn on_finished(&mut self, i: usize, result: Result<PhotoPatch, StageError>) {
        self.tasks.0[i] = None;
        let kind = self.plan.stages()[i].kind();
        let duration = self.elapsed(i);
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(patch) => {
                self.tracker.record_success(kind, patch);
                self.status[i] = StageStatus::Completed;
                if self.executor.log_timings {
                    info!(enricher = %kind, duration_ms, "Enricher completed");
                } else {
                    debug!(enricher = %kind, "Enricher completed");
                }
                EnrichmentEvent::StageCompleted {
                    run_id: self.run_id,
                    kind,
                    duration_ms,
                }
                .emit_to(self.executor.sink.as_ref());
                self.outcomes.push(StageOutcome {
                    kind,
                    status: StageStatus::Completed,
                    duration: Some(duration),
                    error: None,
                    skip_reason: None,
                });
                self.check_stop_conditions(kind);
                self.resolve_dependents(i, true);
            }
            Err(err) => {
                self.status[i] = StageStatus::Failed;
                if matches!(err, StageError::Panicked(_)) {
                    error!(enricher = %kind, duration_ms, error = %err, "Enricher panicked");
                } else {
                    warn!(enricher = %kind, duration_ms, error = %err, "Enricher failed");
                }
                EnrichmentEvent::StageFailed {
                    run_id: self.run_id,
                    kind,
                    error_type: err.error_type().to_string(),
                    error: err.to_string(),
                    duration_ms,
                }
                .emit_to(self.executor.sink.as_ref());
                self.outcomes.push(StageOutcome {
                    kind,
                    status: StageStatus::Failed,
                    duration: Some(duration),
                    error: Some(err),
                    skip_reason: None,
                });

                if self.executor.failure_mode.halts_on_failure() && self.halted.is_none() {
                    self.halted = Some(format!("halted after '{kind}' failed"));
                }
                self.resolve_dependents(i, false);
            }
        }
    }

    /// Releases the dependents of stage `i`, cascading skips through stages
    /// that can no longer run.
    fn resolve_dependents(&mut self, i: usize, succeeded: bool) {
        let plan = self.plan;
        let mut worklist = vec![(i, succeeded)];
        while let Some((node, ok)) = worklist.pop() {
            let kind = plan.stages()[node].kind();
            for &dependent in &plan.stages()[node].dependents {
                self.remaining[dependent] -= 1;
                if !ok && self.blocked_by[dependent].is_none() {
                    self.blocked_by[dependent] = Some(kind);
                }
                if self.remaining[dependent] > 0 {
                    continue;
                }

                match self.blocked_by[dependent] {
                    Some(blocker)
                        if !self.executor.failure_mode.runs_after_incomplete_dependency() =>
                    {
                        let reason = StageError::DependencyNotCompleted(blocker).to_string();
                        self.skip(dependent, reason);
                        worklist.push((dependent, false));
                    }
                    _ => {
                        self.status[dependent] = StageStatus::Ready;
                        self.ready.push_back(dependent);
                    }
                }
            }
        }
    }

    fn skip(&mut self, i: usize, reason: String) {
        let kind = self.plan.stages()[i].kind();
        self.status[i] = StageStatus::Skipped;
        debug!(enricher = %kind, reason = %reason, "Enricher skipped");
        EnrichmentEvent::StageSkipped {
            run_id: self.run_id,
            kind,
            reason: reason.clone(),
        }
        .emit_to(self.executor.sink.as_ref());
        self.outcomes.push(StageOutcome {
            kind,
            status: StageStatus::Skipped,
            duration: None,
            error: None,
            skip_reason: Some(reason),
        });
    }

    fn check_stop_conditions(&mut self, kind: EnricherKind) {
        if self.halted.is_some() {
            return;
        }
        let reason = {
            let photo = self.photo.read();
            let ctx = StopContext {
                completed: kind,
                photo: &photo,
                source: &self.source,
            };
            self.executor
                .stop_conditions
                .iter()
                .filter(|condition| condition.applies_to(kind))
                .find_map(|condition| condition.check(&ctx))
        };
        let Some(reason) = reason else {
            return;
        };

        info!(enricher = %kind, reason = %reason, "Stop condition met");
        EnrichmentEvent::PipelineStopped {
            run_id: self.run_id,
            after: kind,
            reason: reason.clone(),
        }
        .emit_to(self.executor.sink.as_ref());
        self.halted = Some(format!("stopped: {reason}"));
        self.stop_reason = Some(reason);
    }

    fn on_cancelled(&mut self) {
        let reason = self
            .cancel
            .reason()
            .unwrap_or_else(|| "cancelled".to_string());
        warn!(reason = %reason, in_flight = self.in_flight.len(), "Enrichment run cancelled");
        self.cancelled = true;
        self.halted = Some(format!("cancelled: {reason}"));
    }

    fn finish(mut self, duration: Duration) -> RunReport {
        let enriched_with = self.tracker.marker();
        let report = RunReport {
            run_id: self.run_id,
            state: RunState::Drained,
            outcomes: std::mem::take(&mut self.outcomes),
            enriched_with,
            cancelled: self.cancelled,
            stop_reason: self.stop_reason.take(),
            duration,
        };

        let summary = report.summary();
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "Enrichment run drained"
        );
        EnrichmentEvent::PipelineDrained {
            run_id: report.run_id,
            completed: summary.completed.len(),
            failed: summary.failed.len(),
            skipped: summary.skipped.len(),
            cancelled: report.cancelled,
            enriched_with,
        }
        .emit_to(self.executor.sink.as_ref());

        report
    }
}

/// Aborts the stage tasks still running when the driver is dropped before it
/// drains, e.g. when the caller drops the run future.
struct AbortOnDrop(Vec<Option<AbortHandle>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in self.0.iter().flatten() {
            handle.abort();
        }
    }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{FnStopCondition, StageCatalog};
    use crate::testing::{
        CancellingStage, ConcurrencyGauge, ExecutionLog, FailingStage, GateStage, PanickingStage,
        Phase, RecordingStage,
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;
    use EnricherKind::{Analyze, Caption, Face, Metadata, Preview, Tag, Thumbnail};

    async fn run_with(
        executor: &DependencyExecutor,
        catalog: &StageCatalog,
        cancel: Arc<CancellationToken>,
    ) -> (RunReport, Photo) {
        let plan = ExecutionPlan::build(catalog).unwrap();
        let photo = Arc::new(RwLock::new(Photo::new("a.jpg")));
        let source = Arc::new(SourceData::new("/photos/a.jpg"));
        let report = executor
            .execute(&plan, Arc::clone(&photo), source, cancel)
            .await;
        let photo = photo.read().clone();
        (report, photo)
    }

    async fn run(executor: &DependencyExecutor, catalog: &StageCatalog) -> (RunReport, Photo) {
        run_with(executor, catalog, Arc::new(CancellationToken::new())).await
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Tag, &[Analyze], &log))
            .with(RecordingStage::new(Analyze, &[Preview], &log))
            .with(RecordingStage::new(Preview, &[], &log));

        let (report, photo) = run(&DependencyExecutor::new(), &catalog).await;

        assert_eq!(log.started(), vec![Preview, Analyze, Tag]);
        assert!(log.finished_before_started(Preview, Analyze));
        assert!(log.finished_before_started(Analyze, Tag));
        assert_eq!(report.completed(), vec![Preview, Analyze, Tag]);
        assert_eq!(report.state, RunState::Drained);
        assert!(report.is_success());
        assert_eq!(photo.enriched_with.kinds(), vec![Preview, Analyze, Tag]);
        assert_eq!(report.enriched_with, photo.enriched_with);
        assert_eq!(photo.tags.len(), 3);
    }

    #[tokio::test]
    async fn test_each_stage_runs_once_after_its_dependencies() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Preview, &[], &log))
            .with(RecordingStage::new(Metadata, &[Preview], &log))
            .with(RecordingStage::new(Analyze, &[Preview], &log))
            .with(RecordingStage::new(Face, &[Preview, Metadata], &log))
            .with(RecordingStage::new(Tag, &[Analyze], &log))
            .with(RecordingStage::new(Caption, &[Analyze], &log));

        let (report, _) = run(&DependencyExecutor::new(), &catalog).await;

        assert_eq!(report.completed().len(), 6);
        for kind in [Preview, Metadata, Analyze, Face, Tag, Caption] {
            assert_eq!(log.start_count(kind), 1, "{kind} ran more than once");
        }
        assert!(log.finished_before_started(Preview, Metadata));
        assert!(log.finished_before_started(Metadata, Face));
        assert!(log.finished_before_started(Analyze, Caption));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_independent_stages_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let gauge = ConcurrencyGauge::new();
        let catalog = StageCatalog::new()
            .with(GateStage::new(Metadata, &[], &barrier, &gauge))
            .with(GateStage::new(Analyze, &[], &barrier, &gauge));

        // Each gate only opens once both stages are in flight.
        let (report, _) = tokio::time::timeout(
            Duration::from_secs(5),
            run(&DependencyExecutor::new(), &catalog),
        )
        .await
        .expect("independent stages were not in flight together");

        assert_eq!(gauge.max_observed(), 2);
        assert_eq!(report.completed().len(), 2);
    }

    #[tokio::test]
    async fn test_max_concurrency_limits_in_flight() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Metadata, &[], &log).with_delay(Duration::from_millis(5)))
            .with(RecordingStage::new(Analyze, &[], &log).with_delay(Duration::from_millis(5)))
            .with(RecordingStage::new(Thumbnail, &[], &log).with_delay(Duration::from_millis(5)));

        let executor = DependencyExecutor::new().with_max_concurrency(Some(1));
        let (report, _) = run(&executor, &catalog).await;

        assert_eq!(report.completed().len(), 3);
        let entries = log.entries();
        for pair in entries.chunks(2) {
            assert_eq!(pair[0].0, pair[1].0);
            assert_eq!((pair[0].1, pair[1].1), (Phase::Started, Phase::Finished));
        }
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Preview, &[], &log))
            .with(FailingStage::new(Analyze, &[Preview], &log, "vision down"))
            .with(RecordingStage::new(Tag, &[Analyze], &log))
            .with(RecordingStage::new(Caption, &[Tag], &log))
            .with(RecordingStage::new(Metadata, &[Preview], &log));

        let (report, photo) = run(&DependencyExecutor::new(), &catalog).await;

        assert_eq!(report.status_of(Analyze), Some(StageStatus::Failed));
        assert_eq!(report.status_of(Tag), Some(StageStatus::Skipped));
        assert_eq!(report.status_of(Caption), Some(StageStatus::Skipped));
        assert_eq!(report.status_of(Metadata), Some(StageStatus::Completed));

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, Analyze);
        assert!(failures[0].1.to_string().contains("vision down"));

        let skipped = report.skipped();
        assert!(skipped.contains(&(Tag, "dependency 'analyze' did not complete")));
        assert!(skipped.contains(&(Caption, "dependency 'tag' did not complete")));

        assert_eq!(log.start_count(Tag), 0);
        assert_eq!(photo.enriched_with.kinds(), vec![Preview, Metadata]);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_best_effort_runs_dependents() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(FailingStage::new(Analyze, &[], &log, "boom"))
            .with(RecordingStage::new(Tag, &[Analyze], &log));

        let executor = DependencyExecutor::new().with_failure_mode(FailureMode::BestEffort);
        let (report, photo) = run(&executor, &catalog).await;

        assert_eq!(report.status_of(Analyze), Some(StageStatus::Failed));
        assert_eq!(report.status_of(Tag), Some(StageStatus::Completed));
        assert_eq!(photo.enriched_with.kinds(), vec![Tag]);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_launching_but_drains() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(FailingStage::new(Preview, &[], &log, "corrupt file"))
            .with(RecordingStage::new(Metadata, &[], &log).with_delay(Duration::from_millis(30)))
            .with(RecordingStage::new(Face, &[Metadata], &log));

        let executor = DependencyExecutor::new().with_failure_mode(FailureMode::FailFast);
        let (report, photo) = run(&executor, &catalog).await;

        assert_eq!(report.status_of(Preview), Some(StageStatus::Failed));
        assert_eq!(report.status_of(Metadata), Some(StageStatus::Completed));
        assert_eq!(report.status_of(Face), Some(StageStatus::Skipped));
        assert_eq!(log.start_count(Face), 0);
        assert!(report.skipped()[0].1.contains("halted after 'preview' failed"));
        assert!(photo.enriched_with.has(Metadata));
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_skips_pending_stages() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(CancellingStage::new(Preview, &[], &log))
            .with(RecordingStage::new(Analyze, &[Preview], &log))
            .with(RecordingStage::new(Tag, &[Analyze], &log));

        let (report, photo) = run(&DependencyExecutor::new(), &catalog).await;

        assert!(report.cancelled);
        assert_eq!(report.completed(), vec![Preview]);
        assert_eq!(log.start_count(Analyze), 0);
        let skipped = report.skipped();
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().all(|(_, reason)| *reason == "cancelled: stop requested"));
        assert_eq!(photo.enriched_with.kinds(), vec![Preview]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new().with(RecordingStage::new(Preview, &[], &log));
        let cancel = Arc::new(CancellationToken::new());
        cancel.cancel("shutdown");

        let (report, photo) = run_with(&DependencyExecutor::new(), &catalog, cancel).await;

        assert!(report.cancelled);
        assert!(log.entries().is_empty());
        assert_eq!(report.status_of(Preview), Some(StageStatus::Skipped));
        assert!(photo.enriched_with.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_stage_is_recorded_as_failure() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(PanickingStage::new(Tag, &[]))
            .with(RecordingStage::new(Metadata, &[], &log));

        let (report, _) = run(&DependencyExecutor::new(), &catalog).await;

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].1, StageError::Panicked(msg) if msg.contains("exploded")));
        assert_eq!(report.status_of(Metadata), Some(StageStatus::Completed));
    }

    #[tokio::test]
    async fn test_events_emitted_in_lifecycle_order() {
        let log = ExecutionLog::new();
        let sink = Arc::new(CollectingEventSink::new());
        let catalog = StageCatalog::new()
            .with(FailingStage::new(Preview, &[], &log, "nope"))
            .with(RecordingStage::new(Analyze, &[Preview], &log));

        let executor = DependencyExecutor::new().with_event_sink(sink.clone());
        run(&executor, &catalog).await;

        assert_eq!(
            sink.event_types(),
            vec![
                "stage.started",
                "stage.failed",
                "stage.skipped",
                "pipeline.drained"
            ]
        );
        let drained = sink.events_of_type("pipeline.drained");
        let payload = drained[0].payload();
        assert_eq!(payload["failed"], 1);
        assert_eq!(payload["skipped"], 1);
    }

    fn chain(log: &ExecutionLog) -> StageCatalog {
        StageCatalog::new()
            .with(RecordingStage::new(Analyze, &[], log))
            .with(RecordingStage::new(Metadata, &[Analyze], log))
            .with(RecordingStage::new(Tag, &[Metadata], log))
    }

    /// A condition that counts its checks and stops once `kind` is applied.
    fn stop_when_applied(
        kind: EnricherKind,
        reason: &str,
        checks: &Arc<AtomicUsize>,
    ) -> FnStopCondition<impl Fn(&StopContext<'_>) -> bool + Send + Sync> {
        let checks = Arc::clone(checks);
        FnStopCondition::new(reason, move |ctx| {
            checks.fetch_add(1, Ordering::SeqCst);
            ctx.photo.enriched_with.has(kind)
        })
    }

    #[tokio::test]
    async fn test_stop_condition_halts_run_with_reason() {
        let log = ExecutionLog::new();
        let sink = Arc::new(CollectingEventSink::new());
        let checks = Arc::new(AtomicUsize::new(0));
        let executor = DependencyExecutor::new()
            .with_event_sink(sink.clone())
            .with_stop_condition(Arc::new(stop_when_applied(
                Metadata,
                "stop on metadata",
                &checks,
            )));

        let (report, photo) = run(&executor, &chain(&log)).await;

        assert_eq!(log.started(), vec![Analyze, Metadata]);
        assert_eq!(report.stop_reason.as_deref(), Some("stop on metadata"));
        assert_eq!(report.skipped(), vec![(Tag, "stopped: stop on metadata")]);
        assert!(report.is_stopped());
        assert!(!report.is_success());
        assert!(!report.cancelled);
        assert_eq!(checks.load(Ordering::SeqCst), 2);

        // Bits of the stages that ran before the stop are kept.
        assert_eq!(photo.enriched_with.kinds(), vec![Metadata, Analyze]);
        assert_eq!(report.enriched_with, photo.enriched_with);

        let stopped = sink.events_of_type("pipeline.stopped");
        assert_eq!(stopped.len(), 1);
        let payload = stopped[0].payload();
        assert_eq!(payload["after"], "metadata");
        assert_eq!(payload["reason"], "stop on metadata");
    }

    #[tokio::test]
    async fn test_untriggered_stop_condition_lets_run_finish() {
        let log = ExecutionLog::new();
        let checks = Arc::new(AtomicUsize::new(0));
        let never = {
            let checks = Arc::clone(&checks);
            FnStopCondition::new("never", move |_| {
                checks.fetch_add(1, Ordering::SeqCst);
                false
            })
        };
        let executor = DependencyExecutor::new().with_stop_condition(Arc::new(never));

        let (report, _) = run(&executor, &chain(&log)).await;

        assert_eq!(log.started(), vec![Analyze, Metadata, Tag]);
        assert!(report.stop_reason.is_none());
        assert!(report.is_success());
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stop_condition_checked_only_after_its_kinds() {
        let log = ExecutionLog::new();
        let checks = Arc::new(AtomicUsize::new(0));
        let targeted = {
            let checks = Arc::clone(&checks);
            FnStopCondition::new("never", move |ctx| {
                checks.fetch_add(1, Ordering::SeqCst);
                assert_eq!(ctx.completed, Metadata);
                false
            })
            .after(&[Metadata])
        };
        let executor = DependencyExecutor::new().with_stop_condition(Arc::new(targeted));

        let (report, _) = run(&executor, &chain(&log)).await;

        assert!(report.is_success());
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_drains_stages_in_flight() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Preview, &[], &log))
            .with(RecordingStage::new(Metadata, &[], &log).with_delay(Duration::from_millis(30)))
            .with(RecordingStage::new(Face, &[Metadata], &log));
        let stop = FnStopCondition::new("seen enough", |_| true).after(&[Preview]);
        let executor = DependencyExecutor::new().with_stop_condition(Arc::new(stop));

        let (report, photo) = run(&executor, &catalog).await;

        assert_eq!(report.status_of(Metadata), Some(StageStatus::Completed));
        assert_eq!(report.status_of(Face), Some(StageStatus::Skipped));
        assert_eq!(log.start_count(Face), 0);
        assert_eq!(photo.enriched_with.kinds(), vec![Preview, Metadata]);
    }

    #[tokio::test]
    async fn test_dropped_execution_aborts_running_stages() {
        let log = ExecutionLog::new();
        let catalog = StageCatalog::new()
            .with(RecordingStage::new(Preview, &[], &log).with_delay(Duration::from_millis(300)));

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            run(&DependencyExecutor::new(), &catalog),
        )
        .await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(log.started(), vec![Preview]);
        assert!(log.finished().is_empty());
    }
}
