//! Scripted enrichers for scheduler tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::model::PhotoTag;
use crate::stages::{EnrichContext, Enricher, PhotoPatch};

/// Start or end of a stage's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Started,
    Finished,
}

/// Shared, ordered record of stage starts and finishes.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<(EnricherKind, Phase)>>>,
}

impl ExecutionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, kind: EnricherKind, phase: Phase) {
        self.entries.lock().push((kind, phase));
    }

    /// All entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<(EnricherKind, Phase)> {
        self.entries.lock().clone()
    }

    fn kinds(&self, phase: Phase) -> Vec<EnricherKind> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, p)| *p == phase)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Kinds in the order they started.
    #[must_use]
    pub fn started(&self) -> Vec<EnricherKind> {
        self.kinds(Phase::Started)
    }

    /// Kinds in the order they finished.
    #[must_use]
    pub fn finished(&self) -> Vec<EnricherKind> {
        self.kinds(Phase::Finished)
    }

    /// How many times `kind` started.
    #[must_use]
    pub fn start_count(&self, kind: EnricherKind) -> usize {
        self.started().into_iter().filter(|k| *k == kind).count()
    }

    /// Index of the first `(kind, phase)` entry.
    #[must_use]
    pub fn position(&self, kind: EnricherKind, phase: Phase) -> Option<usize> {
        self.entries.lock().iter().position(|e| *e == (kind, phase))
    }

    /// True if `first` finished before `then` started.
    #[must_use]
    pub fn finished_before_started(&self, first: EnricherKind, then: EnricherKind) -> bool {
        match (
            self.position(first, Phase::Finished),
            self.position(then, Phase::Started),
        ) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

fn tag_patch(kind: EnricherKind) -> PhotoPatch {
    PhotoPatch::new(move |photo| {
        photo.tags.push(PhotoTag {
            name: kind.to_string(),
            confidence: 1.0,
        });
    })
}

/// Records start/finish, optionally sleeps, then tags the photo with its kind.
#[derive(Debug, Clone)]
pub struct RecordingStage {
    kind: EnricherKind,
    dependencies: Vec<EnricherKind>,
    log: ExecutionLog,
    delay: Option<Duration>,
}

impl RecordingStage {
    /// Creates a recording stage.
    #[must_use]
    pub fn new(kind: EnricherKind, dependencies: &[EnricherKind], log: &ExecutionLog) -> Self {
        Self {
            kind,
            dependencies: dependencies.to_vec(),
            log: log.clone(),
            delay: None,
        }
    }

    /// Sleeps for `delay` between start and finish.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Enricher for RecordingStage {
    fn kind(&self) -> EnricherKind {
        self.kind
    }

    fn dependencies(&self) -> &[EnricherKind] {
        &self.dependencies
    }

    async fn enrich(&self, _ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        self.log.record(self.kind, Phase::Started);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.record(self.kind, Phase::Finished);
        Ok(tag_patch(self.kind))
    }
}

/// Always fails with [`StageError::Other`].
#[derive(Debug, Clone)]
pub struct FailingStage {
    kind: EnricherKind,
    dependencies: Vec<EnricherKind>,
    log: ExecutionLog,
    message: String,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(
        kind: EnricherKind,
        dependencies: &[EnricherKind],
        log: &ExecutionLog,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            dependencies: dependencies.to_vec(),
            log: log.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Enricher for FailingStage {
    fn kind(&self) -> EnricherKind {
        self.kind
    }

    fn dependencies(&self) -> &[EnricherKind] {
        &self.dependencies
    }

    async fn enrich(&self, _ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        self.log.record(self.kind, Phase::Started);
        Err(StageError::Other(anyhow::anyhow!(self.message.clone())))
    }
}

/// Panics inside its task.
#[derive(Debug, Clone)]
pub struct PanickingStage {
    kind: EnricherKind,
    dependencies: Vec<EnricherKind>,
}

impl PanickingStage {
    #[must_use]
    pub fn new(kind: EnricherKind, dependencies: &[EnricherKind]) -> Self {
        Self {
            kind,
            dependencies: dependencies.to_vec(),
        }
    }
}

#[async_trait]
impl Enricher for PanickingStage {
    fn kind(&self) -> EnricherKind {
        self.kind
    }

    fn dependencies(&self) -> &[EnricherKind] {
        &self.dependencies
    }

    async fn enrich(&self, _ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        panic!("{} exploded", self.kind);
    }
}

/// Cancels the run from inside, then completes.
#[derive(Debug, Clone)]
pub struct CancellingStage {
    kind: EnricherKind,
    dependencies: Vec<EnricherKind>,
    log: ExecutionLog,
}

impl CancellingStage {
    #[must_use]
    pub fn new(kind: EnricherKind, dependencies: &[EnricherKind], log: &ExecutionLog) -> Self {
        Self {
            kind,
            dependencies: dependencies.to_vec(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Enricher for CancellingStage {
    fn kind(&self) -> EnricherKind {
        self.kind
    }

    fn dependencies(&self) -> &[EnricherKind] {
        &self.dependencies
    }

    async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        self.log.record(self.kind, Phase::Started);
        ctx.cancellation().cancel("stop requested");
        self.log.record(self.kind, Phase::Finished);
        Ok(tag_patch(self.kind))
    }
}

/// Tracks how many gated stages are inside their critical section.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of stages observed in flight together.
    #[must_use]
    pub fn max_observed(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Waits on a shared barrier, so it only finishes once every stage sharing
/// the barrier is running at the same time.
#[derive(Debug, Clone)]
pub struct GateStage {
    kind: EnricherKind,
    dependencies: Vec<EnricherKind>,
    barrier: Arc<Barrier>,
    gauge: Arc<ConcurrencyGauge>,
}

impl GateStage {
    #[must_use]
    pub fn new(
        kind: EnricherKind,
        dependencies: &[EnricherKind],
        barrier: &Arc<Barrier>,
        gauge: &Arc<ConcurrencyGauge>,
    ) -> Self {
        Self {
            kind,
            dependencies: dependencies.to_vec(),
            barrier: Arc::clone(barrier),
            gauge: Arc::clone(gauge),
        }
    }
}

#[async_trait]
impl Enricher for GateStage {
    fn kind(&self) -> EnricherKind {
        self.kind
    }

    fn dependencies(&self) -> &[EnricherKind] {
        &self.dependencies
    }

    async fn enrich(&self, _ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
        self.gauge.enter();
        self.barrier.wait().await;
        self.gauge.exit();
        Ok(tag_patch(self.kind))
    }
}
