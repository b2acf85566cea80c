//! Lifecycle events emitted while a run is scheduled.
//!
//! The scheduler reports every stage transition to an [`EventSink`]. Each
//! event has a dotted type (e.g. `stage.completed`) and serializes to a JSON
//! payload tagged with its variant.

mod sink;

pub use sink::{ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::{EnricherKind, EnricherSet};
use serde::Serialize;
use uuid::Uuid;

/// A lifecycle event of one enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EnrichmentEvent {
    StageStarted {
        run_id: Uuid,
        kind: EnricherKind,
    },
    StageCompleted {
        run_id: Uuid,
        kind: EnricherKind,
        duration_ms: u64,
    },
    StageFailed {
        run_id: Uuid,
        kind: EnricherKind,
        error_type: String,
        error: String,
        duration_ms: u64,
    },
    StageSkipped {
        run_id: Uuid,
        kind: EnricherKind,
        reason: String,
    },
    PipelineStopped {
        run_id: Uuid,
        after: EnricherKind,
        reason: String,
    },
    PipelineDrained {
        run_id: Uuid,
        completed: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
        enriched_with: EnricherSet,
    },
}

impl EnrichmentEvent {
    /// The dotted event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::StageSkipped { .. } => "stage.skipped",
            Self::PipelineStopped { .. } => "pipeline.stopped",
            Self::PipelineDrained { .. } => "pipeline.drained",
        }
    }

    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        match self {
            Self::StageStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::StageFailed { run_id, .. }
            | Self::StageSkipped { run_id, .. }
            | Self::PipelineStopped { run_id, .. }
            | Self::PipelineDrained { run_id, .. } => *run_id,
        }
    }

    /// The stage the event is about; `None` for run-level events.
    #[must_use]
    pub const fn kind(&self) -> Option<EnricherKind> {
        match self {
            Self::StageStarted { kind, .. }
            | Self::StageCompleted { kind, .. }
            | Self::StageFailed { kind, .. }
            | Self::StageSkipped { kind, .. } => Some(*kind),
            Self::PipelineStopped { .. } | Self::PipelineDrained { .. } => None,
        }
    }

    /// The event as JSON.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Sends the event to `sink`.
    pub fn emit_to(&self, sink: &dyn EventSink) {
        sink.emit(self);
    }
}
