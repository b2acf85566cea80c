//! Receivers of enrichment lifecycle events.

use super::EnrichmentEvent;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};

/// Receiver of [`EnrichmentEvent`]s.
///
/// The scheduler calls [`EventSink::emit`] from its driver loop between stage
/// completions, so implementations must not block or panic.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EnrichmentEvent);
}

/// Discards every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &EnrichmentEvent) {}
}

/// Logs every event through `tracing`.
///
/// Failures are always logged at warn level; everything else at the
/// configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &EnrichmentEvent) {
        let event_type = event.event_type();
        let run_id = event.run_id();
        let kind = event.kind().map(|k| k.as_str()).unwrap_or_default();

        if let EnrichmentEvent::StageFailed { error, .. } = event {
            warn!(event_type, %run_id, kind, error = %error, "enrichment event");
        } else if self.level == Level::DEBUG {
            debug!(event_type, %run_id, kind, payload = %event.payload(), "enrichment event");
        } else {
            info!(event_type, %run_id, kind, payload = %event.payload(), "enrichment event");
        }
    }
}

/// Keeps every event in memory. Used by tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<EnrichmentEvent>>,
}

impl CollectingEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every collected event, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<EnrichmentEvent> {
        self.events.read().clone()
    }

    /// The dotted type of every collected event.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(EnrichmentEvent::event_type).collect()
    }

    /// Events whose type starts with `type_prefix`, e.g. `"stage."`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<EnrichmentEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &EnrichmentEvent) {
        self.events.write().push(event.clone());
    }
}

/// Forwards events to a bounded tokio channel, e.g. for a progress view.
///
/// Events are dropped, and counted, when the channel is full or closed; the
/// scheduler never waits on a slow consumer.
#[derive(Debug)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<EnrichmentEvent>,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// A sink and the receiver of its events.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EnrichmentEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            dropped: AtomicU64::new(0),
        };
        (sink, rx)
    }

    /// Number of events that could not be delivered.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &EnrichmentEvent) {
        if let Err(err) = self.tx.try_send(event.clone()) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(event_type = event.event_type(), error = %err, "Enrichment event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EnricherKind;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn started(kind: EnricherKind) -> EnrichmentEvent {
        EnrichmentEvent::StageStarted {
            run_id: Uuid::nil(),
            kind,
        }
    }

    fn failed(kind: EnricherKind) -> EnrichmentEvent {
        EnrichmentEvent::StageFailed {
            run_id: Uuid::nil(),
            kind,
            error_type: "provider".into(),
            error: "vision down".into(),
            duration_ms: 4,
        }
    }

    #[test]
    fn test_noop_and_logging_sinks_accept_every_event() {
        for sink in [
            &NoOpEventSink as &dyn EventSink,
            &LoggingEventSink::default(),
            &LoggingEventSink::debug(),
        ] {
            sink.emit(&started(EnricherKind::Preview));
            sink.emit(&failed(EnricherKind::Analyze));
        }
    }

    #[test]
    fn test_collecting_sink_filters_by_prefix() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&started(EnricherKind::Preview));
        sink.emit(&failed(EnricherKind::Preview));
        sink.emit(&EnrichmentEvent::PipelineStopped {
            run_id: Uuid::nil(),
            after: EnricherKind::Duplicate,
            reason: "duplicate photo detected".into(),
        });

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.event_types(),
            vec!["stage.started", "stage.failed", "pipeline.stopped"]
        );
        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(sink.events()[1], failed(EnricherKind::Preview));

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_counts_drops() {
        let (sink, mut rx) = ChannelEventSink::new(1);

        sink.emit(&started(EnricherKind::Tag));
        sink.emit(&started(EnricherKind::Caption));

        assert_eq!(rx.recv().await, Some(started(EnricherKind::Tag)));
        assert_eq!(sink.dropped(), 1);

        drop(rx);
        sink.emit(&started(EnricherKind::Color));
        assert_eq!(sink.dropped(), 2);
    }
}
