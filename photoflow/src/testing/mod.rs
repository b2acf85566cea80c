//! Testing utilities for enrichment pipelines.
//!
//! This module provides:
//! - Scripted enrichers that record, fail, panic, cancel or block on a gate
//! - An execution log for asserting start/finish ordering
//! - Fixtures: working sets, contexts and stub providers

pub mod fixtures;
mod mocks;

pub use mocks::{
    CancellingStage, ConcurrencyGauge, ExecutionLog, FailingStage, GateStage, PanickingStage,
    Phase, RecordingStage,
};
