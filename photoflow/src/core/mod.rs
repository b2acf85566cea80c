//! Core domain model types for photoflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - The enricher kind tag and the completion marker bitset
//! - Per-stage and per-run status enums

mod kind;
mod status;

pub use kind::{EnricherKind, EnricherSet, UnknownEnricherKind};
pub use status::{RunState, StageStatus};
