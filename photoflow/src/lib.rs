//! # Photoflow
//!
//! Dependency-ordered enrichment of photo records.
//!
//! A photo is enriched by a set of pluggable enrichers (preview, metadata,
//! cloud vision analysis, tags, captions, faces, thumbnails and so on). Each
//! enricher declares the kinds it depends on; photoflow validates the graph,
//! runs independent enrichers concurrently on tokio, and records every
//! completed kind in the photo's completion marker.
//!
//! - **Graph validation**: missing dependencies and cycles are rejected before
//!   anything runs
//! - **Failure isolation**: a failed enricher only affects its dependents
//! - **Face identification**: nearest-person search with a birth-date check
//! - **Stop conditions**: end a run early, e.g. once a duplicate is found
//! - **Re-enrichment**: run only what is missing, or redo selected kinds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use photoflow::prelude::*;
//!
//! let pipeline = EnrichmentPipeline::standard(&providers, EnrichmentConfig::default())?;
//! let mut photo = Photo::new("beach.jpg");
//! let report = pipeline.run(&mut photo, SourceData::new("/photos/beach.jpg")).await?;
//!
//! for (kind, error) in report.failures() {
//!     eprintln!("{kind} failed: {error}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod face;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod stages;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::EnrichmentConfig;
    pub use crate::core::{EnricherKind, EnricherSet, RunState, StageStatus};
    pub use crate::errors::{
        ContractErrorInfo, CycleDetectedError, PhotoflowError, PipelineValidationError,
        StageError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::face::{FaceIdentificationConfig, FaceIdentifier};
    pub use crate::model::{Photo, SourceData};
    pub use crate::pipeline::{
        run_all, DependencyExecutor, EnrichmentDiff, EnrichmentPipeline, ExecutionPlan,
        FailureMode, FnStopCondition, RunReport, StageCatalog, StopCondition,
    };
    pub use crate::retry::RetryConfig;
    pub use crate::stages::{EnrichContext, Enricher, FnEnricher, PhotoPatch, Providers};
}
