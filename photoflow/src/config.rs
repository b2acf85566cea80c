//! Run configuration for the enrichment pipeline.

use crate::core::EnricherKind;
use crate::errors::PhotoflowError;
use crate::face::FaceIdentificationConfig;
use crate::pipeline::FailureMode;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_max_parallel_photos() -> usize {
    4
}

fn default_log_timings() -> bool {
    true
}

fn default_stop_on_duplicate() -> bool {
    true
}

/// Settings for one [`crate::pipeline::EnrichmentPipeline`].
///
/// Every field has a default, so a partial JSON document is valid:
///
/// ```
/// use photoflow::config::EnrichmentConfig;
///
/// let config = EnrichmentConfig::from_json_str(r#"{"max_concurrency": 2}"#).unwrap();
/// assert_eq!(config.max_concurrency, Some(2));
/// assert_eq!(config.max_parallel_photos, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Cap on stages in flight for one photo; `None` means unbounded.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Photos processed together by `run_batch`.
    #[serde(default = "default_max_parallel_photos")]
    pub max_parallel_photos: usize,
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Log each stage's duration on completion.
    #[serde(default = "default_log_timings")]
    pub log_timings: bool,
    /// Kinds to activate; `None` keeps every registered enricher active.
    #[serde(default)]
    pub active_enrichers: Option<Vec<EnricherKind>>,
    /// End the run once the duplicate enricher finds a stored copy.
    #[serde(default = "default_stop_on_duplicate")]
    pub stop_on_duplicate: bool,
    #[serde(default)]
    pub face: FaceIdentificationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            max_parallel_photos: default_max_parallel_photos(),
            failure_mode: FailureMode::default(),
            log_timings: default_log_timings(),
            active_enrichers: None,
            stop_on_duplicate: default_stop_on_duplicate(),
            face: FaceIdentificationConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl EnrichmentConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, PhotoflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PhotoflowError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), PhotoflowError> {
        if self.max_concurrency == Some(0) {
            return Err(PhotoflowError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_parallel_photos == 0 {
            return Err(PhotoflowError::Config(
                "max_parallel_photos must be at least 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.face.threshold) {
            return Err(PhotoflowError::Config(format!(
                "face.threshold must be within [-1, 1], got {}",
                self.face.threshold
            )));
        }
        if self.face.max_candidates == 0 {
            return Err(PhotoflowError::Config(
                "face.max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    #[must_use]
    pub fn with_max_parallel_photos(mut self, photos: usize) -> Self {
        self.max_parallel_photos = photos;
        self
    }

    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    #[must_use]
    pub fn with_log_timings(mut self, enabled: bool) -> Self {
        self.log_timings = enabled;
        self
    }

    /// Restricts the run to the given kinds.
    #[must_use]
    pub fn with_active_enrichers(mut self, kinds: Vec<EnricherKind>) -> Self {
        self.active_enrichers = Some(kinds);
        self
    }

    #[must_use]
    pub fn with_stop_on_duplicate(mut self, enabled: bool) -> Self {
        self.stop_on_duplicate = enabled;
        self
    }

    #[must_use]
    pub fn with_face(mut self, face: FaceIdentificationConfig) -> Self {
        self.face = face;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
