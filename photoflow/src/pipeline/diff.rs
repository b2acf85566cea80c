//! Which enrichers still have to run for a photo.
//!
//! Data-provider kinds ([`EnricherKind::is_data_provider`]) fill the working
//! set, which is never persisted. When a kind that depends on one of them has
//! to run, the provider runs again even if its completion bit is already set.

use super::catalog::StageCatalog;
use crate::core::{EnricherKind, EnricherSet};
use crate::errors::{CycleDetectedError, PipelineValidationError};

/// Dependency-aware comparison of a completion marker with a catalog.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentDiff<'a> {
    catalog: &'a StageCatalog,
}

impl<'a> EnrichmentDiff<'a> {
    #[must_use]
    pub const fn new(catalog: &'a StageCatalog) -> Self {
        Self { catalog }
    }

    /// Active kinds that are not in `marker`, together with the dependencies
    /// they need re-run.
    ///
    /// Dependencies already in `marker` are left out unless they are data
    /// providers; build the plan with
    /// [`super::ExecutionPlan::build_with_satisfied`] so the omitted ones
    /// count as satisfied.
    pub fn missing(&self, marker: EnricherSet) -> Result<EnricherSet, PipelineValidationError> {
        let mut walk = Walk::new(self.catalog, Some(marker));
        for kind in self.catalog.active_kinds() {
            walk.visit(kind, None)?;
        }
        Ok(walk.included)
    }

    /// True if [`Self::missing`] is non-empty.
    pub fn needs_enrichment(&self, marker: EnricherSet) -> Result<bool, PipelineValidationError> {
        Ok(!self.missing(marker)?.is_empty())
    }

    /// `requested` plus every transitive dependency, whether applied or not.
    pub fn expand_with_dependencies(
        &self,
        requested: &[EnricherKind],
    ) -> Result<EnricherSet, PipelineValidationError> {
        let mut walk = Walk::new(self.catalog, None);
        for &kind in requested {
            walk.visit(kind, None)?;
        }
        Ok(walk.included)
    }

    /// Registered kinds whose bit is set in `marker`.
    #[must_use]
    pub fn applied(&self, marker: EnricherSet) -> Vec<EnricherKind> {
        self.catalog
            .iter()
            .map(|stage| stage.kind())
            .filter(|kind| marker.has(*kind))
            .collect()
    }
}

/// Depth-first walk over declared dependencies.
struct Walk<'a> {
    catalog: &'a StageCatalog,
    /// `None` includes every reachable kind.
    marker: Option<EnricherSet>,
    included: EnricherSet,
    visiting: Vec<EnricherKind>,
}

impl<'a> Walk<'a> {
    fn new(catalog: &'a StageCatalog, marker: Option<EnricherSet>) -> Self {
        Self {
            catalog,
            marker,
            included: EnricherSet::empty(),
            visiting: Vec::new(),
        }
    }

    fn visit(
        &mut self,
        kind: EnricherKind,
        needed_by: Option<EnricherKind>,
    ) -> Result<(), PipelineValidationError> {
        if self.included.has(kind) {
            return Ok(());
        }
        if let Some(marker) = self.marker {
            let rerun = kind.is_data_provider() && needed_by.is_some();
            if marker.has(kind) && !rerun {
                return Ok(());
            }
        }

        if let Some(pos) = self.visiting.iter().position(|k| *k == kind) {
            let mut path = self.visiting[pos..].to_vec();
            path.push(kind);
            let unresolved = self.visiting[pos..].to_vec();
            return Err(CycleDetectedError::new(path, unresolved).into());
        }

        let stage = self.catalog.get(kind).ok_or_else(|| match needed_by {
            Some(parent) => PipelineValidationError::missing_dependency(parent, kind),
            None => PipelineValidationError::new(format!("Enricher '{kind}' is not registered"))
                .with_stages(vec![kind]),
        })?;

        self.visiting.push(kind);
        for &dependency in stage.dependencies() {
            self.visit(dependency, Some(kind))?;
        }
        self.visiting.pop();

        self.included |= kind.flag();
        Ok(())
    }
}
