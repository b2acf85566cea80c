//! The set of enrichers available to one execution.

use crate::config::EnrichmentConfig;
use crate::core::EnricherKind;
use crate::stages::{
    AdultEnricher, AnalyzeEnricher, CaptionEnricher, CategoryEnricher, ColorEnricher,
    DuplicateEnricher, Enricher, FaceEnricher, MetadataEnricher, ObjectPropertyEnricher,
    PreviewEnricher, Providers, TagEnricher, ThumbnailEnricher,
};
use std::fmt;
use std::sync::Arc;

/// A registered enricher and its activation flag.
#[derive(Clone)]
pub struct StageDescriptor {
    enricher: Arc<dyn Enricher>,
    active: bool,
}

impl StageDescriptor {
    /// The enricher's kind.
    #[must_use]
    pub fn kind(&self) -> EnricherKind {
        self.enricher.kind()
    }

    /// The enricher's declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[EnricherKind] {
        self.enricher.dependencies()
    }

    /// Whether the enricher takes part in planning.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// The runner handle.
    #[must_use]
    pub fn enricher(&self) -> &Arc<dyn Enricher> {
        &self.enricher
    }
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("kind", &self.kind())
            .field("dependencies", &self.dependencies())
            .field("active", &self.active)
            .finish()
    }
}

/// Enrichers registered for an execution, in registration order.
///
/// Registration never fails; duplicates and dangling dependencies are
/// reported when an [`super::ExecutionPlan`] is built.
#[derive(Debug, Clone, Default)]
pub struct StageCatalog {
    stages: Vec<StageDescriptor>,
}

impl StageCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an active enricher.
    pub fn register(&mut self, enricher: impl Enricher + 'static) -> &mut Self {
        self.register_arc(Arc::new(enricher), true)
    }

    /// Registers an enricher that is skipped until activated.
    pub fn register_inactive(&mut self, enricher: impl Enricher + 'static) -> &mut Self {
        self.register_arc(Arc::new(enricher), false)
    }

    /// Registers a shared enricher.
    pub fn register_arc(&mut self, enricher: Arc<dyn Enricher>, active: bool) -> &mut Self {
        self.stages.push(StageDescriptor { enricher, active });
        self
    }

    /// Adds an active enricher, builder style.
    #[must_use]
    pub fn with(mut self, enricher: impl Enricher + 'static) -> Self {
        self.register(enricher);
        self
    }

    /// Toggles every enricher of `kind`. Returns false if none is registered.
    pub fn set_active(&mut self, kind: EnricherKind, active: bool) -> bool {
        let mut found = false;
        for stage in self.stages.iter_mut().filter(|s| s.kind() == kind) {
            stage.active = active;
            found = true;
        }
        found
    }

    /// Activates exactly the listed kinds and deactivates the rest.
    pub fn activate_only(&mut self, kinds: &[EnricherKind]) {
        for stage in &mut self.stages {
            stage.active = kinds.contains(&stage.kind());
        }
    }

    /// Applies the `active_enrichers` setting of `config`, if present.
    pub fn apply_config(&mut self, config: &EnrichmentConfig) {
        if let Some(kinds) = &config.active_enrichers {
            self.activate_only(kinds);
        }
    }

    /// Builds a catalog from enrichers and a configuration.
    #[must_use]
    pub fn from_config(
        enrichers: impl IntoIterator<Item = Arc<dyn Enricher>>,
        config: &EnrichmentConfig,
    ) -> Self {
        let mut catalog = Self::new();
        for enricher in enrichers {
            catalog.register_arc(enricher, true);
        }
        catalog.apply_config(config);
        catalog
    }

    /// Builds the catalog of every standard enricher wired to `providers`.
    #[must_use]
    pub fn standard(providers: &Providers, config: &EnrichmentConfig) -> Self {
        let retry = config.retry.clone();
        let enrichers: Vec<Arc<dyn Enricher>> = vec![
            Arc::new(PreviewEnricher::new(Arc::clone(&providers.images), retry.clone())),
            Arc::new(MetadataEnricher::new(Arc::clone(&providers.metadata))),
            Arc::new(AnalyzeEnricher::new(Arc::clone(&providers.vision), retry.clone())),
            Arc::new(TagEnricher),
            Arc::new(CategoryEnricher),
            Arc::new(CaptionEnricher),
            Arc::new(ObjectPropertyEnricher),
            Arc::new(ColorEnricher),
            Arc::new(AdultEnricher),
            Arc::new(FaceEnricher::new(
                Arc::clone(&providers.faces),
                Arc::clone(&providers.persons),
                config.face.clone(),
                retry,
            )),
            Arc::new(ThumbnailEnricher::new(Arc::clone(&providers.thumbnails))),
            Arc::new(DuplicateEnricher::new(Arc::clone(&providers.duplicates))),
        ];
        Self::from_config(enrichers, config)
    }

    /// Every registered descriptor.
    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter()
    }

    /// Active descriptors, in registration order.
    pub fn active(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter().filter(|s| s.active)
    }

    /// Kinds of the active descriptors.
    #[must_use]
    pub fn active_kinds(&self) -> Vec<EnricherKind> {
        self.active().map(StageDescriptor::kind).collect()
    }

    /// The first descriptor registered for `kind`.
    #[must_use]
    pub fn get(&self, kind: EnricherKind) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.kind() == kind)
    }

    /// Number of registered enrichers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures::stub_providers, ExecutionLog, RecordingStage};
    use EnricherKind::{Analyze, Preview, Tag};

    #[test]
    fn test_register_and_toggle() {
        let log = ExecutionLog::new();
        let mut catalog = StageCatalog::new();
        catalog
            .register(RecordingStage::new(Preview, &[], &log))
            .register_inactive(RecordingStage::new(Analyze, &[Preview], &log));

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.active_kinds(), vec![Preview]);

        assert!(catalog.set_active(Analyze, true));
        assert_eq!(catalog.active_kinds(), vec![Preview, Analyze]);
        assert!(!catalog.set_active(Tag, true));
    }

    #[test]
    fn test_from_config_limits_active_set() {
        let log = ExecutionLog::new();
        let enrichers: Vec<Arc<dyn Enricher>> = vec![
            Arc::new(RecordingStage::new(Preview, &[], &log)),
            Arc::new(RecordingStage::new(Analyze, &[Preview], &log)),
            Arc::new(RecordingStage::new(Tag, &[Analyze], &log)),
        ];
        let config = EnrichmentConfig::default().with_active_enrichers(vec![Preview, Tag]);

        let catalog = StageCatalog::from_config(enrichers, &config);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.active_kinds(), vec![Preview, Tag]);
        assert!(!catalog.get(Analyze).unwrap().is_active());
    }

    #[test]
    fn test_standard_catalog_registers_every_kind() {
        let catalog = StageCatalog::standard(&stub_providers(), &EnrichmentConfig::default());
        assert_eq!(catalog.active_kinds(), EnricherKind::ALL.to_vec());
        assert_eq!(
            catalog.get(EnricherKind::Face).unwrap().dependencies(),
            &[Preview, EnricherKind::Metadata]
        );
    }
}
