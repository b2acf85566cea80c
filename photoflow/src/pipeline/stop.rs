//! Conditions that end a run early.
//!
//! The driver checks every condition that applies to a stage right after the
//! stage completes and its patch is applied. The first condition that returns
//! a reason halts launching: stages already in flight drain, every stage not
//! yet started is skipped, and the reason is reported in
//! [`super::RunReport::stop_reason`].

use crate::core::EnricherKind;
use crate::model::{Photo, SourceData};
use std::fmt::Debug;

/// State visible to a stop condition.
#[derive(Debug, Clone, Copy)]
pub struct StopContext<'a> {
    /// The stage that just completed.
    pub completed: EnricherKind,
    /// The photo with that stage's patch applied.
    pub photo: &'a Photo,
    pub source: &'a SourceData,
}

/// A check that may end a run after certain enrichers complete.
///
/// Checks run on the scheduler's driver loop and must not block.
pub trait StopCondition: Send + Sync + Debug {
    /// Kinds whose completion triggers a check. Empty means every kind.
    fn applies_after(&self) -> &[EnricherKind] {
        &[]
    }

    /// Returns the stop reason if the run should end.
    fn check(&self, ctx: &StopContext<'_>) -> Option<String>;

    /// True if the condition is checked after `kind` completes.
    fn applies_to(&self, kind: EnricherKind) -> bool {
        let kinds = self.applies_after();
        kinds.is_empty() || kinds.contains(&kind)
    }
}

/// A fixed reason paired with a predicate.
pub struct FnStopCondition<F>
where
    F: Fn(&StopContext<'_>) -> bool + Send + Sync,
{
    reason: String,
    applies_after: Vec<EnricherKind>,
    predicate: F,
}

impl<F> FnStopCondition<F>
where
    F: Fn(&StopContext<'_>) -> bool + Send + Sync,
{
    /// A condition checked after every completed stage.
    pub fn new(reason: impl Into<String>, predicate: F) -> Self {
        Self {
            reason: reason.into(),
            applies_after: Vec::new(),
            predicate,
        }
    }

    /// Restricts the check to the completion of `kinds`.
    #[must_use]
    pub fn after(mut self, kinds: &[EnricherKind]) -> Self {
        self.applies_after = kinds.to_vec();
        self
    }
}

impl<F> Debug for FnStopCondition<F>
where
    F: Fn(&StopContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStopCondition")
            .field("reason", &self.reason)
            .field("applies_after", &self.applies_after)
            .finish_non_exhaustive()
    }
}

impl<F> StopCondition for FnStopCondition<F>
where
    F: Fn(&StopContext<'_>) -> bool + Send + Sync,
{
    fn applies_after(&self) -> &[EnricherKind] {
        &self.applies_after
    }

    fn check(&self, ctx: &StopContext<'_>) -> Option<String> {
        (self.predicate)(ctx).then(|| self.reason.clone())
    }
}

/// Stops once [`crate::stages::DuplicateEnricher`] found a stored copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateStopCondition;

impl StopCondition for DuplicateStopCondition {
    fn applies_after(&self) -> &[EnricherKind] {
        &[EnricherKind::Duplicate]
    }

    fn check(&self, ctx: &StopContext<'_>) -> Option<String> {
        ctx.source
            .duplicate()
            .map(|found| format!("duplicate photo detected: {found}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DuplicateMatch;
    use uuid::Uuid;

    fn check(condition: &dyn StopCondition, photo: &Photo, source: &SourceData) -> Option<String> {
        let ctx = StopContext {
            completed: EnricherKind::Duplicate,
            photo,
            source,
        };
        condition.check(&ctx)
    }

    #[test]
    fn test_fn_condition_targets() {
        let everywhere = FnStopCondition::new("always", |_| true);
        assert!(everywhere.applies_to(EnricherKind::Tag));
        assert!(everywhere.applies_to(EnricherKind::Preview));

        let targeted = FnStopCondition::new("adult", |ctx| ctx.photo.is_adult_content)
            .after(&[EnricherKind::Adult]);
        assert!(targeted.applies_to(EnricherKind::Adult));
        assert!(!targeted.applies_to(EnricherKind::Tag));

        let source = SourceData::new("/photos/a.jpg");
        let mut photo = Photo::new("a.jpg");
        assert_eq!(check(&targeted, &photo, &source), None);
        photo.is_adult_content = true;
        assert_eq!(check(&targeted, &photo, &source).as_deref(), Some("adult"));
    }

    #[test]
    fn test_duplicate_condition_reads_working_set() {
        let condition = DuplicateStopCondition;
        assert!(condition.applies_to(EnricherKind::Duplicate));
        assert!(!condition.applies_to(EnricherKind::Preview));

        let photo = Photo::new("a.jpg");
        let source = SourceData::new("/photos/a.jpg");
        assert_eq!(check(&condition, &photo, &source), None);

        source
            .set_duplicate(DuplicateMatch {
                photo_id: Uuid::nil(),
                location: None,
            })
            .unwrap();
        let reason = check(&condition, &photo, &source).unwrap();
        assert!(reason.starts_with("duplicate photo detected: photo 00000000"));
    }
}
