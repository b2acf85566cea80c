//! Enrichers that project the stored vision analysis onto the photo.
//!
//! All of them depend on [`EnricherKind::Analyze`] and read the `analysis`
//! working-set slot; none of them call a provider.

use super::{EnrichContext, Enricher, PhotoPatch};
use crate::core::EnricherKind;
use crate::errors::StageError;
use crate::model::{Caption, ImageAnalysis, ObjectProperty, Photo, PhotoCategory, PhotoTag};
use async_trait::async_trait;
use std::collections::HashMap;

const DEPENDENCIES: &[EnricherKind] = &[EnricherKind::Analyze];

/// Implements [`Enricher`] for a unit struct whose work is a pure function of
/// the analysis.
macro_rules! analysis_enricher {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $project:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        #[async_trait]
        impl Enricher for $name {
            fn kind(&self) -> EnricherKind {
                $kind
            }

            fn dependencies(&self) -> &[EnricherKind] {
                DEPENDENCIES
            }

            async fn enrich(&self, ctx: &EnrichContext) -> Result<PhotoPatch, StageError> {
                let analysis = ctx.source().require_analysis()?;
                let project: fn(&ImageAnalysis) -> PhotoPatch = $project;
                Ok(project(analysis))
            }
        }
    };
}

analysis_enricher!(
    /// Tags, deduplicated case-insensitively keeping the highest confidence.
    TagEnricher,
    EnricherKind::Tag,
    |analysis| {
        let tags = dedupe_tags(analysis);
        PhotoPatch::new(move |photo: &mut Photo| photo.tags = tags)
    }
);

analysis_enricher!(
    /// Categories as reported by the provider.
    CategoryEnricher,
    EnricherKind::Category,
    |analysis| {
        let categories: Vec<PhotoCategory> = analysis
            .categories
            .iter()
            .map(|c| PhotoCategory {
                name: c.name.clone(),
                score: c.score,
            })
            .collect();
        PhotoPatch::new(move |photo: &mut Photo| photo.categories = categories)
    }
);

analysis_enricher!(
    /// Generated captions.
    CaptionEnricher,
    EnricherKind::Caption,
    |analysis| {
        let captions: Vec<Caption> = analysis
            .captions
            .iter()
            .map(|c| Caption {
                text: c.text.clone(),
                confidence: c.confidence,
            })
            .collect();
        PhotoPatch::new(move |photo: &mut Photo| photo.captions = captions)
    }
);

analysis_enricher!(
    /// Detected objects with their rectangles.
    ObjectPropertyEnricher,
    EnricherKind::ObjectProperty,
    |analysis| {
        let objects: Vec<ObjectProperty> = analysis
            .objects
            .iter()
            .map(|o| ObjectProperty {
                name: o.name.clone(),
                confidence: o.confidence,
                rect: o.rect,
            })
            .collect();
        PhotoPatch::new(move |photo: &mut Photo| photo.object_properties = objects)
    }
);

analysis_enricher!(
    /// Dominant and accent colours.
    ColorEnricher,
    EnricherKind::Color,
    |analysis| {
        let colors = analysis.color.clone();
        PhotoPatch::new(move |photo: &mut Photo| photo.colors = colors)
    }
);

analysis_enricher!(
    /// Adult and racy scores. Missing scores leave the photo flagged clean.
    AdultEnricher,
    EnricherKind::Adult,
    |analysis| {
        let adult = analysis.adult.unwrap_or_default();
        PhotoPatch::new(move |photo: &mut Photo| {
            photo.is_adult_content = adult.is_adult;
            photo.adult_score = adult.adult_score;
            photo.is_racy_content = adult.is_racy;
            photo.racy_score = adult.racy_score;
        })
    }
);

fn dedupe_tags(analysis: &ImageAnalysis) -> Vec<PhotoTag> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, f64> = HashMap::new();
    for tag in &analysis.tags {
        let name = tag.name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        match best.get_mut(&name) {
            Some(confidence) => *confidence = confidence.max(tag.confidence),
            None => {
                best.insert(name.clone(), tag.confidence);
                order.push(name);
            }
        }
    }
    order
        .into_iter()
        .map(|name| {
            let confidence = best.get(&name).copied().unwrap_or_default();
            PhotoTag { name, confidence }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdultInfo, CategoryScore, ColorInfo, TagScore};
    use crate::testing::fixtures::{context_for, context_with_analysis};
    use pretty_assertions::assert_eq;

    fn analysis() -> ImageAnalysis {
        ImageAnalysis {
            tags: vec![
                TagScore {
                    name: "Dog".into(),
                    confidence: 0.7,
                },
                TagScore {
                    name: "grass".into(),
                    confidence: 0.6,
                },
                TagScore {
                    name: "dog".into(),
                    confidence: 0.9,
                },
            ],
            categories: vec![CategoryScore {
                name: "animal_dog".into(),
                score: 0.8,
            }],
            color: Some(ColorInfo {
                accent_color: "A1B2C3".into(),
                ..ColorInfo::default()
            }),
            adult: Some(AdultInfo {
                is_adult: false,
                adult_score: 0.01,
                is_racy: true,
                racy_score: 0.7,
            }),
            ..ImageAnalysis::default()
        }
    }

    async fn run(enricher: &dyn Enricher) -> Photo {
        let ctx = context_with_analysis(enricher.kind(), Photo::new("a.jpg"), analysis());
        let mut photo = Photo::new("a.jpg");
        enricher.enrich(&ctx).await.unwrap().apply(&mut photo);
        photo
    }

    #[tokio::test]
    async fn test_tags_grouped_by_lowercase_name() {
        let photo = run(&TagEnricher).await;
        assert_eq!(
            photo.tags,
            vec![
                PhotoTag {
                    name: "dog".into(),
                    confidence: 0.9
                },
                PhotoTag {
                    name: "grass".into(),
                    confidence: 0.6
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_category_color_and_adult() {
        assert_eq!(run(&CategoryEnricher).await.categories.len(), 1);
        assert_eq!(
            run(&ColorEnricher).await.colors.unwrap().accent_color,
            "A1B2C3"
        );

        let photo = run(&AdultEnricher).await;
        assert!(!photo.is_adult_content);
        assert!(photo.is_racy_content);
        assert_eq!(photo.racy_score, 0.7);
    }

    #[tokio::test]
    async fn test_empty_sections_clear_collections() {
        assert!(run(&CaptionEnricher).await.captions.is_empty());
        assert!(run(&ObjectPropertyEnricher).await.object_properties.is_empty());
    }

    #[tokio::test]
    async fn test_missing_analysis_fails() {
        let ctx = context_for(EnricherKind::Tag, Photo::new("a.jpg"));
        let err = TagEnricher.enrich(&ctx).await.unwrap_err();
        assert!(matches!(err, StageError::MissingInput("analysis")));
        assert_eq!(TagEnricher.dependencies(), &[EnricherKind::Analyze]);
    }
}
