//! Enricher kind tags and the completion marker.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symbolic identifier of an enrichment stage.
///
/// Dependencies between stages are declared in terms of these tags, and each
/// kind owns exactly one bit of the [`EnricherSet`] completion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnricherKind {
    /// Decodes the original image and produces the working preview.
    Preview,
    /// Reads EXIF/file metadata (taken date, location).
    Metadata,
    /// Calls the vision provider and stores the raw analysis.
    Analyze,
    /// Image tags derived from the analysis.
    Tag,
    /// Image categories derived from the analysis.
    Category,
    /// Captions derived from the analysis.
    Caption,
    /// Detected objects with bounding boxes.
    ObjectProperty,
    /// Dominant and accent colour information.
    Color,
    /// Adult and racy content scores.
    Adult,
    /// Face detection and identification.
    Face,
    /// Small thumbnail generation.
    Thumbnail,
    /// Looks up other photos with the same image hash.
    Duplicate,
}

impl EnricherKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Preview,
        Self::Metadata,
        Self::Analyze,
        Self::Tag,
        Self::Category,
        Self::Caption,
        Self::ObjectProperty,
        Self::Color,
        Self::Adult,
        Self::Face,
        Self::Thumbnail,
        Self::Duplicate,
    ];

    /// Returns the snake_case name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Metadata => "metadata",
            Self::Analyze => "analyze",
            Self::Tag => "tag",
            Self::Category => "category",
            Self::Caption => "caption",
            Self::ObjectProperty => "object_property",
            Self::Color => "color",
            Self::Adult => "adult",
            Self::Face => "face",
            Self::Thumbnail => "thumbnail",
            Self::Duplicate => "duplicate",
        }
    }

    /// Returns the completion-marker bit owned by this kind.
    #[must_use]
    pub const fn flag(&self) -> EnricherSet {
        match self {
            Self::Preview => EnricherSet::PREVIEW,
            Self::Metadata => EnricherSet::METADATA,
            Self::Analyze => EnricherSet::ANALYZE,
            Self::Tag => EnricherSet::TAG,
            Self::Category => EnricherSet::CATEGORY,
            Self::Caption => EnricherSet::CAPTION,
            Self::ObjectProperty => EnricherSet::OBJECT_PROPERTY,
            Self::Color => EnricherSet::COLOR,
            Self::Adult => EnricherSet::ADULT,
            Self::Face => EnricherSet::FACE,
            Self::Thumbnail => EnricherSet::THUMBNAIL,
            Self::Duplicate => EnricherSet::DUPLICATE,
        }
    }

    /// Data-provider kinds populate the non-persisted working set, so they
    /// have to run again whenever a dependent runs.
    #[must_use]
    pub const fn is_data_provider(&self) -> bool {
        matches!(self, Self::Preview | Self::Analyze)
    }
}

impl fmt::Display for EnricherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown enricher name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown enricher kind '{0}'")]
pub struct UnknownEnricherKind(pub String);

impl FromStr for EnricherKind {
    type Err = UnknownEnricherKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownEnricherKind(s.to_string()))
    }
}

bitflags! {
    /// Completion marker: the set of enricher kinds applied to a photo.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EnricherSet: u32 {
        const PREVIEW = 1 << 0;
        const METADATA = 1 << 1;
        const ANALYZE = 1 << 2;
        const TAG = 1 << 3;
        const CATEGORY = 1 << 4;
        const CAPTION = 1 << 5;
        const OBJECT_PROPERTY = 1 << 6;
        const COLOR = 1 << 7;
        const ADULT = 1 << 8;
        const FACE = 1 << 9;
        const THUMBNAIL = 1 << 10;
        const DUPLICATE = 1 << 11;
    }
}

impl EnricherSet {
    /// Returns true if the kind's bit is set.
    #[must_use]
    pub const fn has(&self, kind: EnricherKind) -> bool {
        self.contains(kind.flag())
    }

    /// Returns the kinds whose bits are set, in declaration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EnricherKind> {
        EnricherKind::ALL
            .into_iter()
            .filter(|kind| self.has(*kind))
            .collect()
    }
}

// Persisted as the raw bitmask; unknown bits are dropped on load.
impl Serialize for EnricherSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for EnricherSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Self::from_bits_truncate)
    }
}

impl FromIterator<EnricherKind> for EnricherSet {
    fn from_iter<I: IntoIterator<Item = EnricherKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, kind| set | kind.flag())
    }
}
