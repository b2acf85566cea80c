//! Raw vision-analysis result stored in the working set.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in preview pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A tag with its provider confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagScore {
    pub name: String,
    pub confidence: f64,
}

/// A category with its provider score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub name: String,
    pub score: f64,
}

/// A generated caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionScore {
    pub text: String,
    pub confidence: f64,
}

/// An object detected in the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f64,
    pub rect: Rect,
}

/// Colour information reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColorInfo {
    pub is_bw: bool,
    pub accent_color: String,
    pub dominant_background: String,
    pub dominant_foreground: String,
    pub dominant_colors: Vec<String>,
}

/// Adult and racy content scores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdultInfo {
    pub is_adult: bool,
    pub adult_score: f64,
    pub is_racy: bool,
    pub racy_score: f64,
}

/// Everything the vision provider returns for one preview.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageAnalysis {
    #[serde(default)]
    pub tags: Vec<TagScore>,
    #[serde(default)]
    pub categories: Vec<CategoryScore>,
    #[serde(default)]
    pub captions: Vec<CaptionScore>,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub color: Option<ColorInfo>,
    #[serde(default)]
    pub adult: Option<AdultInfo>,
}
