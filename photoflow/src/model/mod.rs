//! Data model: the photo aggregate, the per-run working set and the
//! face/person records used by identification.

mod analysis;
mod face;
mod photo;
mod source;

pub use analysis::{
    AdultInfo, CaptionScore, CategoryScore, ColorInfo, DetectedObject, ImageAnalysis, Rect,
    TagScore,
};
pub use face::{
    DetectedFace, Face, FaceBox, FaceIdentifyStatus, IdentityStatus, Identification, Person,
    PersonEmbedding,
};
pub use photo::{BlobInfo, Caption, GeoPoint, ObjectProperty, Photo, PhotoCategory, PhotoTag};
pub use source::{DuplicateMatch, ImageData, SourceData};
