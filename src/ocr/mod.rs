//! The extraction pipeline: decode an image, recognize it, walk the layout,
//! and format the blocks into numbered segments.

use schemars::JsonSchema;

use crate::prelude::*;

pub mod confidence;
pub mod engines;
pub mod extract;
pub mod image_source;
pub mod layout;
pub mod segments;

/// Everything that can go wrong while extracting text from one image.
///
/// None of these escape [`extract::Extractor::extract`]. They are turned into a
/// failed [`extract::ExtractionResult`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The language data could not be found or loaded.
    #[error("cannot load language data: {0}")]
    ResourceInit(String),

    /// The input could not be decoded into a raster.
    #[error("cannot decode image: {0}")]
    Decode(String),

    /// The recognition engine could not be started, or it failed while
    /// processing the raster.
    #[error("recognition failed: {0}")]
    Engine(String),

    /// The engine produced a layout that cannot be walked.
    #[error("cannot read page layout: {0}")]
    Traversal(String),
}

impl ExtractError {
    /// A short machine-readable name for this kind of error.
    pub fn kind(&self) -> ExtractErrorKind {
        match self {
            ExtractError::ResourceInit(_) => ExtractErrorKind::ResourceInit,
            ExtractError::Decode(_) => ExtractErrorKind::Decode,
            ExtractError::Engine(_) => ExtractErrorKind::Engine,
            ExtractError::Traversal(_) => ExtractErrorKind::Traversal,
        }
    }
}

/// The kinds of [`ExtractError`], for serialized results.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractErrorKind {
    ResourceInit,
    Decode,
    Engine,
    Traversal,
}
