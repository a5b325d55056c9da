//! Extracting segmented text from one image.
//!
//! [`Extractor::extract`] is the entry point for callers. It runs the whole
//! pipeline (decode, recognize, walk, format, score) and always returns an
//! [`ExtractionResult`]. Errors are reported inside the result.

use std::sync::Arc;

use schemars::JsonSchema;

use super::{
    ExtractError, ExtractErrorKind,
    confidence::score,
    engines::{RecognitionEngine, SessionOptions},
    image_source::{ImageSource, Raster},
    layout::walk,
    segments::format_segments,
};
use crate::{async_utils::spawn_blocking_catching_panics, prelude::*};

/// Prefix of `display_text` when extraction failed.
pub const ERROR_PREFIX: &str = "Error: ";

/// The outcome of extracting text from one image.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ExtractionResult {
    /// Text to show the user. Either numbered segments, the engine's plain
    /// text if it found no blocks, or an error message starting with
    /// `Error: `.
    pub display_text: String,

    /// Mean engine confidence, from 0 to 100. Always 0 for failures and for
    /// pages with no text.
    pub confidence_percent: f32,

    /// How many segments are in `display_text`.
    pub segment_count: usize,

    /// Did extraction succeed?
    pub status: ExtractionStatus,
}

/// Whether an extraction succeeded.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// We found text.
    Ok,
    /// The engine ran, but found no text.
    NoText,
    /// Something went wrong.
    Failed {
        error_kind: ExtractErrorKind,
        message: String,
    },
}

impl ExtractionResult {
    /// Build the result of a pipeline run that completed.
    fn completed(display_text: String, confidence_percent: f32, segment_count: usize) -> Self {
        if display_text.trim().is_empty() {
            Self {
                display_text,
                confidence_percent: 0.0,
                segment_count: 0,
                status: ExtractionStatus::NoText,
            }
        } else {
            Self {
                display_text,
                confidence_percent,
                segment_count,
                status: ExtractionStatus::Ok,
            }
        }
    }

    /// Build the result for a failed run.
    fn failed(err: &ExtractError) -> Self {
        Self {
            display_text: format!("{}{}", ERROR_PREFIX, err),
            confidence_percent: 0.0,
            segment_count: 0,
            status: ExtractionStatus::Failed {
                error_kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    /// Did extraction fail?
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ExtractionStatus::Failed { .. })
    }

    /// A one-line description of the result, for status messages.
    pub fn summary(&self) -> String {
        match &self.status {
            ExtractionStatus::Ok if self.segment_count == 0 => format!(
                "Done: text extracted without segments ({:.1}% confidence).",
                self.confidence_percent
            ),
            ExtractionStatus::Ok => format!(
                "Done: {} segment{} extracted ({:.1}% confidence).",
                self.segment_count,
                if self.segment_count == 1 { "" } else { "s" },
                self.confidence_percent
            ),
            ExtractionStatus::NoText => "No text detected.".to_owned(),
            ExtractionStatus::Failed { message, .. } => {
                format!("Extraction failed: {}", message)
            }
        }
    }
}

/// Runs the extraction pipeline.
///
/// `extract` takes `&mut self`, so an extractor has at most one extraction in
/// flight. Each call gets its own engine session.
pub struct Extractor {
    image_source: Arc<dyn ImageSource>,
    engine: Arc<dyn RecognitionEngine>,
    options: SessionOptions,
}

impl Extractor {
    pub fn new(
        image_source: Arc<dyn ImageSource>,
        engine: Arc<dyn RecognitionEngine>,
        options: SessionOptions,
    ) -> Self {
        Self {
            image_source,
            engine,
            options,
        }
    }

    /// Extract segmented text from the image at `image_path`.
    ///
    /// This never fails. Failures are returned as an [`ExtractionResult`] whose
    /// `display_text` starts with [`ERROR_PREFIX`].
    #[instrument(level = "debug", skip_all, fields(path = %image_path.display()))]
    pub async fn extract(&mut self, image_path: &Path) -> ExtractionResult {
        match self.extract_inner(image_path).await {
            Ok(result) => {
                debug!(
                    segments = result.segment_count,
                    confidence = result.confidence_percent,
                    "extraction finished"
                );
                result
            }
            Err(err) => {
                warn!("extraction failed: {}", err);
                ExtractionResult::failed(&err)
            }
        }
    }

    async fn extract_inner(&self, image_path: &Path) -> Result<ExtractionResult, ExtractError> {
        let raster = self.decode(image_path).await?;
        let page = self.engine.process(&raster, &self.options).await?;

        let spans = walk(&page)?.collect::<Vec<_>>();
        let segmented = format_segments(&spans);
        let display_text = if segmented.is_empty() {
            page.full_text.clone()
        } else {
            segmented
        };
        Ok(ExtractionResult::completed(
            display_text,
            score(&page),
            spans.len(),
        ))
    }

    /// Decode on a blocking thread, so we don't stall the async runtime.
    async fn decode(&self, image_path: &Path) -> Result<Raster, ExtractError> {
        let image_source = self.image_source.clone();
        let image_path = image_path.to_owned();
        spawn_blocking_catching_panics(move || image_source.decode(&image_path))
            .await
            .map_err(|err| ExtractError::Decode(format!("{:#}", err)))?
    }
}
