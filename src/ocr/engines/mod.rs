//! Recognition engine interface.

use clap::ValueEnum;
use schemars::JsonSchema;

use super::{ExtractError, image_source::Raster, layout::PageLayout};
use crate::prelude::*;

pub mod tesseract;

/// The language code for Arabic language data.
pub const ARABIC: &str = "ara";

/// Which recognizer the engine should use.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    Serialize,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum EngineMode {
    /// The legacy recognizer only.
    TesseractOnly,
    /// The neural network (LSTM) recognizer only.
    LstmOnly,
    /// Both recognizers.
    Combined,
    /// Whatever the language data supports.
    #[default]
    Default,
}

impl EngineMode {
    /// The numeric `--oem` value.
    pub fn oem(self) -> u8 {
        match self {
            EngineMode::TesseractOnly => 0,
            EngineMode::LstmOnly => 1,
            EngineMode::Combined => 2,
            EngineMode::Default => 3,
        }
    }
}

/// Settings for one recognition pass.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    /// Language code, such as `ara`.
    pub language: String,
    /// Directory containing `<language>.traineddata`, if we could find one.
    /// Engines report a missing directory as a resource error.
    pub tessdata_dir: Option<PathBuf>,
    pub engine_mode: EngineMode,
    /// Page segmentation mode, if we don't want the engine default.
    pub page_segmentation_mode: Option<u8>,
}

/// What the engine found on one page.
#[derive(Clone, Debug)]
pub struct PageResult {
    /// The plain text of the page.
    pub full_text: String,
    /// Mean confidence across the page, from 0.0 to 1.0.
    pub mean_confidence: f32,
    /// Page, block, paragraph, line and word structure.
    pub layout: PageLayout,
}

/// Interface to a recognition engine.
///
/// Implementations must acquire all of their per-call resources inside
/// `process` and release them before it returns, whether it succeeds or not.
#[async_trait]
pub trait RecognitionEngine: Send + Sync + 'static {
    /// Recognize the text in `raster`.
    async fn process(
        &self,
        raster: &Raster,
        options: &SessionOptions,
    ) -> Result<PageResult, ExtractError>;
}
