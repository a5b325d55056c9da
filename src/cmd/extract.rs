//! The `extract` subcommand.

use std::sync::Arc;

use clap::{Args, ValueEnum};
use tokio::io::AsyncWriteExt as _;

use crate::{
    async_utils::io::create_writer,
    config::OcrConfig,
    ocr::{
        engines::{EngineMode, tesseract::TesseractEngine},
        extract::{ExtractionResult, Extractor},
        image_source::FileImageSource,
    },
    prelude::*,
    ui::Ui,
};

/// How to write the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The display text only.
    #[default]
    Text,
    /// The full result as JSON.
    Json,
}

/// `extract` command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// The image to read (PNG, JPEG, BMP or TIFF).
    #[clap(value_name = "IMAGE")]
    pub image_path: PathBuf,

    /// Directory containing the `.traineddata` language files.
    #[clap(long, value_name = "DIR")]
    pub tessdata_dir: Option<PathBuf>,

    /// Language code. Defaults to `ara`.
    #[clap(long = "lang", value_name = "CODE")]
    pub language: Option<String>,

    /// Which recognizer to use.
    #[clap(long = "oem", value_enum)]
    pub engine_mode: Option<EngineMode>,

    /// Page segmentation mode (0 to 13).
    #[clap(long = "psm", value_parser = clap::value_parser!(u8).range(0..=13))]
    pub page_segmentation_mode: Option<u8>,

    /// A TOML or JSON config file. Command-line options take precedence.
    #[clap(long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Output format.
    #[clap(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the result here instead of standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

impl ExtractOpts {
    /// Load our config file, if any, and apply command-line overrides.
    async fn to_config(&self) -> Result<OcrConfig> {
        let mut config = match &self.config_path {
            Some(path) => OcrConfig::load(path).await?,
            None => OcrConfig::default(),
        };
        if let Some(dir) = &self.tessdata_dir {
            config.tessdata_dir = Some(dir.clone());
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(engine_mode) = self.engine_mode {
            config.engine_mode = engine_mode;
        }
        if let Some(psm) = self.page_segmentation_mode {
            config.page_segmentation_mode = Some(psm);
        }
        Ok(config)
    }
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.image_path.display()))]
pub async fn cmd_extract(ui: Ui, opts: &ExtractOpts) -> Result<()> {
    let config = opts.to_config().await?;
    debug!(?config, "extraction config");
    let mut extractor = Extractor::new(
        Arc::new(FileImageSource),
        Arc::new(TesseractEngine::new(&config.tesseract_command)),
        config.session_options()?,
    );

    let spinner = ui.start_spinner("Extracting text...");
    let result = extractor.extract(&opts.image_path).await;
    spinner.finish_and_clear();

    write_result(&result, opts.format, opts.output_path.as_deref()).await?;

    if result.is_failure() {
        error!("{}", result.summary());
        Err(anyhow!(
            "could not extract text from {:?}",
            opts.image_path.display()
        ))
    } else {
        info!("{}", result.summary());
        Ok(())
    }
}

/// Send the result to the output sink.
async fn write_result(
    result: &ExtractionResult,
    format: OutputFormat,
    path: Option<&Path>,
) -> Result<()> {
    let out = match format {
        OutputFormat::Text => result.display_text.clone(),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(result)
                .context("failed to serialize result")?;
            json.push('\n');
            json
        }
    };
    let mut wtr = create_writer(path).await?;
    wtr.write_all(out.as_bytes())
        .await
        .context("failed to write result")?;
    wtr.flush().await.context("failed to flush result")?;
    Ok(())
}
