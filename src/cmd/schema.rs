//! Print JSON Schemas for the files we read and write.

use clap::{Args, ValueEnum};
use schemars::{schema::RootSchema, schema_for};
use tokio::io::AsyncWriteExt as _;

use crate::{
    async_utils::io::create_writer, config::OcrConfig, ocr::extract::ExtractionResult,
    prelude::*,
};

/// Types with a published schema. Named after the Rust types, hence PascalCase.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// The JSON output of `extract --format json`.
    ExtractionResult,
    /// The `--config` file format.
    OcrConfig,
}

impl SchemaType {
    fn root_schema(self) -> RootSchema {
        match self {
            SchemaType::ExtractionResult => schema_for!(ExtractionResult),
            SchemaType::OcrConfig => schema_for!(OcrConfig),
        }
    }
}

/// Arguments for `schema`.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// Which schema to print.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// Write the schema here instead of stdout.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

#[instrument(level = "debug", skip_all, fields(schema_type = ?opts.schema_type))]
pub async fn cmd_schema(opts: &SchemaOpts) -> Result<()> {
    let mut json = serde_json::to_string_pretty(&opts.schema_type.root_schema())
        .context("cannot serialize schema")?;
    json.push('\n');

    let mut out = create_writer(opts.output_path.as_deref()).await?;
    out.write_all(json.as_bytes())
        .await
        .context("cannot write schema")?;
    out.flush().await.context("cannot flush schema output")?;
    Ok(())
}
