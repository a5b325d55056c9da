use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod config;
mod ocr;
mod prelude;
mod ui;

/// Extract segmented text from scanned Arabic documents.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - TESSDATA_PREFIX (optional): Directory containing `ara.traineddata`, used
    when neither --tessdata-dir nor a config file names one.
  - RUST_LOG (optional): Log filter, such as `debug` or `arabic_ocr=trace`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Extract text from one image, split into numbered segments.
    Extract(cmd::extract::ExtractOpts),
    /// Print schemas for the JSON output and config file formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Does this command write its result to stdout?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();
    init_tracing(&ui);
    real_main(ui).await
}

/// Send logs to stderr through [`Ui`], so they don't tear the spinner.
/// `RUST_LOG` overrides the default `info` level.
fn init_tracing(ui: &Ui) {
    let default_level =
        Directive::from_str("info").expect("built-in directive should be valid");
    let filter = EnvFilter::builder()
        .with_default_directive(default_level)
        .from_env_lossy();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(filter);
    tracing_subscriber::registry().with(fmt_layer).init();
}

#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    dotenvy::dotenv().ok();
    let opts = Opts::parse();
    debug!(?opts, "parsed options");

    // The spinner would end up mixed into the extracted text.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Extract(extract_opts) => {
            cmd::extract::cmd_extract(ui, extract_opts).await?;
        }
        Cmd::Schema(schema_opts) => {
            cmd::schema::cmd_schema(schema_opts).await?;
        }
    }
    Ok(())
}
