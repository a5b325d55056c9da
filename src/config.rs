//! Extraction settings, from config files, the environment and the command
//! line.

use std::{env, ffi::OsString};

use schemars::JsonSchema;

use crate::{
    async_utils::io::read_json_or_toml,
    ocr::engines::{ARABIC, EngineMode, SessionOptions},
    prelude::*,
};

/// The highest page segmentation mode `tesseract` understands.
const MAX_PAGE_SEGMENTATION_MODE: u8 = 13;

/// Settings for the OCR engine. Every field is optional in config files.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct OcrConfig {
    /// Language code for the engine. Defaults to `ara`.
    pub language: String,

    /// Directory containing `<language>.traineddata`. If not set, we use
    /// `TESSDATA_PREFIX`, and then a `tessdata` directory next to our
    /// executable.
    pub tessdata_dir: Option<PathBuf>,

    /// Which recognizer to use.
    pub engine_mode: EngineMode,

    /// Page segmentation mode (0 to 13). Uses the engine default if not set.
    pub page_segmentation_mode: Option<u8>,

    /// The `tesseract` executable to run.
    pub tesseract_command: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: ARABIC.to_owned(),
            tessdata_dir: None,
            engine_mode: EngineMode::default(),
            page_segmentation_mode: None,
            tesseract_command: PathBuf::from("tesseract"),
        }
    }
}

impl OcrConfig {
    /// Load a config file in TOML or JSON format.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let config = read_json_or_toml::<Self>(path).await?;
        config
            .validate()
            .with_context(|| format!("invalid config file {:?}", path.display()))?;
        Ok(config)
    }

    /// Check for values we can't use.
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(anyhow!("language must not be empty"));
        }
        if let Some(psm) = self.page_segmentation_mode
            && psm > MAX_PAGE_SEGMENTATION_MODE
        {
            return Err(anyhow!(
                "page_segmentation_mode must be between 0 and {}, not {}",
                MAX_PAGE_SEGMENTATION_MODE,
                psm
            ));
        }
        Ok(())
    }

    /// Build the options for an engine session.
    ///
    /// Not finding a language data directory is left for the engine to
    /// report, so it shows up in the extraction result.
    pub fn session_options(&self) -> Result<SessionOptions> {
        self.validate()?;
        let tessdata_dir = resolve_tessdata_dir(
            self.tessdata_dir.as_deref(),
            env::var_os("TESSDATA_PREFIX"),
            env::current_exe().ok(),
        );
        match &tessdata_dir {
            Some(dir) => debug!(tessdata_dir = %dir.display(), "using language data"),
            None => warn!("no language data directory configured"),
        }
        Ok(SessionOptions {
            language: self.language.clone(),
            tessdata_dir,
            engine_mode: self.engine_mode,
            page_segmentation_mode: self.page_segmentation_mode,
        })
    }
}

/// Pick the language data directory: explicit setting, then
/// `TESSDATA_PREFIX`, then `tessdata` next to the executable.
fn resolve_tessdata_dir(
    configured: Option<&Path>,
    env_prefix: Option<OsString>,
    current_exe: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(dir) = configured {
        return Some(dir.to_owned());
    }
    if let Some(prefix) = env_prefix.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(prefix));
    }
    current_exe
        .as_deref()
        .and_then(Path::parent)
        .map(|dir| dir.join("tessdata"))
}
