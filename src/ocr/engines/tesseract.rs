//! Tesseract OCR engine.

use std::sync::LazyLock;

use regex::Regex;
use tempfile::TempDir;
use tokio::{fs, process::Command};

use crate::{
    async_utils::check_for_command_failure,
    ocr::{ExtractError, image_source::Raster, layout::PageLayout},
    prelude::*,
};

use super::{PageResult, RecognitionEngine, SessionOptions};

/// Messages `tesseract` prints when it can't load language data.
static MISSING_LANGUAGE_DATA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(error opening data file|failed loading language|could not initialize tesseract)")
        .expect("failed to compile regex")
});

/// Form feed `tesseract` appends to text output after each page.
const PAGE_SEPARATOR: char = '\u{c}';

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Clone, Debug)]
pub struct TesseractEngine {
    /// The `tesseract` executable.
    command: PathBuf,
}

impl TesseractEngine {
    /// Create a new engine that runs `command`.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Build the command line for one pass, asking for plain text and TSV
    /// layout output.
    fn build_command(
        &self,
        session: &RecognitionSession,
        tessdata_dir: &Path,
        options: &SessionOptions,
    ) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg(session.input_path())
            .arg(session.output_base())
            .arg("-l")
            .arg(&options.language)
            .arg("--tessdata-dir")
            .arg(tessdata_dir)
            .arg("--oem")
            .arg(options.engine_mode.oem().to_string());
        if let Some(psm) = options.page_segmentation_mode {
            cmd.arg("--psm").arg(psm.to_string());
        }
        cmd.arg("txt").arg("tsv").kill_on_drop(true);
        cmd
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    #[instrument(level = "debug", skip_all, fields(language = %options.language))]
    async fn process(
        &self,
        raster: &Raster,
        options: &SessionOptions,
    ) -> Result<PageResult, ExtractError> {
        let tessdata_dir = check_language_data(options).await?;

        // Everything below lives in `session`, which cleans up on drop.
        let session = RecognitionSession::new()?;
        debug!(
            width = raster.width(),
            height = raster.height(),
            "writing raster for tesseract"
        );
        raster
            .write_png(&session.input_path())
            .map_err(|err| ExtractError::Engine(format!("{:#}", err)))?;

        let output = self
            .build_command(&session, tessdata_dir, options)
            .output()
            .await
            .map_err(|err| {
                ExtractError::Engine(format!(
                    "cannot run {:?}: {}",
                    self.command.display(),
                    err
                ))
            })?;
        if let Err(err) = check_for_command_failure("tesseract", &output, None) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(if MISSING_LANGUAGE_DATA_REGEX.is_match(&stderr) {
                ExtractError::ResourceInit(format!("{:#}", err))
            } else {
                ExtractError::Engine(format!("{:#}", err))
            });
        }

        let text = session.read_output("txt").await?;
        let tsv = session.read_output("tsv").await?;
        let layout = PageLayout::from_tsv(&tsv)?;
        let mean_confidence = layout.mean_word_confidence();
        debug!(
            rows = layout.rows().len(),
            mean_confidence, "recognized page"
        );
        Ok(PageResult {
            full_text: text.strip_suffix(PAGE_SEPARATOR).unwrap_or(&text).to_owned(),
            mean_confidence,
            layout,
        })
    }
}

/// Make sure the language data we need is present before starting the
/// engine, and return the directory that holds it.
async fn check_language_data(options: &SessionOptions) -> Result<&Path, ExtractError> {
    let dir = options.tessdata_dir.as_deref().ok_or_else(|| {
        ExtractError::ResourceInit(
            "no language data directory; pass --tessdata-dir or set TESSDATA_PREFIX"
                .to_owned(),
        )
    })?;
    if !fs::metadata(dir).await.is_ok_and(|md| md.is_dir()) {
        return Err(ExtractError::ResourceInit(format!(
            "language data directory {:?} does not exist",
            dir.display()
        )));
    }
    for language in options.language.split('+') {
        let data_file = dir.join(format!("{}.traineddata", language));
        if !fs::metadata(&data_file).await.is_ok_and(|md| md.is_file()) {
            return Err(ExtractError::ResourceInit(format!(
                "{}.traineddata not found in {:?}",
                language,
                dir.display()
            )));
        }
    }
    Ok(dir)
}

/// Scratch space for a single recognition pass.
///
/// The temporary directory is removed when this is dropped.
struct RecognitionSession {
    tmpdir: TempDir,
}

impl RecognitionSession {
    fn new() -> Result<Self, ExtractError> {
        let tmpdir = TempDir::with_prefix("arabic-ocr").map_err(|err| {
            ExtractError::Engine(format!("cannot create temporary directory: {}", err))
        })?;
        Ok(Self { tmpdir })
    }

    /// Where we write the raster for `tesseract` to read.
    fn input_path(&self) -> PathBuf {
        self.tmpdir.path().join("input.png")
    }

    /// `tesseract` adds an extension for each output format.
    fn output_base(&self) -> PathBuf {
        self.tmpdir.path().join("output")
    }

    async fn read_output(&self, extension: &str) -> Result<String, ExtractError> {
        let path = self.output_base().with_extension(extension);
        fs::read_to_string(&path).await.map_err(|err| {
            ExtractError::Engine(format!(
                "cannot read tesseract {} output: {}",
                extension, err
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{ffi::OsStr, fs as std_fs, os::unix::fs::PermissionsExt as _};

    use image::{DynamicImage, GrayImage, Luma};

    use super::*;
    use crate::ocr::{
        engines::{ARABIC, EngineMode},
        layout::test_support::tsv_for_blocks,
    };

    fn options(tessdata_dir: &Path) -> SessionOptions {
        SessionOptions {
            language: ARABIC.to_owned(),
            tessdata_dir: Some(tessdata_dir.to_owned()),
            engine_mode: EngineMode::Default,
            page_segmentation_mode: None,
        }
    }

    fn blank_raster() -> Raster {
        Raster::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            32,
            32,
            Luma([255]),
        )))
    }

    #[test]
    fn command_line_has_expected_arguments() {
        let session = RecognitionSession::new().unwrap();
        let mut opts = options(Path::new("/opt/tessdata"));
        opts.engine_mode = EngineMode::LstmOnly;
        opts.page_segmentation_mode = Some(6);
        let cmd = TesseractEngine::default().build_command(
            &session,
            Path::new("/opt/tessdata"),
            &opts,
        );
        let args = cmd.as_std().get_args().collect::<Vec<_>>();
        assert_eq!(args[0], session.input_path().as_os_str());
        assert_eq!(args[1], session.output_base().as_os_str());
        let rest = args[2..]
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            rest,
            [
                "-l",
                "ara",
                "--tessdata-dir",
                "/opt/tessdata",
                "--oem",
                "1",
                "--psm",
                "6",
                "txt",
                "tsv"
            ]
        );
        assert_eq!(cmd.as_std().get_program(), OsStr::new("tesseract"));
    }

    #[test]
    fn session_directory_is_removed_on_drop() {
        let session = RecognitionSession::new().unwrap();
        let dir = session.tmpdir.path().to_owned();
        assert!(dir.is_dir());
        drop(session);
        assert!(!dir.exists());
    }

    /// Language data that passes our preflight check.
    fn fake_tessdata() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std_fs::write(dir.path().join("ara.traineddata"), b"").unwrap();
        dir
    }

    /// Write a shell script standing in for `tesseract`. It is called as
    /// `tesseract INPUT OUTBASE ...`.
    fn fake_tesseract(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-tesseract");
        std_fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std_fs::set_permissions(&path, std_fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn unconfigured_tessdata_dir_is_a_resource_error() {
        let mut opts = options(Path::new("unused"));
        opts.tessdata_dir = None;
        let err = TesseractEngine::default()
            .process(&blank_raster(), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ResourceInit(_)));
        assert!(err.to_string().contains("--tessdata-dir"));
    }

    #[tokio::test]
    async fn reads_text_and_layout_output() {
        let tessdata = fake_tessdata();
        let fixtures = tempfile::tempdir().unwrap();
        let txt = fixtures.path().join("page.txt");
        let tsv = fixtures.path().join("page.tsv");
        std_fs::write(&txt, "نص\n\u{c}").unwrap();
        std_fs::write(&tsv, tsv_for_blocks(&["نص"])).unwrap();
        let body = format!(
            "test -f \"$1\" || exit 2\ncp '{}' \"$2.txt\"\ncp '{}' \"$2.tsv\"",
            txt.display(),
            tsv.display()
        );
        let script = fake_tesseract(fixtures.path(), &body);

        let page = TesseractEngine::new(&script)
            .process(&blank_raster(), &options(tessdata.path()))
            .await
            .unwrap();
        assert_eq!(page.full_text, "نص\n");
        assert!((page.mean_confidence - 0.9).abs() < 1e-6);
        assert_eq!(page.layout.rows().len(), 5);
    }

    #[tokio::test]
    async fn missing_language_data_on_stderr_is_a_resource_error() {
        let tessdata = fake_tessdata();
        let script = fake_tesseract(
            tessdata.path(),
            "echo 'Error opening data file ./ara.traineddata' >&2\nexit 1",
        );
        let err = TesseractEngine::new(&script)
            .process(&blank_raster(), &options(tessdata.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ResourceInit(_)));
    }

    #[tokio::test]
    async fn other_engine_failures_are_engine_errors() {
        let tessdata = fake_tessdata();
        let script = fake_tesseract(
            tessdata.path(),
            "echo 'Error in pixReadStream: Unknown format' >&2\nexit 1",
        );
        let err = TesseractEngine::new(&script)
            .process(&blank_raster(), &options(tessdata.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Engine(_)));
    }

    #[tokio::test]
    async fn missing_output_is_an_engine_error() {
        let tessdata = fake_tessdata();
        let script = fake_tesseract(tessdata.path(), "exit 0");
        let err = TesseractEngine::new(&script)
            .process(&blank_raster(), &options(tessdata.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Engine(_)));
        assert!(err.to_string().contains("txt output"));
    }

    #[tokio::test]
    async fn missing_tessdata_dir_is_a_resource_error() {
        let err = TesseractEngine::default()
            .process(&blank_raster(), &options(Path::new("/nonexistent/tessdata")))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ResourceInit(_)));
    }

    #[tokio::test]
    async fn missing_traineddata_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        std_fs::write(dir.path().join("eng.traineddata"), b"").unwrap();
        let err = TesseractEngine::default()
            .process(&blank_raster(), &options(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ResourceInit(_)));
        assert!(err.to_string().contains("ara.traineddata"));
    }

    #[tokio::test]
    async fn missing_executable_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        std_fs::write(dir.path().join("ara.traineddata"), b"").unwrap();
        let err = TesseractEngine::new("/nonexistent/bin/tesseract")
            .process(&blank_raster(), &options(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Engine(_)));
    }

    #[tokio::test]
    #[ignore = "Requires tesseract with Arabic language data in TESSDATA_PREFIX"]
    async fn recognizes_blank_page() {
        let tessdata = std::env::var_os("TESSDATA_PREFIX").expect("TESSDATA_PREFIX");
        let page = TesseractEngine::default()
            .process(&blank_raster(), &options(Path::new(&tessdata)))
            .await
            .unwrap();
        assert!(page.full_text.trim().is_empty());
        assert_eq!(page.mean_confidence, 0.0);
    }
}
