//! Loading image files into rasters.

use std::{fs::File, io::BufReader};

use image::{DynamicImage, ImageFormat};

use super::ExtractError;
use crate::prelude::*;

/// Image types we accept.
const SUPPORTED_MIME_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/bmp", "image/tiff"];

/// PDF MIME type, which we recognize only to give a better error.
const PDF_MIME_TYPE: &str = "application/pdf";

/// A decoded image, ready for recognition.
#[derive(Clone, Debug)]
pub struct Raster {
    image: DynamicImage,
}

impl Raster {
    /// Wrap an already-decoded image.
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Write this raster to `path` as a PNG.
    pub fn write_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("cannot write image to {:?}", path.display()))
    }
}

/// Something that can turn a path into a [`Raster`].
///
/// Decoding is blocking, CPU-bound work. Async callers should run it on a
/// blocking thread.
pub trait ImageSource: Send + Sync + 'static {
    /// Decode the image at `path`.
    fn decode(&self, path: &Path) -> Result<Raster, ExtractError>;
}

/// An [`ImageSource`] reading PNG, JPEG, BMP and TIFF files from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileImageSource;

impl ImageSource for FileImageSource {
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    fn decode(&self, path: &Path) -> Result<Raster, ExtractError> {
        let mime_type = get_mime_type(path)?;
        if mime_type == PDF_MIME_TYPE {
            return Err(ExtractError::Decode(
                "PDF input is not supported; convert the PDF pages to images first"
                    .to_owned(),
            ));
        }
        if !SUPPORTED_MIME_TYPES.contains(&mime_type) {
            return Err(ExtractError::Decode(format!(
                "unsupported file type {} for {:?}",
                mime_type,
                path.display()
            )));
        }
        let format = ImageFormat::from_mime_type(mime_type).ok_or_else(|| {
            ExtractError::Decode(format!("no decoder for {}", mime_type))
        })?;

        let file = File::open(path).map_err(|err| {
            ExtractError::Decode(format!("cannot open {:?}: {}", path.display(), err))
        })?;
        let image = image::load(BufReader::new(file), format).map_err(|err| {
            ExtractError::Decode(format!("cannot decode {:?}: {}", path.display(), err))
        })?;
        debug!(
            width = image.width(),
            height = image.height(),
            mime_type,
            "decoded image"
        );
        Ok(Raster::new(image))
    }
}

/// Get the MIME type of a file by looking at its contents.
fn get_mime_type(path: &Path) -> Result<&'static str, ExtractError> {
    infer::get_from_path(path)
        .map_err(|err| {
            ExtractError::Decode(format!("cannot read {:?}: {}", path.display(), err))
        })?
        .map(|kind| kind.mime_type())
        .ok_or_else(|| {
            ExtractError::Decode(format!("unknown file type for {:?}", path.display()))
        })
}
