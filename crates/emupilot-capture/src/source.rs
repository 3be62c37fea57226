//! Frame sources polled by the capture loop.

use image::RgbaImage;
use std::path::{Path, PathBuf};

use crate::error::CaptureError;

/// Something that can produce the emulator's current video frame.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<RgbaImage, CaptureError>;

    fn describe(&self) -> String {
        "frame-source".to_string()
    }
}

/// Reads the image file the emulator keeps overwriting with its screen.
///
/// A file caught mid-write fails to decode; the capture loop treats that as a
/// skipped tick.
#[derive(Debug, Clone)]
pub struct ImageFileSource {
    path: PathBuf,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for ImageFileSource {
    fn grab(&mut self) -> Result<RgbaImage, CaptureError> {
        if !self.path.exists() {
            return Err(CaptureError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }
        let bytes = std::fs::read(&self.path)?;
        let image = image::load_from_memory(&bytes)?;
        Ok(image.to_rgba8())
    }

    fn describe(&self) -> String {
        format!("image-file:{}", self.path.display())
    }
}
