use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::error::{PipelineError, Result};

/// Validated raw input for one analysis
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureInput {
    Image { bytes: Vec<u8>, mime_type: String },
    /// `bytes` is a 16-bit PCM WAV container
    Audio { bytes: Vec<u8>, duration_seconds: f64 },
}

impl CaptureInput {
    pub fn image(bytes: Vec<u8>, mime_type: impl Into<String>) -> Result<Self> {
        let input = Self::Image {
            bytes,
            mime_type: mime_type.into(),
        };
        input.validate()?;
        Ok(input)
    }

    pub fn audio(bytes: Vec<u8>, duration_seconds: f64) -> Result<Self> {
        let input = Self::Audio {
            bytes,
            duration_seconds,
        };
        input.validate()?;
        Ok(input)
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Image { bytes, .. } | Self::Audio { bytes, .. } => bytes,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
        }
    }

    /// Non-empty bytes, an `image/*` type for images, a positive duration for audio
    pub fn validate(&self) -> Result<()> {
        if self.bytes().is_empty() {
            return Err(PipelineError::InvalidInputKind(format!(
                "{} input is empty",
                self.kind()
            )));
        }
        match self {
            Self::Image { mime_type, .. } => ensure_image_mime(mime_type),
            Self::Audio {
                duration_seconds, ..
            } => {
                if duration_seconds.is_finite() && *duration_seconds > 0.0 {
                    Ok(())
                } else {
                    Err(PipelineError::InvalidInputKind(format!(
                        "audio duration must be positive, got {}",
                        duration_seconds
                    )))
                }
            }
        }
    }
}

pub(crate) fn ensure_image_mime(mime_type: &str) -> Result<()> {
    if mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        Ok(())
    } else {
        Err(PipelineError::InvalidInputKind(format!(
            "expected an image file, got {}",
            mime_type
        )))
    }
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Memory(Vec<u8>),
}

/// A user-selected file with its declared MIME type
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub source: ImageSource,
}

impl ImageFile {
    /// A file on disk, typed by extension
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type: mime_from_extension(&path).to_string(),
            source: ImageSource::Path(path),
        }
    }

    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            source: ImageSource::Memory(bytes),
        }
    }

    /// The file's bytes, refusing anything over `limit`
    ///
    /// A file on disk is sized from its metadata first, so an oversized one is
    /// never loaded.
    pub(crate) async fn read(self, limit: usize) -> Result<Vec<u8>> {
        let bytes = match self.source {
            ImageSource::Path(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let len = file.metadata().await?.len();
                if len > limit as u64 {
                    return Err(too_large(len, limit));
                }
                let mut bytes = Vec::with_capacity(len as usize);
                // The file may grow after the metadata call
                file.take(limit as u64 + 1).read_to_end(&mut bytes).await?;
                bytes
            }
            ImageSource::Memory(bytes) => bytes,
        };
        if bytes.len() > limit {
            return Err(too_large(bytes.len() as u64, limit));
        }
        Ok(bytes)
    }
}

fn too_large(len: u64, limit: usize) -> PipelineError {
    PipelineError::InvalidInputKind(format!("image is {} bytes, limit is {}", len, limit))
}

fn mime_from_extension(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "dcm" => "image/dicom",
        _ => "application/octet-stream",
    }
}
