//! Collaborators the editor core calls through for remote generation and image loading,
//! plus the machinery that tracks a generation to completion.

pub mod clock;
mod notifications;
mod score;
mod session;
mod tracker;

use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pixels::{decode_image, EncodeFormat, PixelError, RgbaImage};

pub use clock::{Clock, ManualClock, SystemClock};
pub use notifications::{NotificationHub, Subscription};
pub use score::{effective_score, rank_by_score};
pub use session::{
    run_augmentation, run_generation, AugmentOutcome, AugmentPlan, GenerationMessage,
    GenerationOutcome, GenerationPlan, RankedVariant, Services, VariantProcessing,
};
pub use tracker::{GenerationTracker, Settlement, TrackerTimeouts};

#[cfg(test)]
pub(crate) use session::fakes;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to upload {what}: {message}")]
    Staging { what: &'static str, message: String },
    #[error("failed to create image: {0}")]
    Submission(String),
    #[error("failed to check job: {0}")]
    Status(String),
    #[error("no images returned")]
    NoImages,
    #[error("{0}")]
    GenerationFailed(String),
    #[error("generation was cancelled")]
    Cancelled,
    #[error("generation timed out before any image completed")]
    TimedOut,
    #[error("failed to load image {id}: {message}")]
    PixelLoad { id: ImageId, message: String },
    #[error(transparent)]
    Pixel(#[from] PixelError),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Opaque identifier of a remote image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl ImageStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Position in the only allowed progression: pending, processing, then a terminal.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Error => 2,
        }
    }
}

/// Server-side view of one generated image, as returned by a poll or pushed as an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub status: ImageStatus,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub negative_score: f64,
    #[serde(default)]
    pub prompt: String,
}

impl ImageRecord {
    pub fn new(id: ImageId, status: ImageStatus) -> Self {
        Self {
            id,
            status,
            score: 0.0,
            negative_score: 0.0,
            prompt: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Inpaint,
    Enhance,
    Upscale,
    FaceRestore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub image: StagingHandle,
    pub mask: Option<StagingHandle>,
    pub parent: Option<ImageId>,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub denoising_strength: f32,
    pub model: String,
}

/// Encoded payloads waiting to be staged before a generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPayload {
    pub image: Vec<u8>,
    pub image_format: EncodeFormat,
    pub mask: Option<Vec<u8>>,
}

/// Remote image-generation service.
pub trait RemoteGenerator: Send + Sync {
    /// Pre-uploads a payload, reporting fractional progress in `[0, 1]`.
    fn upload_staging(
        &self,
        bytes: &[u8],
        format: EncodeFormat,
        progress: &mut dyn FnMut(f32),
    ) -> RemoteResult<StagingHandle>;

    /// Requests generation and returns the initial records of the images it will produce.
    fn submit_generation(&self, request: &GenerationRequest) -> RemoteResult<Vec<ImageRecord>>;

    fn poll_status(&self, id: &ImageId) -> RemoteResult<ImageRecord>;
}

/// Resolves an image identifier to decoded pixels.
pub trait PixelSource: Send + Sync {
    fn load_pixels(&self, id: &ImageId) -> RemoteResult<RgbaImage>;
}

/// Treats identifiers as file paths, optionally relative to `root`.
#[derive(Debug, Clone, Default)]
pub struct FilePixelSource {
    root: Option<PathBuf>,
}

impl FilePixelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn resolve(&self, id: &ImageId) -> PathBuf {
        match &self.root {
            Some(root) => root.join(id.as_str()),
            None => PathBuf::from(id.as_str()),
        }
    }
}

impl PixelSource for FilePixelSource {
    fn load_pixels(&self, id: &ImageId) -> RemoteResult<RgbaImage> {
        let path = self.resolve(id);
        let bytes = fs::read(&path).map_err(|err| RemoteError::PixelLoad {
            id: id.clone(),
            message: err.to_string(),
        })?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "loaded image file");
        Ok(decode_image(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixels::{encode_image, Rgba};

    #[test]
    fn status_rank_orders_progression() {
        assert!(ImageStatus::Pending.rank() < ImageStatus::Processing.rank());
        assert!(ImageStatus::Processing.rank() < ImageStatus::Completed.rank());
        assert_eq!(ImageStatus::Completed.rank(), ImageStatus::Error.rank());
        assert!(ImageStatus::Error.is_terminal());
        assert!(!ImageStatus::Processing.is_terminal());
    }

    #[test]
    fn image_record_deserializes_with_missing_scores() {
        let record: ImageRecord =
            serde_json::from_str(r#"{ "id": "abc", "status": "processing" }"#)
                .expect("record should parse");
        assert_eq!(record, ImageRecord::new(ImageId::new("abc"), ImageStatus::Processing));
    }

    #[test]
    fn file_pixel_source_reads_from_root() {
        let root = std::env::temp_dir().join(format!("brushcanvas-pixels-{}", std::process::id()));
        fs::create_dir_all(&root).expect("root should be creatable");
        let image = RgbaImage::from_pixel(3, 2, Rgba([4, 5, 6, 255]));
        fs::write(
            root.join("base.png"),
            encode_image(&image, EncodeFormat::Png).expect("png should encode"),
        )
        .expect("file should be writable");

        let source = FilePixelSource::with_root(root.clone());
        let loaded = source
            .load_pixels(&ImageId::new("base.png"))
            .expect("image should load");

        assert_eq!(loaded, image);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_file_reports_pixel_load_error() {
        let source = FilePixelSource::new();
        let err = source
            .load_pixels(&ImageId::new("/nonexistent/brushcanvas.png"))
            .expect_err("missing file should fail");
        assert!(matches!(err, RemoteError::PixelLoad { .. }));
    }
}
