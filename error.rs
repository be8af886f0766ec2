use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Model Load Error: {}: {reason}", .path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Image Decode Error: {0}")]
    ImageDecode(String),

    #[error("Shape Mismatch Error: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 4],
        actual: Vec<usize>,
    },

    #[error("Inference Error ({model}): {cause}")]
    Inference { model: String, cause: String },

    #[error("Unknown sample image: {0}")]
    UnknownSample(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl Error {
    pub fn inference(model: &str, cause: impl std::fmt::Display) -> Self {
        Self::Inference {
            model: model.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Per-request failures leave the process able to serve the next request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ImageDecode(_)
                | Self::ShapeMismatch { .. }
                | Self::Inference { .. }
                | Self::UnknownSample(_)
        )
    }

    /// 1 for a failed request, 2 for startup or configuration failures.
    pub fn exit_code(&self) -> u8 {
        if self.is_recoverable() {
            1
        } else {
            2
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::ImageDecode(cause) => format!(
                "Could not read the image: {cause}. Please try a different JPG or PNG file."
            ),
            Self::ShapeMismatch { .. } => "Error processing image.".to_string(),
            Self::Inference { cause, .. } => format!("Error processing image: {cause}"),
            Self::UnknownSample(_) => "Failed to load sample image".to_string(),
            Self::ModelLoad { .. } => format!("Error loading models: {self}"),
            other => other.to_string(),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::ImageDecode(err.to_string())
    }
}
