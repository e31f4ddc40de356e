//! Error types shared by the calibration, workspace and session layers.

use thiserror::Error;

/// Errors produced by surface-touch.
#[derive(Debug, Error)]
pub enum TouchError {
    /// Fewer correspondences than a solve needs. The model is left untouched.
    #[error("not enough control points: {found} (need at least {required})")]
    InsufficientPoints { found: usize, required: usize },

    /// A projection query was made before any solve succeeded.
    #[error("projector is not calibrated")]
    Uncalibrated,

    #[error("malformed correspondence file {path}, line {line}: {reason}")]
    MalformedCorrespondenceFile {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("correspondence count mismatch: {image} display points vs {world} world points")]
    MismatchedCorrespondences { image: usize, world: usize },

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Workspace corners can only be authored once calibration points exist.
    #[error("workspace authoring needs calibration points first")]
    WorkspaceNotReady,

    #[error("no depth reading at ({x:.1}, {y:.1})")]
    NoDepth { x: f64, y: f64 },

    #[error("no fingertip is currently tracked")]
    NoFingertip,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::de::DeError),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::se::SeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T> = std::result::Result<T, TouchError>;
