//! Projector calibration from display/world point correspondences.

mod capture;
mod correspondence;
mod engine;
mod model;
#[cfg(feature = "opencv")]
mod opencv_solver;
#[cfg_attr(feature = "opencv", allow(dead_code))]
mod solver;

#[cfg(not(feature = "opencv"))]
use self::solver as backend;
#[cfg(feature = "opencv")]
use self::opencv_solver as backend;

/// Fewest usable correspondences a solve accepts.
pub const MIN_CORRESPONDENCES: usize = 4;

pub use capture::{CaptureProgress, CorrespondenceCapture};
pub use correspondence::{
    format_image_points, format_world_points, load_correspondence_files, load_finger_points,
    parse_finger_points, parse_image_points, parse_world_points, save_correspondence_files,
    CorrespondenceSet,
};
pub use engine::{CalibrationEngine, ProjectorParams, ReprojectionReport, DEFAULT_LENS_OFFSET, EULER_ORDER};
pub use model::{
    rms_reprojection_error, CalibrationModel, CameraMatrix, Pose, Rotation, SolveOutput,
    DEFAULT_PRINCIPAL_Y, DEFAULT_THROW_RATIO,
};
