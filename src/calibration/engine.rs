//! Projector calibration state.
//!
//! The engine owns the correspondence set, the solved model, the derived
//! human-facing parameters (throw ratio, lens offset, Euler pose) and the
//! `ProjectorView` matrices used for drawing. A solve either commits all of
//! them together or leaves every one untouched.

use glam::{DMat3, DQuat, DVec2, DVec3, EulerRot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::backend;
use super::correspondence::{load_correspondence_files, load_finger_points, CorrespondenceSet};
use super::model::{CalibrationModel, CameraMatrix, Rotation, SolveOutput, DEFAULT_THROW_RATIO};
use super::MIN_CORRESPONDENCES;
use crate::error::{Result, TouchError};
use crate::projector::{make_matrix, make_projection_matrix, ProjectorView};

/// Euler composition of the stored angles: `R = Ry * Rz * Rx`.
pub const EULER_ORDER: EulerRot = EulerRot::YZX;

/// Lens offset restored by `reset_projector`, as a fraction of resolution.
pub const DEFAULT_LENS_OFFSET: DVec2 = DVec2::new(0.0, 0.5);

/// Adjustable projector parameters.
///
/// Throw ratios are focal length over resolution. Lens offsets are the
/// principal point as a fraction of resolution, minus one half. Rotations
/// are in degrees and compose as [`EULER_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectorParams {
    pub throw_ratio_x: f64,
    pub throw_ratio_y: f64,
    pub lens_offset_x: f64,
    pub lens_offset_y: f64,
    pub translation_x: f64,
    pub translation_y: f64,
    pub translation_z: f64,
    pub rotation_x: f64,
    pub rotation_y: f64,
    pub rotation_z: f64,
}

impl Default for ProjectorParams {
    fn default() -> Self {
        Self {
            throw_ratio_x: DEFAULT_THROW_RATIO,
            throw_ratio_y: DEFAULT_THROW_RATIO,
            lens_offset_x: DEFAULT_LENS_OFFSET.x,
            lens_offset_y: DEFAULT_LENS_OFFSET.y,
            translation_x: 0.0,
            translation_y: 0.0,
            translation_z: 0.0,
            rotation_x: 0.0,
            rotation_y: 0.0,
            rotation_z: 0.0,
        }
    }
}

impl ProjectorParams {
    pub fn translation(&self) -> DVec3 {
        DVec3::new(self.translation_x, self.translation_y, self.translation_z)
    }

    /// Rotation matrix rebuilt from the stored Euler angles.
    pub fn rotation(&self) -> DMat3 {
        DMat3::from_quat(DQuat::from_euler(
            EULER_ORDER,
            self.rotation_y.to_radians(),
            self.rotation_z.to_radians(),
            self.rotation_x.to_radians(),
        ))
    }
}

/// Per-point reprojection of the current correspondences.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionReport {
    /// Where the model puts each world point, in display pixels.
    pub projected: Vec<DVec2>,
    /// Distance between each projected point and its recorded display point.
    pub errors: Vec<f64>,
    pub rms_error: f64,
}

#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    width: u32,
    height: u32,
    swap_yz: bool,
    correspondences: CorrespondenceSet,
    source: Option<PathBuf>,
    /// Set when the correspondences came from a finger-point document,
    /// whose unused records sit at display (0, 0).
    finger_document: bool,
    model: Option<CalibrationModel>,
    params: ProjectorParams,
    projector: ProjectorView,
}

impl CalibrationEngine {
    pub fn new(width: u32, height: u32) -> Self {
        let mut engine = Self {
            width,
            height,
            swap_yz: false,
            correspondences: CorrespondenceSet::default(),
            source: None,
            finger_document: false,
            model: None,
            params: ProjectorParams::default(),
            projector: ProjectorView::new(width, height),
        };
        engine.reset_projector();
        engine
    }

    /// Exchange Y and Z of every world point the engine takes in.
    pub fn with_swap_yz(mut self, swap_yz: bool) -> Self {
        self.swap_yz = swap_yz;
        self
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn correspondences(&self) -> &CorrespondenceSet {
        &self.correspondences
    }

    /// Where the current correspondences were loaded from, if a file.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Replace the correspondence set, e.g. with freshly captured pairs.
    /// The solved model is kept until the next successful solve.
    pub fn set_correspondences(&mut self, mut set: CorrespondenceSet) {
        if self.swap_yz {
            set.swap_world_yz();
        }
        self.correspondences = set;
        self.source = None;
        self.finger_document = false;
    }

    /// Load a display/world text file pair. Nothing changes on failure.
    pub fn load_points(&mut self, image_path: &Path, world_path: &Path) -> Result<usize> {
        let mut set = load_correspondence_files(image_path, world_path)?;
        if self.swap_yz {
            set.swap_world_yz();
        }
        let count = set.len();
        self.correspondences = set;
        self.source = Some(image_path.to_path_buf());
        self.finger_document = false;
        Ok(count)
    }

    /// Load a finger-point calibration document. Nothing changes on failure.
    pub fn load_finger_tip_points(&mut self, path: &Path) -> Result<usize> {
        let set = load_finger_points(path, self.swap_yz)?;
        let count = set.len();
        log::info!(
            "{} finger calibration points ({} usable) from {}",
            count,
            set.usable_count(),
            path.display()
        );
        self.correspondences = set;
        self.source = Some(path.to_path_buf());
        self.finger_document = true;
        Ok(count)
    }

    /// Pairs that count toward solving. Finger-point documents only count
    /// records with a recorded display point; every other source counts all.
    pub fn usable_points(&self) -> usize {
        if self.finger_document {
            self.correspondences.usable_count()
        } else {
            self.correspondences.len()
        }
    }

    pub fn has_enough_points(&self) -> bool {
        self.usable_points() >= MIN_CORRESPONDENCES
    }

    /// Solve intrinsics and pose together from the current correspondences.
    pub fn correct_camera(&mut self) -> Result<&CalibrationModel> {
        self.ensure_enough_points()?;
        let out = backend::calibrate_single_view(
            self.correspondences.world(),
            self.correspondences.image(),
            self.width,
            self.height,
        )?;
        Ok(self.commit(out))
    }

    /// Solve only the pose, for known intrinsics and zero distortion.
    pub fn correct_camera_pnp(&mut self, camera: &CameraMatrix) -> Result<&CalibrationModel> {
        self.ensure_enough_points()?;
        let out = backend::solve_pose(self.correspondences.world(), self.correspondences.image(), camera)?;
        Ok(self.commit(out))
    }

    fn ensure_enough_points(&self) -> Result<()> {
        if self.has_enough_points() {
            return Ok(());
        }
        let found = self.usable_points();
        log::warn!("not enough control points: {} (need {})", found, MIN_CORRESPONDENCES);
        Err(TouchError::InsufficientPoints {
            found,
            required: MIN_CORRESPONDENCES,
        })
    }

    fn commit(&mut self, out: SolveOutput) -> &CalibrationModel {
        self.set_extrinsics(Rotation::Matrix(out.pose.rotation), out.pose.translation);
        self.set_intrinsics(&out.camera);

        let c = &out.camera;
        log::info!(
            "projector calibrated from {} points: fx {:.2} fy {:.2} px {:.2} py {:.2}, rms {:.3}px",
            self.correspondences.len(),
            c.fx,
            c.fy,
            c.px,
            c.py,
            out.rms_error
        );
        self.model.insert(CalibrationModel::from(out))
    }

    /// Derive throw ratios and lens offsets from `camera` and rebuild the
    /// projection matrix.
    pub fn set_intrinsics(&mut self, camera: &CameraMatrix) {
        let (w, h) = (self.width as f64, self.height as f64);
        self.params.throw_ratio_x = camera.fx / w;
        self.params.throw_ratio_y = camera.fy / h;
        self.params.lens_offset_x = camera.px / w - 0.5;
        self.params.lens_offset_y = camera.py / h - 0.5;

        self.projector
            .set_projection(make_projection_matrix(camera, self.width, self.height));
    }

    /// Store the pose as Euler angles and translation and rebuild the view matrix.
    pub fn set_extrinsics(&mut self, rotation: Rotation, translation: DVec3) {
        let matrix = rotation.to_mat3();
        let (y, z, x) = DQuat::from_mat3(&matrix).to_euler(EULER_ORDER);

        self.params.rotation_x = x.to_degrees();
        self.params.rotation_y = y.to_degrees();
        self.params.rotation_z = z.to_degrees();
        self.params.translation_x = translation.x;
        self.params.translation_y = translation.y;
        self.params.translation_z = translation.z;

        self.projector.set_view(make_matrix(Rotation::Matrix(matrix), translation));
    }

    /// Restore the default throw ratio and lens offset, keeping the stored pose.
    pub fn reset_projector(&mut self) {
        self.params.throw_ratio_x = DEFAULT_THROW_RATIO;
        self.params.throw_ratio_y = DEFAULT_THROW_RATIO;
        self.params.lens_offset_x = DEFAULT_LENS_OFFSET.x;
        self.params.lens_offset_y = DEFAULT_LENS_OFFSET.y;

        let view = make_matrix(Rotation::Matrix(self.params.rotation()), self.params.translation());
        let camera = CameraMatrix::from_throw(
            DEFAULT_THROW_RATIO,
            DEFAULT_THROW_RATIO,
            DEFAULT_LENS_OFFSET,
            self.width,
            self.height,
        );

        self.projector = ProjectorView::new(self.width, self.height);
        self.projector.set_view(view);
        self.projector
            .set_projection(make_projection_matrix(&camera, self.width, self.height));
    }

    pub fn params(&self) -> &ProjectorParams {
        &self.params
    }

    /// Current display matrices. Before any solve these are the defaults
    /// installed by `reset_projector`.
    pub fn projector(&self) -> &ProjectorView {
        &self.projector
    }

    pub fn is_calibrated(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Result<&CalibrationModel> {
        self.model.as_ref().ok_or(TouchError::Uncalibrated)
    }

    /// World point to display pixels through the solved model.
    pub fn project_world_point(&self, world: DVec3) -> Result<DVec2> {
        Ok(self.model()?.project(world))
    }

    /// Reproject every correspondence through the solved model.
    pub fn reprojection(&self) -> Result<ReprojectionReport> {
        let model = self.model()?;
        let projected: Vec<DVec2> = self.correspondences.world().iter().map(|w| model.project(*w)).collect();
        let errors: Vec<f64> = projected
            .iter()
            .zip(self.correspondences.image())
            .map(|(p, i)| p.distance(*i))
            .collect();
        let rms_error = if errors.is_empty() {
            0.0
        } else {
            (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt()
        };
        Ok(ReprojectionReport {
            projected,
            errors,
            rms_error,
        })
    }
}
