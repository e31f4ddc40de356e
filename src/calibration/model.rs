//! Camera/projector model types: intrinsics, pose, solved model.

use glam::{DMat3, DQuat, DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Throw ratio assumed before any calibration.
pub const DEFAULT_THROW_RATIO: f64 = 1.62;
/// Principal point height (fraction of image height) used to seed the direct solve.
pub const DEFAULT_PRINCIPAL_Y: f64 = 0.9;

/// Pinhole intrinsics (the 3x3 camera matrix without skew).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraMatrix {
    pub fx: f64,
    pub fy: f64,
    pub px: f64,
    pub py: f64,
}

impl CameraMatrix {
    pub fn new(fx: f64, fy: f64, px: f64, py: f64) -> Self {
        Self { fx, fy, px, py }
    }

    /// Initial guess for the direct solve: default throw ratio, principal
    /// point centred horizontally and low in the image (projectors throw upwards).
    pub fn default_guess(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            fx: w * DEFAULT_THROW_RATIO,
            fy: h * DEFAULT_THROW_RATIO,
            px: w / 2.0,
            py: h * DEFAULT_PRINCIPAL_Y,
        }
    }

    /// Camera matrix equivalent to a throw ratio and a centred lens offset.
    pub fn from_throw(throw_x: f64, throw_y: f64, lens_offset: DVec2, width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            fx: throw_x * w,
            fy: throw_y * h,
            px: (lens_offset.x + 0.5) * w,
            py: (lens_offset.y + 0.5) * h,
        }
    }

    /// Build from a row-major 3x3 matrix.
    pub fn from_rows(m: [[f64; 3]; 3]) -> Self {
        Self {
            fx: m[0][0],
            fy: m[1][1],
            px: m[0][2],
            py: m[1][2],
        }
    }

    /// Row-major 3x3 matrix.
    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.px],
            [0.0, self.fy, self.py],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Pixel to normalised image coordinates.
    pub fn normalize(&self, pixel: DVec2) -> DVec2 {
        DVec2::new((pixel.x - self.px) / self.fx, (pixel.y - self.py) / self.fy)
    }

    /// Project a world point through `pose` into pixels. Distortion-free.
    pub fn project(&self, pose: &Pose, world: DVec3) -> DVec2 {
        let p = pose.transform_point(world);
        let z = if p.z.abs() < 1e-12 { 1e-12f64.copysign(p.z) } else { p.z };
        DVec2::new(self.fx * p.x / z + self.px, self.fy * p.y / z + self.py)
    }
}

/// Rotation given either as a matrix or as an axis-angle (Rodrigues) vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rotation {
    Matrix(DMat3),
    AxisAngle(DVec3),
}

impl Rotation {
    pub fn to_mat3(self) -> DMat3 {
        match self {
            Rotation::Matrix(m) => m,
            Rotation::AxisAngle(v) => DMat3::from_quat(DQuat::from_scaled_axis(v)),
        }
    }
}

/// World-to-projector rigid transform: `p_projector = rotation * p_world + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: DMat3,
    pub translation: DVec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            rotation: DMat3::IDENTITY,
            translation: DVec3::ZERO,
        }
    }
}

impl Pose {
    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self { rotation, translation }
    }

    pub fn from_rotation_vector(rvec: DVec3, translation: DVec3) -> Self {
        Self::new(Rotation::AxisAngle(rvec).to_mat3(), translation)
    }

    /// Axis-angle form of the rotation.
    pub fn rotation_vector(&self) -> DVec3 {
        DQuat::from_mat3(&self.rotation).to_scaled_axis()
    }

    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.translation
    }
}

/// Result of one solver run, before it is committed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOutput {
    pub camera: CameraMatrix,
    pub pose: Pose,
    pub distortion: [f64; 5],
    pub rms_error: f64,
}

/// A successfully solved projector model. Intrinsics and extrinsics are
/// only ever replaced together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationModel {
    pub camera: CameraMatrix,
    pub pose: Pose,
    /// k1, k2, p1, p2, k3. Never estimated, always zero.
    pub distortion: [f64; 5],
    /// RMS reprojection error of the correspondences used for the solve, in pixels.
    pub rms_error: f64,
}

impl From<SolveOutput> for CalibrationModel {
    fn from(out: SolveOutput) -> Self {
        Self {
            camera: out.camera,
            pose: out.pose,
            distortion: out.distortion,
            rms_error: out.rms_error,
        }
    }
}

impl CalibrationModel {
    /// Project a world point to display pixels.
    pub fn project(&self, world: DVec3) -> DVec2 {
        self.camera.project(&self.pose, world)
    }
}

/// RMS pixel error of `pose`/`camera` over a correspondence set.
pub fn rms_reprojection_error(camera: &CameraMatrix, pose: &Pose, world: &[DVec3], image: &[DVec2]) -> f64 {
    if world.is_empty() {
        return 0.0;
    }
    let sum: f64 = world
        .iter()
        .zip(image)
        .map(|(w, i)| camera.project(pose, *w).distance_squared(*i))
        .sum();
    (sum / world.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_guess() {
        let guess = CameraMatrix::default_guess(1024, 768);
        assert!((guess.fx - 1658.88).abs() < 1e-9);
        assert!((guess.fy - 1244.16).abs() < 1e-9);
        assert_eq!(guess.px, 512.0);
        assert!((guess.py - 691.2).abs() < 1e-9);
    }

    #[test]
    fn test_rows_roundtrip() {
        let camera = CameraMatrix::new(1000.0, 900.0, 512.0, 384.0);
        let rows = camera.to_rows();
        assert_eq!(rows[2], [0.0, 0.0, 1.0]);
        assert_eq!(CameraMatrix::from_rows(rows), camera);
    }

    #[test]
    fn test_project_principal_axis() {
        let camera = CameraMatrix::new(1000.0, 1000.0, 512.0, 384.0);
        let pose = Pose::new(DMat3::IDENTITY, DVec3::new(0.0, 0.0, 500.0));
        let px = camera.project(&pose, DVec3::ZERO);
        assert!((px - DVec2::new(512.0, 384.0)).length() < 1e-9);

        let px = camera.project(&pose, DVec3::new(50.0, -25.0, 0.0));
        assert!((px - DVec2::new(612.0, 334.0)).length() < 1e-9);
    }

    #[test]
    fn test_rotation_vector_roundtrip() {
        let rvec = DVec3::new(0.1, -0.4, 0.25);
        let pose = Pose::from_rotation_vector(rvec, DVec3::ZERO);
        assert!((pose.rotation_vector() - rvec).length() < 1e-9);
        assert!((pose.rotation.determinant() - 1.0).abs() < 1e-9);
    }
}
