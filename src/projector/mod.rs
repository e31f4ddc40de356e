//! Projector display model.
//!
//! Matrices follow glam's column-vector convention: a world point `p`
//! reaches clip space as `projection * view * p`. Row `i`, column `j` of the
//! conventional row-major layout is `to_cols_array_2d()[j][i]`.

use glam::{DMat4, DVec2, DVec3, DVec4};

use crate::calibration::{CameraMatrix, Rotation};

/// Camera-to-clip matrix for a pinhole with intrinsics `camera` at
/// `width` x `height`. Display Y points down, so the Y focal term is negated.
pub fn make_projection_matrix(camera: &CameraMatrix, width: u32, height: u32) -> DMat4 {
    let (w, h) = (width as f64, height as f64);
    let base = DMat4::from_cols(
        DVec4::new(2.0 * camera.fx / w, 0.0, 0.0, 0.0),
        DVec4::new(0.0, -2.0 * camera.fy / h, 0.0, 0.0),
        DVec4::new(0.0, 0.0, 1.0, 1.0),
        DVec4::ZERO,
    );
    let lens_offset = DVec3::new(2.0 * camera.px / w - 1.0, 1.0 - 2.0 * camera.py / h, 0.0);
    DMat4::from_translation(lens_offset) * base
}

/// Rigid world-to-view transform.
pub fn make_matrix(rotation: Rotation, translation: DVec3) -> DMat4 {
    let r = rotation.to_mat3();
    DMat4::from_cols(
        r.x_axis.extend(0.0),
        r.y_axis.extend(0.0),
        r.z_axis.extend(0.0),
        translation.extend(1.0),
    )
}

/// The view and projection a renderer uses to draw registered content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorView {
    pub width: u32,
    pub height: u32,
    pub projection: DMat4,
    pub view: DMat4,
}

impl ProjectorView {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            projection: DMat4::IDENTITY,
            view: DMat4::IDENTITY,
        }
    }

    pub fn set_projection(&mut self, projection: DMat4) {
        self.projection = projection;
    }

    pub fn set_view(&mut self, view: DMat4) {
        self.view = view;
    }

    /// Map a world point to display pixels. `None` for points on the
    /// projector's focal plane.
    pub fn world_to_screen(&self, world: DVec3) -> Option<DVec2> {
        let clip = self.projection * self.view * world.extend(1.0);
        if clip.w.abs() < 1e-12 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(DVec2::new(
            (ndc.x + 1.0) * self.width as f64 / 2.0,
            (1.0 - ndc.y) * self.height as f64 / 2.0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Pose;
    use glam::{DMat3, DQuat};

    #[test]
    fn test_projection_matrix_entries() {
        let camera = CameraMatrix::new(1000.0, 1000.0, 512.0, 384.0);
        let m = make_projection_matrix(&camera, 1024, 768).to_cols_array_2d();

        assert!((m[0][0] - 1.953125).abs() < 1e-9);
        assert!((m[1][1] + 2.604166).abs() < 1e-5);
        assert_eq!(m[2][3], 1.0);
        assert_eq!(m[3][3], 0.0);
        // Centred principal point: no lens shift.
        assert_eq!(m[2][0], 0.0);
        assert_eq!(m[2][1], 0.0);
    }

    #[test]
    fn test_pose_matrix_layout() {
        let rotation = DMat3::from_quat(DQuat::from_rotation_z(0.3));
        let m = make_matrix(Rotation::Matrix(rotation), DVec3::new(1.0, 2.0, 3.0));
        let rows = m.to_cols_array_2d();

        // Bottom row of the row-major form carries the translation.
        assert_eq!(rows[3][0], 1.0);
        assert_eq!(rows[3][1], 2.0);
        assert_eq!(rows[3][2], 3.0);
        assert_eq!(rows[3][3], 1.0);
        // Upper-left block is the transposed rotation in that layout.
        assert_eq!(rows[0][1], rotation.x_axis.y);
        assert_eq!(rows[1][0], rotation.y_axis.x);
    }

    #[test]
    fn test_axis_angle_matches_matrix() {
        let rvec = DVec3::new(0.2, -0.1, 0.05);
        let t = DVec3::new(5.0, 0.0, 900.0);
        let a = make_matrix(Rotation::AxisAngle(rvec), t);
        let b = make_matrix(Rotation::Matrix(Pose::from_rotation_vector(rvec, t).rotation), t);
        assert!(a.abs_diff_eq(b, 1e-12));
    }

    #[test]
    fn test_world_to_screen_matches_pinhole() {
        let camera = CameraMatrix::new(1400.0, 1350.0, 500.0, 650.0);
        let pose = Pose::from_rotation_vector(DVec3::new(0.1, 0.2, -0.05), DVec3::new(30.0, -20.0, 1000.0));

        let mut view = ProjectorView::new(1024, 768);
        view.set_projection(make_projection_matrix(&camera, 1024, 768));
        view.set_view(make_matrix(Rotation::Matrix(pose.rotation), pose.translation));

        for world in [DVec3::ZERO, DVec3::new(100.0, 50.0, 20.0), DVec3::new(-200.0, 120.0, -40.0)] {
            let screen = view.world_to_screen(world).unwrap();
            let expected = camera.project(&pose, world);
            assert!((screen - expected).length() < 1e-6, "{screen} vs {expected}");
        }
    }

    #[test]
    fn test_focal_plane_has_no_screen_point() {
        let mut view = ProjectorView::new(640, 480);
        view.set_projection(make_projection_matrix(&CameraMatrix::new(500.0, 500.0, 320.0, 240.0), 640, 480));
        assert!(view.world_to_screen(DVec3::new(1.0, 1.0, 0.0)).is_none());
    }
}
