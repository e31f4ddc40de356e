//! Calibration through OpenCV's `calibrateCamera` and `solvePnP`.
//!
//! Same interface as the native solver. Radial and tangential distortion are
//! fixed at zero and the focal lengths are seeded from the default throw ratio.

use glam::{DVec2, DVec3};
use opencv::calib3d;
use opencv::core::{self, Mat, Point2f, Point3f, Size, TermCriteria, Vector};
use opencv::prelude::*;

use super::model::{rms_reprojection_error, CameraMatrix, Pose, SolveOutput};
use crate::error::{Result, TouchError};

const CALIBRATION_FLAGS: i32 = calib3d::CALIB_USE_INTRINSIC_GUESS
    | calib3d::CALIB_ZERO_TANGENT_DIST
    | calib3d::CALIB_FIX_K1
    | calib3d::CALIB_FIX_K2
    | calib3d::CALIB_FIX_K3
    | calib3d::CALIB_FIX_K4
    | calib3d::CALIB_FIX_K5
    | calib3d::CALIB_FIX_K6;

pub fn calibrate_single_view(world: &[DVec3], image: &[DVec2], width: u32, height: u32) -> Result<SolveOutput> {
    let guess = CameraMatrix::default_guess(width, height);

    let mut object_points = Vector::<Vector<Point3f>>::new();
    object_points.push(to_object_points(world));
    let mut image_points = Vector::<Vector<Point2f>>::new();
    image_points.push(to_image_points(image));

    let mut camera_matrix = Mat::from_slice_2d(&guess.to_rows())?;
    let mut dist_coeffs = Mat::zeros(5, 1, core::CV_64F)?.to_mat()?;
    let mut rvecs = Vector::<Mat>::new();
    let mut tvecs = Vector::<Mat>::new();

    let criteria = TermCriteria::new(
        core::TermCriteria_Type::COUNT as i32 | core::TermCriteria_Type::EPS as i32,
        30,
        f64::EPSILON,
    )?;

    let rms = calib3d::calibrate_camera(
        &object_points,
        &image_points,
        Size::new(width as i32, height as i32),
        &mut camera_matrix,
        &mut dist_coeffs,
        &mut rvecs,
        &mut tvecs,
        CALIBRATION_FLAGS,
        criteria,
    )?;
    log::debug!("calibrateCamera reported rms {:.4}", rms);

    let camera = read_camera_matrix(&camera_matrix)?;
    let pose = read_pose(&rvecs.get(0)?, &tvecs.get(0)?)?;
    finish(camera, pose, world, image)
}

pub fn solve_pose(world: &[DVec3], image: &[DVec2], camera: &CameraMatrix) -> Result<SolveOutput> {
    let camera_matrix = Mat::from_slice_2d(&camera.to_rows())?;
    let dist_coeffs = Mat::zeros(5, 1, core::CV_64F)?.to_mat()?;
    let mut rvec = Mat::default();
    let mut tvec = Mat::default();

    let solved = calib3d::solve_pnp(
        &to_object_points(world),
        &to_image_points(image),
        &camera_matrix,
        &dist_coeffs,
        &mut rvec,
        &mut tvec,
        false,
        calib3d::SOLVEPNP_ITERATIVE,
    )?;
    if !solved {
        return Err(TouchError::DegenerateGeometry("solvePnP found no pose".to_string()));
    }

    let pose = read_pose(&rvec, &tvec)?;
    finish(*camera, pose, world, image)
}

fn finish(camera: CameraMatrix, pose: Pose, world: &[DVec3], image: &[DVec2]) -> Result<SolveOutput> {
    Ok(SolveOutput {
        camera,
        pose,
        distortion: [0.0; 5],
        rms_error: rms_reprojection_error(&camera, &pose, world, image),
    })
}

fn to_object_points(world: &[DVec3]) -> Vector<Point3f> {
    world
        .iter()
        .map(|p| Point3f::new(p.x as f32, p.y as f32, p.z as f32))
        .collect()
}

fn to_image_points(image: &[DVec2]) -> Vector<Point2f> {
    image.iter().map(|p| Point2f::new(p.x as f32, p.y as f32)).collect()
}

fn read_camera_matrix(m: &Mat) -> Result<CameraMatrix> {
    let mut rows = [[0.0; 3]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = *m.at_2d::<f64>(r as i32, c as i32)?;
        }
    }
    Ok(CameraMatrix::from_rows(rows))
}

fn read_pose(rvec: &Mat, tvec: &Mat) -> Result<Pose> {
    let r = DVec3::new(*rvec.at::<f64>(0)?, *rvec.at::<f64>(1)?, *rvec.at::<f64>(2)?);
    let t = DVec3::new(*tvec.at::<f64>(0)?, *tvec.at::<f64>(1)?, *tvec.at::<f64>(2)?);
    Ok(Pose::from_rotation_vector(r, t))
}
