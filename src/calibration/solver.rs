//! Native single-view projector calibration.
//!
//! A linear initialisation (DLT pose for six or more points, planar
//! homography decomposition for four or more) is refined with
//! Levenberg-Marquardt on the pixel reprojection error. Lens distortion is
//! held at zero throughout.

use glam::{DMat3, DVec2, DVec3};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Matrix3, Vector3};

use super::model::{rms_reprojection_error, CameraMatrix, Pose, SolveOutput};
use crate::error::{Result, TouchError};

const MAX_ITERATIONS: usize = 100;

/// Jointly refine focal lengths, principal point and pose from one view,
/// starting from the default intrinsic guess for `width` x `height`.
pub fn calibrate_single_view(world: &[DVec3], image: &[DVec2], width: u32, height: u32) -> Result<SolveOutput> {
    let guess = CameraMatrix::default_guess(width, height);
    let initial = initial_pose(world, image, &guess)?;

    let mut start = vec![guess.fx, guess.fy, guess.px, guess.py];
    start.extend_from_slice(&pose_to_params(&initial));

    let params = refine(DVector::from_vec(start), |p| {
        let camera = CameraMatrix::new(p[0], p[1], p[2], p[3]);
        residuals(&camera, &params_to_pose(&p.as_slice()[4..]), world, image)
    });

    let camera = CameraMatrix::new(params[0], params[1], params[2], params[3]);
    let pose = params_to_pose(&params.as_slice()[4..]);
    finish(camera, pose, world, image)
}

/// Refine only the pose for known intrinsics.
pub fn solve_pose(world: &[DVec3], image: &[DVec2], camera: &CameraMatrix) -> Result<SolveOutput> {
    let initial = initial_pose(world, image, camera)?;

    let params = refine(DVector::from_vec(pose_to_params(&initial).to_vec()), |p| {
        residuals(camera, &params_to_pose(p.as_slice()), world, image)
    });

    finish(*camera, params_to_pose(params.as_slice()), world, image)
}

fn finish(camera: CameraMatrix, pose: Pose, world: &[DVec3], image: &[DVec2]) -> Result<SolveOutput> {
    let rms_error = rms_reprojection_error(&camera, &pose, world, image);
    let finite = [camera.fx, camera.fy, camera.px, camera.py].iter().all(|v| v.is_finite())
        && pose.rotation.is_finite()
        && pose.translation.is_finite()
        && rms_error.is_finite();
    if !finite {
        return Err(TouchError::DegenerateGeometry("solver diverged".to_string()));
    }
    Ok(SolveOutput {
        camera,
        pose,
        distortion: [0.0; 5],
        rms_error,
    })
}

/// Pick the better of the available linear pose estimates.
fn initial_pose(world: &[DVec3], image: &[DVec2], camera: &CameraMatrix) -> Result<Pose> {
    let mut candidates = Vec::with_capacity(2);
    if world.len() >= 6 {
        candidates.extend(dlt_pose(world, image, camera));
    }
    candidates.extend(planar_pose(world, image, camera));

    candidates
        .into_iter()
        .map(|pose| (rms_reprojection_error(camera, &pose, world, image), pose))
        .filter(|(err, _)| err.is_finite())
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(err, pose)| {
            log::debug!("initial pose reprojection error {:.3}px", err);
            pose
        })
        .ok_or_else(|| TouchError::DegenerateGeometry("no initial pose could be estimated".to_string()))
}

/// Direct linear transform for [R|t] in normalised image coordinates.
fn dlt_pose(world: &[DVec3], image: &[DVec2], camera: &CameraMatrix) -> Option<Pose> {
    let (centroid, scale) = normalization_3d(world)?;
    let n = world.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 12);

    for (i, (w, px)) in world.iter().zip(image).enumerate() {
        let p = (*w - centroid) * scale;
        let x = camera.normalize(*px);
        let (r0, r1) = (2 * i, 2 * i + 1);

        a[(r0, 0)] = p.x;
        a[(r0, 1)] = p.y;
        a[(r0, 2)] = p.z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -x.x * p.x;
        a[(r0, 9)] = -x.x * p.y;
        a[(r0, 10)] = -x.x * p.z;
        a[(r0, 11)] = -x.x;

        a[(r1, 4)] = p.x;
        a[(r1, 5)] = p.y;
        a[(r1, 6)] = p.z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -x.y * p.x;
        a[(r1, 9)] = -x.y * p.y;
        a[(r1, 10)] = -x.y * p.z;
        a[(r1, 11)] = -x.y;
    }

    let p = null_vector(&a)?;
    let m = Matrix3::new(p[0], p[1], p[2], p[4], p[5], p[6], p[8], p[9], p[10]);
    let mut t = Vector3::new(p[3], p[7], p[11]);

    let svd = m.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let s = svd.singular_values.sum() / 3.0;
    if s.abs() < 1e-12 {
        return None;
    }

    let mut r = u * v_t;
    t /= s;
    if r.determinant() < 0.0 {
        r = -r;
        t = -t;
    }

    // Undo the world normalisation.
    let rotation = from_na(&r);
    let translation = DVec3::new(t.x, t.y, t.z) / scale - rotation * centroid;
    Some(Pose::new(rotation, translation))
}

/// Pose from the homography between the best-fit plane of the world
/// points and their normalised image coordinates. Exact for coplanar input.
fn planar_pose(world: &[DVec3], image: &[DVec2], camera: &CameraMatrix) -> Option<Pose> {
    if world.len() < 4 {
        return None;
    }
    let centroid = world.iter().copied().sum::<DVec3>() / world.len() as f64;

    let mut covariance = Matrix3::<f64>::zeros();
    for w in world {
        let d = to_na_vec(*w - centroid);
        covariance += d * d.transpose();
    }
    let eigen = covariance.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let e1: Vector3<f64> = eigen.eigenvectors.column(order[0]).into_owned();
    let normal: Vector3<f64> = eigen.eigenvectors.column(order[2]).into_owned();
    let e2 = normal.cross(&e1);
    let basis = Matrix3::from_rows(&[e1.transpose(), e2.transpose(), normal.transpose()]);

    let plane: Vec<DVec2> = world
        .iter()
        .map(|w| {
            let local = basis * to_na_vec(*w - centroid);
            DVec2::new(local.x, local.y)
        })
        .collect();
    let normalized: Vec<DVec2> = image.iter().map(|p| camera.normalize(*p)).collect();

    let h = homography(&plane, &normalized)?;
    let h1: Vector3<f64> = h.column(0).into_owned();
    let h2: Vector3<f64> = h.column(1).into_owned();
    let h3: Vector3<f64> = h.column(2).into_owned();

    let norm = h1.norm() + h2.norm();
    if norm < 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / norm;
    // The plane centroid has to sit in front of the projector.
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let t = h3 * lambda;
    let approx = Matrix3::from_columns(&[r1, r2, r1.cross(&r2)]);

    let svd = approx.svd(true, true);
    let (mut u, v_t) = (svd.u?, svd.v_t?);
    if (u * v_t).determinant() < 0.0 {
        let flipped = -u.column(2);
        u.set_column(2, &flipped);
    }
    let r = u * v_t;

    let r_world = r * basis;
    let t_world = t - r_world * to_na_vec(centroid);
    Some(Pose::new(from_na(&r_world), DVec3::new(t_world.x, t_world.y, t_world.z)))
}

/// Normalised DLT homography mapping `src` onto `dst`.
fn homography(src: &[DVec2], dst: &[DVec2]) -> Option<Matrix3<f64>> {
    let (src_n, t_src) = normalization_2d(src)?;
    let (dst_n, t_dst) = normalization_2d(dst)?;

    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let (r0, r1) = (2 * i, 2 * i + 1);
        a[(r0, 0)] = s.x;
        a[(r0, 1)] = s.y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -d.x * s.x;
        a[(r0, 7)] = -d.x * s.y;
        a[(r0, 8)] = -d.x;

        a[(r1, 3)] = s.x;
        a[(r1, 4)] = s.y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -d.y * s.x;
        a[(r1, 7)] = -d.y * s.y;
        a[(r1, 8)] = -d.y;
    }

    let h = null_vector(&a)?;
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    Some(t_dst.try_inverse()? * hn * t_src)
}

/// Right singular vector of the smallest singular value. Under-determined
/// systems are zero-padded so the full V is available.
fn null_vector(a: &DMatrix<f64>) -> Option<DVector<f64>> {
    let cols = a.ncols();
    let padded = if a.nrows() < cols {
        let mut m = DMatrix::<f64>::zeros(cols, cols);
        m.rows_mut(0, a.nrows()).copy_from(a);
        m
    } else {
        a.clone()
    };

    let svd = padded.svd(false, true);
    let v_t = svd.v_t?;
    let (idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    Some(v_t.row(idx).transpose())
}

/// Hartley normalisation: centroid to origin, mean distance sqrt(2).
fn normalization_2d(points: &[DVec2]) -> Option<(Vec<DVec2>, Matrix3<f64>)> {
    let centroid = points.iter().copied().sum::<DVec2>() / points.len() as f64;
    let mean_dist = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / points.len() as f64;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * centroid.x, 0.0, s, -s * centroid.y, 0.0, 0.0, 1.0);
    Some((points.iter().map(|p| (*p - centroid) * s).collect(), t))
}

fn normalization_3d(points: &[DVec3]) -> Option<(DVec3, f64)> {
    let centroid = points.iter().copied().sum::<DVec3>() / points.len() as f64;
    let mean_dist = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / points.len() as f64;
    if mean_dist < 1e-12 {
        return None;
    }
    Some((centroid, 3f64.sqrt() / mean_dist))
}

fn residuals(camera: &CameraMatrix, pose: &Pose, world: &[DVec3], image: &[DVec2]) -> DVector<f64> {
    let mut r = DVector::<f64>::zeros(2 * world.len());
    for (i, (w, observed)) in world.iter().zip(image).enumerate() {
        let predicted = camera.project(pose, *w);
        r[2 * i] = predicted.x - observed.x;
        r[2 * i + 1] = predicted.y - observed.y;
    }
    r
}

/// Residual closure over a parameter vector, minimised by
/// `levenberg_marquardt::LevenbergMarquardt`.
struct ReprojectionProblem<F> {
    params: DVector<f64>,
    residual_fn: F,
}

impl<F> LeastSquaresProblem<f64, Dyn, Dyn> for ReprojectionProblem<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some((self.residual_fn)(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let base = (self.residual_fn)(&self.params);
        Some(numeric_jacobian(&self.params, &base, &self.residual_fn))
    }
}

/// Minimise `residual_fn` from `start`. The start is returned unchanged when
/// the optimiser ends on a worse or non-finite cost.
fn refine<F>(start: DVector<f64>, residual_fn: F) -> DVector<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let start_cost = residual_fn(&start).norm_squared();
    let problem = ReprojectionProblem {
        params: start.clone(),
        residual_fn,
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(MAX_ITERATIONS)
        .minimize(problem);

    log::debug!(
        "reprojection refinement: {:?} after {} evaluations, cost {:.3e}",
        report.termination,
        report.number_of_evaluations,
        report.objective_function
    );

    let cost = (problem.residual_fn)(&problem.params).norm_squared();
    if cost.is_finite() && cost <= start_cost {
        problem.params
    } else {
        start
    }
}

fn numeric_jacobian<F>(params: &DVector<f64>, base: &DVector<f64>, residual_fn: &F) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let mut jacobian = DMatrix::<f64>::zeros(base.len(), params.len());
    for k in 0..params.len() {
        let step = 1e-6 * params[k].abs().max(1.0);
        let mut perturbed = params.clone();
        perturbed[k] += step;
        let shifted = residual_fn(&perturbed);
        for r in 0..base.len() {
            jacobian[(r, k)] = (shifted[r] - base[r]) / step;
        }
    }
    jacobian
}

fn pose_to_params(pose: &Pose) -> [f64; 6] {
    let r = pose.rotation_vector();
    let t = pose.translation;
    [r.x, r.y, r.z, t.x, t.y, t.z]
}

fn params_to_pose(p: &[f64]) -> Pose {
    Pose::from_rotation_vector(DVec3::new(p[0], p[1], p[2]), DVec3::new(p[3], p[4], p[5]))
}

fn to_na_vec(v: DVec3) -> Vector3<f64> {
    Vector3::new(v.x, v.y, v.z)
}

fn from_na(m: &Matrix3<f64>) -> DMat3 {
    DMat3::from_cols_slice(m.as_slice())
}
