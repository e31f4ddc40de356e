//! Export module for calibration results.

use glam::DMat4;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::calibration::{CalibrationEngine, ProjectorParams};
use crate::error::Result;

/// Everything a renderer or another tool needs from a solved projector.
/// Matrices are flattened row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "calibration")]
pub struct CalibrationReport {
    pub width: u32,
    pub height: u32,
    pub point_count: usize,
    pub camera_matrix: Vec<f64>,
    pub distortion: Vec<f64>,
    pub rotation_vector: Vec<f64>,
    pub translation: Vec<f64>,
    pub params: ProjectorParams,
    pub view: Vec<f64>,
    pub projection: Vec<f64>,
    pub rms_error: f64,
}

impl CalibrationReport {
    /// Snapshot a calibrated engine. Fails when no solve has succeeded.
    pub fn from_engine(engine: &CalibrationEngine) -> Result<Self> {
        let model = engine.model()?;
        let (width, height) = engine.resolution();
        let projector = engine.projector();

        Ok(Self {
            width,
            height,
            point_count: engine.correspondences().len(),
            camera_matrix: model.camera.to_rows().iter().flatten().copied().collect(),
            distortion: model.distortion.to_vec(),
            rotation_vector: model.pose.rotation_vector().to_array().to_vec(),
            translation: model.pose.translation.to_array().to_vec(),
            params: *engine.params(),
            view: row_major(&projector.view),
            projection: row_major(&projector.projection),
            rms_error: model.rms_error,
        })
    }
}

fn row_major(m: &DMat4) -> Vec<f64> {
    m.transpose().to_cols_array().to_vec()
}

/// Export calibration data to various formats.
pub struct CalibrationExporter;

impl CalibrationExporter {
    pub fn export_xml(report: &CalibrationReport, path: &Path) -> Result<()> {
        let xml = quick_xml::se::to_string(report)?;
        std::fs::write(path, xml)?;
        log::info!("Exported calibration to {}", path.display());
        Ok(())
    }

    pub fn export_json(report: &CalibrationReport, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json)?;
        log::info!("Exported calibration to {}", path.display());
        Ok(())
    }

    /// Pick the format from the extension: `.json` or XML.
    pub fn export(report: &CalibrationReport, path: &Path) -> Result<()> {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Self::export_json(report, path)
        } else {
            Self::export_xml(report, path)
        }
    }
}

/// Load a previously exported report.
pub fn load_report(path: &Path) -> Result<CalibrationReport> {
    let contents = std::fs::read_to_string(path)?;

    if path.extension().map(|e| e == "json").unwrap_or(false) {
        Ok(serde_json::from_str(&contents)?)
    } else {
        Ok(quick_xml::de::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CameraMatrix, CorrespondenceSet};
    use crate::error::TouchError;
    use glam::{DQuat, DVec3};

    fn calibrated_engine() -> CalibrationEngine {
        let camera = CameraMatrix::new(1300.0, 1300.0, 512.0, 600.0);
        let rotation = glam::DMat3::from_quat(DQuat::from_rotation_x(0.2));
        let pose = crate::calibration::Pose::new(rotation, DVec3::new(0.0, 50.0, 1100.0));

        let mut set = CorrespondenceSet::new();
        for (x, y) in [(-200.0, -150.0), (200.0, -150.0), (200.0, 150.0), (-200.0, 150.0), (0.0, 0.0)] {
            let world = DVec3::new(x, y, 0.0);
            set.push(camera.project(&pose, world), world);
        }

        let mut engine = CalibrationEngine::new(1024, 768);
        engine.set_correspondences(set);
        engine.correct_camera_pnp(&camera).unwrap();
        engine
    }

    #[test]
    fn test_report_requires_calibration() {
        let engine = CalibrationEngine::new(1024, 768);
        assert!(matches!(CalibrationReport::from_engine(&engine), Err(TouchError::Uncalibrated)));
    }

    #[test]
    fn test_report_contents() {
        let engine = calibrated_engine();
        let report = CalibrationReport::from_engine(&engine).unwrap();

        assert_eq!(report.point_count, 5);
        assert_eq!(report.camera_matrix.len(), 9);
        assert_eq!(report.camera_matrix[0], 1300.0);
        assert_eq!(report.camera_matrix[8], 1.0);
        assert_eq!(report.distortion, vec![0.0; 5]);
        assert_eq!(report.view.len(), 16);
        // Row-major view: translation in the last column.
        assert!((report.view[11] - 1100.0).abs() < 1e-3);
        assert!(report.rms_error < 1e-6);
    }

    #[test]
    fn test_export_json_roundtrip() {
        let report = CalibrationReport::from_engine(&calibrated_engine()).unwrap();
        let path = std::env::temp_dir().join(format!("surface-touch-report-{}.json", std::process::id()));

        CalibrationExporter::export(&report, &path).unwrap();
        let loaded = load_report(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.point_count, report.point_count);
        assert_eq!(loaded.camera_matrix, report.camera_matrix);
        for (a, b) in loaded.view.iter().zip(&report.view) {
            assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
        }
        assert!((loaded.params.throw_ratio_y - report.params.throw_ratio_y).abs() < 1e-12);
    }

    #[test]
    fn test_export_xml() {
        let report = CalibrationReport::from_engine(&calibrated_engine()).unwrap();
        let xml = quick_xml::se::to_string(&report).unwrap();
        assert!(xml.starts_with("<calibration>"));
        assert!(xml.contains("<throw_ratio_x>"));
    }
}
