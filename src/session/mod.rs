//! Frame-loop state for an interactive surface.
//!
//! `TouchSession` owns the calibration engine, the correspondence capture,
//! the workspace volume and the touch classifier. The driver calls
//! `process_frame` once per sensor frame and the setters when controls change.

use glam::{DVec2, DVec3};
use std::path::Path;

use crate::calibration::{
    save_correspondence_files, CalibrationEngine, CalibrationModel, CameraMatrix, CaptureProgress,
    CorrespondenceCapture,
};
use crate::config::{clamp_z_offset, clamp_zone_height, SurfaceConfig};
use crate::error::{Result, TouchError};
use crate::touch::{find_fingertip, Blob, TouchClassifier, TouchFrame};
use crate::workspace::WorkspaceVolume;

/// Depth sensor lookups the session needs.
pub trait DepthSensor {
    /// World position seen at sensor pixel `(x, y)`, or `None` without a reading.
    fn world_coordinate_at(&self, x: f64, y: f64) -> Option<DVec3>;
}

/// The tracked fingertip of the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fingertip {
    pub pixel: DVec2,
    pub world: Option<DVec3>,
}

pub struct TouchSession {
    config: SurfaceConfig,
    engine: CalibrationEngine,
    capture: CorrespondenceCapture,
    volume: WorkspaceVolume,
    classifier: TouchClassifier,
    touches: TouchFrame,
    fingertip: Option<Fingertip>,
}

impl TouchSession {
    pub fn new(mut config: SurfaceConfig) -> Self {
        config.clamp_parameters();
        let engine = CalibrationEngine::new(config.projector_width, config.projector_height)
            .with_swap_yz(config.swap_yz);
        let capture = CorrespondenceCapture::new(config.capture_target);
        let volume = WorkspaceVolume::new(config.zone_height, config.z_offset)
            .with_depth_axis(config.depth_axis);

        Self {
            config,
            engine,
            capture,
            volume,
            classifier: TouchClassifier::new(),
            touches: TouchFrame::default(),
            fingertip: None,
        }
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CalibrationEngine {
        &mut self.engine
    }

    pub fn capture(&self) -> &CorrespondenceCapture {
        &self.capture
    }

    pub fn volume(&self) -> &WorkspaceVolume {
        &self.volume
    }

    pub fn classifier(&self) -> &TouchClassifier {
        &self.classifier
    }

    /// Load the configured display/world correspondence files.
    pub fn load_correspondence_files(&mut self) -> Result<usize> {
        let count = self
            .engine
            .load_points(&self.config.image_points_path, &self.config.world_points_path)?;
        log::info!("Loaded {} calibration points", count);
        Ok(count)
    }

    pub fn load_finger_tip_points(&mut self, path: &Path) -> Result<usize> {
        self.engine.load_finger_tip_points(path)
    }

    /// Solve intrinsics and pose from the current correspondences.
    pub fn calibrate(&mut self) -> Result<&CalibrationModel> {
        self.engine.correct_camera()
    }

    /// Solve the pose for known intrinsics.
    pub fn calibrate_with_intrinsics(&mut self, camera: &CameraMatrix) -> Result<&CalibrationModel> {
        self.engine.correct_camera_pnp(camera)
    }

    /// Whether calibration points have been captured or loaded.
    pub fn points_ready(&self) -> bool {
        !self.engine.correspondences().is_empty()
    }

    /// Update the fingertip from the first blob and classify every blob
    /// against the workspace. Touch results never carry over between frames.
    pub fn process_frame(&mut self, blobs: &[Blob], sensor: &dyn DepthSensor) -> &TouchFrame {
        self.fingertip = blobs
            .first()
            .and_then(|blob| find_fingertip(&blob.outline, self.config.fingertip_spacing))
            .map(|pixel| Fingertip {
                pixel,
                world: sensor.world_coordinate_at(pixel.x, pixel.y),
            });

        self.touches = if self.volume.is_defined() {
            self.classifier.classify_blobs(blobs)
        } else {
            TouchFrame::default()
        };
        &self.touches
    }

    pub fn touches(&self) -> &TouchFrame {
        &self.touches
    }

    pub fn fingertip(&self) -> Option<Fingertip> {
        self.fingertip
    }

    /// Pair `display` with the tracked fingertip's world point. When the
    /// capture target is reached the set is saved to the configured files
    /// and handed to the engine. A failed save keeps the captured pairs.
    pub fn capture_correspondence(&mut self, display: DVec2) -> Result<CaptureProgress> {
        let world = self
            .fingertip
            .and_then(|tip| tip.world)
            .ok_or(TouchError::NoFingertip)?;

        let progress = self.capture.record(display, world);
        if progress == CaptureProgress::Complete {
            save_correspondence_files(
                self.capture.points(),
                &self.config.image_points_path,
                &self.config.world_points_path,
            )?;
            self.engine.set_correspondences(self.capture.take());
        }
        Ok(progress)
    }

    /// Add a workspace corner picked at sensor pixel `pixel`. Returns whether
    /// the workspace is now defined.
    pub fn add_workspace_point(&mut self, pixel: DVec2, sensor: &dyn DepthSensor) -> Result<bool> {
        if !self.points_ready() {
            log::warn!("workspace points need calibration points first");
            return Err(TouchError::WorkspaceNotReady);
        }
        if self.volume.is_defined() {
            return Ok(true);
        }
        let world = sensor
            .world_coordinate_at(pixel.x, pixel.y)
            .ok_or(TouchError::NoDepth { x: pixel.x, y: pixel.y })?;

        let defined = self.volume.add_point(world, pixel)?;
        if defined {
            self.classifier.set_polygon(self.volume.quad().display());
        }
        Ok(defined)
    }

    pub fn clear_workspace(&mut self) {
        self.volume.clear();
        self.classifier.clear();
        self.touches = TouchFrame::default();
    }

    pub fn set_zone_height(&mut self, height: f64) {
        let height = clamp_zone_height(height);
        self.config.zone_height = height;
        self.volume.set_zone_height(height);
    }

    pub fn set_z_offset(&mut self, offset: f64) {
        let offset = clamp_z_offset(offset);
        self.config.z_offset = offset;
        self.volume.set_z_offset(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::load_correspondence_files;

    /// A flat surface 1000 units away, one world unit per pixel.
    struct FlatSensor;

    impl DepthSensor for FlatSensor {
        fn world_coordinate_at(&self, x: f64, y: f64) -> Option<DVec3> {
            ((0.0..640.0).contains(&x) && (0.0..480.0).contains(&y)).then(|| DVec3::new(x, y, 1000.0))
        }
    }

    fn square_blob(origin: DVec2, size: f64) -> Blob {
        let outline = vec![
            origin,
            origin + DVec2::new(size, 0.0),
            origin + DVec2::new(size, size),
            origin + DVec2::new(0.0, size),
        ];
        Blob::new(origin + DVec2::splat(size / 2.0), outline)
    }

    fn temp_config(tag: &str) -> SurfaceConfig {
        let dir = std::env::temp_dir();
        let id = std::process::id();
        SurfaceConfig {
            capture_target: 4,
            image_points_path: dir.join(format!("surface-touch-{tag}-{id}-image.txt")),
            world_points_path: dir.join(format!("surface-touch-{tag}-{id}-world.txt")),
            ..SurfaceConfig::default()
        }
    }

    fn remove_files(config: &SurfaceConfig) {
        std::fs::remove_file(&config.image_points_path).ok();
        std::fs::remove_file(&config.world_points_path).ok();
    }

    #[test]
    fn test_fingertip_tracking() {
        let mut session = TouchSession::new(SurfaceConfig::default());
        session.process_frame(&[square_blob(DVec2::new(100.0, 100.0), 100.0)], &FlatSensor);

        let tip = session.fingertip().unwrap();
        assert_eq!(tip.pixel, DVec2::new(200.0, 200.0));
        assert_eq!(tip.world, Some(DVec3::new(200.0, 200.0, 1000.0)));

        session.process_frame(&[], &FlatSensor);
        assert!(session.fingertip().is_none());
    }

    #[test]
    fn test_capture_requires_fingertip() {
        let mut session = TouchSession::new(temp_config("nofinger"));
        assert!(matches!(
            session.capture_correspondence(DVec2::new(10.0, 10.0)),
            Err(TouchError::NoFingertip)
        ));
    }

    #[test]
    fn test_capture_saves_and_loads() {
        let config = temp_config("capture");
        let mut session = TouchSession::new(config.clone());

        for i in 0..4 {
            let offset = 20.0 * i as f64;
            session.process_frame(&[square_blob(DVec2::new(100.0 + offset, 100.0), 100.0)], &FlatSensor);
            let progress = session
                .capture_correspondence(DVec2::new(50.0 + offset, 60.0 + offset))
                .unwrap();
            if i < 3 {
                assert_eq!(progress, CaptureProgress::Collecting { count: i + 1, target: 4 });
            } else {
                assert_eq!(progress, CaptureProgress::Complete);
            }
        }

        assert!(session.points_ready());
        assert_eq!(session.engine().correspondences().len(), 4);
        assert_eq!(session.capture().count(), 0);

        let saved = load_correspondence_files(&config.image_points_path, &config.world_points_path).unwrap();
        remove_files(&config);
        assert_eq!(&saved, session.engine().correspondences());
        assert_eq!(saved.world()[3], DVec3::new(260.0, 200.0, 1000.0));
    }

    #[test]
    fn test_failed_save_keeps_captured_pairs() {
        let missing = std::env::temp_dir().join(format!("surface-touch-missing-{}", std::process::id()));
        let config = SurfaceConfig {
            capture_target: 4,
            image_points_path: missing.join("image.txt"),
            world_points_path: missing.join("world.txt"),
            ..SurfaceConfig::default()
        };
        let mut session = TouchSession::new(config);
        session.process_frame(&[square_blob(DVec2::new(100.0, 100.0), 100.0)], &FlatSensor);

        for i in 0..3 {
            session.capture_correspondence(DVec2::new(50.0 + i as f64, 60.0)).unwrap();
        }
        assert!(matches!(
            session.capture_correspondence(DVec2::new(80.0, 60.0)),
            Err(TouchError::Io(_))
        ));
        assert_eq!(session.capture().count(), 4);
        assert!(session.capture().is_complete());
        assert!(!session.points_ready());
    }

    #[test]
    fn test_swap_yz_applies_to_loaded_files() {
        let config = SurfaceConfig {
            swap_yz: true,
            ..temp_config("swap")
        };
        std::fs::write(&config.image_points_path, "10, 20\n").unwrap();
        std::fs::write(&config.world_points_path, "1, 2, 3\n").unwrap();

        let mut session = TouchSession::new(config.clone());
        assert_eq!(session.load_correspondence_files().unwrap(), 1);
        remove_files(&config);
        assert_eq!(session.engine().correspondences().world(), &[DVec3::new(1.0, 3.0, 2.0)]);
        // The zone's depth axis is configured separately.
        assert_eq!(session.volume().zone().depth_axis(), crate::workspace::DepthAxis::Z);
    }

    #[test]
    fn test_workspace_flow() {
        let config = temp_config("workspace");
        let mut session = TouchSession::new(config.clone());

        assert!(matches!(
            session.add_workspace_point(DVec2::new(10.0, 10.0), &FlatSensor),
            Err(TouchError::WorkspaceNotReady)
        ));

        let image = "100, 100\n500, 100\n500, 400\n100, 400\n";
        let world = "0, 0, 1000\n400, 0, 1000\n400, 300, 1000\n0, 300, 1000\n";
        std::fs::write(&config.image_points_path, image).unwrap();
        std::fs::write(&config.world_points_path, world).unwrap();
        assert_eq!(session.load_correspondence_files().unwrap(), 4);
        remove_files(&config);

        assert!(matches!(
            session.add_workspace_point(DVec2::new(700.0, 10.0), &FlatSensor),
            Err(TouchError::NoDepth { .. })
        ));

        let corners = [(100.0, 100.0), (300.0, 100.0), (300.0, 300.0), (100.0, 300.0)];
        for (i, (x, y)) in corners.iter().enumerate() {
            let defined = session.add_workspace_point(DVec2::new(*x, *y), &FlatSensor).unwrap();
            assert_eq!(defined, i == 3);
        }
        assert!(session.volume().is_defined());
        assert_eq!(session.classifier().polygon().len(), 4);

        let blobs = [
            square_blob(DVec2::new(150.0, 150.0), 20.0),
            square_blob(DVec2::new(400.0, 50.0), 20.0),
            square_blob(DVec2::new(200.0, 250.0), 20.0),
        ];
        assert_eq!(session.process_frame(&blobs, &FlatSensor).indices, vec![0, 2]);

        session.clear_workspace();
        assert!(!session.volume().is_defined());
        assert!(!session.process_frame(&blobs, &FlatSensor).has_touch());
    }

    #[test]
    fn test_control_setters_clamp() {
        let mut session = TouchSession::new(SurfaceConfig::default());
        session.set_zone_height(900.0);
        session.set_z_offset(-80.0);
        assert_eq!(session.config().zone_height, 500.0);
        assert_eq!(session.config().z_offset, -50.0);
        assert_eq!(session.volume().zone().zone_height(), 500.0);
        assert_eq!(session.volume().zone().z_offset(), -50.0);
    }
}
