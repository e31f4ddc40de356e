//! Configuration and serialization module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::workspace::DepthAxis;

/// Zone height range exposed by the control panel.
pub const ZONE_HEIGHT_RANGE: (f64, f64) = (1.0, 500.0);
/// Depth offset range exposed by the control panel.
pub const Z_OFFSET_RANGE: (f64, f64) = (-50.0, 50.0);

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Projector resolution width used for calibration.
    pub projector_width: u32,
    /// Projector resolution height used for calibration.
    pub projector_height: u32,
    /// Exchange Y and Z of world points handed to the calibration engine.
    pub swap_yz: bool,
    /// Sensor axis the interaction zone's depth offset moves along.
    pub depth_axis: DepthAxis,
    /// Interaction zone height above the workspace plane.
    pub zone_height: f64,
    /// Depth offset applied to the whole interaction zone.
    pub z_offset: f64,
    /// Correspondences collected before the authoring flow completes.
    pub capture_target: usize,
    /// Display-space correspondence file (`x, y` per line).
    pub image_points_path: PathBuf,
    /// World-space correspondence file (`x, y, z` per line).
    pub world_points_path: PathBuf,
    /// Minimum spacing between convex hull vertices when picking a fingertip.
    pub fingertip_spacing: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            projector_width: 1024,
            projector_height: 768,
            swap_yz: false,
            depth_axis: DepthAxis::Z,
            zone_height: 50.0,
            z_offset: 0.0,
            capture_target: 40,
            image_points_path: PathBuf::from("imagePts.txt"),
            world_points_path: PathBuf::from("worldPts.txt"),
            fingertip_spacing: 15.0,
        }
    }
}

impl SurfaceConfig {
    /// Load a configuration. JSON when the extension is `.json`, XML otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        let mut config: Self = if is_json(path) {
            serde_json::from_str(&contents)?
        } else {
            quick_xml::de::from_str(&contents)?
        };
        config.clamp_parameters();
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save the configuration in the format implied by the extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            quick_xml::se::to_string(self)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default location: `<config dir>/surface-touch/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("surface-touch").join("config.json"))
    }

    /// Clamp zone height and offset into their control ranges.
    pub fn clamp_parameters(&mut self) {
        self.zone_height = clamp_zone_height(self.zone_height);
        self.z_offset = clamp_z_offset(self.z_offset);
        self.capture_target = self.capture_target.max(crate::calibration::MIN_CORRESPONDENCES);
    }
}

pub fn clamp_zone_height(height: f64) -> f64 {
    height.clamp(ZONE_HEIGHT_RANGE.0, ZONE_HEIGHT_RANGE.1)
}

pub fn clamp_z_offset(offset: f64) -> f64 {
    offset.clamp(Z_OFFSET_RANGE.0, Z_OFFSET_RANGE.1)
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SurfaceConfig::default();
        assert_eq!(config.projector_width, 1024);
        assert_eq!(config.projector_height, 768);
        assert_eq!(config.capture_target, 40);
        assert!(!config.swap_yz);
        assert_eq!(config.depth_axis, DepthAxis::Z);
        assert!((config.zone_height - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_parameter_clamping() {
        let mut config = SurfaceConfig {
            zone_height: 900.0,
            z_offset: -75.0,
            capture_target: 2,
            ..SurfaceConfig::default()
        };
        config.clamp_parameters();
        assert_eq!(config.zone_height, 500.0);
        assert_eq!(config.z_offset, -50.0);
        assert_eq!(config.capture_target, 4);

        assert_eq!(clamp_zone_height(0.0), 1.0);
        assert_eq!(clamp_z_offset(12.5), 12.5);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SurfaceConfig =
            serde_json::from_str(r#"{ "swap_yz": true, "depth_axis": "y", "zone_height": 80.0 }"#).unwrap();
        assert!(config.swap_yz);
        assert_eq!(config.depth_axis, DepthAxis::Y);
        assert_eq!(config.zone_height, 80.0);
        assert_eq!(config.projector_width, 1024);
    }

    #[test]
    fn test_save_and_load_json() {
        let path = std::env::temp_dir().join(format!(
            "surface-touch-config-{}.json",
            std::process::id()
        ));
        let config = SurfaceConfig {
            z_offset: 12.0,
            ..SurfaceConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = SurfaceConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
