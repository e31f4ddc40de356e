//! Interactive Surface Touch
//!
//! Geometry core for a projector plus depth-sensor touch surface:
//! - Projector calibration from display/world point correspondences
//! - An interaction zone extruded above a four-corner workspace
//! - Per-frame touch classification of depth blobs

pub mod calibration;
pub mod config;
pub mod error;
pub mod export;
pub mod projector;
pub mod session;
pub mod touch;
pub mod workspace;

pub use error::{Result, TouchError};
