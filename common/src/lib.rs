//! Common types and utilities for Living Portrait.
//!
//! This crate holds the pieces shared by the playback controller
//! (`living-portrait`) and the sensor tuning tool (`pir-test`): the error
//! taxonomy and the smoothed PIR motion sensor.
//!
//! # Examples
//!
//! ```no_run
//! use common::{MotionSensor, SensorSettings};
//!
//! let sensor = common::open_pir(&SensorSettings::default())?;
//! if sensor.motion_detected() {
//!     println!("someone is there");
//! }
//! # Ok::<(), common::PortraitError>(())
//! ```

use std::path::PathBuf;
use thiserror::Error;

mod sensor;

pub use sensor::{
    DEFAULT_PIR_PIN, DEFAULT_QUEUE_LEN, DEFAULT_SAMPLE_RATE, DEFAULT_THRESHOLD, DigitalInput,
    MotionSensor, PirSensor, SampleWindow, SensorSettings, open_pir,
};

/// Error types shared between the controller and the tuning tool.
#[derive(Error, Debug)]
pub enum PortraitError {
    /// No file in the video directory matched the pattern.
    #[error("No videos matching '{pattern}' found in {}", .directory.display())]
    EmptyCatalog { directory: PathBuf, pattern: String },

    #[error("Playback engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Masking hook failed: {0}")]
    MaskingHook(String),

    #[error("Motion sensor error: {0}")]
    Sensor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Interrupted by operator")]
    Interrupted,
}

impl From<std::io::Error> for PortraitError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
