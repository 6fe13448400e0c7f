//! Thermal zone sensor
//!
//! Reads the kernel's thermal zone file, which holds the temperature in
//! milli-degrees Celsius as a decimal integer followed by a newline.

use crate::domain::error::SensorError;
use crate::domain::ports::SensorSource;
use std::fs;
use std::path::PathBuf;

pub struct ThermalZoneSensor {
    path: PathBuf,
}

impl ThermalZoneSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SensorSource for ThermalZoneSensor {
    fn read_milli(&self) -> Result<i32, SensorError> {
        let raw = fs::read_to_string(&self.path)?;
        raw.trim()
            .parse()
            .map_err(|_| SensorError::Parse(raw.trim().to_string()))
    }
}
