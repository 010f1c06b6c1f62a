//! Collector configuration, loaded from a JSON file. A missing file is
//! not an error; defaults are used and a warning logged.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use adxl355::{Odr, Range};
use log::warn;
use serde::Deserialize;

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Full-scale range selector as it appears in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RangeSetting {
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "4g")]
    G4,
    #[serde(rename = "8g")]
    G8,
}

impl From<RangeSetting> for Range {
    fn from(s: RangeSetting) -> Range {
        match s {
            RangeSetting::G2 => Range::G2,
            RangeSetting::G4 => Range::G4,
            RangeSetting::G8 => Range::G8,
        }
    }
}

/// Output-data-rate selector, named by the ODR in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OdrSetting {
    #[serde(rename = "4000")]
    Hz4000,
    #[serde(rename = "2000")]
    Hz2000,
    #[serde(rename = "1000")]
    Hz1000,
    #[serde(rename = "500")]
    Hz500,
    #[serde(rename = "250")]
    Hz250,
    #[serde(rename = "125")]
    Hz125,
    #[serde(rename = "62.5")]
    Hz62_5,
    #[serde(rename = "31.25")]
    Hz31_25,
    #[serde(rename = "15.625")]
    Hz15_625,
    #[serde(rename = "7.813")]
    Hz7_813,
    #[serde(rename = "3.906")]
    Hz3_906,
}

impl From<OdrSetting> for Odr {
    fn from(s: OdrSetting) -> Odr {
        match s {
            OdrSetting::Hz4000 => Odr::Hz4000,
            OdrSetting::Hz2000 => Odr::Hz2000,
            OdrSetting::Hz1000 => Odr::Hz1000,
            OdrSetting::Hz500 => Odr::Hz500,
            OdrSetting::Hz250 => Odr::Hz250,
            OdrSetting::Hz125 => Odr::Hz125,
            OdrSetting::Hz62_5 => Odr::Hz62_5,
            OdrSetting::Hz31_25 => Odr::Hz31_25,
            OdrSetting::Hz15_625 => Odr::Hz15_625,
            OdrSetting::Hz7_813 => Odr::Hz7_813,
            OdrSetting::Hz3_906 => Odr::Hz3_906,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// I2C character device the sensor hangs off.
    pub i2c_bus: String,
    /// 7-bit bus address: 0x1D with ASEL low, 0x53 with ASEL high.
    pub device_address: u8,
    pub range: RangeSetting,
    pub lowpass: OdrSetting,

    pub sink_host: String,
    pub sink_port: u16,
    pub measurement: String,

    pub sample_interval_secs: f64,
    /// The loop gives up when this many ticks fail in a row.
    pub failure_budget: u32,
    pub write_timeout_secs: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".into(),
            device_address: adxl355::DEFAULT_ADDRESS,
            range: RangeSetting::G4,
            lowpass: OdrSetting::Hz62_5,
            sink_host: "127.0.0.1".into(),
            sink_port: 8094,
            measurement: "adxl355_measure".into(),
            sample_interval_secs: 1.0,
            failure_budget: 5,
            write_timeout_secs: 5.0,
        }
    }
}

impl CollectorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let cfg: Self = serde_json::from_str(&text).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// JSON (and the CLI override) happily carry values that a
    /// `Duration` cannot; reject them here instead of panicking later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_interval_secs.is_finite() || self.sample_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sample_interval_secs must be a positive number, got {}",
                self.sample_interval_secs
            )));
        }
        if !self.write_timeout_secs.is_finite() || self.write_timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "write_timeout_secs must be a positive number, got {}",
                self.write_timeout_secs
            )));
        }
        Ok(())
    }
}
