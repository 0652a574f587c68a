//! # Simulator Configuration
//!
//! Settings for one OBC session, loadable from TOML. Every key is optional.
//!
//! ```toml
//! instrument = "RATS"
//! zephyr_port = "/dev/ttyUSB0"
//! log_port = "/dev/ttyUSB1"   # omit to read debug text from the Zephyr port
//! baud_rate = 115200
//! auto_ack = true
//! auto_gps = true
//! data_directory = "./OBC_Data"
//!
//! [timeouts]
//! frame_ms = 2000
//! trailer_ms = 5000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::demux::DemuxTimeouts;
use crate::error::ConfigError;
use crate::message::KNOWN_INSTRUMENTS;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default = "default_zephyr_port")]
    pub zephyr_port: String,
    #[serde(default)]
    pub log_port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_true")]
    pub auto_ack: bool,
    #[serde(default)]
    pub auto_gps: bool,
    #[serde(default = "default_gps_interval_secs")]
    pub gps_interval_secs: u64,
    #[serde(default = "default_sza")]
    pub default_sza: f64,
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
    #[serde(default)]
    pub verify_checksums: bool,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            instrument: default_instrument(),
            zephyr_port: default_zephyr_port(),
            log_port: None,
            baud_rate: default_baud_rate(),
            auto_ack: true,
            auto_gps: false,
            gps_interval_secs: default_gps_interval_secs(),
            default_sza: default_sza(),
            data_directory: default_data_directory(),
            verify_checksums: false,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Timeouts in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Serial read timeout; bounds a single poll of a link.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// Reader pause when no link has a line.
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
    #[serde(default = "default_trailer_ms")]
    pub trailer_ms: u64,
    /// Console refresh cadence.
    #[serde(default = "default_ui_poll_ms")]
    pub ui_poll_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            idle_ms: default_idle_ms(),
            frame_ms: default_frame_ms(),
            trailer_ms: default_trailer_ms(),
            ui_poll_ms: default_ui_poll_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn ui_poll(&self) -> Duration {
        Duration::from_millis(self.ui_poll_ms)
    }

    pub fn demux(&self) -> DemuxTimeouts {
        DemuxTimeouts {
            frame: Duration::from_millis(self.frame_ms),
            trailer: Duration::from_millis(self.trailer_ms),
            idle: Duration::from_millis(self.idle_ms),
        }
    }
}

impl SimulatorConfig {
    /// Separate log port, or `None` when debug text shares the Zephyr link.
    pub fn separate_log_port(&self) -> Option<&str> {
        self.log_port
            .as_deref()
            .filter(|port| !port.is_empty() && *port != self.zephyr_port)
    }

    pub fn gps_interval(&self) -> Duration {
        Duration::from_secs(self.gps_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.trim().is_empty() {
            return Err(ConfigError::Invalid("instrument must not be empty".into()));
        }
        if self.zephyr_port.trim().is_empty() {
            return Err(ConfigError::Invalid("zephyr_port must not be empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.auto_gps && self.gps_interval_secs == 0 {
            return Err(ConfigError::Invalid("gps_interval_secs must be positive".into()));
        }
        if !(0.0..=180.0).contains(&self.default_sza) {
            return Err(ConfigError::Invalid(format!(
                "default_sza {} is outside 0..=180",
                self.default_sza
            )));
        }
        let t = &self.timeouts;
        for (name, value) in [
            ("poll_ms", t.poll_ms),
            ("idle_ms", t.idle_ms),
            ("frame_ms", t.frame_ms),
            ("trailer_ms", t.trailer_ms),
            ("ui_poll_ms", t.ui_poll_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("timeouts.{name} must be positive")));
            }
        }
        if !KNOWN_INSTRUMENTS.contains(&self.instrument.as_str()) {
            warn!(instrument = %self.instrument, "instrument is not one of {:?}", KNOWN_INSTRUMENTS);
        }
        Ok(())
    }
}

fn default_instrument() -> String { "RATS".to_string() }
fn default_zephyr_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }
fn default_true() -> bool { true }
fn default_gps_interval_secs() -> u64 { 60 }
fn default_sza() -> f64 { 120.0 }
fn default_data_directory() -> PathBuf { PathBuf::from("./OBC_Data") }
fn default_poll_ms() -> u64 { 1 }
fn default_idle_ms() -> u64 { 1 }
fn default_frame_ms() -> u64 { 2000 }
fn default_trailer_ms() -> u64 { 5000 }
fn default_ui_poll_ms() -> u64 { 10 }

/// Loads and validates a configuration file.
pub fn load_config(path: &Path) -> Result<SimulatorConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: SimulatorConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = SimulatorConfig::default();
        assert_eq!(config.instrument, "RATS");
        assert_eq!(config.baud_rate, 115_200);
        assert!(config.auto_ack);
        assert!(!config.auto_gps);
        assert_eq!(config.default_sza, 120.0);
        assert_eq!(config.timeouts.demux(), DemuxTimeouts::default());
        assert_eq!(config.timeouts.ui_poll(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: SimulatorConfig = toml::from_str("").unwrap();
        assert_eq!(config, SimulatorConfig::default());
    }

    #[test]
    fn test_load_config_success() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "instrument = \"LPC\"\nzephyr_port = \"COM3\"\nlog_port = \"COM4\"\nauto_ack = false\n\n[timeouts]\nframe_ms = 500\n"
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.instrument, "LPC");
        assert_eq!(config.separate_log_port(), Some("COM4"));
        assert!(!config.auto_ack);
        assert_eq!(config.timeouts.frame_ms, 500);
        assert_eq!(config.timeouts.trailer_ms, 5000);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/obc_sim.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "baud_rate = \"fast\"").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_log_port_equal_to_zephyr_is_shared() {
        let config = SimulatorConfig {
            log_port: Some("/dev/ttyUSB0".into()),
            ..SimulatorConfig::default()
        };
        assert_eq!(config.separate_log_port(), None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let empty_instrument = SimulatorConfig {
            instrument: " ".into(),
            ..SimulatorConfig::default()
        };
        assert!(matches!(empty_instrument.validate(), Err(ConfigError::Invalid(_))));

        let mut zero_timeout = SimulatorConfig::default();
        zero_timeout.timeouts.trailer_ms = 0;
        let err = zero_timeout.validate().unwrap_err();
        assert!(err.to_string().contains("timeouts.trailer_ms"));

        let bad_sza = SimulatorConfig {
            default_sza: 200.0,
            ..SimulatorConfig::default()
        };
        assert!(bad_sza.validate().is_err());
    }

    #[test]
    fn test_unknown_instrument_is_accepted() {
        let config = SimulatorConfig {
            instrument: "NEWINST".into(),
            ..SimulatorConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
