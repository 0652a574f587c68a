use std::path::PathBuf;

use clap::Parser;
use obc_sim::{load_config, ConfigError, SimulatorConfig};

use super::logging::LogLevel;

/// Stand-in for the balloon OBC, for testing instruments on the bench.
#[derive(Debug, Parser)]
#[command(name = "obc_sim_cli", version, about)]
pub struct Cli {
    /// TOML settings file; command-line flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Instrument name (RATS, LPC, RACHUTS, FLOATS).
    #[arg(long)]
    pub instrument: Option<String>,
    /// Serial port carrying Zephyr frames.
    #[arg(long)]
    pub zephyr_port: Option<String>,
    /// Separate serial port carrying debug text.
    #[arg(long)]
    pub log_port: Option<String>,
    #[arg(long)]
    pub baud: Option<u32>,
    /// Do not acknowledge TM, S and RA frames.
    #[arg(long)]
    pub no_auto_ack: bool,
    /// Send a GPS frame periodically.
    #[arg(long)]
    pub auto_gps: bool,
    /// Directory that receives the session folders.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Line-oriented console on stdin/stdout instead of the TUI.
    #[arg(long)]
    pub headless: bool,
    /// Print the available serial ports and exit.
    #[arg(long)]
    pub list_ports: bool,
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

impl Cli {
    /// Settings file (or defaults) with the flags applied on top.
    pub fn resolve_config(&self) -> Result<SimulatorConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimulatorConfig::default(),
        };
        if let Some(instrument) = &self.instrument {
            config.instrument = instrument.to_uppercase();
        }
        if let Some(port) = &self.zephyr_port {
            config.zephyr_port = port.clone();
        }
        if let Some(port) = &self.log_port {
            config.log_port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if self.no_auto_ack {
            config.auto_ack = false;
        }
        if self.auto_gps {
            config.auto_gps = true;
        }
        if let Some(dir) = &self.data_dir {
            config.data_directory = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::try_parse_from(["obc_sim_cli"]).unwrap();
        assert!(!cli.headless);
        assert!(matches!(cli.log_level, LogLevel::Info));
        assert_eq!(cli.resolve_config().unwrap(), SimulatorConfig::default());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "obc_sim_cli",
            "--instrument",
            "lpc",
            "--zephyr-port",
            "COM5",
            "--log-port",
            "COM6",
            "--baud",
            "9600",
            "--no-auto-ack",
            "--auto-gps",
            "--data-dir",
            "/tmp/obc",
            "--headless",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.instrument, "LPC");
        assert_eq!(config.zephyr_port, "COM5");
        assert_eq!(config.separate_log_port(), Some("COM6"));
        assert_eq!(config.baud_rate, 9600);
        assert!(!config.auto_ack);
        assert!(config.auto_gps);
        assert_eq!(config.data_directory, PathBuf::from("/tmp/obc"));
        assert!(cli.headless);
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }

    #[test]
    fn file_settings_survive_unset_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "instrument = \"FLOATS\"\nauto_gps = true").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from(["obc_sim_cli", "--config", &path, "--baud", "57600"]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.instrument, "FLOATS");
        assert!(config.auto_gps);
        assert_eq!(config.baud_rate, 57600);
    }

    #[test]
    fn rejects_zero_baud() {
        let cli = Cli::try_parse_from(["obc_sim_cli", "--baud", "0"]).unwrap();
        assert!(matches!(cli.resolve_config(), Err(ConfigError::Invalid(_))));
    }
}
