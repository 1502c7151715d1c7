//! Configuration module
//!
//! Run profiles bundle a transport configuration, a script path and a run
//! mode into one TOML file so a whole bench setup can be launched with a
//! single flag.

use crate::core::transport::{SerialConfig, SerialTransport, TcpConfig, TcpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Profile loading error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Profile file could not be read
    #[error("cannot read profile: {0}")]
    Io(#[from] std::io::Error),

    /// Profile file is not valid TOML
    #[error("cannot parse profile: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Transport selection inside a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportProfile {
    /// Serial line
    Serial(SerialConfig),
    /// TCP socket
    Tcp(TcpConfig),
}

impl TransportProfile {
    /// Build the configured transport.
    pub fn build(&self) -> Arc<dyn Transport> {
        match self {
            Self::Serial(config) => Arc::new(SerialTransport::new(config.clone())),
            Self::Tcp(config) => Arc::new(TcpTransport::new(config.clone())),
        }
    }
}

/// A complete bench setup: where the device is, what to run, and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProfile {
    /// Transport configuration
    pub transport: TransportProfile,
    /// Path to the script JSON (ordered array of steps)
    pub script: PathBuf,
    /// Run the script once instead of looping
    #[serde(default = "default_once")]
    pub once: bool,
    /// Interval between passes in loop mode, in seconds
    #[serde(rename = "intervalSecs", default)]
    pub interval_secs: u64,
}

fn default_once() -> bool {
    true
}

impl RunProfile {
    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_tcp_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
script = "steps.json"
once = false
intervalSecs = 5

[transport]
type = "tcp"
host = "192.168.1.50"
port = 5025
"#
        )
        .unwrap();

        let profile = RunProfile::load(file.path()).unwrap();
        assert!(!profile.once);
        assert_eq!(profile.interval_secs, 5);
        match profile.transport {
            TransportProfile::Tcp(config) => {
                assert_eq!(config.host, "192.168.1.50");
                assert_eq!(config.port, 5025);
                assert_eq!(config.retry_delay_ms, 2000);
            }
            TransportProfile::Serial(_) => panic!("expected tcp transport"),
        }
    }

    #[test]
    fn test_load_serial_profile_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
script = "steps.json"

[transport]
type = "serial"
port = "/dev/ttyUSB0"
baudRate = 9600
parity = "even"
stopBits = "2"
"#
        )
        .unwrap();

        let profile = RunProfile::load(file.path()).unwrap();
        assert!(profile.once);
        match profile.transport {
            TransportProfile::Serial(config) => {
                assert_eq!(config.baud_rate, 9600);
                assert_eq!(config.data_bits, 8);
                assert_eq!(
                    config.parity,
                    crate::core::transport::SerialParity::Even
                );
                assert_eq!(
                    config.stop_bits,
                    crate::core::transport::SerialStopBits::Two
                );
            }
            TransportProfile::Tcp(_) => panic!("expected serial transport"),
        }
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not = [valid").unwrap();
        assert!(matches!(
            RunProfile::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
