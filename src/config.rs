//! Configuration collaborator: supplies the transport identifier and the
//! session-log toggle/directory to the acquisition core.

use crate::{
    device::GpsSource,
    error::{DeviceError, Result},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// "serial", "file", "gpsd" or "platform"
    pub source_type: String,
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub replay_path: Option<PathBuf>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
    pub platform_accuracy: Option<u32>,
    pub platform_interval: Option<u64>,
    pub log_enabled: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl DeviceConfig {
    /// Platform-specific defaults: the OS location service where one
    /// exists, gpsd elsewhere.
    pub fn platform_default() -> Self {
        Self {
            #[cfg(windows)]
            source_type: "platform".to_string(),
            #[cfg(not(windows))]
            source_type: "gpsd".to_string(),
            serial_port: None,
            serial_baudrate: Some(4800),
            replay_path: None,
            gpsd_host: Some("localhost".to_string()),
            gpsd_port: Some(2947),
            platform_accuracy: Some(10),
            platform_interval: Some(1),
            log_enabled: false,
            log_dir: None,
        }
    }

    /// Loads the saved configuration, falling back to the platform default
    /// when none exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::platform_default());
        }
        let contents = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| DeviceError::Open("no home directory for config".to_string()))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("gps-device")
            .join("config.json"))
    }

    /// Resolves the configured transport into a source selection.
    pub fn to_source(&self) -> Result<GpsSource> {
        match self.source_type.as_str() {
            "serial" => {
                let port = self.serial_port.clone().ok_or_else(|| {
                    DeviceError::Open("serial source configured without a port".to_string())
                })?;
                Ok(GpsSource::Serial {
                    port,
                    baudrate: self.serial_baudrate.unwrap_or(4800),
                })
            }
            "file" => {
                let path = self.replay_path.clone().ok_or_else(|| {
                    DeviceError::Open("file source configured without a path".to_string())
                })?;
                Ok(GpsSource::FileReplay { path })
            }
            "gpsd" => Ok(GpsSource::Gpsd {
                host: self
                    .gpsd_host
                    .clone()
                    .unwrap_or_else(|| "localhost".to_string()),
                port: self.gpsd_port.unwrap_or(2947),
            }),
            #[cfg(windows)]
            "platform" => Ok(GpsSource::Platform {
                accuracy: self.platform_accuracy.unwrap_or(10),
                interval_secs: self.platform_interval.unwrap_or(1),
            }),
            other => Err(DeviceError::Open(format!(
                "unknown source type {:?}",
                other
            ))),
        }
    }

    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        self.serial_baudrate = Some(baudrate);
    }

    pub fn update_file(&mut self, path: PathBuf) {
        self.source_type = "file".to_string();
        self.replay_path = Some(path);
    }

    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = Some(host);
        self.gpsd_port = Some(port);
    }

    pub fn update_logging(&mut self, enabled: bool, dir: Option<PathBuf>) {
        self.log_enabled = enabled;
        self.log_dir = dir;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();

        #[cfg(windows)]
        assert_eq!(config.source_type, "platform");

        #[cfg(not(windows))]
        assert_eq!(config.source_type, "gpsd");

        assert!(!config.log_enabled);
    }

    #[test]
    fn test_update_serial() {
        let mut config = DeviceConfig::default();
        config.update_serial("/dev/ttyUSB0".to_string(), 115200);
        assert_eq!(config.source_type, "serial");
        assert_eq!(config.serial_port, Some("/dev/ttyUSB0".to_string()));
        assert_eq!(config.serial_baudrate, Some(115200));

        match config.to_source().unwrap() {
            GpsSource::Serial { port, baudrate } => {
                assert_eq!(port, "/dev/ttyUSB0");
                assert_eq!(baudrate, 115200);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_serial_without_port_is_rejected() {
        let mut config = DeviceConfig::default();
        config.source_type = "serial".to_string();
        config.serial_port = None;
        assert!(config.to_source().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = DeviceConfig::default();
        config.update_gpsd("gps.local".to_string(), 2948);
        config.update_logging(true, Some(PathBuf::from("/var/log/gps")));

        let json = serde_json::to_string(&config).unwrap();
        let back: DeviceConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.source_type, "gpsd");
        assert_eq!(back.gpsd_host, Some("gps.local".to_string()));
        assert_eq!(back.gpsd_port, Some(2948));
        assert!(back.log_enabled);
        assert_eq!(back.log_dir, Some(PathBuf::from("/var/log/gps")));
    }
}
