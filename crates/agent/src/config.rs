//! Agent configuration management

use crate::hub::HardwareIds;
use crate::scheduler::Timing;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentSettings,
    #[serde(default)]
    pub timing: TimingSettings,
    /// Insight Hub identifiers
    #[serde(default)]
    pub hardware: HardwareIds,
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub directory: DirectorySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub log_level: String,
    /// Run headless (no TUI), notifying systemd when present
    #[serde(default)]
    pub service_mode: bool,
}

/// Timer settings, all in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Quiet period after a hot-plug event before rebuilding
    #[serde(default = "TimingSettings::default_debounce")]
    pub debounce_ms: u64,
    /// Interval between frame sends to each hub
    #[serde(default = "TimingSettings::default_heartbeat")]
    pub heartbeat_ms: u64,
    /// Busy re-arms tolerated before a rebuild is forced
    #[serde(default = "TimingSettings::default_max_reschedules")]
    pub max_reschedules: u32,
    /// Serial read/write timeout
    #[serde(default = "TimingSettings::default_serial_timeout")]
    pub serial_timeout_ms: u64,
    /// Directory polling period when libusb hot-plug is unavailable
    #[serde(default = "TimingSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce(),
            heartbeat_ms: Self::default_heartbeat(),
            max_reschedules: Self::default_max_reschedules(),
            serial_timeout_ms: Self::default_serial_timeout(),
            poll_interval_ms: Self::default_poll_interval(),
        }
    }
}

impl TimingSettings {
    fn default_debounce() -> u64 {
        500
    }

    fn default_heartbeat() -> u64 {
        500
    }

    fn default_max_reschedules() -> u32 {
        2
    }

    fn default_serial_timeout() -> u64 {
        500
    }

    fn default_poll_interval() -> u64 {
        2000
    }

    pub fn timing(&self) -> Timing {
        Timing {
            debounce: Duration::from_millis(self.debounce_ms),
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            max_reschedules: self.max_reschedules,
        }
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default = "SerialSettings::default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: Self::default_baud_rate(),
        }
    }
}

impl SerialSettings {
    fn default_baud_rate() -> u32 {
        115_200
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Root of the sysfs mount
    #[serde(default = "DirectorySettings::default_sysfs_root")]
    pub sysfs_root: PathBuf,
    /// Replay a captured snapshot instead of reading sysfs
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            sysfs_root: Self::default_sysfs_root(),
            snapshot: None,
        }
    }
}

impl DirectorySettings {
    fn default_sysfs_root() -> PathBuf {
        PathBuf::from("/sys")
    }

    pub fn sysfs_root(&self) -> PathBuf {
        expand_path(&self.sysfs_root)
    }

    pub fn snapshot(&self) -> Option<PathBuf> {
        self.snapshot.as_deref().map(expand_path)
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent: AgentSettings {
                log_level: "info".to_string(),
                service_mode: false,
            },
            timing: TimingSettings::default(),
            hardware: HardwareIds::default(),
            serial: SerialSettings::default(),
            directory: DirectorySettings::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-insight-hub/agent.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-insight-hub").join("agent.toml")
        } else {
            PathBuf::from(".config/usb-insight-hub/agent.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.agent.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.agent.log_level,
                valid_levels.join(", ")
            ));
        }

        let intervals = [
            ("debounce_ms", self.timing.debounce_ms),
            ("heartbeat_ms", self.timing.heartbeat_ms),
            ("serial_timeout_ms", self.timing.serial_timeout_ms),
            ("poll_interval_ms", self.timing.poll_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(anyhow!("Invalid {} '0', must be greater than 0", name));
            }
        }

        if self.serial.baud_rate == 0 {
            return Err(anyhow!("Invalid baud_rate '0'"));
        }

        let port = &self.hardware.controller_port;
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!(
                "Invalid controller_port '{}', must be a hub port number",
                port
            ));
        }

        Ok(())
    }
}

/// Load a config file named on the command line, expanding `~`
pub fn load_config(path: &str) -> Result<AgentConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    AgentConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.agent.log_level, "info");
        assert!(!config.agent.service_mode);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.timing.timing(), Timing::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AgentConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: AgentConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = AgentConfig::default();
        config.agent.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.agent.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = AgentConfig::default();
        config.timing.heartbeat_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.timing.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_controller_port() {
        let mut config = AgentConfig::default();
        config.hardware.controller_port = "x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        let settings = DirectorySettings {
            sysfs_root: PathBuf::from("/sys"),
            snapshot: Some(PathBuf::from("~/desk.json")),
        };
        let snapshot = settings.snapshot().unwrap();
        assert!(!snapshot.starts_with("~"));
        assert!(snapshot.ends_with("desk.json"));
    }
}
