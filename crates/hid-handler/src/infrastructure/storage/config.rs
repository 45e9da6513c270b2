//! TOML-based configuration persistence for the HID handler.
//!
//! Reads and writes [`AppConfig`] from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\HidHandler\config.toml`
//! - Linux:    `~/.config/hid-handler/config.toml`
//! - macOS:    `~/Library/Application Support/HidHandler/config.toml`
//!
//! Example:
//!
//! ```toml
//! [handler]
//! default_device_type = "generic"
//! log_level = "info"
//!
//! [layouts]
//! dir = "/usr/share/hid-handler/layouts"
//!
//! [[supported_devices]]
//! vendor_id = 0x192f
//! product_id = 0x0416
//! type = "mouse"
//!
//! [[supported_devices]]
//! vendor_id = 0x04d9
//! product_id = 0x1702
//! type = { "0" = "keyboard", "1" = "mouse" }
//! layout = "fr-azerty"
//! ```
//!
//! # Defaults
//!
//! Every section and most fields fall back to a default when absent, so the
//! handler runs on first start (no file) and with partial files.  Leaving out
//! `supported_devices` altogether means "every connected device"; an empty
//! list means "no device".

use std::path::{Path, PathBuf};

use hid_handler_core::{DeviceType, LayoutDefinition, SupportedDevice};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::device_registry::HandlerConfig;

/// Errors reading or writing the handler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME`/`HOME` nor `APPDATA` is set.
    #[error("no configuration directory for this platform")]
    NoPlatformConfigDir,

    #[error("cannot access configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub handler: HandlerSection,
    #[serde(default)]
    pub layouts: LayoutSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_devices: Option<Vec<SupportedDevice>>,
}

/// General handler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerSection {
    /// Type of a matched device whose entry has no `type`.
    #[serde(default = "default_device_type")]
    pub default_device_type: String,
    /// Filter used when `RUST_LOG` is unset, e.g. `"debug"` or
    /// `"hid_handler=trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where keyboard layouts come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayoutSettings {
    /// Directory scanned for `.json`, `.yaml`/`.yml` and `.properties`
    /// layout files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Layouts registered after the directory scan.
    #[serde(default)]
    pub extra: Vec<LayoutDefinition>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

fn default_device_type() -> String {
    "generic".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HandlerSection {
    fn default() -> Self {
        Self {
            default_device_type: default_device_type(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Handler configuration with disabled devices filtered out.
    pub fn to_handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            supported_devices: self.supported_devices.as_ref().map(|devices| {
                devices
                    .iter()
                    .filter(|device| device.enabled)
                    .cloned()
                    .collect()
            }),
            default_device_type: DeviceType::from(self.handler.default_device_type.as_str()),
        }
    }
}

// ── Loading and saving ────────────────────────────────────────────────────────

/// Per-user directory holding `config.toml`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// `config.toml` inside [`config_dir`].
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Reads the configuration at `path`.  A missing file is not an error and
/// yields the defaults.
///
/// # Errors
///
/// [`ConfigError::Io`] when the file exists but cannot be read,
/// [`ConfigError::Parse`] when it is not a valid configuration.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppConfig::default())
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(toml::from_str(&content)?)
}

/// Writes `config` to `path`, creating missing parent directories.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigError::Io { path, source }
    };
    let encoded = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    std::fs::write(path, encoded).map_err(io_error(path))
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("HidHandler"))
    }

    #[cfg(target_os = "linux")]
    {
        match std::env::var_os("XDG_CONFIG_HOME") {
            Some(xdg) => Some(PathBuf::from(xdg).join("hid-handler")),
            None => std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config").join("hid-handler")),
        }
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("HidHandler")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hid_handler_core::Assignment;
    use std::collections::BTreeMap;

    const SAMPLE: &str = r#"
[handler]
default_device_type = "keyboard"

[layouts]
dir = "/opt/layouts"

[[layouts.extra]]
name = "custom"
[layouts.extra.value]
"04" = "q Q"

[[supported_devices]]
vendor_id = 0x192f
product_id = 0x0416
type = "mouse"
name = "Optical mouse"

[[supported_devices]]
vendor_id = 0x04d9
product_id = 0x1702
type = { "0" = "keyboard", "1" = "mouse" }
layout = "fr-azerty"

[[supported_devices]]
vendor_id = 0x1234
product_id = 0x0001
enabled = false
"#;

    #[test]
    fn test_default_config_has_generic_type_and_info_level() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.handler.default_device_type, "generic");
        assert_eq!(cfg.handler.log_level, "info");
        assert!(cfg.supported_devices.is_none());
        assert!(cfg.layouts.dir.is_none());
    }

    #[test]
    fn test_parses_full_config() {
        // Arrange / Act
        let cfg: AppConfig = toml::from_str(SAMPLE).expect("parse");

        // Assert
        let devices = cfg.supported_devices.as_ref().unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].device_type, Some(Assignment::from("mouse")));
        assert_eq!(devices[0].name.as_deref(), Some("Optical mouse"));
        assert_eq!(
            devices[1].interface_types(&DeviceType::Generic),
            BTreeMap::from([(0, DeviceType::Keyboard), (1, DeviceType::Mouse)])
        );
        assert_eq!(devices[1].layout, Some(Assignment::from("fr-azerty")));
        assert!(!devices[2].enabled);
        assert_eq!(cfg.layouts.dir, Some(PathBuf::from("/opt/layouts")));
        assert_eq!(cfg.layouts.extra[0].name.as_deref(), Some("custom"));
        assert_eq!(cfg.handler.log_level, "info");
    }

    #[test]
    fn test_handler_config_drops_disabled_devices() {
        let cfg: AppConfig = toml::from_str(SAMPLE).expect("parse");

        let handler = cfg.to_handler_config();

        let devices = handler.supported_devices.unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.enabled));
        assert_eq!(handler.default_device_type, DeviceType::Keyboard);
    }

    #[test]
    fn test_missing_device_list_means_all_devices() {
        let cfg: AppConfig = toml::from_str("[handler]\nlog_level = \"debug\"\n").expect("parse");

        assert!(cfg.to_handler_config().supported_devices.is_none());
        assert_eq!(cfg.handler.default_device_type, "generic");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");

        let cfg = load_config(&dir.path().join("absent.toml")).expect("load");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_config() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.handler.log_level = "trace".into();
        cfg.supported_devices = Some(vec![
            SupportedDevice::new(0x192f, 0x0416, "mouse").with_name("Optical mouse")
        ]);

        // Act
        save_config(&path, &cfg).expect("save");
        let restored = load_config(&path).expect("load");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[handler\n").expect("write");

        let err = load_config(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
