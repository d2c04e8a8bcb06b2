//! TOML-based configuration persistence.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Linux:    `$XDG_CONFIG_HOME/keymacro/config.toml` or `~/.config/keymacro/config.toml`
//! - Windows:  `%APPDATA%\KeyMacro\config.toml`
//! - macOS:    `~/Library/Application Support/KeyMacro/config.toml`
//!
//! # Example file
//!
//! ```toml
//! [general]
//! log_level = "info"
//! macro_path = "macro.txt"
//!
//! [recording]
//! device_dir = "/dev/input"
//! device_prefix = "event"
//! poll_interval_ms = 50
//!
//! [playback]
//! uinput_path = "/dev/uinput"
//! settle_delay_ms = 100
//! device_name = "Virtual POS Device"
//! vendor_id = 4660
//! product_id = 22136
//! version = 1
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "some_fn")]` and every section is
//! `#[serde(default)]`, so an empty file, a file with only `[playback]`, or
//! no file at all all produce a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use keymacro_core::domain::capabilities::BUS_USB;
use keymacro_core::{CapabilitySet, DeviceIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::macro_manager::MacroSettings;
use crate::application::play_macro::PlayerSettings;
use crate::application::record_macro::RecorderSettings;
use crate::infrastructure::input_device::PlatformConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Settings shared by every command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Macro file used when a command is given no explicit path.
    #[serde(default = "default_macro_path")]
    pub macro_path: PathBuf,
}

/// Where recording finds its devices and how often it checks for a stop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingConfig {
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,
    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,
    /// Upper bound on stop latency while no events arrive.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// The virtual device playback creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    #[serde(default = "default_uinput_path")]
    pub uinput_path: PathBuf,
    /// Pause between creating the device and the first event, so listeners
    /// can attach.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,
    #[serde(default = "default_version")]
    pub version: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_macro_path() -> PathBuf {
    PathBuf::from("macro.txt")
}
fn default_device_dir() -> PathBuf {
    PlatformConfig::default().device_dir
}
fn default_device_prefix() -> String {
    PlatformConfig::default().device_prefix
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_uinput_path() -> PathBuf {
    PlatformConfig::default().uinput_path
}
fn default_settle_delay_ms() -> u64 {
    100
}
fn default_device_name() -> String {
    DeviceIdentity::default().name
}
fn default_vendor_id() -> u16 {
    DeviceIdentity::default().vendor
}
fn default_product_id() -> u16 {
    DeviceIdentity::default().product
}
fn default_version() -> u16 {
    DeviceIdentity::default().version
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            macro_path: default_macro_path(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            device_dir: default_device_dir(),
            device_prefix: default_device_prefix(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            uinput_path: default_uinput_path(),
            settle_delay_ms: default_settle_delay_ms(),
            device_name: default_device_name(),
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            version: default_version(),
        }
    }
}

impl AppConfig {
    /// Session timing and the virtual device description.
    pub fn macro_settings(&self) -> MacroSettings {
        MacroSettings {
            recorder: RecorderSettings {
                // A zero interval would turn every idle poll into a spin.
                poll_interval: Duration::from_millis(self.recording.poll_interval_ms.max(1)),
            },
            player: PlayerSettings {
                settle_delay: Duration::from_millis(self.playback.settle_delay_ms),
                identity: DeviceIdentity {
                    name: self.playback.device_name.clone(),
                    bus_type: BUS_USB,
                    vendor: self.playback.vendor_id,
                    product: self.playback.product_id,
                    version: self.playback.version,
                },
                capabilities: CapabilitySet::full(),
            },
        }
    }

    /// Device node locations for the platform adapter.
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            device_dir: self.recording.device_dir.clone(),
            device_prefix: self.recording.device_prefix.clone(),
            uinput_path: self.playback.uinput_path.clone(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from an explicit path.  A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to an explicit path, creating parent directories.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `keymacro` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeyMacro"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keymacro"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KeyMacro")
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
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("keymacro_cfg_{}", Uuid::new_v4()))
            .join(name)
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_config_matches_documented_values() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.general.log_level, "info");
        assert_eq!(cfg.recording.poll_interval_ms, 50);
        assert_eq!(cfg.recording.device_dir, PathBuf::from("/dev/input"));
        assert_eq!(cfg.playback.uinput_path, PathBuf::from("/dev/uinput"));
        assert_eq!(cfg.playback.settle_delay_ms, 100);
        assert_eq!(cfg.playback.vendor_id, 0x1234);
        assert_eq!(cfg.playback.product_id, 0x5678);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_named_fields() {
        // Arrange
        let toml_str = r#"
[playback]
settle_delay_ms = 250
device_name = "Bench Keyboard"
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.playback.settle_delay_ms, 250);
        assert_eq!(cfg.playback.device_name, "Bench Keyboard");
        assert_eq!(cfg.playback.vendor_id, 0x1234);
        assert_eq!(cfg.recording, RecordingConfig::default());
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        // Arrange
        let path = temp_path("config.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    // ── Conversions ───────────────────────────────────────────────────────────

    #[test]
    fn test_macro_settings_carry_playback_identity() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.playback.device_name = "Register".to_string();
        cfg.playback.vendor_id = 0xbeef;
        cfg.recording.poll_interval_ms = 20;

        // Act
        let settings = cfg.macro_settings();

        // Assert
        assert_eq!(settings.recorder.poll_interval, Duration::from_millis(20));
        assert_eq!(settings.player.settle_delay, Duration::from_millis(100));
        assert_eq!(settings.player.identity.name, "Register");
        assert_eq!(settings.player.identity.vendor, 0xbeef);
        assert_eq!(settings.player.identity.bus_type, BUS_USB);
        assert_eq!(settings.player.capabilities, CapabilitySet::full());
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let mut cfg = AppConfig::default();
        cfg.recording.poll_interval_ms = 0;
        assert_eq!(
            cfg.macro_settings().recorder.poll_interval,
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_platform_config_collects_device_paths() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.recording.device_dir = PathBuf::from("/tmp/input");
        cfg.playback.uinput_path = PathBuf::from("/tmp/uinput");

        // Act
        let platform = cfg.platform_config();

        // Assert
        assert_eq!(platform.device_dir, PathBuf::from("/tmp/input"));
        assert_eq!(platform.device_prefix, "event");
        assert_eq!(platform.uinput_path, PathBuf::from("/tmp/uinput"));
    }

    // ── File round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = temp_path("absent.toml");
        let cfg = load_config_from(&path).expect("missing file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_creates_parent_dir() {
        // Arrange
        let path = temp_path("nested/config.toml");
        let mut cfg = AppConfig::default();
        cfg.general.log_level = "debug".to_string();
        cfg.general.macro_path = PathBuf::from("/var/lib/pos/macro.txt");
        cfg.playback.version = 7;

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        if let Some(root) = path.parent().and_then(Path::parent) {
            std::fs::remove_dir_all(root).ok();
        }
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("keymacro/config.toml") || path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped environment is also acceptable.
    }
}
