//! Configuration for pullbridge
//!
//! Settings are stored as TOML under the platform configuration directory
//! (`<config_dir>/pullbridge/config.toml`). Missing fields fall back to
//! their defaults, so a partial file is always valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default sample rate requested from the device
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default mixer buffer size hint, in frames
pub const DEFAULT_BUFFER_SIZE: u32 = 2048;

/// Default channel count requested from the device
pub const DEFAULT_CHANNELS: u16 = 2;

/// Which native audio subsystem drives the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hardware output through cpal
    #[default]
    Cpal,
    /// Scripted in-process host, no sound output
    Null,
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Name as accepted in filter directives
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Audio output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Native subsystem to open
    pub backend: BackendKind,
    /// cpal host name (e.g. "ALSA", "JACK"); None = platform default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Requested sample rate (the device may grant another)
    pub sample_rate: u32,
    /// Buffer size hint forwarded to the mixer, in frames
    pub buffer_size: u32,
    /// Requested channel count (the device may grant another)
    pub channels: u16,
    /// Fixed device buffer in frames; None lets the device decide
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_device_buffer: Option<u32>,
    /// Clamp mixer output to [-1.0, 1.0]
    pub clip_roundoff: bool,
    /// Ask the mixer to keep visualization data
    pub visualization: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            host: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            channels: DEFAULT_CHANNELS,
            fixed_device_buffer: None,
            clip_roundoff: true,
            visualization: false,
        }
    }
}

/// Debugging and logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    /// Override for negotiation messages (`audio` target)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_log_level: Option<LogLevel>,
    /// Override for native host messages (`audio::host` target)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_log_level: Option<LogLevel>,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            audio_log_level: None,
            host_log_level: None,
            log_to_file: false,
            log_path: PathBuf::from("pullbridge.log"),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub debug: DebugConfig,
}

impl Config {
    /// Path of the user configuration file
    pub fn path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("pullbridge").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load the user configuration file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load a configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to the user configuration file, creating its directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Save to an explicit path, creating its parent directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, self.to_toml()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
