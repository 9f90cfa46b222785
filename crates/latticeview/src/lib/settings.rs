//! Per-directory settings persistence for Latticeview
//!
//! Settings are stored as `latticeview.toml` in the working directory (or the
//! directory holding a recording). They capture solver endpoints, channel
//! timing, playback preferences and streamline seeding.

use latticeview_network::{ChannelConfig, PayloadUnit};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Filename used for per-directory settings
pub const SETTINGS_FILENAME: &str = "latticeview.toml";

/// How the solver lays out one velocity element on the velocity port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VelocityLayout {
    /// Three floats, 12 bytes
    Vec3,
    /// Four floats, 16 bytes, the fourth ignored
    #[default]
    Vec4,
}

/// Solver endpoints and channel timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub host: IpAddr,
    pub velocity_port: u16,
    pub density_port: u16,
    /// Port of the single Vec4 stream (xyz velocity, w density)
    pub combined_port: u16,
    pub velocity_layout: VelocityLayout,
    /// Consecutive empty receives tolerated per frame
    pub retry_budget: u32,
    pub retry_interval_ms: u64,
    /// Bound on the wait for a frame header
    pub header_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Minimum delay between reconnect attempts, 0 retries every tick
    pub reconnect_interval_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            velocity_port: 4000,
            density_port: 4001,
            combined_port: 4331,
            velocity_layout: VelocityLayout::Vec4,
            retry_budget: 1000,
            retry_interval_ms: 1,
            header_timeout_ms: 2000,
            connect_timeout_ms: 1000,
            reconnect_interval_ms: 0,
        }
    }
}

impl NetworkSettings {
    /// Channel configuration for one solver port
    pub fn channel_config(&self, port: u16, payload_unit: PayloadUnit) -> ChannelConfig {
        ChannelConfig {
            host: self.host,
            port,
            payload_unit,
            retry_budget: self.retry_budget,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            header_timeout: Duration::from_millis(self.header_timeout_ms),
            connect_timeout: Some(Duration::from_millis(self.connect_timeout_ms)),
            ..ChannelConfig::default()
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Seconds each frame is shown during auto-advance
    pub frame_interval: f32,
    /// Whether to loop playback
    #[serde(rename = "loop")]
    pub loop_enabled: bool,
    /// Start auto-advancing as soon as the recording is loaded
    pub autoplay: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            frame_interval: crate::lib::playback::DEFAULT_FRAME_INTERVAL,
            loop_enabled: true,
            autoplay: true,
        }
    }
}

/// Streamline seeding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamlineSettings {
    /// Maximum points per streamline
    pub steps: usize,
    /// Seed positions in lattice coordinates; empty seeds from the lattice centre
    pub seeds: Vec<[f32; 3]>,
}

impl Default for StreamlineSettings {
    fn default() -> Self {
        Self {
            steps: 64,
            seeds: Vec::new(),
        }
    }
}

/// Top-level settings struct, serialized as latticeview.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub network: NetworkSettings,
    pub playback: PlaybackSettings,
    pub streamline: StreamlineSettings,
}

impl Settings {
    /// Load settings from a latticeview.toml file in the given directory.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;
        let settings: Settings =
            toml::from_str(&contents).map_err(|e| SettingsError::ParseToml {
                path: path.clone(),
                source: e,
            })?;
        info!("Loaded settings from {:?}", path);
        Ok(Some(settings))
    }

    /// Load settings from `dir`, falling back to defaults when absent
    pub fn load_or_default(dir: &Path) -> Result<Self, SettingsError> {
        Ok(Self::load_from_dir(dir)?.unwrap_or_default())
    }

    /// Save settings to latticeview.toml in the given directory.
    /// Merges with existing file if present (preserves unknown keys).
    pub fn save_to_dir(&self, dir: &Path) -> Result<(), SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        let serialize_error = |e| SettingsError::SerializeToml {
            path: path.clone(),
            source: e,
        };

        let ours = toml::to_string_pretty(self).map_err(serialize_error)?;
        let merged = if path.exists() {
            let existing_contents =
                std::fs::read_to_string(&path).map_err(|e| SettingsError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            let mut existing_table: toml::Table =
                toml::from_str(&existing_contents).unwrap_or_default();
            let our_table: toml::Table = toml::from_str(&ours).unwrap_or_default();

            for (key, value) in our_table {
                existing_table.insert(key, value);
            }
            toml::to_string_pretty(&existing_table).map_err(serialize_error)?
        } else {
            ours
        };

        std::fs::write(&path, merged).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }
}

/// Errors that can occur during settings operations
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize TOML for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// Resolve the settings directory from a path argument.
/// If the path is a file, returns its parent directory.
/// If the path is a directory, returns it directly.
pub fn resolve_settings_dir(path: &Path) -> Option<PathBuf> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if canonical.is_dir() {
        Some(canonical)
    } else if canonical.is_file() {
        canonical.parent().map(|p| p.to_path_buf())
    } else {
        None
    }
}
