// Settings management and persistence
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Network listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub hostname: String,
    pub http_port: u16,
    pub ws_port: u16,
    /// Accept WebSocket upgrades from any origin (browser dev setups)
    pub allow_any_origin: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            http_port: 8000,
            ws_port: 8001,
            allow_any_origin: true,
        }
    }
}

/// Static asset settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSettings {
    pub dir: PathBuf,
    pub url_path: String,
    pub views_dir: PathBuf,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./public"),
            url_path: "/".to_string(),
            views_dir: PathBuf::from("./views"),
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub enabled: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_frames: u32,
    pub feed_chunk_samples: usize, // samples per sink call
    pub volume: f32,               // 0.0-1.0
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 44100,
            channels: 2,
            buffer_frames: 1024,
            feed_chunk_samples: 128,
            volume: 1.0,
        }
    }
}

/// Recording persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub result_file: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            result_file: PathBuf::from("result.dat"),
        }
    }
}

/// Main server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub version: i32, // Settings schema version for future migrations
    pub network: NetworkSettings,
    pub static_files: StaticSettings,
    pub playback: PlaybackSettings,
    pub storage: StorageSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            network: NetworkSettings::default(),
            static_files: StaticSettings::default(),
            playback: PlaybackSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl ServerSettings {
    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let settings: ServerSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {:?}", path))?;

        settings.validate()?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, content).with_context(|| format!("Failed to write settings file {:?}", path))?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.http_port == 0 || self.network.ws_port == 0 {
            bail!("ports must be non-zero");
        }
        if self.network.http_port == self.network.ws_port {
            bail!("http_port and ws_port must differ");
        }
        let playback = &self.playback;
        if playback.sample_rate == 0 || playback.channels == 0 {
            bail!("sample_rate and channels must be non-zero");
        }
        if playback.feed_chunk_samples == 0 {
            bail!("feed_chunk_samples must be non-zero");
        }
        if !(0.0..=1.0).contains(&playback.volume) {
            bail!("volume must be between 0.0 and 1.0, got {}", playback.volume);
        }
        if self.storage.result_file.as_os_str().is_empty() {
            bail!("storage.result_file must not be empty");
        }
        Ok(())
    }
}
