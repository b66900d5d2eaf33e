// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compositor::OverlayStyle;
use crate::error::ConfigError;

pub const SERVER_ENV: &str = "HAND_OVERLAY_SERVER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub server_url: String,
    pub camera_index: u32,
    pub video_width: u32,
    pub video_height: u32,
    pub refresh_hz: u32,
    /// `None` keeps peers for the whole session.
    pub peer_ttl_secs: Option<u64>,
    pub fade_alpha: u8,
    pub stroke_width: f32,
    pub stroke_alpha: u8,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        let style = OverlayStyle::default();
        Self {
            server_url: "ws://127.0.0.1:3030/messages".to_string(),
            camera_index: 0,
            video_width: 640,
            video_height: 500,
            refresh_hz: 60,
            peer_ttl_secs: Some(30),
            fade_alpha: style.fade_alpha,
            stroke_width: style.stroke_width,
            stroke_alpha: style.stroke_alpha,
        }
    }
}

impl OverlaySettings {
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "handoverlay", "HandOverlay")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Reads the platform settings file (if any), then applies env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        let settings = settings.with_overrides(std::env::var(SERVER_ENV).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// A missing file yields the defaults; a present but invalid one is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn with_overrides(mut self, server_url: Option<String>) -> Self {
        if let Some(url) = server_url.filter(|url| !url.trim().is_empty()) {
            self.server_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_hz == 0 {
            return Err(ConfigError::ZeroRefreshRate);
        }
        if self.video_width == 0 || self.video_height == 0 {
            return Err(ConfigError::EmptyVideo);
        }
        Ok(())
    }

    pub fn peer_ttl(&self) -> Option<Duration> {
        self.peer_ttl_secs.map(Duration::from_secs)
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            fade_alpha: self.fade_alpha,
            stroke_width: self.stroke_width,
            stroke_alpha: self.stroke_alpha,
        }
    }
}
