//! Runtime settings for torshare.
//!
//! Settings come from an optional TOML file and are then overridden by
//! `TORSHARE_*` environment variables (a `.env` file is loaded first by `main`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SessionError};

/// Default bound on onion service publication.
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;

/// x264 presets accepted by the encoder.
const ENCODER_PRESETS: [&str; 10] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the tor binary (default: search PATH for "tor")
    pub tor_binary: Option<PathBuf>,

    /// Path to the ffmpeg binary (default: search PATH for "ffmpeg")
    pub ffmpeg_binary: Option<PathBuf>,

    /// How long to wait for the onion service to be published.
    #[serde(deserialize_with = "duration_secs::deserialize")]
    pub publish_timeout: Duration,

    /// x264 preset used when re-encoding.
    pub encoder_preset: String,

    /// Port the onion service advertises.
    pub hidden_service_port: u16,

    /// Line typed on stdin that ends the session early.
    pub stop_keyword: String,

    /// Copy the onion URL to the system clipboard once published.
    pub copy_to_clipboard: bool,

    /// Parent directory for the session workspace (default: system temp dir)
    pub temp_root: Option<PathBuf>,

    /// How long in-flight HTTP requests may keep the server alive during teardown.
    #[serde(deserialize_with = "duration_secs::deserialize")]
    pub server_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tor_binary: None,
            ffmpeg_binary: None,
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            encoder_preset: "slow".to_string(),
            hidden_service_port: 80,
            stop_keyword: "stop".to_string(),
            copy_to_clipboard: true,
            temp_root: None,
            server_grace: Duration::from_secs(5),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let settings = settings.with_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SessionError::resource(format!("Failed to read config {}", path.display()), e)
        })?;
        Self::from_toml(&content)
            .map_err(|e| SessionError::invalid(format!("config {}: {}", path.display(), e)))
    }

    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        // TORSHARE_TOR_BINARY - path to tor binary
        if let Some(path) = non_empty_var("TORSHARE_TOR_BINARY") {
            self.tor_binary = Some(PathBuf::from(path));
        }

        // TORSHARE_FFMPEG_BINARY - path to ffmpeg binary
        if let Some(path) = non_empty_var("TORSHARE_FFMPEG_BINARY") {
            self.ffmpeg_binary = Some(PathBuf::from(path));
        }

        // TORSHARE_PUBLISH_TIMEOUT - duration string, e.g. "45s"
        if let Some(value) = non_empty_var("TORSHARE_PUBLISH_TIMEOUT") {
            self.publish_timeout = crate::utils::parse_duration(&value)?;
        }

        if let Some(preset) = non_empty_var("TORSHARE_PRESET") {
            self.encoder_preset = preset;
        }

        if let Some(port) = non_empty_var("TORSHARE_HS_PORT") {
            self.hidden_service_port = port.parse().map_err(|_| {
                SessionError::invalid(format!("TORSHARE_HS_PORT is not a port: {}", port))
            })?;
        }

        if let Some(keyword) = non_empty_var("TORSHARE_STOP_KEYWORD") {
            self.stop_keyword = keyword;
        }

        // TORSHARE_NO_CLIPBOARD=1 - never touch the clipboard
        if env::var("TORSHARE_NO_CLIPBOARD")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            self.copy_to_clipboard = false;
        }

        if let Some(dir) = non_empty_var("TORSHARE_TEMP_DIR") {
            self.temp_root = Some(PathBuf::from(dir));
        }

        Ok(self)
    }

    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.publish_timeout.is_zero() {
            return Err(SessionError::invalid("publish_timeout must be greater than zero"));
        }
        if self.stop_keyword.trim().is_empty() {
            return Err(SessionError::invalid("stop_keyword must not be empty"));
        }
        if self.hidden_service_port == 0 {
            return Err(SessionError::invalid("hidden_service_port must not be 0"));
        }
        if !ENCODER_PRESETS.contains(&self.encoder_preset.as_str()) {
            return Err(SessionError::invalid(format!(
                "unknown encoder preset \"{}\" (expected one of: {})",
                self.encoder_preset,
                ENCODER_PRESETS.join(", ")
            )));
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Durations are written as whole or fractional seconds in TOML.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
