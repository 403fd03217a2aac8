use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_PROBE_URLS,
    PANIC_RECORDING_DURATION_SECS,
};

fn default_api_port() -> u16 {
    3000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_user_id() -> String {
    "local-user".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_probe_urls() -> Vec<String> {
    DEFAULT_PROBE_URLS.iter().map(|u| u.to_string()).collect()
}

fn default_panic_duration_secs() -> u64 {
    PANIC_RECORDING_DURATION_SECS
}

fn default_geocoder_url() -> String {
    "https://api.bigdatacloud.net/data/reverse-geocode-client".to_string()
}

fn default_geocoder_language() -> String {
    "pt".to_string()
}

fn default_geocoder_timeout_ms() -> u64 {
    3000
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_video_device() -> String {
    "/dev/video0".to_string()
}

fn default_audio_device() -> String {
    "default".to_string()
}

fn default_location_interval_secs() -> u64 {
    5
}

/// Top-level configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding the database, stored objects, downloads and lock files (default: tmp)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Owner of every device, recording and subscription written by this instance
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// API server port (default: 3000)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Base URL used when building download links (default: http://localhost:<api_port>)
    pub public_url: Option<String>,
    /// Connection monitor settings (maps to [monitor] section in TOML)
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Reverse geocoding settings (maps to [geocoder] section in TOML)
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    /// Capture backend settings (maps to [capture] section in TOML)
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Connection monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Start monitoring as soon as the process starts (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between connectivity checks (default: 3)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Abort timeout of each reachability request in milliseconds (default: 2000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// URLs probed in order with HEAD requests; the first answer wins
    #[serde(default = "default_probe_urls")]
    pub probe_urls: Vec<String>,
    /// Duration of an automatic panic recording in seconds (default: 3600)
    #[serde(default = "default_panic_duration_secs")]
    pub panic_duration_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_urls: default_probe_urls(),
            panic_duration_secs: default_panic_duration_secs(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn panic_duration(&self) -> Duration {
        Duration::from_secs(self.panic_duration_secs)
    }
}

/// Reverse geocoding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    /// Reverse geocoding endpoint taking latitude/longitude/localityLanguage query parameters
    #[serde(default = "default_geocoder_url")]
    pub url: String,
    /// Language of returned place names (default: pt)
    #[serde(default = "default_geocoder_language")]
    pub language: String,
    /// Request timeout in milliseconds (default: 3000)
    #[serde(default = "default_geocoder_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            url: default_geocoder_url(),
            language: default_geocoder_language(),
            timeout_ms: default_geocoder_timeout_ms(),
        }
    }
}

/// Capture backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// ffmpeg executable used to record camera and microphone (default: ffmpeg)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// V4L2 camera device (default: /dev/video0)
    #[serde(default = "default_video_device")]
    pub video_device: String,
    /// ALSA capture device (default: default)
    #[serde(default = "default_audio_device")]
    pub audio_device: String,
    /// Fixed position reported by devices without a positioning receiver
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Seconds between position reports of the fixed position source (default: 5)
    #[serde(default = "default_location_interval_secs")]
    pub location_interval_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            video_device: default_video_device(),
            audio_device: default_audio_device(),
            latitude: None,
            longitude: None,
            location_interval_secs: default_location_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            user_id: default_user_id(),
            api_port: default_api_port(),
            public_url: None,
            monitor: MonitorConfig::default(),
            geocoder: GeocoderConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".to_string());
        }

        if self.monitor.poll_interval_secs == 0 {
            return Err("monitor.poll_interval_secs must be greater than 0".to_string());
        }

        if self.monitor.probe_timeout_ms == 0 {
            return Err("monitor.probe_timeout_ms must be greater than 0".to_string());
        }

        if self.monitor.panic_duration_secs == 0 {
            return Err("monitor.panic_duration_secs must be greater than 0".to_string());
        }

        if self.monitor.probe_urls.is_empty() {
            return Err("monitor.probe_urls must contain at least one URL".to_string());
        }

        for probe_url in &self.monitor.probe_urls {
            url::Url::parse(probe_url)
                .map_err(|e| format!("Invalid probe URL '{}': {}", probe_url, e))?;
        }

        url::Url::parse(&self.geocoder.url)
            .map_err(|e| format!("Invalid geocoder URL '{}': {}", self.geocoder.url, e))?;

        if let Some(public_url) = &self.public_url {
            url::Url::parse(public_url)
                .map_err(|e| format!("Invalid public_url '{}': {}", public_url, e))?;
        }

        match (self.capture.latitude, self.capture.longitude) {
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err(format!("capture position ({}, {}) out of range", lat, lng));
                }
            }
            (None, None) => {}
            _ => {
                return Err(
                    "capture.latitude and capture.longitude must be set together".to_string(),
                )
            }
        }

        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("panic_guard.sqlite")
    }

    /// Root of the object store; objects live under <root>/<user_id>/<file>
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    /// Where locally saved capture artifacts are written
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.lock", name))
    }

    pub fn public_base_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.api_port))
            .trim_end_matches('/')
            .to_string()
    }
}
