use std::{path::Path, sync::Arc, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    failover::DEFAULT_PROBE_PATH,
    health::{HealthCache, MirrorEndpoint},
    select::DEFAULT_VIDEO_CONTAINER,
    transcode::TranscodeOptions,
};

const DEFAULT_MIRRORS: [&str; 3] = [
    "https://pipedapi.kavin.rocks",
    "https://pipedapi.adminforge.de",
    "https://api.piped.private.coffee",
];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("no mirrors configured")]
    NoMirrors,
    #[error("mirror {0:?} is not an absolute http(s) URL")]
    InvalidMirror(String),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URLs of the API mirrors, in rotation order.
    pub mirrors: Vec<String>,
    /// Path requested by health probes.
    pub probe_path: String,
    /// Bound on every probe and API request.
    pub request_timeout_secs: u64,
    /// Bound on a media download.
    pub download_timeout_secs: u64,
    /// Preferred container for the direct video link.
    pub video_container: String,
    pub ffmpeg_path: String,
    pub transcode: TranscodeOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirrors: DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            request_timeout_secs: 10,
            download_timeout_secs: 300,
            video_container: DEFAULT_VIDEO_CONTAINER.to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            transcode: TranscodeOptions::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mirrors.is_empty() {
            return Err(ConfigError::NoMirrors);
        }

        for mirror in &self.mirrors {
            let ok = Url::parse(mirror)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
                .unwrap_or(false);
            if !ok {
                return Err(ConfigError::InvalidMirror(mirror.clone()));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("request_timeout_secs"));
        }
        if self.download_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("download_timeout_secs"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn health_cache(&self) -> Result<Arc<HealthCache>, ConfigError> {
        let mirrors = self.mirrors.iter().map(MirrorEndpoint::new).collect();
        HealthCache::new(mirrors)
            .map(Arc::new)
            .ok_or(ConfigError::NoMirrors)
    }
}
