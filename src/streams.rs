use serde::{Deserialize, Deserializer};
use serde_aux::prelude::*;
use serde_json::Value;

use crate::video_id::VideoId;

/// Upstream path of the metadata and stream document for one video.
pub fn streams_path(id: &VideoId) -> String {
    format!("/api/v1/streams/{}", id)
}

/// Metadata and stream lists returned by a mirror for one video.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub duration: u64,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub muxed_streams: Vec<StreamDescriptor>,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub audio_streams: Vec<StreamDescriptor>,
}

/// One downloadable variant of a video or of its audio track.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "deserialize_quality")]
    pub quality: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_bitrate")]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl StreamDescriptor {
    /// Best available description of the container: `container`, then
    /// `mimeType`, then `format`.
    pub fn container_hint(&self) -> &str {
        [&self.container, &self.mime_type, &self.format]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    pub fn quality_or_zero(&self) -> u32 {
        self.quality.unwrap_or(0)
    }

    pub fn bitrate_or_zero(&self) -> u64 {
        self.bitrate.unwrap_or(0)
    }

    /// The playable URL, if there is one worth following.
    pub fn usable_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

fn leading_digits(s: &str) -> Option<u64> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// Mirrors disagree on number encoding: plain numbers, numeric strings, and
// labels like "720p" or "1080p60" all show up.
fn lenient_number(value: Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => leading_digits(&s),
        _ => None,
    }
}

fn deserialize_quality<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(value).and_then(|n| u32::try_from(n).ok()))
}

fn deserialize_bitrate<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(value))
}

// Live streams report -1; anything unusable counts as zero.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(value).unwrap_or(0))
}
