use std::{fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use url::Url;

const SHORT_LINK_HOST: &str = "youtu.be";
const MIN_ID_LEN: usize = 6;

/// A video identifier as understood by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("not a video identifier: {0:?}")]
pub struct InvalidVideoId(String);

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl FromStr for VideoId {
    type Err = InvalidVideoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() >= MIN_ID_LEN && s.chars().all(is_id_char) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidVideoId(s.to_string()))
        }
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?:youtube\.com/watch\?(?:[^#\s]*?&)?v=|youtu\.be/)([A-Za-z0-9_-]{6,})",
        )
        .expect("video id pattern is valid")
    })
}

fn from_url(url: &Url) -> Option<VideoId> {
    let host = url.host_str()?;

    if host.contains(SHORT_LINK_HOST) {
        let segment = url.path_segments()?.find(|s| !s.is_empty())?;
        return segment.parse().ok();
    }

    url.query_pairs()
        .find(|(k, _)| k == "v")
        .and_then(|(_, v)| v.trim().parse().ok())
}

fn from_text(text: &str) -> Option<VideoId> {
    id_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Pulls a video identifier out of whatever the user pasted.
///
/// Well-formed URLs are inspected structurally first. Anything else, including
/// links without a scheme, goes through a pattern scan of the raw text.
/// `None` is the normal answer for partial input and is not an error.
pub fn extract_video_id(raw: &str) -> Option<VideoId> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    Url::parse(text)
        .ok()
        .and_then(|url| from_url(&url))
        .or_else(|| from_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> Option<String> {
        extract_video_id(raw).map(|v| v.to_string())
    }

    #[test]
    fn long_form_links() {
        assert_eq!(
            id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42s").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("   https://youtube.com/watch?v=dQw4w9WgXcQ&list=PL123  \n").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn short_links() {
        assert_eq!(id("https://youtu.be/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            id("https://youtu.be/dQw4w9WgXcQ?si=abcdef&t=10").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn links_without_scheme_use_pattern_scan() {
        assert_eq!(id("youtu.be/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            id("www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("check this out: youtube.com/watch?app=desktop&v=a_b-c1234 !!").as_deref(),
            Some("a_b-c1234")
        );
    }

    #[test]
    fn nothing_to_find() {
        assert_eq!(id(""), None);
        assert_eq!(id("    "), None);
        assert_eq!(id("https://example.com/some/page"), None);
        assert_eq!(id("https://www.youtube.com/watch"), None);
        assert_eq!(id("https://youtu.be/"), None);
        assert_eq!(id("https://youtu.be/abc"), None);
        assert_eq!(id("not a link at all"), None);
        assert_eq!(id("http://[::1"), None);
    }

    #[test]
    fn video_id_validation() {
        assert!("dQw4w9WgXcQ".parse::<VideoId>().is_ok());
        assert!("short".parse::<VideoId>().is_err());
        assert!("has space!".parse::<VideoId>().is_err());

        let v: VideoId = "dQw4w9WgXcQ".parse().unwrap();
        assert_eq!(v.watch_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }
}
