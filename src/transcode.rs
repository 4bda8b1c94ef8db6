use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("could not start transcoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
    #[error("transcoder exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("transcoder produced no output")]
    EmptyOutput,
}

/// Target encoding. The channel layout of the source is kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    pub format: String,
    pub sample_rate: u32,
    pub bitrate: String,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            format: "mp3".to_string(),
            sample_rate: 44_100,
            bitrate: "192k".to_string(),
        }
    }
}

/// Turns raw media bytes into encoded audio.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: Bytes,
        container_hint: &str,
        options: &TranscodeOptions,
    ) -> Result<Bytes, TranscodeError>;
}

/// Runs `ffmpeg`, feeding it through stdin and reading the result from
/// stdout.
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Maps a mime type or container name onto an ffmpeg demuxer.
fn demuxer_for(container_hint: &str) -> Option<&'static str> {
    let hint = container_hint.to_ascii_lowercase();
    if hint.contains("webm") {
        Some("webm")
    } else if hint.contains("mp4") || hint.contains("m4a") {
        Some("mp4")
    } else if hint.contains("ogg") || hint.contains("opus") {
        Some("ogg")
    } else if hint.contains("mpeg") || hint.contains("mp3") {
        Some("mp3")
    } else {
        None
    }
}

fn ffmpeg_args(container_hint: &str, options: &TranscodeOptions) -> Vec<String> {
    let mut args = vec!["-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();

    if let Some(demuxer) = demuxer_for(container_hint) {
        args.extend(["-f".to_string(), demuxer.to_string()]);
    }

    let sample_rate = options.sample_rate.to_string();
    for arg in [
        "-i",
        "pipe:0",
        "-vn",
        "-ar",
        sample_rate.as_str(),
        "-b:a",
        options.bitrate.as_str(),
        "-f",
        options.format.as_str(),
        "pipe:1",
    ] {
        args.push(arg.to_string());
    }

    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: Bytes,
        container_hint: &str,
        options: &TranscodeOptions,
    ) -> Result<Bytes, TranscodeError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(ffmpeg_args(container_hint, options))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeError::Spawn)?;

        // Feed stdin from a separate task so a full stdout pipe cannot
        // deadlock the child.
        let mut stdin = child.stdin.take().ok_or_else(|| {
            TranscodeError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "transcoder stdin unavailable",
            ))
        })?;
        let writer = tokio::spawn(async move {
            let res = stdin.write_all(&input).await;
            drop(stdin);
            res
        });

        let output = child.wait_with_output().await?;
        if let Ok(Err(e)) = writer.await {
            // ffmpeg may stop reading early on bad input; its exit status
            // tells the real story.
            debug!("Writing to transcoder stdin failed: {}", e);
        }

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(TranscodeError::EmptyOutput);
        }

        Ok(Bytes::from(output.stdout))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Records calls and returns a canned result.
    pub struct FakeTranscoder {
        pub calls: Mutex<Vec<(usize, String, TranscodeOptions)>>,
        pub fail: bool,
    }

    impl FakeTranscoder {
        pub fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(
            &self,
            input: Bytes,
            container_hint: &str,
            options: &TranscodeOptions,
        ) -> Result<Bytes, TranscodeError> {
            self.calls
                .lock()
                .push((input.len(), container_hint.to_string(), options.clone()));
            if self.fail {
                return Err(TranscodeError::Failed {
                    code: Some(1),
                    stderr: "Invalid data found when processing input".to_string(),
                });
            }
            Ok(Bytes::from_static(b"ID3fake-mp3"))
        }
    }

    #[test]
    fn demuxers() {
        assert_eq!(demuxer_for("audio/webm; codecs=\"opus\""), Some("webm"));
        assert_eq!(demuxer_for("audio/mp4"), Some("mp4"));
        assert_eq!(demuxer_for("M4A"), Some("mp4"));
        assert_eq!(demuxer_for("audio/mpeg"), Some("mp3"));
        assert_eq!(demuxer_for("flac"), None);
        assert_eq!(demuxer_for(""), None);
    }

    #[test]
    fn default_args() {
        let args = ffmpeg_args("audio/webm", &TranscodeOptions::default());
        assert_eq!(
            args.join(" "),
            "-hide_banner -loglevel error -f webm -i pipe:0 -vn -ar 44100 -b:a 192k -f mp3 pipe:1"
        );
        assert!(!args.iter().any(|a| a == "-ac"), "Channel count must not change");
    }

    #[test]
    fn unknown_container_lets_ffmpeg_probe() {
        let args = ffmpeg_args("", &TranscodeOptions::default());
        assert_eq!(args[3], "-i");
    }

    #[tokio::test]
    async fn missing_binary() {
        let t = FfmpegTranscoder::new("/nonexistent/streamgrab-ffmpeg");
        let err = t
            .transcode(Bytes::from_static(b"data"), "webm", &TranscodeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn(_)));
    }
}
