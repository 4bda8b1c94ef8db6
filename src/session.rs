use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use bytes::Bytes;

use crate::{
    client::{HttpClient, Transport},
    config::{Config, ConfigError},
    failover::{Failover, FetchError, RequestFailure},
    progress::{format_bytes, ProgressGuard, ProgressSink},
    select::{self, DEFAULT_VIDEO_CONTAINER},
    streams::{StreamDescriptor, VideoMetadata},
    transcode::{FfmpegTranscoder, TranscodeError, TranscodeOptions, Transcoder},
    video_id::{extract_video_id, VideoId},
};

const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_FILE_STEM_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Video,
    Audio,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::Video => f.write_str("video"),
            VariantKind::Audio => f.write_str("audio"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("could not fetch video information")]
    Fetch(#[from] FetchError),
    #[error("no usable {0} stream")]
    NoUsableVariant(VariantKind),
    #[error("could not download audio stream")]
    Download(#[source] RequestFailure),
    #[error("could not convert audio")]
    Transcode(#[from] TranscodeError),
}

impl LookupError {
    /// One-line message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            LookupError::Fetch(FetchError::AllEndpointsUnreachable { .. }) => {
                "The service is unavailable right now. Please try again later.".to_string()
            }
            LookupError::Fetch(FetchError::UpstreamRequestFailed { .. }) => {
                "Could not retrieve video information. Please try again.".to_string()
            }
            LookupError::NoUsableVariant(kind) => {
                format!("No downloadable {} stream is available for this video.", kind)
            }
            LookupError::Download(_) => {
                "Could not download the audio stream. Please try again.".to_string()
            }
            LookupError::Transcode(_) => {
                "Audio conversion failed. Please try again; a different mirror may work better."
                    .to_string()
            }
        }
    }
}

/// Metadata for one video plus the variants picked from it.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub video_id: VideoId,
    pub metadata: VideoMetadata,
    pub video: Option<StreamDescriptor>,
    pub audio: Option<StreamDescriptor>,
}

impl Lookup {
    pub fn video_link(&self) -> Result<&str, LookupError> {
        self.video
            .as_ref()
            .and_then(|v| v.usable_url())
            .ok_or(LookupError::NoUsableVariant(VariantKind::Video))
    }

    pub fn audio_stream(&self) -> Result<&StreamDescriptor, LookupError> {
        self.audio
            .as_ref()
            .filter(|a| a.usable_url().is_some())
            .ok_or(LookupError::NoUsableVariant(VariantKind::Audio))
    }

    pub fn file_name(&self, extension: &str) -> String {
        suggested_file_name(self.metadata.title.as_deref(), &self.video_id, extension)
    }
}

#[derive(Debug)]
pub enum LookupOutcome {
    /// The input holds no recognisable video identifier (yet).
    NoIdentifier,
    /// A newer lookup started before this one finished.
    Superseded,
    Ready(Lookup),
}

/// An encoded audio file ready to be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Drives lookups and audio conversion on behalf of a front end.
pub struct Session<T, X> {
    failover: Failover<T>,
    transcoder: X,
    video_container: String,
    transcode: TranscodeOptions,
    download_timeout: Duration,
    latest: AtomicU64,
}

impl Session<HttpClient, FfmpegTranscoder> {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = HttpClient::new(config.request_timeout(), config.download_timeout())?;
        let failover = Failover::new(
            client,
            config.health_cache()?,
            &config.probe_path,
            config.request_timeout(),
        );

        Ok(Session::new(failover, FfmpegTranscoder::new(&config.ffmpeg_path))
            .with_video_container(&config.video_container)
            .with_transcode_options(config.transcode.clone())
            .with_download_timeout(config.download_timeout()))
    }
}

impl<T: Transport, X: Transcoder> Session<T, X> {
    pub fn new(failover: Failover<T>, transcoder: X) -> Self {
        Self {
            failover,
            transcoder,
            video_container: DEFAULT_VIDEO_CONTAINER.to_string(),
            transcode: TranscodeOptions::default(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            latest: AtomicU64::new(0),
        }
    }

    pub fn with_video_container(mut self, container: &str) -> Self {
        self.video_container = container.to_string();
        self
    }

    pub fn with_transcode_options(mut self, options: TranscodeOptions) -> Self {
        self.transcode = options;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn failover(&self) -> &Failover<T> {
        &self.failover
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    /// Resolves `raw` to a video and picks its best variants.
    ///
    /// Every call supersedes the ones still in flight, including calls whose
    /// input turns out to hold no identifier.
    pub async fn lookup(&self, raw: &str) -> Result<LookupOutcome, LookupError> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(video_id) = extract_video_id(raw) else {
            return Ok(LookupOutcome::NoIdentifier);
        };
        debug!("Looking up {}", video_id);

        let result = self.failover.fetch_streams(&video_id).await;
        if !self.is_current(ticket) {
            debug!("Lookup of {} superseded", video_id);
            return Ok(LookupOutcome::Superseded);
        }
        let metadata = result?;

        let video =
            select::pick_best_muxed(&metadata.muxed_streams, &self.video_container).cloned();
        let audio = select::pick_best_audio(&metadata.audio_streams).cloned();
        if video.is_none() {
            info!("{} has no muxed streams", video_id);
        }
        if audio.is_none() {
            info!("{} has no audio streams", video_id);
        }

        Ok(LookupOutcome::Ready(Lookup {
            video_id,
            metadata,
            video,
            audio,
        }))
    }

    /// Downloads the picked audio stream and converts it.
    ///
    /// `progress` is reset before returning, whatever the outcome.
    pub async fn convert_audio(
        &self,
        lookup: &Lookup,
        progress: &dyn ProgressSink,
    ) -> Result<AudioFile, LookupError> {
        let guard = ProgressGuard::new(progress);
        let stream = lookup.audio_stream()?;
        let url = stream
            .usable_url()
            .ok_or(LookupError::NoUsableVariant(VariantKind::Audio))?;

        guard.update("Downloading", 0, None);
        let resp = tokio::time::timeout(
            self.download_timeout,
            self.failover.transport().download(url, progress),
        )
        .await
        .map_err(|_| LookupError::Download(RequestFailure::Timeout(self.download_timeout)))?
        .map_err(|e| LookupError::Download(e.into()))?;

        if !resp.is_success() {
            return Err(LookupError::Download(RequestFailure::Status(resp.status)));
        }

        guard.update("Converting", resp.body.len() as u64, None);
        let bytes = self
            .transcoder
            .transcode(resp.body, stream.container_hint(), &self.transcode)
            .await?;
        info!(
            "Converted {} to {} of {}",
            lookup.video_id,
            format_bytes(bytes.len() as u64),
            self.transcode.format
        );

        Ok(AudioFile {
            file_name: lookup.file_name(&self.transcode.format),
            bytes,
        })
    }
}

/// Builds a file name from a video title, falling back to the video id.
pub fn suggested_file_name(title: Option<&str>, video_id: &VideoId, extension: &str) -> String {
    let cleaned = title
        .unwrap_or_default()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>();

    let stem = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches('.')
        .chars()
        .take(MAX_FILE_STEM_CHARS)
        .collect::<String>();
    let stem = stem.trim();

    if stem.is_empty() {
        format!("{}.{}", video_id, extension)
    } else {
        format!("{}.{}", stem, extension)
    }
}
