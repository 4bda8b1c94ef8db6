use std::{path::Path, time::Duration};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::progress::{format_bytes, ProgressSink};

const USER_AGENT: &str = concat!("streamgrab/", env!("CARGO_PKG_VERSION"));

#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP operations the failover and download paths rely on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a HEAD request and reports the status code.
    async fn head(&self, url: &str) -> Result<u16, HttpError>;

    /// Issues a GET request against an API mirror.
    async fn get(&self, url: &str) -> Result<RawResponse, HttpError>;

    /// Fetches a media file, reporting progress as bytes arrive.
    async fn download(
        &self,
        url: &str,
        _progress: &dyn ProgressSink,
    ) -> Result<RawResponse, HttpError> {
        self.get(url).await
    }
}

/// reqwest-backed [`Transport`].
///
/// API calls go through a client without retries: failover between mirrors
/// is the only retry mechanism for them. Media downloads hit CDN URLs and use
/// a client that retries transient errors.
pub struct HttpClient {
    pub api: ClientWithMiddleware,
    pub media: ClientWithMiddleware,
}

impl HttpClient {
    pub fn new(request_timeout: Duration, download_timeout: Duration) -> reqwest::Result<Self> {
        let api = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .build()?;
        let api = reqwest_middleware::ClientBuilder::new(api).build();

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let media = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(request_timeout)
            .timeout(download_timeout)
            .build()?;
        let media = reqwest_middleware::ClientBuilder::new(media)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(HttpClient { api, media })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn head(&self, url: &str) -> Result<u16, HttpError> {
        let resp = self.api.head(url).send().await?;
        Ok(resp.status().as_u16())
    }

    async fn get(&self, url: &str) -> Result<RawResponse, HttpError> {
        let resp = self.api.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;

        Ok(RawResponse { status, body })
    }

    async fn download(
        &self,
        url: &str,
        progress: &dyn ProgressSink,
    ) -> Result<RawResponse, HttpError> {
        let mut resp = self.media.get(url).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Ok(RawResponse {
                status,
                body: Bytes::new(),
            });
        }

        let total = resp.content_length();
        let mut body = BytesMut::with_capacity(total.unwrap_or(0) as usize);
        while let Some(chunk) = resp.chunk().await? {
            body.extend_from_slice(&chunk);
            progress.update("Downloading", body.len() as u64, total);
        }
        debug!("Downloaded {} from {}", format_bytes(body.len() as u64), url);

        Ok(RawResponse {
            status,
            body: body.freeze(),
        })
    }
}

/// Writes `data` to a temporary file next to `path`, then renames it into
/// place.
pub async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<usize> {
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");

    let mut file = File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    tokio::fs::rename(&temp_path, path).await?;

    Ok(data.len())
}
