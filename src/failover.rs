//! Mirror resolution and the one-rotation retry around API requests.
//!
//! Resolution returns the cached healthy mirror when there is one. Otherwise
//! every configured mirror is probed at once, all probes are allowed to
//! settle, and the first healthy answer to arrive is cached and used. A
//! request that fails invalidates the mirror it went through, if that mirror
//! is still the cached one, which also moves the rotation cursor. The request
//! is then retried exactly once against a freshly resolved mirror.

use std::{sync::Arc, time::Duration};

use futures::{stream::FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;

use crate::{
    client::{HttpError, Transport},
    health::{HealthCache, MirrorEndpoint},
    streams::{self, VideoMetadata},
    video_id::VideoId,
};

pub const DEFAULT_PROBE_PATH: &str = "/api/v1/trending";

const MAX_ATTEMPTS: usize = 2;
const STATUS_NOT_FOUND: u16 = 404;

/// Why a single request against a mirror did not produce a document.
#[derive(thiserror::Error, Debug)]
pub enum RequestFailure {
    #[error("transport error: {0}")]
    Transport(#[from] HttpError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("none of the {mirrors} configured mirrors answered the health probe")]
    AllEndpointsUnreachable { mirrors: usize },
    #[error("upstream request failed after {attempts} attempts")]
    UpstreamRequestFailed {
        attempts: usize,
        #[source]
        last: RequestFailure,
    },
}

pub struct Failover<T> {
    transport: T,
    health: Arc<HealthCache>,
    probe_path: String,
    timeout: Duration,
}

fn is_healthy_status(status: u16) -> bool {
    // A 404 on the probe path still proves the mirror is up and answering.
    (200..300).contains(&status) || status == STATUS_NOT_FOUND
}

impl<T: Transport> Failover<T> {
    pub fn new(
        transport: T,
        health: Arc<HealthCache>,
        probe_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            health,
            probe_path: probe_path.into(),
            timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn health(&self) -> &Arc<HealthCache> {
        &self.health
    }

    async fn probe(&self, endpoint: &MirrorEndpoint) -> bool {
        let url = endpoint.join(&self.probe_path);
        match tokio::time::timeout(self.timeout, self.transport.head(&url)).await {
            Ok(Ok(status)) => {
                debug!("Probe {} -> HTTP {}", url, status);
                is_healthy_status(status)
            }
            Ok(Err(e)) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
            Err(_) => {
                debug!("Probe {} timed out", url);
                false
            }
        }
    }

    /// Returns a mirror believed to be healthy, probing only when nothing is
    /// cached.
    pub async fn resolve_endpoint(&self) -> Result<MirrorEndpoint, FetchError> {
        if let Some(endpoint) = self.health.cached_healthy() {
            return Ok(endpoint);
        }

        let generation = self.health.generation();
        let mut probes = self
            .health
            .probe_order()
            .into_iter()
            .map(|endpoint| async move {
                let healthy = self.probe(&endpoint).await;
                (endpoint, healthy)
            })
            .collect::<FuturesUnordered<_>>();

        // Drain every probe; the first healthy one to settle wins.
        let mut winner = None;
        while let Some((endpoint, healthy)) = probes.next().await {
            if healthy && winner.is_none() {
                winner = Some(endpoint);
            }
        }

        match winner {
            Some(endpoint) => {
                info!("Using mirror {}", endpoint);
                self.health.mark_healthy_since(&endpoint, generation);
                Ok(endpoint)
            }
            None => {
                error!("All {} mirrors failed the health probe", self.health.len());
                Err(FetchError::AllEndpointsUnreachable {
                    mirrors: self.health.len(),
                })
            }
        }
    }

    async fn request<D: DeserializeOwned>(
        &self,
        endpoint: &MirrorEndpoint,
        path: &str,
    ) -> Result<D, RequestFailure> {
        let url = endpoint.join(path);
        let resp = tokio::time::timeout(self.timeout, self.transport.get(&url))
            .await
            .map_err(|_| RequestFailure::Timeout(self.timeout))??;

        if !resp.is_success() {
            return Err(RequestFailure::Status(resp.status));
        }

        Ok(serde_json::from_slice(&resp.body)?)
    }

    /// Fetches `path` from a healthy mirror and decodes the JSON body.
    ///
    /// Makes at most two attempts. Each failed attempt invalidates the mirror
    /// it went through, moving the rotation cursor one step, but only if that
    /// mirror is still the cached one; a fresher entry cached meanwhile by a
    /// concurrent lookup is kept and used for the retry.
    pub async fn fetch_json<D: DeserializeOwned>(&self, path: &str) -> Result<D, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let endpoint = self.resolve_endpoint().await?;

            let failure = match self.request(&endpoint, path).await {
                Ok(doc) => return Ok(doc),
                Err(failure) => failure,
            };

            warn!(
                "Request {} via {} failed (attempt {}/{}): {}",
                path, endpoint, attempt, MAX_ATTEMPTS, failure
            );
            self.health.mark_unhealthy_if(&endpoint);

            if attempt >= MAX_ATTEMPTS {
                return Err(FetchError::UpstreamRequestFailed {
                    attempts: attempt,
                    last: failure,
                });
            }
        }
    }

    pub async fn fetch_streams(&self, id: &VideoId) -> Result<VideoMetadata, FetchError> {
        self.fetch_json(&streams::streams_path(id)).await
    }
}
