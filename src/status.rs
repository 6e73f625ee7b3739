// ABOUTME: Readiness probe that asks the proxy for the site until it answers.
// ABOUTME: Plain HTTP/1.1 through hyper with the site URL as the Host header.

use crate::types::SiteUrl;
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("{url} did not become ready within {timeout:?}: {last}")]
    NotReady {
        url: String,
        timeout: Duration,
        last: String,
    },
}

#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Wait until the site answers through the proxy.
    async fn wait_ready(&self, url: &SiteUrl) -> Result<(), StatusError>;
}

/// Polls the proxy over HTTP.
pub struct HttpStatusProbe {
    address: String,
    timeout: Duration,
    interval: Duration,
}

impl HttpStatusProbe {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            interval: Duration::from_secs(1),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One request. `Ok(status)` for any HTTP answer.
    async fn request(&self, url: &SiteUrl) -> Result<u16, String> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| format!("connect to {}: {}", self.address, e))?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| format!("HTTP handshake failed: {e}"))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("status probe connection error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri("/")
            .header("Host", url.as_str())
            .header("User-Agent", concat!("sitewright/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<bytes::Bytes>::new())
            .map_err(|e| format!("failed to build request: {e}"))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = resp.status().as_u16();
        // Drain so the connection closes cleanly.
        let _ = resp.into_body().collect().await;
        Ok(status)
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn wait_ready(&self, url: &SiteUrl) -> Result<(), StatusError> {
        let deadline = Instant::now() + self.timeout;
        let mut last;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt = tokio::time::timeout(remaining, self.request(url)).await;
            last = match attempt {
                Ok(Ok(status)) if (200..400).contains(&status) => {
                    tracing::debug!("{} answered with {}", url, status);
                    return Ok(());
                }
                Ok(Ok(status)) => format!("HTTP {status}"),
                Ok(Err(e)) => e,
                Err(_) => "request timed out".to_string(),
            };
            tracing::debug!("{} not ready yet: {}", url, last);

            if Instant::now() + self.interval >= deadline {
                return Err(StatusError::NotReady {
                    url: url.to_string(),
                    timeout: self.timeout,
                    last,
                });
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
