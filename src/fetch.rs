use std::path::Path;
use std::time::Duration;

use crate::error::{AggregatorError, Result};
use crate::logsink::LogSink;

// ─── Backend fetcher ─────────────────────────────────────────────

/// Fetches snapshot payloads from the monitoring end-points.
///
/// URLs go over HTTP with a per-request timeout and no retries: a failed
/// fetch simply loses that data point and the next interval recovers.
/// Anything that is not an `http(s)` URL is read as a local file, which is
/// how recorded snapshots are replayed in test mode.
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout_secs: f64, insecure: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_secs))
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| {
                AggregatorError::Config(format!("unable to build HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Fetch every URL in order; failures are logged and skipped so the
    /// remaining backends still produce data this tick.
    ///
    /// Returns `(backend identifier, payload)` pairs: the identifier is the
    /// URL itself, or the parent directory for file-based backends.
    pub async fn fetch_all(&self, urls: &[String], sink: &LogSink) -> Vec<(String, Vec<u8>)> {
        let mut payloads = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetch_one(url).await {
                Ok(pair) => payloads.push(pair),
                Err(e @ AggregatorError::HttpStatus { .. }) => sink.error(&e.to_string()),
                Err(e) => sink.exception(&e, &format!("Request failed for URL {url}")),
            }
        }
        payloads
    }

    async fn fetch_one(&self, url: &str) -> Result<(String, Vec<u8>)> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response =
                self.client
                    .get(url)
                    .send()
                    .await
                    .map_err(|source| AggregatorError::Transport {
                        url: url.to_owned(),
                        source,
                    })?;
            let status = response.status();
            if status != reqwest::StatusCode::OK {
                return Err(AggregatorError::HttpStatus {
                    url: url.to_owned(),
                    status: status.as_u16(),
                });
            }
            let body = response
                .bytes()
                .await
                .map_err(|source| AggregatorError::Transport {
                    url: url.to_owned(),
                    source,
                })?;
            Ok((url.to_owned(), body.to_vec()))
        } else {
            let data = std::fs::read(url)?;
            let backend = Path::new(url)
                .parent()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok((backend, data))
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
