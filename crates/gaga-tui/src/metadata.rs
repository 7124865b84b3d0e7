//! Now-playing providers.
//!
//! - [`ApiSource`] polls a stream's JSON metadata endpoint.
//! - [`IcySource`] reads the in-band `StreamTitle` tag from the audio stream.
//!
//! The two are independent.  Either may come back empty or fail while the
//! other succeeds; the refresh loop merges whatever arrives.

use std::future::Future;
use std::time::{Duration, Instant};

use gaga_proto::nowplaying::{parse_icy, parse_metadata_json, parse_stream_title, TrackInfo};
use gaga_proto::protocol::Stream;
use reqwest::header::HeaderValue;
use tracing::debug;

/// Largest `icy-metaint` we are willing to buffer.
const MAX_METAINT: usize = 256_000;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("request timed out")]
    Timeout,
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unrecognized metadata payload from {0}")]
    Decode(String),
    #[error("stream: {0}")]
    Stream(String),
}

/// A single now-playing provider.
pub trait TrackSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the provider has nothing for this stream (not an
    /// error).  Errors are reported per stream and never abort a tick.
    fn fetch(
        &self,
        stream: &Stream,
    ) -> impl Future<Output = Result<Option<TrackInfo>, MetadataError>> + Send;
}

pub fn http_client(request_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("radio-gaga/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(request_timeout)
        .build()
}

// ── API provider ──────────────────────────────────────────────────────────────

pub struct ApiSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl ApiSource {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl TrackSource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self, stream: &Stream) -> Result<Option<TrackInfo>, MetadataError> {
        let Some(url) = stream.metadata_url.as_deref() else {
            return Ok(None);
        };

        let request = async {
            let resp = self.client.get(url).send().await?.error_for_status()?;
            resp.json::<serde_json::Value>().await
        };
        let json = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| MetadataError::Timeout)??;

        let info = parse_metadata_json(&json, stream.metadata_channel.as_deref())
            .ok_or_else(|| MetadataError::Decode(url.to_string()))?;
        debug!("api: {} → {:?}", stream.name, info);
        Ok(Some(info))
    }
}

// ── ICY tag provider ──────────────────────────────────────────────────────────

pub struct IcySource {
    client: reqwest::Client,
    timeout: Duration,
    max_blocks: usize,
}

impl IcySource {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            max_blocks: 2,
        }
    }
}

impl TrackSource for IcySource {
    fn name(&self) -> &'static str {
        "icy"
    }

    async fn fetch(&self, stream: &Stream) -> Result<Option<TrackInfo>, MetadataError> {
        let deadline = Instant::now() + self.timeout;
        let req = self
            .client
            .get(&stream.url)
            .header("Icy-MetaData", HeaderValue::from_static("1"))
            .send();
        let mut resp = tokio::time::timeout(self.timeout, req)
            .await
            .map_err(|_| MetadataError::Timeout)??
            .error_for_status()?;

        let metaint = resp
            .headers()
            .get("icy-metaint")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<usize>().ok());
        let Some(metaint) = metaint else {
            return Ok(None);
        };
        if !(1..=MAX_METAINT).contains(&metaint) {
            return Err(MetadataError::Stream(format!("invalid icy-metaint={}", metaint)));
        }

        let title = read_stream_title(&mut resp, metaint, deadline, self.max_blocks).await?;
        Ok(title.map(|t| {
            let (artist, title) = parse_icy(&t);
            TrackInfo::new(artist, title, None)
        }))
    }
}

/// Pull chunks until `buf` holds at least `needed` bytes.
async fn fill(
    resp: &mut reqwest::Response,
    buf: &mut Vec<u8>,
    needed: usize,
    deadline: Instant,
) -> Result<(), MetadataError> {
    while buf.len() < needed {
        let remain = deadline.saturating_duration_since(Instant::now());
        if remain.is_zero() {
            return Err(MetadataError::Timeout);
        }
        match tokio::time::timeout(remain, resp.chunk())
            .await
            .map_err(|_| MetadataError::Timeout)??
        {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => {
                return Err(MetadataError::Stream(
                    "stream ended before ICY metadata".to_string(),
                ))
            }
        }
    }
    Ok(())
}

/// Skip audio blocks and return the first non-empty `StreamTitle` within
/// `max_blocks` metadata intervals.
async fn read_stream_title(
    resp: &mut reqwest::Response,
    metaint: usize,
    deadline: Instant,
    max_blocks: usize,
) -> Result<Option<String>, MetadataError> {
    let mut buf: Vec<u8> = Vec::with_capacity((metaint + 1024).min(128 * 1024));

    for _ in 0..max_blocks {
        fill(resp, &mut buf, metaint + 1, deadline).await?;
        let meta_len = buf[metaint] as usize * 16;

        let meta_start = metaint + 1;
        let meta_end = meta_start + meta_len;
        fill(resp, &mut buf, meta_end, deadline).await?;

        if let Some(title) = parse_stream_title(&buf[meta_start..meta_end]) {
            return Ok(Some(title));
        }
        // keep only the bytes past this block
        buf.drain(..meta_end);
    }
    Ok(None)
}

// ── error throttle ────────────────────────────────────────────────────────────

/// Lets at most one user-visible error through per window, however often the
/// underlying request fails.
#[derive(Debug)]
pub struct ErrorThrottle {
    window: Duration,
    last_shown: Option<Instant>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_shown: None,
        }
    }

    pub fn should_notify(&mut self, now: Instant) -> bool {
        match self.last_shown {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_shown = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests;
