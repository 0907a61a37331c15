//! Camera frame fetching.
//!
//! A camera URL serves either one still image per request or an MJPEG
//! stream (`multipart/x-mixed-replace`) that pushes a new JPEG part for
//! every frame over a single long-lived response.  [`HttpFrameSource`]
//! handles both; the stream is read chunk by chunk and split on its
//! boundary as it arrives.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use roverdeck_types::DeckError;
use tokio::sync::mpsc;
use tracing::debug;

use crate::link::FrameSource;

/// Largest multipart part buffered while waiting for its end.
pub const MAX_PART_BYTES: usize = 4 * 1024 * 1024;

/// Append a `t=<unix millis>` query parameter so every fetch bypasses
/// intermediate caches.
pub fn cache_busted(camera_url: &str) -> String {
    cache_busted_at(camera_url, Utc::now().timestamp_millis())
}

pub(crate) fn cache_busted_at(camera_url: &str, millis: i64) -> String {
    let sep = if camera_url.contains('?') { '&' } else { '?' };
    format!("{camera_url}{sep}t={millis}")
}

/// Boundary of a `multipart/x-mixed-replace` content type, if that is what
/// `content_type` is.
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/x-mixed-replace") {
        return None;
    }
    params
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// MultipartSplitter
// ─────────────────────────────────────────────────────────────────────────────

/// Incremental splitter for a multipart body.
///
/// Feed it chunks in arrival order; it returns the body size of every part
/// completed so far.  A part with a `Content-Length` header completes as
/// soon as that many bytes arrived, otherwise at the next delimiter.
#[derive(Debug)]
pub struct MultipartSplitter {
    delimiter: Vec<u8>,
    buf: Vec<u8>,
    in_part: bool,
}

impl MultipartSplitter {
    pub fn new(boundary: &str) -> Self {
        // Some cameras declare the boundary with its leading dashes already.
        let delimiter = if boundary.starts_with("--") {
            boundary.to_string()
        } else {
            format!("--{boundary}")
        };
        Self {
            delimiter: delimiter.into_bytes(),
            buf: Vec::new(),
            in_part: false,
        }
    }

    /// Consume `chunk` and return the sizes of the parts it completed.
    ///
    /// Fails once a single part grows past [`MAX_PART_BYTES`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<usize>, String> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            if !self.in_part {
                match find(&self.buf, &self.delimiter) {
                    Some(pos) => {
                        self.buf.drain(..pos + self.delimiter.len());
                        self.in_part = true;
                    }
                    None => {
                        let keep = self.delimiter.len().saturating_sub(1);
                        if self.buf.len() > keep {
                            self.buf.drain(..self.buf.len() - keep);
                        }
                        break;
                    }
                }
                continue;
            }

            let Some(head_end) = find(&self.buf, b"\r\n\r\n") else {
                self.check_size()?;
                break;
            };
            let body_start = head_end + 4;
            match content_length(&self.buf[..head_end]) {
                Some(len) if len > MAX_PART_BYTES => {
                    return Err(format!("part of {len} bytes exceeds {MAX_PART_BYTES}"));
                }
                Some(len) => {
                    if self.buf.len() < body_start + len {
                        break;
                    }
                    if len > 0 {
                        frames.push(len);
                    }
                    self.buf.drain(..body_start + len);
                }
                None => {
                    let Some(end) = find(&self.buf[body_start..], &self.delimiter) else {
                        self.check_size()?;
                        break;
                    };
                    let body = &self.buf[body_start..body_start + end];
                    let body = body.strip_suffix(b"\r\n").unwrap_or(body);
                    if !body.is_empty() {
                        frames.push(body.len());
                    }
                    // The delimiter stays in the buffer and opens the next part.
                    self.buf.drain(..body_start + end);
                }
            }
            self.in_part = false;
        }
        Ok(frames)
    }

    fn check_size(&self) -> Result<(), String> {
        if self.buf.len() > MAX_PART_BYTES {
            Err(format!("part exceeds {MAX_PART_BYTES} bytes without ending"))
        } else {
            Ok(())
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn content_length(head: &[u8]) -> Option<usize> {
    String::from_utf8_lossy(head)
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpFrameSource
// ─────────────────────────────────────────────────────────────────────────────

/// [`FrameSource`] that `GET`s the camera URL over HTTP.
#[derive(Clone, Default)]
pub struct HttpFrameSource {
    client: reqwest::Client,
}

impl HttpFrameSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn stream_frames(&self, url: &str, frames: mpsc::Sender<usize>) -> Result<(), DeckError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DeckError::Network(format!("{url}: {e}")))?;

        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(multipart_boundary);

        let Some(boundary) = boundary else {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| DeckError::Network(format!("{url}: reading frame: {e}")))?;
            if bytes.is_empty() {
                return Err(DeckError::Protocol(format!("{url}: empty frame")));
            }
            let _ = frames.send(bytes.len()).await;
            return Ok(());
        };

        debug!(%url, %boundary, "camera serves a multipart stream");
        let mut splitter = MultipartSplitter::new(&boundary);
        let mut seen = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DeckError::Network(format!("{url}: reading stream: {e}")))?
        {
            let sizes = splitter
                .push(&chunk)
                .map_err(|e| DeckError::Protocol(format!("{url}: {e}")))?;
            for size in sizes {
                seen += 1;
                if frames.send(size).await.is_err() {
                    return Ok(());
                }
            }
        }

        if seen == 0 {
            return Err(DeckError::Protocol(format!("{url}: stream ended before the first frame")));
        }
        Ok(())
    }
}
