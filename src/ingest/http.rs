//! HTTP MJPEG pull source (feature `ingest-http`).
//!
//! Multipart responses are passed through as raw bytes; the frame sink skips the
//! part headers between images. A plain `image/jpeg` response is treated as a
//! snapshot endpoint and polled at the configured frame rate.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};
use url::Url;

use crate::frame::SOI_MARKER;
use crate::ingest::sink::MAX_FRAME_BYTES;

use super::source::{frame_interval, SourceConfig, SourceStats};

enum HttpStream {
    Multipart(Box<dyn Read + Send>),
    Snapshot,
}

pub(crate) struct HttpMjpegSource {
    config: SourceConfig,
    stream: Option<HttpStream>,
    pending: Vec<u8>,
    cursor: usize,
    next_due: Option<Instant>,
    connected_at: Option<Instant>,
    last_data_at: Option<Instant>,
    frames_read: u64,
    bytes_read: u64,
}

impl HttpMjpegSource {
    pub(crate) fn new(config: SourceConfig) -> Result<Self> {
        let url = Url::parse(&config.uri).context("parse capture url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported capture scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        Ok(Self {
            config,
            stream: None,
            pending: Vec::new(),
            cursor: 0,
            next_due: None,
            connected_at: None,
            last_data_at: None,
            frames_read: 0,
            bytes_read: 0,
        })
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.config.uri)
            .call()
            .context("connect to http capture stream")?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        self.stream = Some(if content_type.contains("multipart") {
            HttpStream::Multipart(response.into_reader())
        } else {
            HttpStream::Snapshot
        });
        self.pending.clear();
        self.cursor = 0;
        self.connected_at = Some(Instant::now());
        log::info!("http capture connected to {} ({})", self.config.uri, content_type);
        Ok(())
    }

    /// A closed connection is an error so the capture loop reconnects.
    pub(crate) fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("http capture not connected; call connect() first"))?;
        let n = match stream {
            HttpStream::Multipart(reader) => {
                let n = reader.read(buf).context("read mjpeg stream")?;
                if n == 0 {
                    self.stream = None;
                    return Err(anyhow!("mjpeg stream ended"));
                }
                n
            }
            HttpStream::Snapshot => {
                if self.cursor >= self.pending.len() {
                    wait_until(&mut self.next_due, frame_interval(self.config.fps));
                    self.pending = fetch_snapshot(&self.config.uri)?;
                    self.cursor = 0;
                    self.frames_read += 1;
                }
                let n = buf.len().min(self.pending.len() - self.cursor);
                buf[..n].copy_from_slice(&self.pending[self.cursor..self.cursor + n]);
                self.cursor += n;
                n
            }
        };
        self.bytes_read += n as u64;
        self.last_data_at = Some(Instant::now());
        if matches!(self.stream, Some(HttpStream::Multipart(_))) {
            self.frames_read += buf[..n]
                .windows(2)
                .filter(|w| *w == SOI_MARKER)
                .count() as u64;
        }
        Ok(n)
    }

    pub(crate) fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        if self.stream.is_none() {
            return false;
        }
        let grace = health_grace(self.config.fps);
        match self.last_data_at {
            Some(last) => last.elapsed() <= grace,
            None => connected_at.elapsed() <= grace,
        }
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            bytes_read: self.bytes_read,
            source: self.config.uri.clone(),
        }
    }
}

fn fetch_snapshot(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url).call().context("fetch jpeg snapshot")?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_FRAME_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(anyhow!("jpeg snapshot exceeds {} bytes", MAX_FRAME_BYTES));
    }
    Ok(bytes)
}

fn wait_until(next_due: &mut Option<Instant>, interval: Duration) {
    let now = Instant::now();
    let due = next_due.unwrap_or(now);
    if due > now {
        std::thread::sleep(due - now);
    }
    *next_due = Some(due.max(now) + interval);
}

fn health_grace(fps: u32) -> Duration {
    (frame_interval(fps) * 3).max(Duration::from_secs(2))
}
