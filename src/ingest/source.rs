use anyhow::Result;
use std::time::Duration;

use super::file::ReaderSource;
#[cfg(feature = "ingest-http")]
use super::http::HttpMjpegSource;
use super::synthetic::SyntheticCamera;

/// Source URIs with this prefix select the synthetic camera.
pub const STUB_SOURCE_PREFIX: &str = "stub://";

/// Configuration for a capture source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// `stub://<name>`, a local MJPEG file path, `-` for stdin, or `http(s)://...`.
    pub uri: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate for generated and replayed streams.
    pub fps: u32,
    /// Restart a local file at end of stream.
    pub loop_file: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://camera".to_string(),
            width: 640,
            height: 480,
            fps: 24,
            loop_file: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub bytes_read: u64,
    pub source: String,
}

/// Encoded-byte producer feeding a `FrameSink`.
pub struct CaptureSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticCamera),
    Reader(ReaderSource),
    #[cfg(feature = "ingest-http")]
    Http(HttpMjpegSource),
}

impl CaptureSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let backend = if config.uri.starts_with(STUB_SOURCE_PREFIX) {
            SourceBackend::Synthetic(SyntheticCamera::new(config))
        } else if config.uri.starts_with("http://") || config.uri.starts_with("https://") {
            #[cfg(feature = "ingest-http")]
            {
                SourceBackend::Http(HttpMjpegSource::new(config)?)
            }
            #[cfg(not(feature = "ingest-http"))]
            {
                anyhow::bail!("http capture requires the ingest-http feature")
            }
        } else {
            SourceBackend::Reader(ReaderSource::new(config)?)
        };
        Ok(Self { backend })
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.connect(),
            SourceBackend::Reader(source) => source.connect(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.connect(),
        }
    }

    /// Read the next chunk of encoded bytes into `buf`.
    ///
    /// `Ok(0)` means the stream has ended for good; errors mean the source should be
    /// reconnected.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.read_chunk(buf),
            SourceBackend::Reader(source) => source.read_chunk(buf),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.read_chunk(buf),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.is_healthy(),
            SourceBackend::Reader(source) => source.is_healthy(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            SourceBackend::Reader(source) => source.stats(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.stats(),
        }
    }
}

pub(crate) fn frame_interval(fps: u32) -> Duration {
    if fps == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(1_000_000_000 / u64::from(fps))
}
