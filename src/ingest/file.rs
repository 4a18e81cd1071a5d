//! Byte-stream sources: local MJPEG files and stdin.
//!
//! A concatenated-JPEG file is replayed at the configured frame rate (pacing on
//! start-of-image markers as they pass through). Stdin is read as fast as the
//! producer writes, which suits a camera tool piping MJPEG into the daemon.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::time::Instant;

use crate::frame::SOI_MARKER;

use super::source::{frame_interval, SourceConfig, SourceStats};

/// Source URI selecting stdin.
pub const STDIN_SOURCE: &str = "-";

enum Input {
    File(PathBuf),
    Stdin,
}

pub(crate) struct ReaderSource {
    config: SourceConfig,
    input: Input,
    reader: Option<Box<dyn Read + Send>>,
    last_byte: Option<u8>,
    next_due: Option<Instant>,
    frames_seen: u64,
    bytes_read: u64,
    connected_at: Option<Instant>,
    read_since_open: bool,
    finished: bool,
}

impl ReaderSource {
    pub(crate) fn new(config: SourceConfig) -> Result<Self> {
        let input = if config.uri == STDIN_SOURCE {
            Input::Stdin
        } else {
            let path = PathBuf::from(config.uri.strip_prefix("file://").unwrap_or(&config.uri));
            if !path.is_file() {
                return Err(anyhow!("capture file {} does not exist", path.display()));
            }
            Input::File(path)
        };
        Ok(Self {
            config,
            input,
            reader: None,
            last_byte: None,
            next_due: None,
            frames_seen: 0,
            bytes_read: 0,
            connected_at: None,
            read_since_open: false,
            finished: false,
        })
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        self.reader = Some(self.open()?);
        self.read_since_open = false;
        self.connected_at = Some(Instant::now());
        log::info!("capture source {} opened", self.describe());
        Ok(())
    }

    /// Read the next chunk. `Ok(0)` means the stream is over for good.
    pub(crate) fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.finished {
            return Ok(0);
        }
        loop {
            let reader = self
                .reader
                .as_mut()
                .ok_or_else(|| anyhow!("capture source not connected; call connect() first"))?;
            let n = reader.read(buf).context("read capture stream")?;
            if n > 0 {
                self.read_since_open = true;
                self.bytes_read += n as u64;
                let markers = self.count_markers(&buf[..n]);
                self.pace(markers);
                return Ok(n);
            }
            match self.input {
                // An empty pass means the file has nothing to replay.
                Input::File(_) if self.config.loop_file && self.read_since_open => {
                    log::debug!("capture file {} rewound", self.describe());
                    self.reader = Some(self.open()?);
                    self.read_since_open = false;
                    self.last_byte = None;
                }
                _ => {
                    self.finished = true;
                    log::info!("capture source {} reached end of stream", self.describe());
                    return Ok(0);
                }
            }
        }
    }

    /// A pipe may legitimately go quiet; only the end of the stream is unhealthy.
    pub(crate) fn is_healthy(&self) -> bool {
        !self.finished && self.connected_at.is_some()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_seen,
            bytes_read: self.bytes_read,
            source: self.describe(),
        }
    }

    fn describe(&self) -> String {
        match &self.input {
            Input::File(path) => path.display().to_string(),
            Input::Stdin => "stdin".to_string(),
        }
    }

    fn open(&self) -> Result<Box<dyn Read + Send>> {
        match &self.input {
            Input::File(path) => {
                let file = File::open(path)
                    .with_context(|| format!("open capture file {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
            Input::Stdin => Ok(Box::new(std::io::stdin())),
        }
    }

    fn count_markers(&mut self, chunk: &[u8]) -> u64 {
        let mut count = 0;
        let mut prev = self.last_byte;
        for &byte in chunk {
            if prev == Some(SOI_MARKER[0]) && byte == SOI_MARKER[1] {
                count += 1;
            }
            prev = Some(byte);
        }
        self.last_byte = prev;
        self.frames_seen += count;
        count
    }

    /// Files replay at the configured rate; live pipes are never throttled.
    fn pace(&mut self, frames: u64) {
        if frames == 0 || matches!(self.input, Input::Stdin) {
            return;
        }
        let interval = frame_interval(self.config.fps);
        for _ in 0..frames {
            let now = Instant::now();
            let due = self.next_due.unwrap_or(now);
            if due > now {
                std::thread::sleep(due - now);
            }
            self.next_due = Some(due.max(now) + interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::jpeg_with_square;

    fn config(uri: &str, loop_file: bool) -> SourceConfig {
        SourceConfig {
            uri: uri.to_string(),
            width: 16,
            height: 16,
            fps: 1000,
            loop_file,
        }
    }

    fn mjpeg_file(frames: usize) -> tempfile::NamedTempFile {
        let mut data = Vec::new();
        for _ in 0..frames {
            data.extend_from_slice(&jpeg_with_square(16, 16, None));
        }
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), data).unwrap();
        file
    }

    #[test]
    fn reads_file_to_end_and_counts_frames() {
        let file = mjpeg_file(3);
        let mut source = ReaderSource::new(config(file.path().to_str().unwrap(), false)).unwrap();
        source.connect().unwrap();

        let mut buf = [0u8; 64];
        let mut total = 0;
        loop {
            let n = source.read_chunk(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total as u64, std::fs::metadata(file.path()).unwrap().len());
        assert_eq!(source.stats().frames_read, 3);
        assert!(!source.is_healthy());
    }

    #[test]
    fn looping_file_rewinds() {
        let file = mjpeg_file(1);
        let len = std::fs::metadata(file.path()).unwrap().len() as usize;
        let mut source = ReaderSource::new(config(file.path().to_str().unwrap(), true)).unwrap();
        source.connect().unwrap();

        let mut buf = vec![0u8; 4096];
        let mut total = 0;
        while total < len * 3 {
            let n = source.read_chunk(&mut buf).unwrap();
            assert!(n > 0);
            total += n;
        }
        assert!(source.stats().frames_read >= 3);
    }

    #[test]
    fn empty_looping_file_ends_instead_of_spinning() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut source = ReaderSource::new(config(file.path().to_str().unwrap(), true)).unwrap();
        source.connect().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let _ = tx.send(source.read_chunk(&mut buf).map_err(|e| e.to_string()));
        });
        let result = rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("read_chunk returned");
        assert_eq!(result, Ok(0));
    }

    #[test]
    fn missing_file_is_rejected() {
        assert!(ReaderSource::new(config("/nonexistent/capture.mjpg", false)).is_err());
    }
}
