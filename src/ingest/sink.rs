use std::sync::Arc;
use std::time::Instant;

use crate::bus::FrameBus;
use crate::frame::{DecodedImage, Frame, EOI_MARKER, SOI_MARKER};
use crate::pipeline::DetectionPipeline;

/// Upper bound on one accumulated frame. A partial frame that grows past it is
/// dropped and accumulation resumes at the next start-of-image marker.
pub const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub bytes_in: u64,
    pub published: u64,
    /// Frames dropped as truncated, undecodable or oversized.
    pub discarded: u64,
    /// Bytes seen outside any frame (before the first marker, multipart headers).
    pub skipped_bytes: u64,
}

/// Accumulates encoded bytes from the capture source and publishes complete frames.
///
/// A frame starts at a JPEG start-of-image marker and ends where the next one
/// begins (or at `flush`). Each finished buffer is trimmed to its last
/// end-of-image marker, decoded, run through the detection pipeline and published;
/// anything that fails along the way is counted and dropped. Sequence numbers are
/// assigned only to frames that decode, so published sequences are gap-free.
pub struct FrameSink {
    bus: Arc<FrameBus>,
    pipeline: DetectionPipeline,
    buffer: Vec<u8>,
    next_seq: u64,
    stats: SinkStats,
    last_publish_at: Option<Instant>,
}

impl FrameSink {
    pub fn new(bus: Arc<FrameBus>, pipeline: DetectionPipeline) -> Self {
        Self {
            bus,
            pipeline,
            buffer: Vec::with_capacity(256 * 1024),
            next_seq: 1,
            stats: SinkStats::default(),
            last_publish_at: None,
        }
    }

    /// Feed one chunk of bytes. Always consumes the whole chunk.
    pub fn ingest(&mut self, chunk: &[u8]) -> usize {
        if chunk.is_empty() {
            return 0;
        }
        self.stats.bytes_in += chunk.len() as u64;

        // One byte back so a marker split across chunks is still found.
        let mut search = self.buffer.len().saturating_sub(1);
        self.buffer.extend_from_slice(chunk);

        while let Some(offset) = find_marker(&self.buffer[search..], SOI_MARKER) {
            let at = search + offset;
            if at > 0 {
                let previous: Vec<u8> = self.buffer.drain(..at).collect();
                if previous.starts_with(&SOI_MARKER) {
                    self.finalize(previous);
                } else {
                    self.stats.skipped_bytes += previous.len() as u64;
                }
            }
            search = SOI_MARKER.len();
        }

        if !self.buffer.starts_with(&SOI_MARKER) {
            self.keep_tail();
        } else if self.buffer.len() > MAX_FRAME_BYTES {
            self.stats.discarded += 1;
            log::debug!(
                "frame exceeded {} bytes; dropping partial buffer",
                MAX_FRAME_BYTES
            );
            self.keep_tail();
        }
        chunk.len()
    }

    /// Finalize the trailing frame at end of stream.
    pub fn flush(&mut self) {
        let pending = std::mem::take(&mut self.buffer);
        if pending.starts_with(&SOI_MARKER) {
            self.finalize(pending);
        } else {
            self.stats.skipped_bytes += pending.len() as u64;
        }
    }

    /// Drop any partial frame, e.g. after the source reconnects.
    pub fn reset(&mut self) {
        if self.buffer.starts_with(&SOI_MARKER) {
            self.stats.discarded += 1;
        }
        self.buffer.clear();
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    pub fn bus(&self) -> &Arc<FrameBus> {
        &self.bus
    }

    pub fn last_publish_at(&self) -> Option<Instant> {
        self.last_publish_at
    }

    /// Keep at most a trailing `0xFF`, which may be the first half of a marker.
    fn keep_tail(&mut self) {
        let keep = usize::from(self.buffer.last() == Some(&SOI_MARKER[0]));
        let drop = self.buffer.len() - keep;
        self.stats.skipped_bytes += drop as u64;
        self.buffer.drain(..drop);
    }

    fn finalize(&mut self, mut bytes: Vec<u8>) {
        let Some(end) = rfind_marker(&bytes, EOI_MARKER) else {
            self.stats.discarded += 1;
            log::debug!("discarding truncated frame ({} bytes, no EOI)", bytes.len());
            return;
        };
        bytes.truncate(end + EOI_MARKER.len());

        let image = match DecodedImage::decode(&bytes) {
            Ok(image) => image,
            Err(err) => {
                self.stats.discarded += 1;
                log::debug!("discarding undecodable frame ({} bytes): {:#}", bytes.len(), err);
                return;
            }
        };

        let frame = Frame::new(self.next_seq, bytes);
        let published = self.pipeline.process(frame, image);
        if self.bus.publish(published) {
            self.next_seq += 1;
            self.stats.published += 1;
            self.last_publish_at = Some(Instant::now());
        }
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

fn rfind_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).rposition(|w| w == marker)
}
