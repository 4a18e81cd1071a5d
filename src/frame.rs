//! Frame types shared between the capture side and streaming clients.
//!
//! - `Frame`: one complete encoded JPEG plus its publish sequence number. Immutable.
//! - `DecodedImage`: RGB pixel buffer decoded from a `Frame`. Mutated only by
//!   annotation, and only by whoever owns it.
//! - `Published`: what the bus hands to subscribers. Read-only once published.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::sync::Arc;

use crate::detect::Detection;

/// JPEG start-of-image marker. Every encoded frame begins with it.
pub const SOI_MARKER: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const EOI_MARKER: [u8; 2] = [0xFF, 0xD9];

/// One complete encoded image from the capture source.
#[derive(Clone, Debug)]
pub struct Frame {
    seq: u64,
    bytes: Arc<[u8]>,
}

impl Frame {
    pub fn new(seq: u64, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            seq,
            bytes: bytes.into(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle on the encoded bytes.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Mutable RGB pixel buffer derived from a `Frame`.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pixels: RgbImage,
}

impl DecodedImage {
    /// Decode a JPEG buffer. Truncated or malformed input is an error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if !bytes.starts_with(&SOI_MARKER) {
            return Err(anyhow!("buffer does not start with a JPEG SOI marker"));
        }
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .context("decode jpeg frame")?;
        Ok(Self {
            pixels: image.into_rgb8(),
        })
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    pub fn into_rgb(self) -> RgbImage {
        self.pixels
    }

    /// Encode as baseline JPEG. `quality` is clamped to 1..=100.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.pixels.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode_image(&self.pixels)
            .context("encode jpeg frame")?;
        Ok(out)
    }
}

/// One publish step's output: the camera frame, its decoded pixels, and the
/// annotated JPEG every streaming client sends.
#[derive(Debug)]
pub struct Published {
    pub frame: Frame,
    pub image: Arc<DecodedImage>,
    pub annotated: Arc<[u8]>,
    pub detections: Vec<Detection>,
    /// Set when detection failed and `annotated` is a fallback.
    pub stale: bool,
}

impl Published {
    pub fn seq(&self) -> u64 {
        self.frame.seq()
    }
}
