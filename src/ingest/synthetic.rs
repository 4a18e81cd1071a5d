//! Synthetic camera for `stub://` sources.
//!
//! Produces real JPEG frames of a dark scene with one bright square drifting up and
//! down, which is what the bright-region stub detectors look for.

use anyhow::Result;
use image::{Rgb, RgbImage};
use rand::Rng;
use std::time::Instant;

use crate::frame::DecodedImage;

use super::source::{frame_interval, SourceConfig, SourceStats};

const BACKGROUND: Rgb<u8> = Rgb([24, 28, 32]);
const TARGET: Rgb<u8> = Rgb([245, 245, 245]);
const SYNTHETIC_QUALITY: u8 = 80;

pub(crate) struct SyntheticCamera {
    config: SourceConfig,
    pending: Vec<u8>,
    cursor: usize,
    next_due: Option<Instant>,
    target_y: f32,
    velocity: f32,
    frame_count: u64,
    bytes_read: u64,
    connected_at: Option<Instant>,
}

impl SyntheticCamera {
    pub(crate) fn new(config: SourceConfig) -> Self {
        let target_y = config.height as f32 / 2.0;
        Self {
            config,
            pending: Vec::new(),
            cursor: 0,
            next_due: None,
            target_y,
            velocity: 3.0,
            frame_count: 0,
            bytes_read: 0,
            connected_at: None,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        log::info!(
            "synthetic camera {} at {}x{} @ {} fps",
            self.config.uri,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        self.connected_at = Some(Instant::now());
        Ok(())
    }

    pub(crate) fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.cursor >= self.pending.len() {
            self.wait_for_next_frame();
            self.pending = self.render()?;
            self.cursor = 0;
            self.frame_count += 1;
        }
        let n = buf.len().min(self.pending.len() - self.cursor);
        buf[..n].copy_from_slice(&self.pending[self.cursor..self.cursor + n]);
        self.cursor += n;
        self.bytes_read += n as u64;
        Ok(n)
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.connected_at.is_some()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            bytes_read: self.bytes_read,
            source: self.config.uri.clone(),
        }
    }

    fn wait_for_next_frame(&mut self) {
        let interval = frame_interval(self.config.fps);
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // Do not try to catch up after a stall.
        self.next_due = Some(due.max(now) + interval);
    }

    fn render(&mut self) -> Result<Vec<u8>> {
        let (width, height) = (self.config.width.max(1), self.config.height.max(1));
        let side = (height / 6).max(2);
        let mut rng = rand::thread_rng();

        let max_y = height.saturating_sub(side) as f32;
        self.target_y += self.velocity + rng.gen_range(-1.0..=1.0);
        if self.target_y <= 0.0 || self.target_y >= max_y {
            self.velocity = -self.velocity;
            self.target_y = self.target_y.clamp(0.0, max_y);
        }

        let mut pixels = RgbImage::from_pixel(width, height, BACKGROUND);
        let x0 = (width.saturating_sub(side)) / 2;
        let y0 = self.target_y as u32;
        for y in y0..(y0 + side).min(height) {
            for x in x0..(x0 + side).min(width) {
                pixels.put_pixel(x, y, TARGET);
            }
        }
        DecodedImage::from_rgb(pixels).encode_jpeg(SYNTHETIC_QUALITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{EOI_MARKER, SOI_MARKER};

    #[test]
    fn emits_decodable_frames_in_chunks() {
        let mut camera = SyntheticCamera::new(SourceConfig {
            uri: "stub://test".to_string(),
            width: 64,
            height: 48,
            fps: 1000,
            loop_file: false,
        });
        camera.connect().unwrap();

        let mut frame = Vec::new();
        let mut buf = [0u8; 100];
        loop {
            let n = camera.read_chunk(&mut buf).unwrap();
            frame.extend_from_slice(&buf[..n]);
            if frame.ends_with(&EOI_MARKER) {
                break;
            }
        }
        assert!(frame.starts_with(&SOI_MARKER));
        let image = DecodedImage::decode(&frame).unwrap();
        assert_eq!((image.width(), image.height()), (64, 48));
        assert_eq!(camera.stats().frames_read, 1);
    }
}
