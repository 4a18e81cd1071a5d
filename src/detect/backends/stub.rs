use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::{FaceCascade, ObjectInference, RawObject};
use crate::detect::result::{BoundingBox, PixelRect};
use crate::frame::DecodedImage;

const DEFAULT_LUMA_THRESHOLD: u8 = 200;

/// Stub face backend for development and tests.
///
/// Reports one box around all pixels brighter than a luma threshold, which is what
/// the synthetic `stub://` camera draws as its target.
pub struct BrightRegionCascade {
    luma_threshold: u8,
}

impl BrightRegionCascade {
    pub fn new() -> Self {
        Self {
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, luma_threshold: u8) -> Self {
        self.luma_threshold = luma_threshold;
        self
    }
}

impl Default for BrightRegionCascade {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceCascade for BrightRegionCascade {
    fn name(&self) -> &'static str {
        "bright-region"
    }

    fn detect_faces(&mut self, image: &DecodedImage) -> Result<Vec<PixelRect>> {
        Ok(bright_region(image.pixels(), self.luma_threshold)
            .into_iter()
            .collect())
    }
}

/// Stub object backend: the bright region becomes one object of class 0.
pub struct BrightRegionInference {
    input_size: (u32, u32),
    luma_threshold: u8,
}

impl BrightRegionInference {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            input_size: (width.max(1), height.max(1)),
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
        }
    }
}

impl ObjectInference for BrightRegionInference {
    fn name(&self) -> &'static str {
        "bright-region"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn detect_objects(&mut self, input: &RgbImage, threshold: f32) -> Result<Vec<RawObject>> {
        let Some(rect) = bright_region(input, self.luma_threshold) else {
            return Ok(Vec::new());
        };
        let total = (input.width() * input.height()).max(1) as f32;
        let area = ((rect.right - rect.left + 1) * (rect.bottom - rect.top + 1)) as f32;
        // Bigger blobs score higher; never below 0.5 so the default threshold passes.
        let score = (0.5 + area / total).min(1.0);
        if score < threshold {
            return Ok(Vec::new());
        }
        Ok(vec![RawObject {
            bbox: BoundingBox::from_pixels(rect, input.width(), input.height()),
            class_id: 0,
            score,
        }])
    }
}

fn bright_region(pixels: &RgbImage, luma_threshold: u8) -> Option<PixelRect> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in pixels.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
        if luma < luma_threshold as u32 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| PixelRect::new(x0 as i32, y0 as i32, x1 as i32, y1 as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn image_with_square(x: u32, y: u32, side: u32) -> RgbImage {
        let mut pixels = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
        for py in y..y + side {
            for px in x..x + side {
                pixels.put_pixel(px, py, Rgb([255, 255, 255]));
            }
        }
        pixels
    }

    #[test]
    fn cascade_boxes_bright_square() {
        let mut cascade = BrightRegionCascade::new();
        let image = DecodedImage::from_rgb(image_with_square(10, 5, 8));
        let faces = cascade.detect_faces(&image).unwrap();
        assert_eq!(faces, vec![PixelRect::new(10, 5, 17, 12)]);
    }

    #[test]
    fn cascade_finds_nothing_in_dark_image() {
        let mut cascade = BrightRegionCascade::new();
        let image = DecodedImage::from_rgb(RgbImage::new(32, 32));
        assert!(cascade.detect_faces(&image).unwrap().is_empty());
    }

    #[test]
    fn inference_respects_threshold() {
        let mut backend = BrightRegionInference::new(64, 48);
        let input = image_with_square(0, 0, 4);
        assert_eq!(backend.detect_objects(&input, 0.4).unwrap().len(), 1);
        assert!(backend.detect_objects(&input, 0.99).unwrap().is_empty());
    }
}
