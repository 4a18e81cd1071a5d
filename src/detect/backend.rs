use anyhow::Result;
use image::RgbImage;

use crate::detect::result::{BoundingBox, PixelRect};
use crate::frame::DecodedImage;

/// Black-box face detector (e.g. a Haar cascade or a small ONNX model).
///
/// Returns boxes in full-resolution pixel coordinates. The order of the returned
/// list is backend-defined; `FaceTracker` follows whatever order it gets.
pub trait FaceCascade: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn detect_faces(&mut self, image: &DecodedImage) -> Result<Vec<PixelRect>>;
}

/// One raw object from an inference backend, before label lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawObject {
    /// Fractional coordinates relative to the inference input.
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub score: f32,
}

/// Black-box object detector.
///
/// Backends receive the image already resized to `input_size()` and are responsible
/// for dropping results scored below `threshold`.
pub trait ObjectInference: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Required `(width, height)` of the input image.
    fn input_size(&self) -> (u32, u32);

    fn detect_objects(&mut self, input: &RgbImage, threshold: f32) -> Result<Vec<RawObject>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
