#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{FaceCascade, ObjectInference, RawObject};
use crate::detect::result::{BoundingBox, PixelRect};
use crate::frame::DecodedImage;

type Plan = TypedRunnableModel<TypedModel>;

const FACE_INPUT_WIDTH: u32 = 320;
const FACE_INPUT_HEIGHT: u32 = 240;
const FACE_SCORE_THRESHOLD: f32 = 0.7;
const FACE_NMS_IOU: f32 = 0.3;

fn load_plan(model_path: &Path, width: u32, height: u32) -> Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

fn nchw_input(pixels: &RgbImage, normalize: impl Fn(u8) -> f32) -> Tensor {
    let width = pixels.width() as usize;
    let height = pixels.height() as usize;
    let raw = pixels.as_raw();
    tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, channel, y, x)| {
        normalize(raw[(y * width + x) * 3 + channel])
    })
    .into_tensor()
}

fn flat_output(outputs: &TVec<TValue>, index: usize) -> Result<Vec<f32>> {
    let output = outputs
        .get(index)
        .ok_or_else(|| anyhow!("model produced no output #{}", index))?;
    let view = output
        .to_array_view::<f32>()
        .with_context(|| format!("model output #{} was not f32", index))?;
    Ok(view.iter().copied().collect())
}

/// SSD-style object detector exported to ONNX.
///
/// Expects an NCHW float input in `[0, 1]` and three outputs: boxes `[1, N, 4]` as
/// `(y_min, x_min, y_max, x_max)` fractions, class ids `[1, N]`, scores `[1, N]`.
pub struct TractObjectInference {
    model: Plan,
    width: u32,
    height: u32,
}

impl TractObjectInference {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model = load_plan(model_path.as_ref(), width, height)?;
        Ok(Self {
            model,
            width,
            height,
        })
    }
}

impl ObjectInference for TractObjectInference {
    fn name(&self) -> &'static str {
        "tract-ssd"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn detect_objects(&mut self, input: &RgbImage, threshold: f32) -> Result<Vec<RawObject>> {
        if input.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "input size {}x{} does not match model input {}x{}",
                input.width(),
                input.height(),
                self.width,
                self.height
            ));
        }
        let tensor = nchw_input(input, |p| p as f32 / 255.0);
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let boxes = flat_output(&outputs, 0)?;
        let classes = flat_output(&outputs, 1)?;
        let scores = flat_output(&outputs, 2)?;

        let count = scores.len().min(classes.len()).min(boxes.len() / 4);
        let objects = (0..count)
            .filter(|&i| scores[i] >= threshold)
            .map(|i| {
                let b = &boxes[i * 4..i * 4 + 4];
                RawObject {
                    bbox: BoundingBox::new(b[1], b[0], b[3], b[2]),
                    class_id: classes[i].max(0.0) as usize,
                    score: scores[i],
                }
            })
            .collect();
        Ok(objects)
    }
}

/// UltraFace-style face detector (320x240 input, scores `[1, N, 2]`, boxes `[1, N, 4]`).
///
/// Results come out sorted by descending score after non-maximum suppression.
pub struct TractFaceCascade {
    model: Plan,
}

impl TractFaceCascade {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model = load_plan(model_path.as_ref(), FACE_INPUT_WIDTH, FACE_INPUT_HEIGHT)?;
        Ok(Self { model })
    }
}

impl FaceCascade for TractFaceCascade {
    fn name(&self) -> &'static str {
        "tract-ultraface"
    }

    fn detect_faces(&mut self, image: &DecodedImage) -> Result<Vec<PixelRect>> {
        let resized = imageops::resize(
            image.pixels(),
            FACE_INPUT_WIDTH,
            FACE_INPUT_HEIGHT,
            FilterType::Triangle,
        );
        let tensor = nchw_input(&resized, |p| (p as f32 - 127.0) / 128.0);
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let scores = flat_output(&outputs, 0)?;
        let boxes = flat_output(&outputs, 1)?;

        let count = (scores.len() / 2).min(boxes.len() / 4);
        let mut candidates: Vec<(f32, BoundingBox)> = (0..count)
            .filter(|&i| scores[i * 2 + 1] >= FACE_SCORE_THRESHOLD)
            .map(|i| {
                let b = &boxes[i * 4..i * 4 + 4];
                (scores[i * 2 + 1], BoundingBox::new(b[0], b[1], b[2], b[3]))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut kept: Vec<BoundingBox> = Vec::new();
        for (_, candidate) in candidates {
            if kept.iter().all(|k| iou(k, &candidate) < FACE_NMS_IOU) {
                kept.push(candidate);
            }
        }
        Ok(kept
            .into_iter()
            .map(|bbox| bbox.to_pixels(image.width(), image.height()))
            .collect())
    }
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x_max.min(b.x_max) - a.x_min.max(b.x_min)).max(0.0);
    let iy = (a.y_max.min(b.y_max) - a.y_min.max(b.y_min)).max(0.0);
    let inter = ix * iy;
    let area_a = (a.x_max - a.x_min) * (a.y_max - a.y_min);
    let area_b = (b.x_max - b.x_min) * (b.y_max - b.y_min);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
