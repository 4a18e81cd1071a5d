//! Detect-and-annotate once per published frame.
//!
//! Runs on the capture thread inside the publish step, so every streaming session
//! reads the same finished `Published` and no decoded image is ever shared mutably.

use std::sync::Arc;

use crate::detect::Detector;
use crate::frame::{DecodedImage, Frame, Published};
use crate::hooks::DetectionHook;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub inference_errors: u64,
    pub hook_errors: u64,
}

pub struct DetectionPipeline {
    detector: Detector,
    hooks: Vec<DetectionHook>,
    jpeg_quality: u8,
    last_annotated: Option<Arc<[u8]>>,
    stats: PipelineStats,
}

impl DetectionPipeline {
    pub fn new(detector: Detector, hooks: Vec<DetectionHook>, jpeg_quality: u8) -> Self {
        Self {
            detector,
            hooks,
            jpeg_quality: jpeg_quality.clamp(1, 100),
            last_annotated: None,
            stats: PipelineStats::default(),
        }
    }

    /// Pipeline that serves frames untouched.
    pub fn passthrough() -> Self {
        Self::new(
            Detector::Passthrough(crate::detect::PassthroughDetector),
            Vec::new(),
            DEFAULT_JPEG_QUALITY,
        )
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Produce the snapshot subscribers will see for `frame`.
    ///
    /// A failed detection cycle is never fatal: the last good annotated JPEG (or the
    /// camera frame itself, before there is one) is served with `stale` set.
    pub fn process(&mut self, frame: Frame, image: DecodedImage) -> Published {
        self.stats.frames += 1;
        let image = Arc::new(image);

        let outcome = self
            .detector
            .detect((*image).clone())
            .and_then(|annotated| {
                let jpeg: Arc<[u8]> = if self.detector.draws() {
                    annotated.image.encode_jpeg(self.jpeg_quality)?.into()
                } else {
                    frame.shared_bytes()
                };
                Ok((jpeg, annotated.detections))
            });

        match outcome {
            Ok((annotated, detections)) => {
                self.run_hooks(&detections, &annotated);
                self.last_annotated = Some(annotated.clone());
                Published {
                    frame,
                    image,
                    annotated,
                    detections,
                    stale: false,
                }
            }
            Err(err) => {
                self.stats.inference_errors += 1;
                log::warn!(
                    "detection failed on frame {} ({}): {:#}",
                    frame.seq(),
                    self.detector.kind(),
                    err
                );
                let annotated = self
                    .last_annotated
                    .clone()
                    .unwrap_or_else(|| frame.shared_bytes());
                Published {
                    frame,
                    image,
                    annotated,
                    detections: Vec::new(),
                    stale: true,
                }
            }
        }
    }

    fn run_hooks(&mut self, detections: &[crate::detect::Detection], jpeg: &[u8]) {
        if detections.is_empty() {
            return;
        }
        for hook in &mut self.hooks {
            if let Err(err) = hook.run(detections, jpeg) {
                self.stats.hook_errors += 1;
                log::warn!("{} hook failed: {:#}", hook.action_name(), err);
            }
        }
    }
}
