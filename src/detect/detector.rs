use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::actuator::ActuatorController;
use crate::config::DetectorSettings;
use crate::detect::backend::{FaceCascade, ObjectInference};
use crate::detect::backends::{BrightRegionCascade, BrightRegionInference};
use crate::detect::face::{FaceDetector, FaceTracker};
use crate::detect::labels::LabelTable;
use crate::detect::object::ObjectDetector;
use crate::detect::result::Detection;
use crate::frame::DecodedImage;

/// Model paths with this prefix select the in-crate stub backends.
pub const STUB_MODEL_PREFIX: &str = "stub://";

/// A detector's output: the annotated image and what was found on it.
#[derive(Clone, Debug)]
pub struct Annotated {
    pub image: DecodedImage,
    pub detections: Vec<Detection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    Passthrough,
    Object,
    Face,
    FaceTracker,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Passthrough => "passthrough",
            DetectorKind::Object => "object",
            DetectorKind::Face => "face",
            DetectorKind::FaceTracker => "face-tracker",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "none" => Ok(DetectorKind::Passthrough),
            "object" => Ok(DetectorKind::Object),
            "face" => Ok(DetectorKind::Face),
            "face-tracker" | "face_tracker" | "tracker" => Ok(DetectorKind::FaceTracker),
            other => Err(anyhow!(
                "unknown detector '{}'; expected passthrough, object, face or face-tracker",
                other
            )),
        }
    }
}

/// Returns the frame untouched with no detections.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughDetector;

impl PassthroughDetector {
    pub fn detect(&mut self, image: DecodedImage) -> Result<Annotated> {
        Ok(Annotated {
            image,
            detections: Vec::new(),
        })
    }
}

/// The detection strategy, fixed once at startup.
pub enum Detector {
    Passthrough(PassthroughDetector),
    Object(ObjectDetector),
    Face(FaceDetector),
    FaceTracker(FaceTracker),
}

impl Detector {
    /// Build the configured detector. `controller` is only used by the face tracker.
    pub fn from_settings(
        settings: &DetectorSettings,
        controller: Arc<ActuatorController>,
    ) -> Result<Self> {
        let detector = match settings.kind {
            DetectorKind::Passthrough => Detector::Passthrough(PassthroughDetector),
            DetectorKind::Object => {
                let labels_path = settings
                    .labels_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("object detector requires a labels file"))?;
                let labels = LabelTable::load(labels_path)?;
                let inference = object_inference(settings)?;
                Detector::Object(ObjectDetector::new(inference, labels, settings.threshold))
            }
            DetectorKind::Face => Detector::Face(FaceDetector::new(face_cascade(settings)?)),
            DetectorKind::FaceTracker => Detector::FaceTracker(FaceTracker::new(
                FaceDetector::new(face_cascade(settings)?),
                controller,
            )),
        };
        log::info!("detector: {} ({})", detector.kind(), detector.backend_name());
        Ok(detector)
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::Passthrough(_) => DetectorKind::Passthrough,
            Detector::Object(_) => DetectorKind::Object,
            Detector::Face(_) => DetectorKind::Face,
            Detector::FaceTracker(_) => DetectorKind::FaceTracker,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Detector::Passthrough(_) => "none",
            Detector::Object(detector) => detector.backend_name(),
            Detector::Face(detector) => detector.backend_name(),
            Detector::FaceTracker(tracker) => tracker.backend_name(),
        }
    }

    /// Whether `detect` can ever change pixels. A non-drawing detector's output may
    /// be served as the original encoded frame.
    pub fn draws(&self) -> bool {
        !matches!(self, Detector::Passthrough(_))
    }

    pub fn detect(&mut self, image: DecodedImage) -> Result<Annotated> {
        match self {
            Detector::Passthrough(detector) => detector.detect(image),
            Detector::Object(detector) => detector.detect(image),
            Detector::Face(detector) => detector.detect(image),
            Detector::FaceTracker(tracker) => tracker.detect(image),
        }
    }
}

fn is_stub(path: &std::path::Path) -> bool {
    path.to_string_lossy().starts_with(STUB_MODEL_PREFIX)
}

fn object_inference(settings: &DetectorSettings) -> Result<Box<dyn ObjectInference>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("object detector requires a model path"))?;
    let (width, height) = (settings.input_width, settings.input_height);
    if is_stub(model_path) {
        return Ok(Box::new(BrightRegionInference::new(width, height)));
    }
    #[cfg(feature = "backend-tract")]
    {
        let mut backend =
            crate::detect::backends::TractObjectInference::new(model_path, width, height)?;
        backend.warm_up()?;
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(anyhow!(
            "model {} requires the backend-tract feature",
            model_path.display()
        ))
    }
}

fn face_cascade(settings: &DetectorSettings) -> Result<Box<dyn FaceCascade>> {
    match settings.face_model_path.as_ref() {
        None => {
            log::warn!("no face model configured; using the bright-region stub cascade");
            Ok(Box::new(BrightRegionCascade::new()))
        }
        Some(path) if is_stub(path) => Ok(Box::new(BrightRegionCascade::new())),
        Some(path) => {
            #[cfg(feature = "backend-tract")]
            {
                Ok(Box::new(crate::detect::backends::TractFaceCascade::new(
                    path,
                )?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(anyhow!(
                    "face model {} requires the backend-tract feature",
                    path.display()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::jpeg_with_square;

    #[test]
    fn passthrough_is_idempotent() {
        let image = DecodedImage::decode(&jpeg_with_square(32, 24, Some((4, 4, 8)))).unwrap();
        let mut detector = Detector::Passthrough(PassthroughDetector);
        let once = detector.detect(image.clone()).unwrap();
        let twice = detector.detect(once.image.clone()).unwrap();
        assert_eq!(once.image, image);
        assert_eq!(twice.image, once.image);
        assert!(once.detections.is_empty() && twice.detections.is_empty());
        assert!(!detector.draws());
    }

    #[test]
    fn kind_parses_aliases() {
        assert_eq!("Face-Tracker".parse::<DetectorKind>().unwrap(), DetectorKind::FaceTracker);
        assert_eq!("none".parse::<DetectorKind>().unwrap(), DetectorKind::Passthrough);
        assert!("yolo".parse::<DetectorKind>().is_err());
        assert_eq!(DetectorKind::FaceTracker.to_string(), "face-tracker");
    }
}
