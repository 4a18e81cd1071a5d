use anyhow::Result;
use std::sync::Arc;

use crate::actuator::{ActuatorController, Adjustment};
use crate::detect::annotate::{draw_rect, BOX_COLOR, DEAD_ZONE_COLOR};
use crate::detect::backend::FaceCascade;
use crate::detect::detector::Annotated;
use crate::detect::result::{BoundingBox, Detection, PixelRect};
use crate::frame::DecodedImage;

pub const FACE_LABEL: &str = "face";

/// Face detection with a box drawn around every face found.
pub struct FaceDetector {
    cascade: Box<dyn FaceCascade>,
}

impl FaceDetector {
    pub fn new(cascade: Box<dyn FaceCascade>) -> Self {
        Self { cascade }
    }

    pub fn backend_name(&self) -> &'static str {
        self.cascade.name()
    }

    pub fn detect(&mut self, mut image: DecodedImage) -> Result<Annotated> {
        let faces = self.cascade.detect_faces(&image)?;
        let detections = annotate_faces(&mut image, &faces);
        Ok(Annotated { image, detections })
    }
}

fn annotate_faces(image: &mut DecodedImage, faces: &[PixelRect]) -> Vec<Detection> {
    let (width, height) = (image.width(), image.height());
    faces
        .iter()
        .map(|rect| {
            draw_rect(image.pixels_mut(), *rect, BOX_COLOR);
            Detection::new(BoundingBox::from_pixels(*rect, width, height), FACE_LABEL, 1.0)
        })
        .collect()
}

/// The face the tracker steers toward: the first one, in cascade order.
pub fn select_target(faces: &[PixelRect]) -> Option<PixelRect> {
    faces.first().copied()
}

/// Face detection that also steers the actuator toward the first face found.
///
/// The dead-zone rectangle is drawn on every frame, with or without faces.
pub struct FaceTracker {
    faces: FaceDetector,
    controller: Arc<ActuatorController>,
}

impl FaceTracker {
    pub fn new(faces: FaceDetector, controller: Arc<ActuatorController>) -> Self {
        Self { faces, controller }
    }

    pub fn backend_name(&self) -> &'static str {
        self.faces.backend_name()
    }

    pub fn controller(&self) -> &Arc<ActuatorController> {
        &self.controller
    }

    pub fn detect(&mut self, mut image: DecodedImage) -> Result<Annotated> {
        let faces = self.faces.cascade.detect_faces(&image)?;
        draw_rect(
            image.pixels_mut(),
            self.controller.dead_zone().rect,
            DEAD_ZONE_COLOR,
        );
        let detections = annotate_faces(&mut image, &faces);
        if let Some(target) = select_target(&faces) {
            let adjustment = self.controller.update(target.center());
            if adjustment != Adjustment::Hold {
                log::trace!("tracker {:?} for face at {:?}", adjustment, target);
            }
        }
        Ok(Annotated { image, detections })
    }
}
