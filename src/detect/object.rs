use anyhow::Result;
use image::imageops::{self, FilterType};

use crate::detect::annotate::{draw_label, draw_rect, BOX_COLOR, LABEL_COLOR};
use crate::detect::backend::ObjectInference;
use crate::detect::detector::Annotated;
use crate::detect::labels::LabelTable;
use crate::detect::result::Detection;
use crate::frame::DecodedImage;

/// Labelled object detection over a resized copy of the frame.
pub struct ObjectDetector {
    inference: Box<dyn ObjectInference>,
    labels: LabelTable,
    threshold: f32,
}

impl ObjectDetector {
    pub fn new(inference: Box<dyn ObjectInference>, labels: LabelTable, threshold: f32) -> Self {
        Self {
            inference,
            labels,
            threshold,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.inference.name()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Run inference at the backend's input size, then draw boxes and labels on the
    /// full-resolution image. Fractional boxes are resolution independent, so they
    /// map straight back onto the original frame.
    pub fn detect(&mut self, mut image: DecodedImage) -> Result<Annotated> {
        let (input_width, input_height) = self.inference.input_size();
        let input = imageops::resize(
            image.pixels(),
            input_width,
            input_height,
            FilterType::Triangle,
        );
        let objects = self.inference.detect_objects(&input, self.threshold)?;

        let (width, height) = (image.width(), image.height());
        let mut detections = Vec::with_capacity(objects.len());
        for object in objects {
            let label = self.labels.label(object.class_id);
            let rect = object.bbox.to_pixels(width, height);
            draw_rect(image.pixels_mut(), rect, BOX_COLOR);
            draw_label(image.pixels_mut(), rect.left + 2, rect.top + 2, &label, LABEL_COLOR);
            detections.push(Detection::new(object.bbox, label, object.score));
        }
        Ok(Annotated { image, detections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backend::RawObject;
    use crate::detect::result::BoundingBox;
    use anyhow::anyhow;
    use image::RgbImage;
    use std::sync::{Arc, Mutex};

    struct FixedInference {
        objects: Vec<RawObject>,
        seen_input: Arc<Mutex<Option<(u32, u32)>>>,
        fail: bool,
    }

    impl ObjectInference for FixedInference {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn input_size(&self) -> (u32, u32) {
            (30, 30)
        }

        fn detect_objects(&mut self, input: &RgbImage, threshold: f32) -> Result<Vec<RawObject>> {
            if self.fail {
                return Err(anyhow!("interpreter crashed"));
            }
            *self.seen_input.lock().unwrap() = Some(input.dimensions());
            Ok(self
                .objects
                .iter()
                .copied()
                .filter(|o| o.score >= threshold)
                .collect())
        }
    }

    fn detector(objects: Vec<RawObject>, fail: bool) -> ObjectDetector {
        detector_with_input(objects, fail).0
    }

    fn detector_with_input(
        objects: Vec<RawObject>,
        fail: bool,
    ) -> (ObjectDetector, Arc<Mutex<Option<(u32, u32)>>>) {
        let seen_input = Arc::new(Mutex::new(None));
        let detector = ObjectDetector::new(
            Box::new(FixedInference {
                objects,
                seen_input: seen_input.clone(),
                fail,
            }),
            LabelTable::from_labels(["person", "cat"]),
            0.4,
        );
        (detector, seen_input)
    }

    #[test]
    fn inference_sees_backend_input_size() {
        let (mut detector, seen_input) = detector_with_input(Vec::new(), false);
        let image = DecodedImage::from_rgb(RgbImage::new(100, 50));
        let out = detector.detect(image).unwrap();
        assert_eq!(*seen_input.lock().unwrap(), Some((30, 30)));
        assert_eq!((out.image.width(), out.image.height()), (100, 50));
    }

    #[test]
    fn maps_labels_and_keeps_fractional_boxes() {
        let mut detector = detector(
            vec![
                RawObject {
                    bbox: BoundingBox::new(0.1, 0.2, 0.5, 0.6),
                    class_id: 1,
                    score: 0.9,
                },
                RawObject {
                    bbox: BoundingBox::new(0.0, 0.0, 0.1, 0.1),
                    class_id: 0,
                    score: 0.2,
                },
            ],
            false,
        );
        let image = DecodedImage::from_rgb(RgbImage::new(100, 50));
        let out = detector.detect(image.clone()).unwrap();

        assert_eq!(out.detections.len(), 1);
        let det = &out.detections[0];
        assert_eq!(det.label, "cat");
        assert_eq!(det.bbox, BoundingBox::new(0.1, 0.2, 0.5, 0.6));
        assert!(det.bbox.is_valid());
        assert_eq!(out.image.width(), 100);
        assert_ne!(out.image, image);
    }

    #[test]
    fn inference_failure_propagates() {
        let mut detector = detector(Vec::new(), true);
        let image = DecodedImage::from_rgb(RgbImage::new(10, 10));
        assert!(detector.detect(image).is_err());
    }

    #[test]
    fn empty_result_leaves_image_unchanged() {
        let mut detector = detector(Vec::new(), false);
        let image = DecodedImage::from_rgb(RgbImage::new(10, 10));
        let out = detector.detect(image.clone()).unwrap();
        assert!(out.detections.is_empty());
        assert_eq!(out.image, image);
    }
}
