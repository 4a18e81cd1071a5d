//! Per-frame detection.
//!
//! A `Detector` runs once per published frame on the capture thread and returns
//! the annotated image plus structured `Detection`s. Model backends sit behind the
//! `FaceCascade` and `ObjectInference` traits; the stub backends need no model files.

pub mod annotate;
mod backend;
pub mod backends;
mod detector;
mod face;
mod labels;
mod object;
mod result;

pub use backend::{FaceCascade, ObjectInference, RawObject};
pub use backends::{BrightRegionCascade, BrightRegionInference};
pub use detector::{Annotated, Detector, DetectorKind, PassthroughDetector, STUB_MODEL_PREFIX};
pub use face::{select_target, FaceDetector, FaceTracker, FACE_LABEL};
pub use labels::LabelTable;
pub use object::ObjectDetector;
pub use result::{BoundingBox, Detection, PixelRect};
