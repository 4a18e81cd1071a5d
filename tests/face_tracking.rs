use std::sync::Arc;

use anyhow::Result;
use image::{Rgb, RgbImage};

use tiltcam::actuator::NullServo;
use tiltcam::detect::{FaceCascade, FaceDetector, FaceTracker};
use tiltcam::{
    ActuatorController, ActuatorState, DeadZone, DecodedImage, DetectionPipeline, Detector,
    FrameBus, FrameSink, PixelRect,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const STEP: f32 = 0.005;

/// Returns no faces on the first frame and one fixed box on every later frame.
struct ScriptedFaceCascade {
    calls: usize,
}

impl FaceCascade for ScriptedFaceCascade {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect_faces(&mut self, _image: &DecodedImage) -> Result<Vec<PixelRect>> {
        self.calls += 1;
        if self.calls == 1 {
            Ok(Vec::new())
        } else {
            Ok(vec![PixelRect::from_xywh(100, 100, 50, 50)])
        }
    }
}

fn jpeg(shade: u8) -> Vec<u8> {
    DecodedImage::from_rgb(RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([shade, shade, shade])))
        .encode_jpeg(85)
        .expect("encode jpeg")
}

fn controller() -> Arc<ActuatorController> {
    Arc::new(ActuatorController::new(
        ActuatorState::new(0.0, -0.5, 0.5, STEP).expect("state"),
        DeadZone::new(PixelRect::new(310, 230, 330, 250), 20.0),
        Box::new(NullServo::new()),
    ))
}

#[test]
fn second_frame_face_steps_actuator_once() {
    let actuator = controller();
    let tracker = FaceTracker::new(
        FaceDetector::new(Box::new(ScriptedFaceCascade { calls: 0 })),
        actuator.clone(),
    );
    let pipeline = DetectionPipeline::new(Detector::FaceTracker(tracker), Vec::new(), 85);
    let bus = FrameBus::new();
    let mut sink = FrameSink::new(bus.clone(), pipeline);

    sink.ingest(&jpeg(40));
    sink.ingest(&jpeg(60));
    let first = bus.latest().expect("first frame published");
    assert_eq!(first.seq(), 1);
    assert!(first.detections.is_empty());
    assert_eq!(actuator.position(), 0.0);

    sink.flush();
    let second = bus.latest().expect("second frame published");
    assert_eq!(second.seq(), 2);
    assert!(!second.stale);
    assert_eq!(second.detections.len(), 1);

    let det = &second.detections[0];
    assert_eq!(det.label, "face");
    assert_eq!(det.confidence, 1.0);
    let expected = [
        100.0 / WIDTH as f32,
        100.0 / HEIGHT as f32,
        150.0 / WIDTH as f32,
        150.0 / HEIGHT as f32,
    ];
    let actual = [det.bbox.x_min, det.bbox.y_min, det.bbox.x_max, det.bbox.y_max];
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!((a - e).abs() < 1e-6, "{:?} != {:?}", actual, expected);
    }

    // Face center (125, 125) is above the dead zone center (320, 240).
    assert_eq!(actuator.position(), -STEP);
}

#[test]
fn annotated_stream_differs_from_camera_frame() {
    let actuator = controller();
    let tracker = FaceTracker::new(
        FaceDetector::new(Box::new(ScriptedFaceCascade { calls: 0 })),
        actuator,
    );
    let pipeline = DetectionPipeline::new(Detector::FaceTracker(tracker), Vec::new(), 85);
    let bus = FrameBus::new();
    let mut sink = FrameSink::new(bus.clone(), pipeline);

    sink.ingest(&jpeg(40));
    sink.flush();
    let published = bus.latest().expect("published");
    // The dead zone is drawn even when no face is found.
    assert_ne!(&*published.annotated, published.frame.bytes());
    let annotated = DecodedImage::decode(&published.annotated).expect("annotated decodes");
    assert_eq!((annotated.width(), annotated.height()), (WIDTH, HEIGHT));
}
