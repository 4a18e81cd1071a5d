//! tiltcam: MJPEG streaming with per-frame detection and closed-loop tilt control.
//!
//! # Architecture
//!
//! ```text
//! capture source -> FrameSink -> DetectionPipeline -> FrameBus -> StreamingSession (xN)
//!                                      |
//!                                      +-> FaceTracker -> ActuatorController -> servo
//! ```
//!
//! - One capture thread owns the source, the sink and the detector. Each completed
//!   frame is decoded, detected and annotated exactly once, then published as an
//!   immutable `Published` snapshot.
//! - Streaming clients each run on their own thread and only ever read snapshots.
//!   A slow client skips to the latest frame; it never stalls the producer.
//! - The actuator position is the one piece of state written from several threads
//!   (tracking and the `/up` `/down` endpoints); every write goes through the
//!   controller's clamp-then-commit critical section.
//!
//! # Module Structure
//!
//! - `frame`: `Frame`, `DecodedImage`, `Published`
//! - `bus`: publish/subscribe broker with cancellable blocking waits
//! - `ingest`: capture sources, `FrameSink`, the capture loop
//! - `detect`: detector variants, inference collaborator traits, annotation
//! - `pipeline`: detect-and-annotate once per frame, with fallback on failure
//! - `hooks`: side effects bound to detected labels (snapshots)
//! - `actuator`: bang-bang tilt controller and servo outputs
//! - `api`: HTTP server, multipart stream, streaming sessions
//! - `config`: file + environment configuration

pub mod actuator;
pub mod api;
pub mod bus;
pub mod config;
pub mod detect;
pub mod frame;
pub mod hooks;
pub mod ingest;
pub mod pipeline;

pub use actuator::{ActuatorController, ActuatorState, Adjustment, DeadZone};
pub use bus::{CancelHandle, FrameBus, Subscriber};
pub use config::StreamerConfig;
pub use detect::{BoundingBox, Detection, Detector, DetectorKind, PixelRect};
pub use frame::{DecodedImage, Frame, Published};
pub use hooks::{DetectionHook, HookAction, SnapshotHook};
pub use ingest::{run_capture, CaptureSource, FrameSink, SourceConfig};
pub use pipeline::DetectionPipeline;
