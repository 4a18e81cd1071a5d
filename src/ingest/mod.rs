//! Frame ingestion.
//!
//! Capture sources produce raw encoded bytes; `FrameSink` turns them into published
//! frames. Supported sources:
//! - `stub://...` synthetic camera (development, tests)
//! - local MJPEG files, optionally looped
//! - `-` for stdin (e.g. piped from a camera tool)
//! - `http(s)://` MJPEG pull (feature: ingest-http)
//!
//! One capture thread owns the source and the sink; nothing here ever blocks on
//! streaming clients.

mod capture;
mod file;
#[cfg(feature = "ingest-http")]
mod http;
mod sink;
mod source;
mod synthetic;

pub use capture::run_capture;
pub use file::STDIN_SOURCE;
pub use sink::{FrameSink, SinkStats, MAX_FRAME_BYTES};
pub use source::{CaptureSource, SourceConfig, SourceStats, STUB_SOURCE_PREFIX};
