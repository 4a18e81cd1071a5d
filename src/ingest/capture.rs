use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::sink::{FrameSink, SinkStats};
use super::source::CaptureSource;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const MIN_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Drive `source` into `sink` until shutdown or end of stream.
///
/// Source errors are never fatal: the partial frame is dropped and the source is
/// reconnected with exponential backoff.
pub fn run_capture(
    mut source: CaptureSource,
    mut sink: FrameSink,
    chunk_size: usize,
    shutdown: Arc<AtomicBool>,
) -> SinkStats {
    let mut buf = vec![0u8; chunk_size.max(512)];
    let mut connected = false;
    let mut backoff = MIN_BACKOFF;
    let mut last_health_log = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        if !connected {
            match source.connect() {
                Ok(()) => {
                    connected = true;
                    backoff = MIN_BACKOFF;
                }
                Err(err) => {
                    log::warn!("capture connect failed: {:#}; retrying in {:?}", err, backoff);
                    sleep_unless_shutdown(backoff, &shutdown);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            }
        }

        match source.read_chunk(&mut buf) {
            Ok(0) => {
                sink.flush();
                break;
            }
            Ok(n) => {
                sink.ingest(&buf[..n]);
            }
            Err(err) => {
                log::warn!("capture read failed: {:#}; reconnecting", err);
                sink.reset();
                connected = false;
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log_health(&source, &sink);
            last_health_log = Instant::now();
        }
    }

    let stats = sink.stats();
    log::info!(
        "capture stopped: {} published, {} discarded, {} bytes",
        stats.published,
        stats.discarded,
        stats.bytes_in
    );
    stats
}

fn log_health(source: &CaptureSource, sink: &FrameSink) {
    let source_stats = source.stats();
    let sink_stats = sink.stats();
    let pipeline_stats = sink.pipeline().stats();
    log::info!(
        "capture {}: healthy={} frames={} published={} discarded={} bytes={} inference_errors={}",
        source_stats.source,
        source.is_healthy(),
        source_stats.frames_read,
        sink_stats.published,
        sink_stats.discarded,
        sink_stats.bytes_in,
        pipeline_stats.inference_errors
    );
}

fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FrameBus;
    use crate::frame::testing::jpeg_with_square;
    use crate::ingest::SourceConfig;
    use crate::pipeline::DetectionPipeline;

    #[test]
    fn file_source_is_drained_and_flushed() {
        let mut data = Vec::new();
        for i in 0..5 {
            data.extend_from_slice(&jpeg_with_square(24, 16, Some((i, 2, 4))));
        }
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &data).unwrap();

        let source = CaptureSource::new(SourceConfig {
            uri: file.path().to_string_lossy().into_owned(),
            fps: 1000,
            ..SourceConfig::default()
        })
        .unwrap();
        let bus = FrameBus::new();
        let sink = FrameSink::new(bus.clone(), DetectionPipeline::passthrough());

        let stats = run_capture(source, sink, 100, Arc::new(AtomicBool::new(false)));
        assert_eq!(stats.published, 5);
        assert_eq!(stats.discarded, 0);
        assert_eq!(bus.latest().unwrap().seq(), 5);
    }

    #[test]
    fn shutdown_stops_synthetic_capture() {
        let source = CaptureSource::new(SourceConfig {
            width: 32,
            height: 24,
            fps: 200,
            ..SourceConfig::default()
        })
        .unwrap();
        let bus = FrameBus::new();
        let sink = FrameSink::new(bus.clone(), DetectionPipeline::passthrough());
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        let handle = std::thread::spawn(move || run_capture(source, sink, 256, flag));
        let mut subscriber = bus.subscribe();
        assert!(subscriber.next().is_some());
        shutdown.store(true, Ordering::SeqCst);
        let stats = handle.join().unwrap();
        assert!(stats.published >= 1);
    }
}
