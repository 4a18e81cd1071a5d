//! tiltcamd - camera streaming daemon
//!
//! This daemon:
//! 1. Reads frames from the configured capture source
//! 2. Runs the configured detector once per frame and annotates it
//! 3. Serves the annotated MJPEG stream and manual tilt control over HTTP
//! 4. Steers the tilt servo toward the tracked face (face-tracker detector)

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use tiltcam::{
    actuator::open_servo,
    api::{ApiConfig, ApiServer, StreamContext},
    ActuatorController, CaptureSource, DetectionHook, DetectionPipeline, Detector, DetectorKind,
    FrameBus, FrameSink, SnapshotHook, StreamerConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream a camera with detection and tilt tracking")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "TILTCAM_CONFIG")]
    config: Option<PathBuf>,
    /// Capture source: stub://name, an MJPEG file, `-` for stdin, or http(s)://.
    #[arg(long)]
    source: Option<String>,
    /// HTTP listen address.
    #[arg(long)]
    addr: Option<String>,
    /// passthrough, object, face or face-tracker.
    #[arg(long)]
    detector: Option<DetectorKind>,
    /// Object detection model (or stub://name).
    #[arg(long)]
    model: Option<PathBuf>,
    /// Label file for the object detector.
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Minimum detection confidence.
    #[arg(long)]
    threshold: Option<f32>,
}

impl Args {
    fn apply(self, cfg: &mut StreamerConfig) {
        if let Some(source) = self.source {
            cfg.capture.uri = source;
        }
        if let Some(addr) = self.addr {
            cfg.http_addr = addr;
        }
        if let Some(kind) = self.detector {
            cfg.detector.kind = kind;
        }
        if let Some(model) = self.model {
            cfg.detector.model_path = Some(model);
        }
        if let Some(labels) = self.labels {
            cfg.detector.labels_path = Some(labels);
        }
        if let Some(threshold) = self.threshold {
            cfg.detector.threshold = threshold;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = StreamerConfig::load_from(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let servo = open_servo(&cfg.actuator.servo)?;
    let actuator = Arc::new(ActuatorController::new(
        cfg.actuator.state()?,
        cfg.actuator.dead_zone(),
        servo,
    ));

    let detector = Detector::from_settings(&cfg.detector, actuator.clone())?;
    let mut hooks = Vec::with_capacity(cfg.hooks.len());
    for hook in &cfg.hooks {
        let action = SnapshotHook::new(&hook.snapshot_dir)?;
        log::info!(
            "snapshot hook: {:?} -> {}",
            hook.labels,
            action.dir().display()
        );
        hooks.push(DetectionHook::new(hook.labels.clone(), Box::new(action)));
    }
    let pipeline = DetectionPipeline::new(detector, hooks, cfg.stream.jpeg_quality);

    let bus = FrameBus::new();
    let sink = FrameSink::new(bus.clone(), pipeline);
    let source = CaptureSource::new(cfg.capture.clone())?;

    let api_config = ApiConfig {
        addr: cfg.http_addr.clone(),
        title: cfg.stream.title.clone(),
    };
    let api_handle =
        ApiServer::new(api_config, StreamContext::new(bus.clone(), actuator.clone())).spawn()?;
    log::info!("stream at http://{}/stream.mjpg", api_handle.addr);

    let shutdown = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let capture_shutdown = shutdown.clone();
    let chunk_size = cfg.chunk_size;
    // End of stream only stops capture; control endpoints stay up until Ctrl-C.
    std::thread::spawn(move || {
        tiltcam::run_capture(source, sink, chunk_size, capture_shutdown.clone());
        if !capture_shutdown.load(Ordering::SeqCst) {
            log::warn!("capture source ended; still serving until Ctrl-C");
        }
    });

    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!(
        "tiltcamd running: source={} detector={} position={:.4}",
        cfg.capture.uri,
        cfg.detector.kind,
        actuator.position()
    );
    let _ = rx.recv();
    log::info!("shutting down");
    shutdown.store(true, Ordering::SeqCst);
    bus.close();
    api_handle.stop()?;
    Ok(())
}
