use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use tiltcam::actuator::ServoSettings;
use tiltcam::config::StreamerConfig;
use tiltcam::DetectorKind;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TILTCAM_CONFIG",
        "TILTCAM_HTTP_ADDR",
        "TILTCAM_SOURCE",
        "TILTCAM_DETECTOR",
        "TILTCAM_THRESHOLD",
        "TILTCAM_MODEL",
        "TILTCAM_LABELS",
        "TILTCAM_SNAPSHOT_DIR",
        "TILTCAM_SNAPSHOT_LABELS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "http": { "addr": "127.0.0.1:9000" },
            "capture": {
                "source": "stub://porch",
                "width": 320,
                "height": 240,
                "fps": 10,
                "chunk_size": 4096
            },
            "detector": { "kind": "face-tracker" },
            "actuator": {
                "min": -0.25,
                "max": 0.25,
                "step": 0.01,
                "dead_zone": [150, 110, 170, 130],
                "tolerance": 10.0
            },
            "stream": { "jpeg_quality": 70, "title": "porch" },
            "hooks": [{ "labels": ["face"], "snapshot_dir": "/tmp/porch" }]
        }"#,
    );

    std::env::set_var("TILTCAM_CONFIG", file.path());
    std::env::set_var("TILTCAM_SOURCE", "stub://garage");
    std::env::set_var("TILTCAM_THRESHOLD", "0.6");

    let cfg = StreamerConfig::load().expect("load config");

    assert_eq!(cfg.http_addr, "127.0.0.1:9000");
    assert_eq!(cfg.capture.uri, "stub://garage");
    assert_eq!(cfg.capture.width, 320);
    assert_eq!(cfg.capture.height, 240);
    assert_eq!(cfg.capture.fps, 10);
    assert_eq!(cfg.chunk_size, 4096);
    assert_eq!(cfg.detector.kind, DetectorKind::FaceTracker);
    assert_eq!(cfg.detector.threshold, 0.6);
    assert_eq!(cfg.actuator.neutral, 0.0);
    assert_eq!(cfg.actuator.dead_zone().reference(), (160.0, 120.0));
    assert_eq!(cfg.actuator.servo, ServoSettings::Null);
    assert_eq!(cfg.stream.jpeg_quality, 70);
    assert_eq!(cfg.stream.title, "porch");
    assert_eq!(cfg.hooks.len(), 1);
    assert_eq!(cfg.hooks[0].snapshot_dir, PathBuf::from("/tmp/porch"));

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = StreamerConfig::load().expect("load defaults");
    assert_eq!(cfg.http_addr, "0.0.0.0:8000");
    assert_eq!(cfg.capture.uri, "stub://camera");
    assert_eq!(cfg.detector.kind, DetectorKind::Passthrough);
    assert_eq!(cfg.actuator.step, 0.005);
    assert!(cfg.hooks.is_empty());
}

#[test]
fn snapshot_env_adds_hook() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TILTCAM_SNAPSHOT_DIR", "/tmp/snaps");
    std::env::set_var("TILTCAM_SNAPSHOT_LABELS", "person, traffic light,");
    let cfg = StreamerConfig::load().expect("load config");
    assert_eq!(cfg.hooks.len(), 1);
    assert_eq!(cfg.hooks[0].labels, vec!["person", "traffic light"]);
    assert_eq!(cfg.hooks[0].snapshot_dir, PathBuf::from("/tmp/snaps"));

    std::env::remove_var("TILTCAM_SNAPSHOT_LABELS");
    let cfg = StreamerConfig::load().expect("load config");
    assert_eq!(cfg.hooks[0].labels, vec!["face"]);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TILTCAM_THRESHOLD", "1.5");
    assert!(StreamerConfig::load().is_err());
    std::env::set_var("TILTCAM_THRESHOLD", "high");
    assert!(StreamerConfig::load().is_err());
    clear_env();

    std::env::set_var("TILTCAM_DETECTOR", "segmenter");
    assert!(StreamerConfig::load().is_err());
    clear_env();

    // Object detection needs both a model and a label table.
    std::env::set_var("TILTCAM_DETECTOR", "object");
    std::env::set_var("TILTCAM_MODEL", "stub://objects");
    assert!(StreamerConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "actuator": { "min": 0.5, "max": -0.5 } }"#);
    assert!(StreamerConfig::load_from(Some(file.path())).is_err());

    let file = write_config(r#"{ "actuator": { "servo": { "kind": "stepper" } } }"#);
    assert!(StreamerConfig::load_from(Some(file.path())).is_err());

    let file = write_config(r#"{ "stream": { "jpeg_quality": 0 } }"#);
    assert!(StreamerConfig::load_from(Some(file.path())).is_err());

    clear_env();
}
