use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::actuator::{ActuatorState, DeadZone, PwmConfig, ServoSettings};
use crate::detect::{DetectorKind, PixelRect};
use crate::ingest::SourceConfig;
use crate::pipeline::DEFAULT_JPEG_QUALITY;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 24;
const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
const DEFAULT_THRESHOLD: f32 = 0.4;
const DEFAULT_INPUT_SIZE: u32 = 300;
const DEFAULT_MIN: f32 = -0.5;
const DEFAULT_MAX: f32 = 0.5;
const DEFAULT_STEP: f32 = 0.005;
const DEFAULT_NEUTRAL: f32 = 0.0;
const DEFAULT_DEAD_ZONE: [i32; 4] = [310, 230, 330, 250];
const DEFAULT_TOLERANCE: f32 = 20.0;
const DEFAULT_TITLE: &str = "tiltcam";
const DEFAULT_SNAPSHOT_LABEL: &str = "face";

#[derive(Debug, Deserialize, Default)]
struct StreamerConfigFile {
    http: Option<HttpConfigFile>,
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    actuator: Option<ActuatorConfigFile>,
    stream: Option<StreamConfigFile>,
    hooks: Option<Vec<HookConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
struct HttpConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    chunk_size: Option<usize>,
    loop_file: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    kind: Option<DetectorKind>,
    threshold: Option<f32>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    face_model_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ActuatorConfigFile {
    min: Option<f32>,
    max: Option<f32>,
    step: Option<f32>,
    neutral: Option<f32>,
    dead_zone: Option<[i32; 4]>,
    tolerance: Option<f32>,
    servo: Option<ServoConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServoConfigFile {
    kind: Option<String>,
    sysfs_root: Option<PathBuf>,
    chip: Option<u32>,
    channel: Option<u32>,
    period_ns: Option<u64>,
    min_pulse_ns: Option<u64>,
    max_pulse_ns: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HookConfigFile {
    labels: Vec<String>,
    snapshot_dir: PathBuf,
}

/// Daemon configuration: JSON file (`TILTCAM_CONFIG`), then environment overrides.
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub http_addr: String,
    pub capture: SourceConfig,
    pub chunk_size: usize,
    pub detector: DetectorSettings,
    pub actuator: ActuatorSettings,
    pub stream: StreamSettings,
    pub hooks: Vec<HookSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub threshold: f32,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub face_model_path: Option<PathBuf>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Passthrough,
            threshold: DEFAULT_THRESHOLD,
            model_path: None,
            labels_path: None,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            face_model_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorSettings {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub neutral: f32,
    pub dead_zone: PixelRect,
    pub tolerance: f32,
    pub servo: ServoSettings,
}

impl ActuatorSettings {
    pub fn state(&self) -> Result<ActuatorState> {
        ActuatorState::new(self.neutral, self.min, self.max, self.step)
    }

    pub fn dead_zone(&self) -> DeadZone {
        DeadZone::new(self.dead_zone, self.tolerance)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookSettings {
    pub labels: Vec<String>,
    pub snapshot_dir: PathBuf,
}

impl StreamerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TILTCAM_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load with an explicit config file (or none), still applying env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => StreamerConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StreamerConfigFile) -> Result<Self> {
        let http_addr = file
            .http
            .and_then(|http| http.addr)
            .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());

        let capture_file = file.capture.unwrap_or_default();
        let capture = SourceConfig {
            uri: capture_file
                .source
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            width: capture_file.width.unwrap_or(DEFAULT_WIDTH),
            height: capture_file.height.unwrap_or(DEFAULT_HEIGHT),
            fps: capture_file.fps.unwrap_or(DEFAULT_FPS),
            loop_file: capture_file.loop_file.unwrap_or(false),
        };
        let chunk_size = capture_file.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);

        let detector_file = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            kind: detector_file.kind.unwrap_or(defaults.kind),
            threshold: detector_file.threshold.unwrap_or(defaults.threshold),
            model_path: detector_file.model_path,
            labels_path: detector_file.labels_path,
            input_width: detector_file.input_width.unwrap_or(defaults.input_width),
            input_height: detector_file.input_height.unwrap_or(defaults.input_height),
            face_model_path: detector_file.face_model_path,
        };

        let actuator_file = file.actuator.unwrap_or_default();
        let [x0, y0, x1, y1] = actuator_file.dead_zone.unwrap_or(DEFAULT_DEAD_ZONE);
        let actuator = ActuatorSettings {
            min: actuator_file.min.unwrap_or(DEFAULT_MIN),
            max: actuator_file.max.unwrap_or(DEFAULT_MAX),
            step: actuator_file.step.unwrap_or(DEFAULT_STEP),
            neutral: actuator_file.neutral.unwrap_or(DEFAULT_NEUTRAL),
            dead_zone: PixelRect {
                left: x0,
                top: y0,
                right: x1,
                bottom: y1,
            },
            tolerance: actuator_file.tolerance.unwrap_or(DEFAULT_TOLERANCE),
            servo: servo_settings(actuator_file.servo)?,
        };

        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            jpeg_quality: stream_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            title: stream_file
                .title
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        };

        let hooks = file
            .hooks
            .unwrap_or_default()
            .into_iter()
            .map(|hook| HookSettings {
                labels: hook.labels,
                snapshot_dir: hook.snapshot_dir,
            })
            .collect();

        Ok(Self {
            http_addr,
            capture,
            chunk_size,
            detector,
            actuator,
            stream,
            hooks,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_nonempty("TILTCAM_HTTP_ADDR") {
            self.http_addr = addr;
        }
        if let Some(source) = env_nonempty("TILTCAM_SOURCE") {
            self.capture.uri = source;
        }
        if let Some(kind) = env_nonempty("TILTCAM_DETECTOR") {
            self.detector.kind = kind
                .parse()
                .map_err(|e| anyhow!("TILTCAM_DETECTOR: {}", e))?;
        }
        if let Some(threshold) = env_nonempty("TILTCAM_THRESHOLD") {
            self.detector.threshold = threshold
                .parse()
                .map_err(|_| anyhow!("TILTCAM_THRESHOLD must be a number between 0 and 1"))?;
        }
        if let Some(model) = env_nonempty("TILTCAM_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        if let Some(labels) = env_nonempty("TILTCAM_LABELS") {
            self.detector.labels_path = Some(PathBuf::from(labels));
        }
        if let Some(dir) = env_nonempty("TILTCAM_SNAPSHOT_DIR") {
            let mut labels = env_nonempty("TILTCAM_SNAPSHOT_LABELS")
                .map(|raw| split_csv(&raw))
                .unwrap_or_default();
            if labels.is_empty() {
                labels.push(DEFAULT_SNAPSHOT_LABEL.to_string());
            }
            self.hooks.push(HookSettings {
                labels,
                snapshot_dir: PathBuf::from(dir),
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow!("http addr '{}' is not a socket address", self.http_addr));
        }
        if self.capture.uri.trim().is_empty() {
            return Err(anyhow!("capture source must not be empty"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.capture.fps == 0 {
            return Err(anyhow!("capture fps must be greater than zero"));
        }
        if self.chunk_size == 0 {
            return Err(anyhow!("capture chunk_size must be greater than zero"));
        }

        let detector = &self.detector;
        if !(0.0..=1.0).contains(&detector.threshold) {
            return Err(anyhow!(
                "detector threshold must be within [0, 1], got {}",
                detector.threshold
            ));
        }
        if detector.input_width == 0 || detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        if detector.kind == DetectorKind::Object
            && (detector.model_path.is_none() || detector.labels_path.is_none())
        {
            return Err(anyhow!("object detector requires model_path and labels_path"));
        }

        let actuator = &self.actuator;
        actuator.state()?;
        let zone = actuator.dead_zone;
        if zone.left > zone.right || zone.top > zone.bottom {
            return Err(anyhow!(
                "dead zone ({}, {})-({}, {}) is not ordered",
                zone.left,
                zone.top,
                zone.right,
                zone.bottom
            ));
        }
        if !actuator.tolerance.is_finite() || actuator.tolerance < 0.0 {
            return Err(anyhow!("actuator tolerance must be non-negative"));
        }
        if let ServoSettings::Pwm(pwm) = &actuator.servo {
            pwm.validate()?;
        }

        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be within [1, 100], got {}",
                self.stream.jpeg_quality
            ));
        }
        for hook in &self.hooks {
            if hook.labels.is_empty() {
                return Err(anyhow!(
                    "hook for {} watches no labels",
                    hook.snapshot_dir.display()
                ));
            }
        }
        Ok(())
    }
}

fn servo_settings(file: Option<ServoConfigFile>) -> Result<ServoSettings> {
    let Some(file) = file else {
        return Ok(ServoSettings::Null);
    };
    match file.kind.as_deref().unwrap_or("null") {
        "null" | "none" => Ok(ServoSettings::Null),
        "pwm" => {
            let defaults = PwmConfig::default();
            Ok(ServoSettings::Pwm(PwmConfig {
                sysfs_root: file.sysfs_root.unwrap_or(defaults.sysfs_root),
                chip: file.chip.unwrap_or(defaults.chip),
                channel: file.channel.unwrap_or(defaults.channel),
                period_ns: file.period_ns.unwrap_or(defaults.period_ns),
                min_pulse_ns: file.min_pulse_ns.unwrap_or(defaults.min_pulse_ns),
                max_pulse_ns: file.max_pulse_ns.unwrap_or(defaults.max_pulse_ns),
            }))
        }
        other => Err(anyhow!(
            "unknown servo kind '{}'; expected null or pwm",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<StreamerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
