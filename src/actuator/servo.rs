//! Physical servo outputs.
//!
//! Servo values use the common `[-1, 1]` convention: `-1` is the minimum pulse
//! width, `0` the midpoint, `1` the maximum pulse width.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const DEFAULT_SYSFS_ROOT: &str = "/sys/class/pwm";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Sink for committed actuator positions.
pub trait ServoOutput: Send {
    fn name(&self) -> &'static str;

    fn set_value(&mut self, value: f32) -> Result<()>;
}

/// Servo output that only remembers the last value. Used when no hardware is attached.
#[derive(Debug, Default)]
pub struct NullServo {
    last: Option<f32>,
}

impl NullServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_value(&self) -> Option<f32> {
        self.last
    }
}

impl ServoOutput for NullServo {
    fn name(&self) -> &'static str {
        "null"
    }

    fn set_value(&mut self, value: f32) -> Result<()> {
        log::debug!("servo(null) <- {:.4}", value);
        self.last = Some(value);
        Ok(())
    }
}

/// Linux sysfs PWM channel settings.
#[derive(Clone, Debug, PartialEq)]
pub struct PwmConfig {
    pub sysfs_root: PathBuf,
    pub chip: u32,
    pub channel: u32,
    /// PWM period; 20 ms is standard for hobby servos.
    pub period_ns: u64,
    pub min_pulse_ns: u64,
    pub max_pulse_ns: u64,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            chip: 0,
            channel: 0,
            period_ns: 20_000_000,
            min_pulse_ns: 1_000_000,
            max_pulse_ns: 2_000_000,
        }
    }
}

impl PwmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.period_ns == 0 {
            return Err(anyhow!("pwm period must be greater than zero"));
        }
        if self.min_pulse_ns > self.max_pulse_ns {
            return Err(anyhow!(
                "pwm min pulse {}ns exceeds max pulse {}ns",
                self.min_pulse_ns,
                self.max_pulse_ns
            ));
        }
        if self.max_pulse_ns > self.period_ns {
            return Err(anyhow!(
                "pwm max pulse {}ns exceeds period {}ns",
                self.max_pulse_ns,
                self.period_ns
            ));
        }
        Ok(())
    }

    /// Duty cycle for a servo value; out-of-range values are clamped to `[-1, 1]`.
    pub fn duty_ns(&self, value: f32) -> u64 {
        let value = f64::from(if value.is_nan() {
            0.0
        } else {
            value.clamp(-1.0, 1.0)
        });
        let min = self.min_pulse_ns as f64;
        let max = self.max_pulse_ns as f64;
        (min + (value + 1.0) / 2.0 * (max - min)).round() as u64
    }
}

/// Servo driven through `/sys/class/pwm/pwmchipN/pwmM`.
pub struct PwmServo {
    config: PwmConfig,
    channel_dir: PathBuf,
}

impl PwmServo {
    /// Export (if needed), configure and enable the PWM channel, centered.
    pub fn open(config: PwmConfig) -> Result<Self> {
        config.validate()?;
        let chip_dir = config.sysfs_root.join(format!("pwmchip{}", config.chip));
        let channel_dir = chip_dir.join(format!("pwm{}", config.channel));
        if !channel_dir.exists() {
            write_attr(&chip_dir.join("export"), &config.channel.to_string())?;
            wait_for_dir(&channel_dir)?;
        }

        write_attr(&channel_dir.join("period"), &config.period_ns.to_string())?;
        write_attr(&channel_dir.join("duty_cycle"), &config.duty_ns(0.0).to_string())?;
        write_attr(&channel_dir.join("enable"), "1")?;
        log::info!(
            "pwm servo enabled at {} (period {}ns)",
            channel_dir.display(),
            config.period_ns
        );
        Ok(Self {
            config,
            channel_dir,
        })
    }
}

impl ServoOutput for PwmServo {
    fn name(&self) -> &'static str {
        "pwm"
    }

    fn set_value(&mut self, value: f32) -> Result<()> {
        let duty = self.config.duty_ns(value);
        write_attr(&self.channel_dir.join("duty_cycle"), &duty.to_string())
    }
}

/// Which servo output the daemon drives.
#[derive(Clone, Debug, PartialEq)]
pub enum ServoSettings {
    Null,
    Pwm(PwmConfig),
}

pub fn open_servo(settings: &ServoSettings) -> Result<Box<dyn ServoOutput>> {
    match settings {
        ServoSettings::Null => Ok(Box::new(NullServo::new())),
        ServoSettings::Pwm(config) => Ok(Box::new(PwmServo::open(config.clone())?)),
    }
}

fn write_attr(path: &Path, value: &str) -> Result<()> {
    std::fs::write(path, value).with_context(|| format!("write {} to {}", value, path.display()))
}

fn wait_for_dir(dir: &Path) -> Result<()> {
    let started = Instant::now();
    while !dir.exists() {
        if started.elapsed() > EXPORT_TIMEOUT {
            return Err(anyhow!("pwm channel {} did not appear", dir.display()));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}
