//! Closed-loop tilt control.
//!
//! `ActuatorController` is a bang-bang controller: each update moves the actuator by
//! exactly one `step` toward the target, or not at all while the target sits inside
//! the dead band. Every write path (tracking updates and manual nudges) goes through
//! one clamp-then-commit critical section, so the position can never leave
//! `[min, max]` and concurrent writers cannot lose each other's updates.

pub mod servo;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::detect::PixelRect;

pub use servo::{open_servo, NullServo, PwmConfig, PwmServo, ServoOutput, ServoSettings};

/// Actuator position register and its limits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ActuatorState {
    pub position: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl ActuatorState {
    /// Build a state starting at `neutral`.
    pub fn new(neutral: f32, min: f32, max: f32, step: f32) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(anyhow!("actuator range [{}, {}] is invalid", min, max));
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(anyhow!("actuator step must be positive, got {}", step));
        }
        if !(min..=max).contains(&neutral) {
            return Err(anyhow!(
                "actuator neutral {} outside range [{}, {}]",
                neutral,
                min,
                max
            ));
        }
        Ok(Self {
            position: neutral,
            min,
            max,
            step,
        })
    }
}

/// Fixed target region on the full-resolution frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeadZone {
    pub rect: PixelRect,
    /// Vertical distance from the reference point tolerated without moving.
    pub tolerance: f32,
}

impl DeadZone {
    pub fn new(rect: PixelRect, tolerance: f32) -> Self {
        Self {
            rect,
            tolerance: tolerance.abs(),
        }
    }

    /// Reference point the controller steers toward: the rectangle's center.
    pub fn reference(&self) -> (f32, f32) {
        self.rect.center()
    }

    /// Positive when the target is above the reference point.
    pub fn vertical_offset(&self, target_y: f32) -> f32 {
        self.reference().1 - target_y
    }
}

/// What an `update` did to the position register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjustment {
    Hold,
    Decrement,
    Increment,
}

struct Register {
    state: ActuatorState,
    servo: Box<dyn ServoOutput>,
}

impl Register {
    /// Clamp against this register's own limits, commit, and drive the servo.
    fn commit(&mut self, proposed: f32) -> f32 {
        if !proposed.is_finite() {
            return self.state.position;
        }
        let clamped = proposed.clamp(self.state.min, self.state.max);
        if clamped == self.state.position {
            return clamped;
        }
        self.state.position = clamped;
        if let Err(err) = self.servo.set_value(clamped) {
            log::warn!("servo {} write failed: {}", self.servo.name(), err);
        }
        clamped
    }
}

pub struct ActuatorController {
    register: Mutex<Register>,
    dead_zone: DeadZone,
}

impl ActuatorController {
    /// Create the controller and drive the servo to the initial position.
    pub fn new(state: ActuatorState, dead_zone: DeadZone, mut servo: Box<dyn ServoOutput>) -> Self {
        if let Err(err) = servo.set_value(state.position) {
            log::warn!("servo {} initial write failed: {}", servo.name(), err);
        }
        Self {
            register: Mutex::new(Register { state, servo }),
            dead_zone,
        }
    }

    // A commit either lands whole or not at all, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, Register> {
        self.register
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Step toward a target center given in full-resolution pixels.
    pub fn update(&self, target: (f32, f32)) -> Adjustment {
        let (_, target_y) = target;
        if !target_y.is_finite() {
            return Adjustment::Hold;
        }
        let offset = self.dead_zone.vertical_offset(target_y);
        let mut register = self.lock();
        let step = register.state.step;
        let position = register.state.position;
        let adjustment = if offset > self.dead_zone.tolerance {
            register.commit(position - step);
            Adjustment::Decrement
        } else if offset < -self.dead_zone.tolerance {
            register.commit(position + step);
            Adjustment::Increment
        } else {
            Adjustment::Hold
        };
        log::debug!(
            "tracking target y={:.1} offset={:.1} -> {:?} position={:.4}",
            target_y,
            offset,
            adjustment,
            register.state.position
        );
        adjustment
    }

    /// Move by `delta` (manual control). Returns the committed position.
    pub fn nudge(&self, delta: f32) -> f32 {
        let mut register = self.lock();
        let position = register.state.position;
        register.commit(position + delta)
    }

    pub fn step_up(&self) -> f32 {
        let step = self.state().step;
        self.nudge(step)
    }

    pub fn step_down(&self) -> f32 {
        let step = self.state().step;
        self.nudge(-step)
    }

    pub fn position(&self) -> f32 {
        self.lock().state.position
    }

    pub fn state(&self) -> ActuatorState {
        self.lock().state
    }

    pub fn dead_zone(&self) -> DeadZone {
        self.dead_zone
    }
}
