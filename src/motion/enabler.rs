// src/motion/enabler.rs - motor enable with idle-timeout disable

use std::time::{Duration, Instant};

/// Tracks whether the motor drivers should be energized. Motion being fed
/// enables them; a configurable stretch with no motion disables them again.
/// The owner applies the returned transitions through the hardware layer.
#[derive(Debug)]
pub struct MotorEnabler {
    idle_timeout: Duration,
    enabled: bool,
    last_motion_at: Instant,
}

impl MotorEnabler {
    pub fn new(idle_timeout_secs: u64) -> Self {
        Self {
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            enabled: false,
            last_motion_at: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Motion is being fed. Returns true when this transitions the motors
    /// from disabled to enabled.
    pub fn motion_fed(&mut self) -> bool {
        self.last_motion_at = Instant::now();
        if !self.enabled {
            self.enabled = true;
            tracing::debug!("motors enabled");
            return true;
        }
        false
    }

    /// Periodic service. `busy` keeps the idle clock reset. Returns true when
    /// the idle timeout expires and the motors transition to disabled.
    pub fn service(&mut self, busy: bool) -> bool {
        if busy {
            self.last_motion_at = Instant::now();
            return false;
        }
        if self.enabled
            && self.idle_timeout > Duration::ZERO
            && self.last_motion_at.elapsed() >= self.idle_timeout
        {
            self.enabled = false;
            tracing::debug!("motors disabled after idle timeout");
            return true;
        }
        false
    }
}
