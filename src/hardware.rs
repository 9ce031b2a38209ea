// src/hardware.rs - pulse/pin abstraction and the simulated implementation
//
// The motion core drives step/direction pins and reads endstops through this
// trait; it knows nothing about GPIO registers or vendor SDKs. Implementations
// must be non-blocking: the step methods are called from the actuator tick.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use crate::motion::{ENDSTOPS_PER_AXIS, MAX_AXES};

pub trait MotionHardware: Send + Sync {
    /// Drive the step pin of an axis high or low. One rising edge = one step.
    fn set_step(&mut self, axis_idx: usize, high: bool);

    /// Latch the direction pin of an axis. `towards_max` is the logical
    /// direction (positive step delta); polarity inversion happens here.
    fn set_direction(&mut self, axis_idx: usize, towards_max: bool);

    /// Read an endstop switch (true = triggered, after polarity handling).
    fn read_endstop(&self, axis_idx: usize, endstop_idx: usize) -> bool;

    /// Enable or disable the motor drivers.
    fn set_motors_enabled(&mut self, enabled: bool);
}

/// Observable state of the simulated pins. Tests and the demo host hold this
/// behind an Arc while the actuator owns the `SimulatedHardware` it belongs
/// to.
#[derive(Debug, Default)]
pub struct HardwareProbe {
    step_counts: [AtomicU32; MAX_AXES],
    step_levels: [AtomicBool; MAX_AXES],
    dir_towards_max: [AtomicBool; MAX_AXES],
    dir_set_counts: [AtomicU32; MAX_AXES],
    endstops: [[AtomicBool; ENDSTOPS_PER_AXIS]; MAX_AXES],
    motors_enabled: AtomicBool,
    motor_enable_changes: AtomicI32,
    trace_enabled: AtomicBool,
    step_trace: Mutex<Vec<u8>>,
}

impl HardwareProbe {
    pub fn step_count(&self, axis_idx: usize) -> u32 {
        self.step_counts[axis_idx].load(Ordering::Acquire)
    }

    pub fn direction_towards_max(&self, axis_idx: usize) -> bool {
        self.dir_towards_max[axis_idx].load(Ordering::Acquire)
    }

    pub fn direction_set_count(&self, axis_idx: usize) -> u32 {
        self.dir_set_counts[axis_idx].load(Ordering::Acquire)
    }

    pub fn step_level(&self, axis_idx: usize) -> bool {
        self.step_levels[axis_idx].load(Ordering::Acquire)
    }

    pub fn motors_enabled(&self) -> bool {
        self.motors_enabled.load(Ordering::Acquire)
    }

    pub fn motor_enable_changes(&self) -> i32 {
        self.motor_enable_changes.load(Ordering::Acquire)
    }

    /// Script an endstop switch level for the simulation.
    pub fn set_endstop(&self, axis_idx: usize, endstop_idx: usize, triggered: bool) {
        self.endstops[axis_idx][endstop_idx].store(triggered, Ordering::Release);
    }

    /// Record the axis index of every step pulse (rising edge) from now on.
    pub fn enable_step_trace(&self) {
        self.trace_enabled.store(true, Ordering::Release);
    }

    pub fn take_step_trace(&self) -> Vec<u8> {
        std::mem::take(&mut *self.step_trace.lock().unwrap())
    }

    pub fn reset_counts(&self) {
        for axis_idx in 0..MAX_AXES {
            self.step_counts[axis_idx].store(0, Ordering::Release);
            self.dir_set_counts[axis_idx].store(0, Ordering::Release);
        }
        self.step_trace.lock().unwrap().clear();
    }
}

/// Pin driver backed by the probe above: counts rising step edges, remembers
/// direction levels and serves scripted endstop reads. Direction polarity per
/// axis mirrors what a GPIO implementation would do with its wiring config.
pub struct SimulatedHardware {
    probe: Arc<HardwareProbe>,
    direction_reversed: [bool; MAX_AXES],
}

impl SimulatedHardware {
    pub fn new() -> (Self, Arc<HardwareProbe>) {
        Self::with_direction_reversed([false; MAX_AXES])
    }

    pub fn with_direction_reversed(
        direction_reversed: [bool; MAX_AXES],
    ) -> (Self, Arc<HardwareProbe>) {
        let probe = Arc::new(HardwareProbe::default());
        (
            Self {
                probe: probe.clone(),
                direction_reversed,
            },
            probe,
        )
    }
}

impl MotionHardware for SimulatedHardware {
    fn set_step(&mut self, axis_idx: usize, high: bool) {
        if axis_idx >= MAX_AXES {
            return;
        }
        let was_high = self.probe.step_levels[axis_idx].swap(high, Ordering::AcqRel);
        if high && !was_high {
            self.probe.step_counts[axis_idx].fetch_add(1, Ordering::AcqRel);
            if self.probe.trace_enabled.load(Ordering::Acquire) {
                self.probe.step_trace.lock().unwrap().push(axis_idx as u8);
            }
        }
    }

    fn set_direction(&mut self, axis_idx: usize, towards_max: bool) {
        if axis_idx >= MAX_AXES {
            return;
        }
        let level = towards_max != self.direction_reversed[axis_idx];
        self.probe.dir_towards_max[axis_idx].store(level, Ordering::Release);
        self.probe.dir_set_counts[axis_idx].fetch_add(1, Ordering::AcqRel);
    }

    fn read_endstop(&self, axis_idx: usize, endstop_idx: usize) -> bool {
        if axis_idx >= MAX_AXES || endstop_idx >= ENDSTOPS_PER_AXIS {
            return false;
        }
        self.probe.endstops[axis_idx][endstop_idx].load(Ordering::Acquire)
    }

    fn set_motors_enabled(&mut self, enabled: bool) {
        self.probe.motors_enabled.store(enabled, Ordering::Release);
        self.probe.motor_enable_changes.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_rising_edges_only() {
        let (mut hw, probe) = SimulatedHardware::new();
        hw.set_step(0, true);
        hw.set_step(0, true);
        hw.set_step(0, false);
        hw.set_step(0, true);
        hw.set_step(0, false);
        assert_eq!(probe.step_count(0), 2);
        assert_eq!(probe.step_count(1), 0);
    }

    #[test]
    fn direction_polarity_applied() {
        let (mut hw, probe) = SimulatedHardware::with_direction_reversed([true, false, false]);
        hw.set_direction(0, true);
        hw.set_direction(1, true);
        assert!(!probe.direction_towards_max(0));
        assert!(probe.direction_towards_max(1));
    }

    #[test]
    fn step_trace_records_order() {
        let (mut hw, probe) = SimulatedHardware::new();
        probe.enable_step_trace();
        for axis in [0u8, 1, 0, 2] {
            hw.set_step(axis as usize, true);
            hw.set_step(axis as usize, false);
        }
        assert_eq!(probe.take_step_trace(), vec![0, 1, 0, 2]);
    }
}
