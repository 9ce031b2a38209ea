// src/motion/actuator.rs - fixed-period tick state machine
//
// Runs in the tick context (hardware timer ISR on an MCU, a timed loop on the
// host). Must complete deterministically: no allocation, no locks, no logging
// anywhere in the tick path. Irregular states degrade to "axis inactive",
// never to a panic.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::hardware::MotionHardware;

use super::axis_values::{AxisEndstopChecks, EndstopCondition};
use super::block::{MotionBlock, StepPhase};
use super::pipeline::MotionPipeline;
use super::{ENDSTOPS_PER_AXIS, MAX_AXES};

/// No numbered command completed yet.
pub const NUMBERED_COMMAND_NONE: i32 = 0;

/// Per-axis execution state for the block in progress.
#[derive(Debug, Clone, Copy, Default)]
struct AxisExecData {
    /// True while the axis still has steps to make in this block.
    is_active: bool,
    phase: StepPhase,
    steps_acc_phase: u32,
    steps_plateau_phase: u32,
    steps_decel_phase: u32,
    /// Steps made in the current phase.
    cur_phase_step_count: u32,
    /// Step target of the current phase.
    target_step_count: u32,
    /// Total steps this axis makes in the block.
    total_steps: u32,
    /// Bresenham accumulator for non-dominant axes.
    relative_accumulator: u32,
    /// Step pin is currently high; lowered at the start of the next tick.
    step_pin_high: bool,
}

impl AxisExecData {
    /// Advance the phase after a step; clears is_active when the axis has
    /// consumed all its phases.
    fn advance_after_step(&mut self) {
        self.cur_phase_step_count += 1;
        if self.cur_phase_step_count < self.target_step_count {
            return;
        }
        self.cur_phase_step_count = 0;
        self.is_active = false;
        match self.phase {
            StepPhase::Accel => {
                if self.steps_plateau_phase != 0 {
                    self.phase = StepPhase::Plateau;
                    self.target_step_count = self.steps_plateau_phase;
                    self.is_active = true;
                } else if self.steps_decel_phase != 0 {
                    self.phase = StepPhase::Decel;
                    self.target_step_count = self.steps_decel_phase;
                    self.is_active = true;
                }
            }
            StepPhase::Plateau => {
                if self.steps_decel_phase != 0 {
                    self.phase = StepPhase::Decel;
                    self.target_step_count = self.steps_decel_phase;
                    self.is_active = true;
                }
            }
            StepPhase::Decel => {}
        }
    }
}

/// One endstop comparison armed for the executing block.
#[derive(Debug, Clone, Copy, Default)]
struct EndstopCheck {
    axis_idx: usize,
    endstop_idx: usize,
    /// Stop when the switch reads this value.
    stop_on: bool,
}

pub struct MotionActuator {
    hw: Box<dyn MotionHardware>,
    paused: AtomicBool,
    axes: [AxisExecData; MAX_AXES],
    /// Axis with the most steps in the executing block; its rate drives the
    /// step accumulator, other axes follow by Bresenham.
    dominant_axis_idx: usize,
    dominant_total_steps: u32,
    cur_step_rate_per_kticks: u32,
    max_step_rate_per_kticks: u32,
    final_step_rate_per_kticks: u32,
    acc_per_kticks_per_ms: u32,
    accumulator_step: u32,
    accumulator_ns: u32,
    endstop_checks: [EndstopCheck; MAX_AXES * ENDSTOPS_PER_AXIS],
    endstop_check_count: usize,
    endstop_reached: AtomicBool,
    last_done_numbered_index: AtomicI32,
}

impl MotionActuator {
    pub fn new(hw: Box<dyn MotionHardware>) -> Self {
        Self {
            hw,
            paused: AtomicBool::new(false),
            axes: Default::default(),
            dominant_axis_idx: 0,
            dominant_total_steps: 0,
            cur_step_rate_per_kticks: 0,
            max_step_rate_per_kticks: 0,
            final_step_rate_per_kticks: 0,
            acc_per_kticks_per_ms: 0,
            accumulator_step: 0,
            accumulator_ns: 0,
            endstop_checks: Default::default(),
            endstop_check_count: 0,
            endstop_reached: AtomicBool::new(false),
            last_done_numbered_index: AtomicI32::new(NUMBERED_COMMAND_NONE),
        }
    }

    /// Pause/resume. Takes effect within one tick period: the flag is checked
    /// at the top of every tick.
    pub fn pause(&self, pause_it: bool) {
        self.paused.store(pause_it, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Reset execution state (after a stop). Producer context only; the tick
    /// must not be running concurrently with this.
    pub fn clear(&mut self) {
        self.axes = Default::default();
        self.accumulator_step = 0;
        self.accumulator_ns = 0;
        self.cur_step_rate_per_kticks = 0;
        self.endstop_check_count = 0;
        self.endstop_reached.store(false, Ordering::Release);
    }

    /// Identifier of the most recently completed numbered block.
    pub fn last_done_numbered_index(&self) -> i32 {
        self.last_done_numbered_index.load(Ordering::Acquire)
    }

    /// An endstop test stopped a block early since the last clear.
    pub fn endstop_reached(&self) -> bool {
        self.endstop_reached.load(Ordering::Acquire)
    }

    pub fn clear_endstop_reached(&self) {
        self.endstop_reached.store(false, Ordering::Release);
    }

    pub fn set_motors_enabled(&mut self, enabled: bool) {
        self.hw.set_motors_enabled(enabled);
    }

    /// Any axis mid-block.
    pub fn any_axis_active(&self) -> bool {
        self.axes.iter().any(|a| a.is_active)
    }

    /// One fixed-period tick. The platform layer calls this every
    /// `MotionBlock::TICK_INTERVAL_NS` nanoseconds.
    pub fn tick(&mut self, pipeline: &MotionPipeline) {
        if self.paused.load(Ordering::Acquire) {
            return;
        }

        // Finish any pending step pulse first and return, keeping the pulse
        // width at one full tick period.
        if self.handle_step_end() {
            return;
        }

        let Some(block) = pipeline.peek_get() else {
            return;
        };
        if !block.can_execute() {
            return;
        }

        if block.begin_executing() {
            // Setup tick: cache the schedule, set direction pins, no
            // stepping. Bounds the worst-case time of any single tick.
            self.setup_new_block(block);
            return;
        }

        // Endstop tests armed for this block.
        if self.endstop_check_count > 0 && self.check_endstops() {
            self.endstop_reached.store(true, Ordering::Release);
            self.end_motion(pipeline, block);
            return;
        }

        // A block whose axes are all inactive (e.g. zero total steps, or the
        // final pulse went out last tick) is complete.
        if !self.axes.iter().any(|a| a.is_active) {
            self.end_motion(pipeline, block);
            return;
        }

        self.update_ms_accumulator();

        // Fixed-point step accumulator for the dominant axis.
        self.accumulator_step = self
            .accumulator_step
            .wrapping_add(self.cur_step_rate_per_kticks);
        if self.accumulator_step >= MotionBlock::K_VALUE {
            self.accumulator_step -= MotionBlock::K_VALUE;
            let any_axis_moving = self.handle_step_motion();
            if !any_axis_moving {
                self.end_motion(pipeline, block);
            }
        }
    }

    /// Lower step pins raised on the previous tick. Returns true if any pin
    /// was lowered.
    fn handle_step_end(&mut self) -> bool {
        let mut any_pin_reset = false;
        for axis_idx in 0..MAX_AXES {
            if self.axes[axis_idx].step_pin_high {
                self.hw.set_step(axis_idx, false);
                self.axes[axis_idx].step_pin_high = false;
                any_pin_reset = true;
            }
        }
        any_pin_reset
    }

    fn setup_new_block(&mut self, block: &MotionBlock) {
        let (dominant_steps, dominant_idx) = block.abs_max_steps_for_any_axis();
        self.dominant_axis_idx = dominant_idx;
        self.dominant_total_steps = dominant_steps;
        self.accumulator_step = 0;
        self.accumulator_ns = 0;

        for axis_idx in 0..MAX_AXES {
            let data = &block.axis_step_data[axis_idx];
            let exec = &mut self.axes[axis_idx];
            *exec = AxisExecData::default();
            exec.total_steps = data.total_steps();
            if exec.total_steps == 0 {
                // Zero-length axis: never active.
                continue;
            }
            exec.steps_acc_phase = data.steps_in_acc_phase;
            exec.steps_plateau_phase = data.steps_in_plateau_phase;
            exec.steps_decel_phase = data.steps_in_decel_phase;
            // First non-empty phase.
            if exec.steps_acc_phase != 0 {
                exec.phase = StepPhase::Accel;
                exec.target_step_count = exec.steps_acc_phase;
            } else if exec.steps_plateau_phase != 0 {
                exec.phase = StepPhase::Plateau;
                exec.target_step_count = exec.steps_plateau_phase;
            } else {
                exec.phase = StepPhase::Decel;
                exec.target_step_count = exec.steps_decel_phase;
            }
            exec.is_active = true;
            // Direction set once per axis for the whole block.
            self.hw
                .set_direction(axis_idx, block.steps_to_target(axis_idx) >= 0);
        }

        let dominant_data = &block.axis_step_data[dominant_idx];
        self.cur_step_rate_per_kticks = dominant_data.initial_step_rate_per_kticks;
        self.acc_per_kticks_per_ms = dominant_data.acc_steps_per_kticks_per_ms;
        self.max_step_rate_per_kticks = block.max_step_rate_per_kticks;
        self.final_step_rate_per_kticks = block.final_step_rate_per_kticks;

        self.arm_endstop_checks(block);
    }

    /// Translate the block's endstop conditions into pin/value comparisons.
    fn arm_endstop_checks(&mut self, block: &MotionBlock) {
        self.endstop_check_count = 0;
        if !block.endstops.any() {
            return;
        }
        for axis_idx in 0..MAX_AXES {
            for endstop_idx in 0..ENDSTOPS_PER_AXIS {
                let condition = block.endstops.get(axis_idx, endstop_idx);
                let stop_on = match condition {
                    EndstopCondition::None => continue,
                    EndstopCondition::Hit => true,
                    EndstopCondition::NotHit => false,
                    EndstopCondition::Towards => {
                        // Only armed when the axis moves towards this switch.
                        let steps = block.steps_to_target(axis_idx);
                        let towards = if endstop_idx == AxisEndstopChecks::MAX_ENDSTOP {
                            steps > 0
                        } else {
                            steps < 0
                        };
                        if !towards {
                            continue;
                        }
                        true
                    }
                };
                self.endstop_checks[self.endstop_check_count] = EndstopCheck {
                    axis_idx,
                    endstop_idx,
                    stop_on,
                };
                self.endstop_check_count += 1;
            }
        }
    }

    fn check_endstops(&self) -> bool {
        for check in &self.endstop_checks[..self.endstop_check_count] {
            if self.hw.read_endstop(check.axis_idx, check.endstop_idx) == check.stop_on {
                return true;
            }
        }
        false
    }

    /// Accumulate tick time; on each millisecond boundary apply the dominant
    /// axis phase's acceleration to the current step rate. Acceleration never
    /// exceeds the plateau rate, deceleration never undershoots the exit rate
    /// (or the anti-stall floor).
    fn update_ms_accumulator(&mut self) {
        self.accumulator_ns += MotionBlock::TICK_INTERVAL_NS;
        if self.accumulator_ns < MotionBlock::NS_IN_A_MS {
            return;
        }
        // Keep the remainder to avoid accumulating rounding error.
        self.accumulator_ns -= MotionBlock::NS_IN_A_MS;

        match self.axes[self.dominant_axis_idx].phase {
            StepPhase::Accel => {
                let bumped = self
                    .cur_step_rate_per_kticks
                    .saturating_add(self.acc_per_kticks_per_ms);
                self.cur_step_rate_per_kticks =
                    bumped.min(self.max_step_rate_per_kticks.max(1));
            }
            StepPhase::Plateau => {}
            StepPhase::Decel => {
                let floor = self
                    .final_step_rate_per_kticks
                    .max(self.acc_per_kticks_per_ms.saturating_mul(
                        MotionBlock::MIN_RATE_ACCEL_MS as u32,
                    ))
                    .max(1);
                let dropped = self
                    .cur_step_rate_per_kticks
                    .saturating_sub(self.acc_per_kticks_per_ms);
                self.cur_step_rate_per_kticks = dropped.max(floor);
            }
        }
    }

    /// Emit a dominant-axis step and proportional steps on the other axes.
    /// Returns true while any axis still has steps to make.
    fn handle_step_motion(&mut self) -> bool {
        let dominant_idx = self.dominant_axis_idx;
        if self.axes[dominant_idx].is_active {
            self.hw.set_step(dominant_idx, true);
            self.axes[dominant_idx].step_pin_high = true;
            self.axes[dominant_idx].advance_after_step();
        }

        for axis_idx in 0..MAX_AXES {
            if axis_idx == dominant_idx || !self.axes[axis_idx].is_active {
                continue;
            }
            // Bresenham: step when this axis's share of the dominant step
            // count rolls over.
            self.axes[axis_idx].relative_accumulator += self.axes[axis_idx].total_steps;
            if self.axes[axis_idx].relative_accumulator >= self.dominant_total_steps {
                self.axes[axis_idx].relative_accumulator -= self.dominant_total_steps;
                self.hw.set_step(axis_idx, true);
                self.axes[axis_idx].step_pin_high = true;
                self.axes[axis_idx].advance_after_step();
            }
        }

        self.axes.iter().any(|a| a.is_active)
    }

    /// Retire the completed (or endstop-stopped) head block.
    fn end_motion(&mut self, pipeline: &MotionPipeline, block: &MotionBlock) {
        if let Some(index) = block.numbered_index {
            self.last_done_numbered_index.store(index, Ordering::Release);
        }
        for axis in &mut self.axes {
            axis.is_active = false;
        }
        pipeline.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;
    use crate::motion::block::MotionParams;

    fn test_params() -> MotionParams {
        MotionParams {
            master_max_accel_mmps2: 100.0,
            master_step_dist_mm: 0.01,
            min_step_rate_per_sec: 0.0,
            max_step_rate_per_sec: 50_000.0,
        }
    }

    fn queue_block(
        pipeline: &mut MotionPipeline,
        x: i32,
        y: i32,
        dist_mm: f32,
        max_speed: f32,
        numbered: Option<i32>,
    ) {
        let mut block = MotionBlock::new();
        block.set_steps_to_target(0, x);
        block.set_steps_to_target(1, y);
        block.move_dist_primary_axes_mm = dist_mm;
        block.max_param_speed_mmps = max_speed;
        block.numbered_index = numbered;
        block.calculate_trapezoid(&test_params());
        assert!(pipeline.add(block));
    }

    fn run_until_idle(actuator: &mut MotionActuator, pipeline: &MotionPipeline, max_ticks: u64) {
        let mut ticks = 0u64;
        while pipeline.can_get() {
            actuator.tick(pipeline);
            ticks += 1;
            assert!(ticks < max_ticks, "did not finish within {max_ticks} ticks");
        }
        // A final tick to lower any pin left high by the last step.
        actuator.tick(pipeline);
    }

    #[test]
    fn block_emits_exact_step_counts() {
        let (hw, probe) = SimulatedHardware::new();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        queue_block(&mut pipeline, 1000, 400, 10.0, 100.0, Some(42));
        run_until_idle(&mut actuator, &pipeline, 20_000_000);
        assert_eq!(probe.step_count(0), 1000);
        assert_eq!(probe.step_count(1), 400);
        assert_eq!(actuator.last_done_numbered_index(), 42);
    }

    #[test]
    fn direction_pins_set_once_per_block() {
        let (hw, probe) = SimulatedHardware::new();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        queue_block(&mut pipeline, 500, -200, 5.0, 100.0, None);
        run_until_idle(&mut actuator, &pipeline, 20_000_000);
        assert!(probe.direction_towards_max(0));
        assert!(!probe.direction_towards_max(1));
        assert_eq!(probe.direction_set_count(0), 1);
        assert_eq!(probe.direction_set_count(1), 1);
    }

    #[test]
    fn bresenham_distribution_is_even() {
        let (hw, probe) = SimulatedHardware::new();
        probe.enable_step_trace();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        let dominant = 1000u32;
        let secondary = 400u32;
        queue_block(&mut pipeline, dominant as i32, secondary as i32, 10.0, 100.0, None);
        run_until_idle(&mut actuator, &pipeline, 20_000_000);
        let trace = probe.take_step_trace();
        let y_pulses = trace.iter().filter(|&&a| a == 1).count() as u32;
        assert_eq!(y_pulses, secondary);
        // No gap between consecutive secondary pulses exceeds
        // ceil(dominant / secondary) + 1 dominant pulses.
        let max_gap = (dominant + secondary - 1) / secondary + 1;
        let mut gap = 0u32;
        for &axis in &trace {
            if axis == 0 {
                gap += 1;
                assert!(gap <= max_gap, "cluster of {gap} X pulses");
            } else if axis == 1 {
                gap = 0;
            }
        }
    }

    #[test]
    fn pause_takes_effect_within_one_tick() {
        let (hw, probe) = SimulatedHardware::new();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        queue_block(&mut pipeline, 1000, 0, 10.0, 100.0, None);
        for _ in 0..5_000 {
            actuator.tick(&pipeline);
        }
        let steps_at_pause = probe.step_count(0);
        assert!(steps_at_pause > 0);
        assert!(pipeline.can_get(), "move should still be in progress");
        actuator.pause(true);
        for _ in 0..50_000 {
            actuator.tick(&pipeline);
        }
        assert_eq!(probe.step_count(0), steps_at_pause);
        actuator.pause(false);
        run_until_idle(&mut actuator, &pipeline, 20_000_000);
        assert_eq!(probe.step_count(0), 1000);
    }

    #[test]
    fn zero_step_block_completes_immediately() {
        let (hw, probe) = SimulatedHardware::new();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        queue_block(&mut pipeline, 0, 0, 0.0, 100.0, Some(7));
        // Setup tick claims the block, next tick retires it.
        actuator.tick(&pipeline);
        actuator.tick(&pipeline);
        assert!(!pipeline.can_get());
        assert_eq!(probe.step_count(0), 0);
        assert_eq!(actuator.last_done_numbered_index(), 7);
    }

    #[test]
    fn not_executable_block_waits() {
        let (hw, probe) = SimulatedHardware::new();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        // Queue a block whose trapezoid has not been computed: gate closed.
        let mut block = MotionBlock::new();
        block.set_steps_to_target(0, 100);
        block.move_dist_primary_axes_mm = 1.0;
        block.max_param_speed_mmps = 50.0;
        assert!(pipeline.add(block));
        for _ in 0..1000 {
            actuator.tick(&pipeline);
        }
        assert_eq!(probe.step_count(0), 0);
        assert!(pipeline.can_get());
    }

    #[test]
    fn endstop_hit_stops_block_early() {
        let (hw, probe) = SimulatedHardware::new();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        let mut block = MotionBlock::new();
        block.set_steps_to_target(0, -100_000);
        block.move_dist_primary_axes_mm = 1000.0;
        block.max_param_speed_mmps = 100.0;
        block.numbered_index = Some(9);
        block
            .endstops
            .set(0, AxisEndstopChecks::MIN_ENDSTOP, EndstopCondition::Hit);
        block.calculate_trapezoid(&test_params());
        assert!(pipeline.add(block));

        // Run a while, then trip the endstop.
        for _ in 0..100_000 {
            actuator.tick(&pipeline);
        }
        assert!(pipeline.can_get());
        let steps_before = probe.step_count(0);
        assert!(steps_before < 100_000);
        probe.set_endstop(0, AxisEndstopChecks::MIN_ENDSTOP, true);
        for _ in 0..10 {
            actuator.tick(&pipeline);
        }
        assert!(!pipeline.can_get(), "block should be retired on endstop hit");
        assert!(actuator.endstop_reached());
        assert_eq!(actuator.last_done_numbered_index(), 9);
        // No further pulses after the stop.
        let steps_after = probe.step_count(0);
        for _ in 0..1000 {
            actuator.tick(&pipeline);
        }
        assert_eq!(probe.step_count(0), steps_after);
    }

    #[test]
    fn towards_endstop_only_armed_in_direction_of_travel() {
        let (hw, probe) = SimulatedHardware::new();
        let mut actuator = MotionActuator::new(Box::new(hw));
        let mut pipeline = MotionPipeline::new(10);
        let mut block = MotionBlock::new();
        // Moving away from the min endstop.
        block.set_steps_to_target(0, 1000);
        block.move_dist_primary_axes_mm = 10.0;
        block.max_param_speed_mmps = 100.0;
        block
            .endstops
            .set(0, AxisEndstopChecks::MIN_ENDSTOP, EndstopCondition::Towards);
        block.calculate_trapezoid(&test_params());
        assert!(pipeline.add(block));
        // Min endstop held triggered the whole time; must be ignored.
        probe.set_endstop(0, AxisEndstopChecks::MIN_ENDSTOP, true);
        run_until_idle(&mut actuator, &pipeline, 20_000_000);
        assert_eq!(probe.step_count(0), 1000);
    }
}
