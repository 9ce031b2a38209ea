// src/motion/block.rs - one planned move and its step-rate schedule
//
// A block is written by the planner while `can_execute` is false and read by
// the actuator tick only after it observes `can_execute` true. Once the
// actuator marks a block `is_executing` the planner never touches its fields
// again. That flag pair, with release/acquire ordering, is the whole
// synchronization contract between the two contexts - there is no lock.

use std::sync::atomic::{AtomicBool, Ordering};

use super::MAX_AXES;
use super::axis_values::{AxisEndstopChecks, AxisFloats, AxisInt32s};

/// Scalar planning parameters derived from the master axis.
#[derive(Debug, Clone, Copy)]
pub struct MotionParams {
    pub master_max_accel_mmps2: f32,
    pub master_step_dist_mm: f32,
    pub min_step_rate_per_sec: f32,
    pub max_step_rate_per_sec: f32,
}

/// Phases of block execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StepPhase {
    #[default]
    Accel,
    Plateau,
    Decel,
}

/// Fixed-point step schedule for one axis: rates are in steps per K ticks,
/// acceleration in steps per K ticks per millisecond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisStepData {
    pub initial_step_rate_per_kticks: u32,
    pub acc_steps_per_kticks_per_ms: u32,
    pub steps_in_acc_phase: u32,
    pub steps_in_plateau_phase: u32,
    pub steps_in_decel_phase: u32,
}

impl AxisStepData {
    pub fn total_steps(&self) -> u32 {
        self.steps_in_acc_phase + self.steps_in_plateau_phase + self.steps_in_decel_phase
    }
}

#[derive(Debug)]
pub struct MotionBlock {
    /// Max speed for the move, possibly reduced by the commanded feedrate.
    pub max_param_speed_mmps: f32,
    /// Euclidean distance of the move considering primary axes only.
    pub move_dist_primary_axes_mm: f32,
    /// Max entry speed from the junction-deviation calculation.
    pub max_entry_speed_mmps: f32,
    pub entry_speed_mmps: f32,
    pub exit_speed_mmps: f32,
    /// Signed steps to target for each axis.
    pub steps_to_target: AxisInt32s,
    /// Unit vector of the move over the primary axes.
    pub unit_vectors: AxisFloats,
    /// Endstop tests evaluated during execution.
    pub endstops: AxisEndstopChecks,
    /// Completion identifier latched by the actuator, if any.
    pub numbered_index: Option<i32>,
    /// Entry speed may still change in later planning passes.
    pub recalculate: bool,
    /// Reserved: guaranteed to reach the junction maximum regardless of entry
    /// speed. Never set by the current planner.
    pub can_reach_jn_max: bool,
    /// Per-axis fixed-point step schedule, valid once `can_execute` is true.
    pub axis_step_data: [AxisStepData; MAX_AXES],
    /// Plateau step-rate ceiling for the axis with most steps.
    pub max_step_rate_per_kticks: u32,
    /// Exit step-rate for the axis with most steps; deceleration clamps here.
    pub final_step_rate_per_kticks: u32,
    is_executing: AtomicBool,
    can_execute: AtomicBool,
}

impl MotionBlock {
    /// Moves shorter than this are treated as no movement at all.
    pub const MINIMUM_MOVE_DIST_MM: f32 = 0.0001;

    /// Fixed-point denominator for step rates: a rate of K means one step
    /// every tick.
    pub const K_VALUE: u32 = 1_000_000_000;

    /// Actuation tick period. 20us gives a 50k steps/sec ceiling since each
    /// step needs at least two tick entries (pulse up, pulse down).
    pub const TICK_INTERVAL_NS: u32 = 20_000;
    pub const TICKS_PER_SEC: f32 = 1e9 / Self::TICK_INTERVAL_NS as f32;

    pub const NS_IN_A_MS: u32 = 1_000_000;

    /// Step rates are floored to the rate reached after this much
    /// acceleration, preventing a rate so low the accumulator never fires.
    pub const MIN_RATE_ACCEL_MS: f32 = 10.0;

    pub fn new() -> Self {
        Self {
            max_param_speed_mmps: 0.0,
            move_dist_primary_axes_mm: 0.0,
            max_entry_speed_mmps: 0.0,
            entry_speed_mmps: 0.0,
            exit_speed_mmps: 0.0,
            steps_to_target: AxisInt32s::new(),
            unit_vectors: AxisFloats::new(),
            endstops: AxisEndstopChecks::none(),
            numbered_index: None,
            recalculate: false,
            can_reach_jn_max: false,
            axis_step_data: Default::default(),
            max_step_rate_per_kticks: 0,
            final_step_rate_per_kticks: 0,
            is_executing: AtomicBool::new(false),
            can_execute: AtomicBool::new(false),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_executing(&self) -> bool {
        self.is_executing.load(Ordering::Acquire)
    }

    pub fn can_execute(&self) -> bool {
        self.can_execute.load(Ordering::Acquire)
    }

    /// Claim the block for execution. Returns true if this call made the
    /// false -> true transition, i.e. this is the block's first tick.
    pub fn begin_executing(&self) -> bool {
        !self.is_executing.swap(true, Ordering::AcqRel)
    }

    pub fn set_steps_to_target(&mut self, axis_idx: usize, steps: i32) {
        self.steps_to_target.set(axis_idx, steps);
    }

    pub fn steps_to_target(&self, axis_idx: usize) -> i32 {
        self.steps_to_target.get(axis_idx)
    }

    /// Axis with the largest absolute step count and that count. This axis is
    /// the timing master; other axes step in proportion to it.
    pub fn abs_max_steps_for_any_axis(&self) -> (u32, usize) {
        let mut abs_max_steps = 0u32;
        let mut axis_idx_with_max = 0usize;
        for axis_idx in 0..MAX_AXES {
            let abs_steps = self.steps_to_target.abs(axis_idx);
            if abs_steps > abs_max_steps {
                abs_max_steps = abs_steps;
                axis_idx_with_max = axis_idx;
            }
        }
        (abs_max_steps, axis_idx_with_max)
    }

    /// Speed attainable over `distance` starting at `target_velocity` under
    /// `acceleration` (pass a negative acceleration for the deceleration
    /// form), from v^2 = v0^2 + 2*a*d.
    pub fn max_allowable_speed(acceleration: f32, target_velocity: f32, distance: f32) -> f32 {
        (target_velocity * target_velocity - 2.0 * acceleration * distance)
            .max(0.0)
            .sqrt()
    }

    /// Backward planning pass. Called newest-to-oldest so each block's exit
    /// constraint is known before its entry is computed. Returns the new
    /// entry speed.
    pub fn calc_max_speed_reverse(&mut self, exit_speed: f32, params: &MotionParams) -> f32 {
        // If entry speed is already at the maximum entry speed the block is
        // cruising and nothing changes. Otherwise reset entry towards the
        // maximum, limited by what deceleration to the exit speed allows.
        if self.entry_speed_mmps != self.max_entry_speed_mmps {
            if !self.can_reach_jn_max && self.max_entry_speed_mmps > exit_speed {
                let max_entry = Self::max_allowable_speed(
                    -params.master_max_accel_mmps2,
                    exit_speed,
                    self.move_dist_primary_axes_mm,
                );
                self.entry_speed_mmps = max_entry.min(self.max_entry_speed_mmps);
            } else {
                self.entry_speed_mmps = self.max_entry_speed_mmps;
            }
        }
        self.entry_speed_mmps
    }

    /// Forward planning pass, oldest-to-newest. Clamps the inherited exit
    /// speed of the previous block to this block's ceilings; if the previous
    /// block could not accelerate past our planned entry we are acceleration
    /// limited and adopt its exit as our entry.
    pub fn calc_max_speed_forward(&mut self, prev_max_exit_speed: f32, params: &MotionParams) {
        let mut prev = prev_max_exit_speed;
        if prev > self.max_param_speed_mmps {
            prev = self.max_param_speed_mmps;
        }
        if prev > self.max_entry_speed_mmps {
            prev = self.max_entry_speed_mmps;
        }
        if prev <= self.entry_speed_mmps {
            self.entry_speed_mmps = prev;
            self.recalculate = false;
        }
        self.maximize_exit_speed(params);
    }

    pub fn maximize_exit_speed(&mut self, params: &MotionParams) {
        if self.is_executing() || self.can_reach_jn_max {
            return;
        }
        let max_exit = Self::max_allowable_speed(
            -params.master_max_accel_mmps2,
            self.entry_speed_mmps,
            self.move_dist_primary_axes_mm,
        );
        self.exit_speed_mmps = max_exit.min(self.exit_speed_mmps);
    }

    /// Compute the per-axis step schedule for the now-final entry/exit speeds.
    ///
    /// ```text
    ///                      +--------+  <- max speed
    ///                     /          \
    ///        entry ->    +            \
    ///                    |             + <- exit
    ///                    +-------------+
    ///                        time ->
    /// ```
    ///
    /// Clears `can_execute` before touching any schedule field and sets it
    /// again only when every field is consistent; the actuator never sees a
    /// half-written schedule. A block already executing is left untouched.
    pub fn calculate_trapezoid(&mut self, params: &MotionParams) {
        if self.is_executing() {
            return;
        }
        self.can_execute.store(false, Ordering::Release);
        // The actuator may have claimed the block between the check above and
        // the store. It can only have seen a fully-written schedule, so leave
        // it alone. The flag only ever transitions false -> true under us.
        if self.is_executing() {
            return;
        }

        let (abs_max_steps, _) = self.abs_max_steps_for_any_axis();
        let dist = self.move_dist_primary_axes_mm;
        if abs_max_steps == 0 || dist < Self::MINIMUM_MOVE_DIST_MM {
            // Degenerate move: no phases, completes on its first tick.
            self.axis_step_data = Default::default();
            self.max_step_rate_per_kticks = 0;
            self.final_step_rate_per_kticks = 0;
            self.can_execute.store(true, Ordering::Release);
            return;
        }

        let entry = self.entry_speed_mmps;
        let exit = self.exit_speed_mmps;
        let max_speed = self.max_param_speed_mmps.max(f32::EPSILON);
        let accel = params.master_max_accel_mmps2.max(f32::EPSILON);

        // Solve for the acceleration distance using (max acceleration
        // followed by max deceleration over the whole move):
        //   Vmax^2  = Ventry^2 + 2*A*Saccel
        //   Vexit^2 = Vmax^2   - 2*A*Sdecel
        //   Stotal  = Saccel + Sdecel
        let mut dist_accel = (exit * exit - entry * entry) / (4.0 * accel) + dist / 2.0;
        dist_accel = dist_accel.clamp(0.0, dist);
        let mut dist_decel = dist - dist_accel;
        let mut dist_plateau = 0.0f32;

        // If max speed arrives before the accel/decel crossover there is a
        // plateau phase.
        let dist_to_max_speed = (max_speed * max_speed - entry * entry) / (2.0 * accel);
        if dist_to_max_speed >= 0.0 && dist_to_max_speed < dist_accel {
            dist_accel = dist_to_max_speed;
            dist_decel = ((max_speed * max_speed - exit * exit) / (2.0 * accel)).clamp(0.0, dist);
            dist_plateau = (dist - dist_accel - dist_decel).max(0.0);
        }

        let dist_prop_accel = dist_accel / dist;
        let dist_prop_plateau = dist_plateau / dist;

        // Master-axis step rates in fixed point.
        let initial_step_rate_per_sec = entry / params.master_step_dist_mm;
        let final_step_rate_per_sec = exit / params.master_step_dist_mm;
        let max_step_rate_per_sec =
            (max_speed / params.master_step_dist_mm).min(params.max_step_rate_per_sec);

        let k = Self::K_VALUE as f32;
        let rate_ceiling = (Self::K_VALUE - 1) as f32;
        let master_acc_steps_per_sec2 = accel / params.master_step_dist_mm;
        let master_acc_per_kticks_per_ms =
            (k * master_acc_steps_per_sec2) / Self::TICKS_PER_SEC / 1000.0;

        let one_over_abs_max = 1.0 / abs_max_steps as f32;
        for axis_idx in 0..MAX_AXES {
            let abs_steps = self.steps_to_target.abs(axis_idx);
            let axis_factor = abs_steps as f32 * one_over_abs_max;

            let axis_initial_per_kticks =
                (k * initial_step_rate_per_sec * axis_factor) / Self::TICKS_PER_SEC;
            let axis_acc_per_kticks_per_ms = master_acc_per_kticks_per_ms * axis_factor;

            let steps_accel =
                ((abs_steps as f32 * dist_prop_accel).ceil() as u32).min(abs_steps);
            let steps_plateau =
                ((abs_steps as f32 * dist_prop_plateau) as u32).min(abs_steps - steps_accel);
            let steps_decel = abs_steps - steps_accel - steps_plateau;

            let configured_floor =
                (k * params.min_step_rate_per_sec * axis_factor) / Self::TICKS_PER_SEC;
            let floor =
                (axis_acc_per_kticks_per_ms * Self::MIN_RATE_ACCEL_MS).max(configured_floor);
            let initial = axis_initial_per_kticks.max(floor).min(rate_ceiling);

            self.axis_step_data[axis_idx] = AxisStepData {
                initial_step_rate_per_kticks: initial as u32,
                acc_steps_per_kticks_per_ms: axis_acc_per_kticks_per_ms as u32,
                steps_in_acc_phase: steps_accel,
                steps_in_plateau_phase: steps_plateau,
                steps_in_decel_phase: steps_decel,
            };
        }

        self.max_step_rate_per_kticks =
            ((k * max_step_rate_per_sec) / Self::TICKS_PER_SEC).min(rate_ceiling) as u32;
        self.final_step_rate_per_kticks =
            ((k * final_step_rate_per_sec) / Self::TICKS_PER_SEC).min(rate_ceiling) as u32;

        // Schedule complete; hand the block to the actuator.
        self.can_execute.store(true, Ordering::Release);
    }
}

impl Default for MotionBlock {
    fn default() -> Self {
        Self::new()
    }
}

// Manual Clone: atomic flags are copied by value, which is fine because
// cloning only happens in the producer context (queue slots, tests).
impl Clone for MotionBlock {
    fn clone(&self) -> Self {
        Self {
            max_param_speed_mmps: self.max_param_speed_mmps,
            move_dist_primary_axes_mm: self.move_dist_primary_axes_mm,
            max_entry_speed_mmps: self.max_entry_speed_mmps,
            entry_speed_mmps: self.entry_speed_mmps,
            exit_speed_mmps: self.exit_speed_mmps,
            steps_to_target: self.steps_to_target,
            unit_vectors: self.unit_vectors,
            endstops: self.endstops,
            numbered_index: self.numbered_index,
            recalculate: self.recalculate,
            can_reach_jn_max: self.can_reach_jn_max,
            axis_step_data: self.axis_step_data,
            max_step_rate_per_kticks: self.max_step_rate_per_kticks,
            final_step_rate_per_kticks: self.final_step_rate_per_kticks,
            is_executing: AtomicBool::new(self.is_executing.load(Ordering::Acquire)),
            can_execute: AtomicBool::new(self.can_execute.load(Ordering::Acquire)),
        }
    }
}
