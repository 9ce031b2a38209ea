// src/motion/command.rs - decoded move request fed to the motion helper

use super::axis_values::{AxisEndstopChecks, AxisFloats};

/// Whether target coordinates are absolute positions or deltas from the
/// current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    Absolute,
    Relative,
}

/// A single decoded motion command. Upstream producers (GCode, patterns,
/// homing) fill one of these in and hand it to `MotionHelper::submit_move`.
#[derive(Debug, Clone)]
pub struct MoveCommand {
    /// Target position; only valid lanes participate in the move.
    pub target: AxisFloats,
    /// Requested feedrate in mm/s; None uses the axis maximum.
    pub feedrate_mmps: Option<f32>,
    /// Absolute/relative selector; None keeps the helper's current mode.
    pub move_type: Option<MoveType>,
    /// Endstop tests evaluated while the move executes.
    pub endstops: AxisEndstopChecks,
    /// Skip bounds checking (homing moves deliberately overshoot).
    pub allow_out_of_bounds: bool,
    /// Do not split the move into smaller blocks.
    pub dont_split: bool,
    /// Identifier latched by the actuator when the block completes, so
    /// sequencers can poll for completion without touching block internals.
    pub numbered_index: Option<i32>,
    /// Set on synthetic moves issued by the homing state machine.
    pub is_homing: bool,
}

impl Default for MoveCommand {
    fn default() -> Self {
        Self {
            target: AxisFloats::new(),
            feedrate_mmps: None,
            move_type: None,
            endstops: AxisEndstopChecks::none(),
            allow_out_of_bounds: false,
            dont_split: false,
            numbered_index: None,
            is_homing: false,
        }
    }
}

impl MoveCommand {
    pub fn to_point(target: AxisFloats) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub fn relative(target: AxisFloats) -> Self {
        Self {
            target,
            move_type: Some(MoveType::Relative),
            ..Default::default()
        }
    }

    pub fn with_feedrate(mut self, feedrate_mmps: f32) -> Self {
        self.feedrate_mmps = Some(feedrate_mmps);
        self
    }
}
