// src/motion/mod.rs - motion pipeline and trapezoidal step-rate actuator

pub mod actuator;
pub mod axes_params;
pub mod axis_values;
pub mod block;
pub mod command;
pub mod enabler;
pub mod geometry;
pub mod helper;
pub mod homing;
pub mod kinematics;
pub mod pipeline;
pub mod planner;

pub use actuator::MotionActuator;
pub use axes_params::{AxesParams, AxisParams};
pub use axis_values::{AxisEndstopChecks, AxisFloats, AxisInt32s, EndstopCondition};
pub use block::MotionBlock;
pub use command::{MoveCommand, MoveType};
pub use helper::MotionHelper;
pub use homing::MotionHoming;
pub use pipeline::MotionPipeline;
pub use planner::{MotionPlanner, PlannerConfig};

use thiserror::Error;

/// Number of controllable axes.
pub const MAX_AXES: usize = 3;

/// Endstop switches per axis (min and max).
pub const ENDSTOPS_PER_AXIS: usize = 2;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("motion pipeline full")]
    PipelineFull,
    #[error("target out of bounds on axis {0}")]
    OutOfBounds(usize),
    #[error("axis index {0} out of range")]
    InvalidAxis(usize),
}
