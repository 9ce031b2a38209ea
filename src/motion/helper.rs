// src/motion/helper.rs - orchestration between commands, planner and actuator
//
// Turns external move/homing requests into pipeline blocks: bounds checking,
// absolute/relative handling, splitting long moves, pause/stop, position
// bookkeeping and the status queries upstream layers poll.

use crate::config::Config;
use crate::hardware::MotionHardware;

use super::actuator::MotionActuator;
use super::axes_params::{AxesParams, AxisParams};
use super::axis_values::{AxisFloats, AxisPosition};
use super::command::{MoveCommand, MoveType};
use super::enabler::MotorEnabler;
use super::homing::{HomingAction, MotionHoming};
use super::kinematics::{Kinematics, create_kinematics};
use super::pipeline::MotionPipeline;
use super::planner::{MotionPlanner, PlannerConfig};
use super::{MAX_AXES, MotionError};

/// A long move being expanded into pipeline blocks as space frees up.
#[derive(Debug)]
struct SplitMoveState {
    command: MoveCommand,
    start_pos: AxisFloats,
    delta_per_block: AxisFloats,
    end_pos: AxisFloats,
    cur_block: usize,
    total_blocks: usize,
}

pub struct MotionHelper {
    axes_params: AxesParams,
    pipeline: MotionPipeline,
    planner: MotionPlanner,
    actuator: MotionActuator,
    kinematics: Box<dyn Kinematics>,
    homing: MotionHoming,
    enabler: MotorEnabler,
    cur_position: AxisPosition,
    move_relative: bool,
    is_paused: bool,
    block_dist_mm: f32,
    split: Option<SplitMoveState>,
}

impl MotionHelper {
    pub fn new(config: &Config, hw: Box<dyn MotionHardware>) -> Self {
        let axes_params = AxesParams::new([
            AxisParams::from(config.axes.get(0)),
            AxisParams::from(config.axes.get(1)),
            AxisParams::from(config.axes.get(2)),
        ]);
        let planner = MotionPlanner::new(PlannerConfig {
            junction_deviation_mm: config.robot.junction_deviation_mm,
            minimum_planner_speed_mmps: 0.0,
            lookahead_blocks: config.robot.lookahead_blocks,
        });
        let mut homing = MotionHoming::new();
        homing.configure(&config.homing.sequence, config.homing.max_duration_secs);
        tracing::info!(
            "motion pipeline len {}, block dist {:.2}mm (0=no-max)",
            config.robot.pipeline_len,
            config.robot.block_dist_mm
        );
        Self {
            axes_params,
            pipeline: MotionPipeline::new(config.robot.pipeline_len),
            planner,
            actuator: MotionActuator::new(hw),
            kinematics: create_kinematics(
                &config.robot.kinematics,
                config.robot.shoulder_elbow_mm,
                config.robot.elbow_hand_mm,
            ),
            homing,
            enabler: MotorEnabler::new(config.motors.idle_disable_secs),
            cur_position: AxisPosition {
                // Power-on position is a known zero on every axis.
                position_mm: AxisFloats::from_xyz(0.0, 0.0, 0.0),
                ..AxisPosition::default()
            },
            move_relative: false,
            is_paused: false,
            block_dist_mm: config.robot.block_dist_mm,
            split: None,
        }
    }

    /// Whether a new command would currently be accepted.
    pub fn can_accept(&self) -> bool {
        self.split.is_none() && self.pipeline.can_accept()
    }

    /// Validate and queue a move. The only rejection reasons are a full
    /// pipeline and out-of-bounds targets; degenerate moves are accepted and
    /// complete trivially.
    pub fn submit_move(&mut self, command: MoveCommand) -> Result<(), MotionError> {
        if let Some(move_type) = command.move_type {
            self.move_relative = move_type == MoveType::Relative;
        }

        // Destination in mm; unspecified axes stay where they are.
        let mut dest_pos = AxisFloats::new();
        let mut include_dist = [false; MAX_AXES];
        for axis_idx in 0..MAX_AXES {
            let cur = self.cur_position.position_mm.get(axis_idx);
            let val = if !command.target.is_valid(axis_idx) {
                cur
            } else if self.move_relative {
                cur + command.target.get(axis_idx)
            } else {
                command.target.get(axis_idx)
            };
            dest_pos.set(axis_idx, val);
            include_dist[axis_idx] = self.axes_params.is_primary_axis(axis_idx);
        }

        if !command.allow_out_of_bounds {
            for axis_idx in 0..MAX_AXES {
                let mut val = dest_pos.get(axis_idx);
                if !self.axes_params.axis(axis_idx).pt_in_bounds(&mut val, false) {
                    tracing::warn!(
                        "move rejected: axis {axis_idx} target {val} out of bounds"
                    );
                    return Err(MotionError::OutOfBounds(axis_idx));
                }
            }
        }

        if !self.can_accept() {
            return Err(MotionError::PipelineFull);
        }

        // Split into blocks of at most block_dist_mm.
        let line_len = dest_pos.distance_to(&self.cur_position.position_mm, &include_dist);
        let mut total_blocks = 1usize;
        if !command.dont_split && self.block_dist_mm > 0.01 {
            total_blocks = ((line_len / self.block_dist_mm) as usize).max(1);
        }

        self.split = Some(SplitMoveState {
            start_pos: self.cur_position.position_mm,
            delta_per_block: (dest_pos - self.cur_position.position_mm) / total_blocks as f32,
            end_pos: dest_pos,
            command,
            cur_block: 0,
            total_blocks,
        });
        self.process_split();
        Ok(())
    }

    /// Feed pending split blocks while the pipeline has room.
    fn process_split(&mut self) {
        while self.pipeline.can_accept() {
            let Some(split) = &mut self.split else {
                return;
            };
            let mut next_dest = split.start_pos + split.delta_per_block * (split.cur_block + 1) as f32;
            if split.cur_block + 1 >= split.total_blocks {
                // Last block lands exactly on the requested end point.
                next_dest = split.end_pos;
            }
            split.cur_block += 1;
            let done = split.cur_block >= split.total_blocks;
            let command = split.command.clone();
            if done {
                self.split = None;
            }
            self.add_to_planner(&command, next_dest);
        }
    }

    fn add_to_planner(&mut self, command: &MoveCommand, dest_pos: AxisFloats) {
        let actuator_coords = self.kinematics.point_to_actuator(&dest_pos, &self.axes_params);
        let added = self.planner.add_move(
            command,
            &dest_pos,
            &actuator_coords,
            &mut self.cur_position,
            &self.axes_params,
            &mut self.pipeline,
        );
        if added {
            self.cur_position.position_mm = dest_pos;
            if self.enabler.motion_fed() {
                self.actuator.set_motors_enabled(true);
            }
        }
    }

    /// Normal-context service pump: homing progress, split-move feeding,
    /// motor idle handling. Call regularly (ms cadence, not tick cadence).
    pub fn service(&mut self) {
        let last_completed = self.actuator.last_done_numbered_index();
        match self.homing.service(&self.axes_params, last_completed) {
            Some(HomingAction::Move(command)) => {
                if let Err(err) = self.submit_move(command) {
                    tracing::warn!("homing move rejected: {err}");
                }
            }
            Some(HomingAction::SetHome(axis_idx)) => self.set_cur_position_as_home(axis_idx),
            None => {}
        }

        self.process_split();

        let busy =
            self.is_moving() || self.split.is_some() || self.homing.is_homing_in_progress();
        if self.enabler.service(busy) {
            self.actuator.set_motors_enabled(false);
        }
    }

    /// One actuator tick. The platform timer drives this at the fixed tick
    /// period.
    pub fn service_tick(&mut self) {
        self.actuator.tick(&self.pipeline);
    }

    /// Run a batch of ticks, e.g. to cover elapsed wall time on the host.
    pub fn service_ticks(&mut self, count: u32) {
        for _ in 0..count {
            self.actuator.tick(&self.pipeline);
        }
    }

    /// Pause (or resume) all motion. Takes effect within one tick.
    pub fn pause(&mut self, pause_it: bool) {
        self.actuator.pause(pause_it);
        self.is_paused = pause_it;
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// Drop all queued motion and reset execution state.
    pub fn stop(&mut self) {
        self.pipeline.clear();
        self.actuator.clear();
        self.planner.reset();
        self.split = None;
        self.actuator.pause(false);
        self.is_paused = false;
    }

    pub fn is_idle(&self) -> bool {
        !self.pipeline.can_get() && self.split.is_none()
    }

    pub fn is_moving(&self) -> bool {
        self.pipeline.can_get()
    }

    pub fn queue_depth(&self) -> usize {
        self.pipeline.count()
    }

    pub fn last_completed_numbered_index(&self) -> i32 {
        self.actuator.last_done_numbered_index()
    }

    pub fn endstop_reached(&self) -> bool {
        self.actuator.endstop_reached()
    }

    pub fn position_mm(&self) -> AxisFloats {
        self.cur_position.position_mm
    }

    pub fn steps_from_zero(&self, axis_idx: usize) -> Result<i32, MotionError> {
        if axis_idx >= MAX_AXES {
            return Err(MotionError::InvalidAxis(axis_idx));
        }
        Ok(self.cur_position.steps_from_home.get(axis_idx))
    }

    /// Adopt the current position as home/zero for the axis.
    pub fn set_cur_position_as_home(&mut self, axis_idx: usize) {
        if axis_idx >= MAX_AXES {
            return;
        }
        self.cur_position.steps_from_home.set(axis_idx, 0);
        self.cur_position.position_mm.set(axis_idx, 0.0);
        tracing::info!("axis {axis_idx} zeroed at current position");
    }

    pub fn reset_zero(&mut self, axis_idx: usize) -> Result<(), MotionError> {
        if axis_idx >= MAX_AXES {
            return Err(MotionError::InvalidAxis(axis_idx));
        }
        self.set_cur_position_as_home(axis_idx);
        Ok(())
    }

    /// Replace one axis's kinematic parameters at runtime.
    pub fn configure_axis(&mut self, axis_idx: usize, params: AxisParams) -> Result<(), MotionError> {
        if axis_idx >= MAX_AXES {
            return Err(MotionError::InvalidAxis(axis_idx));
        }
        self.axes_params.set_axis(axis_idx, params);
        Ok(())
    }

    pub fn axes_params(&self) -> &AxesParams {
        &self.axes_params
    }

    /// Begin the configured homing sequence for the selected axes.
    pub fn start_homing(&mut self, axes_to_home: [bool; MAX_AXES]) {
        if !self.is_idle() {
            tracing::warn!("homing started while motion still queued");
        }
        self.actuator.clear_endstop_reached();
        self.homing.start(axes_to_home);
    }

    pub fn is_homing_in_progress(&self) -> bool {
        self.homing.is_homing_in_progress()
    }

    pub fn is_homed_ok(&self) -> bool {
        self.homing.is_homed_ok()
    }

    pub fn debug_show_blocks(&self) {
        self.pipeline.debug_show_blocks();
    }
}
