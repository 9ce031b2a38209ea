// src/motion/planner.rs - block construction and look-ahead speed planning

use super::MAX_AXES;
use super::axes_params::AxesParams;
use super::axis_values::{AxisFloats, AxisPosition};
use super::block::MotionBlock;
use super::command::MoveCommand;
use super::pipeline::MotionPipeline;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Junction deviation (mm) for the corner speed calculation.
    pub junction_deviation_mm: f32,
    /// Speed floor for junction entry so planning never pins a corner to zero.
    pub minimum_planner_speed_mmps: f32,
    /// How many queued blocks the reverse pass may revisit. 0 = all queued
    /// blocks.
    pub lookahead_blocks: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            junction_deviation_mm: 0.05,
            minimum_planner_speed_mmps: 0.0,
            lookahead_blocks: 0,
        }
    }
}

/// Junction data remembered from the previously added block.
#[derive(Debug, Clone)]
struct MotionBlockSequentialData {
    max_param_speed_mmps: f32,
    unit_vectors: AxisFloats,
}

#[derive(Debug, Default)]
pub struct MotionPlanner {
    config: PlannerConfig,
    prev_block: Option<MotionBlockSequentialData>,
}

impl MotionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            prev_block: None,
        }
    }

    /// Forget junction continuity, e.g. after a stop or pipeline clear.
    pub fn reset(&mut self) {
        self.prev_block = None;
    }

    /// Create a block for the move and queue it, then re-plan the queue.
    /// `dest_point_mm` is the move target in mm; `dest_actuator` the same
    /// target in actuator steps (already through the coordinate transform).
    /// Returns false when the move is degenerate (no steps) - not an error,
    /// the move is trivially complete. Position is updated on success.
    pub fn add_move(
        &mut self,
        command: &MoveCommand,
        dest_point_mm: &AxisFloats,
        dest_actuator: &AxisFloats,
        cur_position: &mut AxisPosition,
        axes_params: &AxesParams,
        pipeline: &mut MotionPipeline,
    ) -> bool {
        // Deltas and primary-axis distance.
        let mut deltas = [0.0f32; MAX_AXES];
        let mut is_a_primary_move = false;
        let mut square_sum = 0.0f32;
        for axis_idx in 0..MAX_AXES {
            deltas[axis_idx] =
                dest_point_mm.get(axis_idx) - cur_position.position_mm.get(axis_idx);
            if deltas[axis_idx] != 0.0 && axes_params.is_primary_axis(axis_idx) {
                square_sum += deltas[axis_idx] * deltas[axis_idx];
                is_a_primary_move = true;
            }
        }
        let move_dist = square_sum.sqrt();

        let mut block = MotionBlock::new();
        block.endstops = command.endstops;
        block.numbered_index = command.numbered_index;
        block.recalculate = true;

        // Feedrate capped by the first primary axis.
        let first_primary = axes_params.first_primary_axis();
        let mut feedrate = command.feedrate_mmps.unwrap_or(f32::MAX);
        if feedrate > axes_params.max_speed(first_primary) {
            feedrate = axes_params.max_speed(first_primary);
        }
        block.max_param_speed_mmps = feedrate;
        block.move_dist_primary_axes_mm = move_dist;

        // Unit vectors over the primary axes.
        let mut unit_vectors = AxisFloats::new();
        if move_dist >= MotionBlock::MINIMUM_MOVE_DIST_MM {
            for axis_idx in 0..MAX_AXES {
                if axes_params.is_primary_axis(axis_idx) {
                    unit_vectors.set(axis_idx, deltas[axis_idx] / move_dist);
                }
            }
        }
        block.unit_vectors = unit_vectors;

        // Steps to target from the actuator-space destination.
        let mut has_steps = false;
        for axis_idx in 0..MAX_AXES {
            let steps_float =
                dest_actuator.get(axis_idx) - cur_position.steps_from_home.get(axis_idx) as f32;
            let steps = steps_float.ceil() as i32;
            if steps != 0 {
                has_steps = true;
            }
            block.set_steps_to_target(axis_idx, steps);
        }
        if !has_steps {
            tracing::trace!("planner: move has no steps, trivially complete");
            return false;
        }

        // Junction-limited max entry speed against the previous block.
        if !pipeline.can_get() {
            // Queue drained since the last add; no junction continuity.
            self.prev_block = None;
        }
        block.max_entry_speed_mmps =
            self.vmax_junction(&unit_vectors, feedrate, is_a_primary_move, axes_params);

        let steps = block.steps_to_target;
        if !pipeline.add(block) {
            return false;
        }
        self.prev_block = Some(MotionBlockSequentialData {
            max_param_speed_mmps: feedrate,
            unit_vectors,
        });

        self.recalculate_pipeline(pipeline, axes_params);

        // Account the actuator-space move.
        for axis_idx in 0..MAX_AXES {
            cur_position.steps_from_home.set(
                axis_idx,
                cur_position.steps_from_home.get(axis_idx) + steps.get(axis_idx),
            );
        }
        true
    }

    /// Maximum speed through the junction between the previous move and one
    /// with the given unit vectors, from the junction-deviation model. Uses
    /// the trig half-angle identity so no acos/sin is needed.
    fn vmax_junction(
        &self,
        unit_vectors: &AxisFloats,
        feedrate: f32,
        is_a_primary_move: bool,
        axes_params: &AxesParams,
    ) -> f32 {
        let junction_deviation = self.config.junction_deviation_mm;
        let mut vmax = self.config.minimum_planner_speed_mmps;
        let Some(prev) = &self.prev_block else {
            return vmax;
        };
        if !is_a_primary_move || junction_deviation <= 0.0 || prev.max_param_speed_mmps <= 0.0 {
            return vmax;
        }

        // Cosine of the angle between the previous and current path (previous
        // unit vector negated).
        let mut cos_theta = 0.0f32;
        for axis_idx in 0..MAX_AXES {
            cos_theta -= prev.unit_vectors.get(axis_idx) * unit_vectors.get(axis_idx);
        }

        // Near-reversal junctions keep the minimum speed.
        if cos_theta < 0.95 {
            vmax = prev.max_param_speed_mmps.min(feedrate);
            if cos_theta > -0.95 {
                // Not straight either: limit by deviation from the corner arc.
                let sin_theta_d2 = (0.5 * (1.0 - cos_theta)).sqrt();
                vmax = vmax.min(
                    (axes_params.master_max_accel_mmps2() * junction_deviation * sin_theta_d2
                        / (1.0 - sin_theta_d2))
                        .sqrt(),
                );
            }
        }
        vmax
    }

    /// Re-plan queued blocks after an append.
    ///
    /// Reverse pass (newest to oldest, bounded by the look-ahead window):
    /// each block's exit speed becomes the entry speed of the block after it
    /// (the newest must plan to stop), then its own entry speed is limited by
    /// what deceleration allows. The pass stops at an executing block or one
    /// whose entry speed already equals its junction maximum.
    ///
    /// Forward pass (oldest touched to newest): entry speeds are clamped by
    /// what the previous block can actually deliver, exit speeds maximized.
    /// Finally every touched block's trapezoid is recomputed, which reopens
    /// its execute gate.
    pub fn recalculate_pipeline(&mut self, pipeline: &mut MotionPipeline, axes_params: &AxesParams) {
        let params = axes_params.motion_params();
        let count = pipeline.count();
        if count == 0 {
            return;
        }
        let window = if self.config.lookahead_blocks == 0 {
            count
        } else {
            self.config.lookahead_blocks.min(count)
        };

        // Reverse pass.
        let mut following_entry_speed = 0.0f32;
        let mut forward_seed_exit_speed = 0.0f32;
        let mut touched = 0usize;
        for block_idx in 0..window {
            {
                let Some(block) = pipeline.peek_nth_from_put(block_idx) else {
                    break;
                };
                if block.is_executing() {
                    // Entry of the executing block is locked; going forwards
                    // we inherit its exit speed.
                    forward_seed_exit_speed = block.exit_speed_mmps;
                    break;
                }
                if block_idx > 1 && block.entry_speed_mmps == block.max_entry_speed_mmps {
                    // Converged; nothing older can change the plan.
                    forward_seed_exit_speed = block.exit_speed_mmps;
                    break;
                }
            }
            let Some(block) = pipeline.peek_nth_from_put_mut(block_idx) else {
                break;
            };
            block.exit_speed_mmps = following_entry_speed;
            following_entry_speed = block.calc_max_speed_reverse(block.exit_speed_mmps, &params);
            touched = block_idx + 1;
        }

        // Reverse pass ended at the window edge rather than at an executing
        // or converged block: seed the forward pass from the exit speed of
        // the next-older block so the junction chain stays continuous.
        if touched == window && window < count {
            if let Some(block) = pipeline.peek_nth_from_put(window) {
                forward_seed_exit_speed = block.exit_speed_mmps;
            }
        }

        // Forward pass over the touched suffix, oldest first.
        let mut prev_exit_speed = forward_seed_exit_speed;
        for block_idx in (0..touched).rev() {
            let Some(block) = pipeline.peek_nth_from_put_mut(block_idx) else {
                break;
            };
            block.calc_max_speed_forward(prev_exit_speed, &params);
            prev_exit_speed = block.exit_speed_mmps;
        }

        // Lock in the step schedules.
        for block_idx in (0..touched).rev() {
            let Some(block) = pipeline.peek_nth_from_put_mut(block_idx) else {
                break;
            };
            block.calculate_trapezoid(&params);
        }

        if tracing::enabled!(tracing::Level::TRACE) {
            pipeline.debug_show_blocks();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::axes_params::AxisParams;
    use crate::motion::command::MoveCommand;

    fn test_axes() -> AxesParams {
        let axis = AxisParams {
            max_speed_mmps: 100.0,
            max_accel_mmps2: 100.0,
            steps_per_mm: 100.0,
            ..Default::default()
        };
        AxesParams::new([axis.clone(), axis.clone(), axis])
    }

    fn submit(
        planner: &mut MotionPlanner,
        pipeline: &mut MotionPipeline,
        position: &mut AxisPosition,
        axes: &AxesParams,
        x: f32,
        y: f32,
        feedrate: f32,
    ) -> bool {
        let target = AxisFloats::from_xy(x, y);
        let mut actuator = AxisFloats::new();
        for axis_idx in 0..2 {
            actuator.set(axis_idx, target.get(axis_idx) * axes.steps_per_mm(axis_idx));
        }
        let command = MoveCommand::to_point(target).with_feedrate(feedrate);
        planner.add_move(&command, &target, &actuator, position, axes, pipeline)
    }

    #[test]
    fn degenerate_move_adds_nothing() {
        let axes = test_axes();
        let mut planner = MotionPlanner::new(PlannerConfig::default());
        let mut pipeline = MotionPipeline::new(10);
        let mut position = AxisPosition::default();
        assert!(!submit(&mut planner, &mut pipeline, &mut position, &axes, 0.0, 0.0, 100.0));
        assert_eq!(pipeline.count(), 0);
    }

    #[test]
    fn add_move_tracks_steps_from_home() {
        let axes = test_axes();
        let mut planner = MotionPlanner::new(PlannerConfig::default());
        let mut pipeline = MotionPipeline::new(10);
        let mut position = AxisPosition::default();
        assert!(submit(&mut planner, &mut pipeline, &mut position, &axes, 10.0, 4.0, 100.0));
        assert_eq!(position.steps_from_home.get(0), 1000);
        assert_eq!(position.steps_from_home.get(1), 400);
        let block = pipeline.peek_get().unwrap();
        assert_eq!(block.steps_to_target.get(0), 1000);
        assert!(block.can_execute());
    }

    #[test]
    fn speed_propagation_respects_ceilings() {
        let axes = test_axes();
        let mut planner = MotionPlanner::new(PlannerConfig {
            junction_deviation_mm: 0.05,
            ..Default::default()
        });
        let mut pipeline = MotionPipeline::new(20);
        let mut position = AxisPosition::default();

        // A zig-zag of short moves at assorted feedrates.
        let moves: &[(f32, f32, f32)] = &[
            (5.0, 0.0, 100.0),
            (5.0, 5.0, 40.0),
            (10.0, 5.0, 80.0),
            (10.0, 10.0, 20.0),
            (15.0, 10.0, 100.0),
        ];
        for &(x, y, f) in moves {
            assert!(submit(&mut planner, &mut pipeline, &mut position, &axes, x, y, f));
        }

        // No block's entry exceeds its junction-limited maximum, and exits
        // chain onto the next entry.
        let count = pipeline.count();
        for n in 0..count {
            let block = pipeline.peek_nth_from_get(n).unwrap();
            assert!(
                block.entry_speed_mmps <= block.max_entry_speed_mmps + 1e-4,
                "block {n} entry {} > max entry {}",
                block.entry_speed_mmps,
                block.max_entry_speed_mmps
            );
            assert!(block.exit_speed_mmps <= block.max_param_speed_mmps + 1e-4);
            if let Some(next) = pipeline.peek_nth_from_get(n + 1) {
                assert!(
                    block.exit_speed_mmps <= next.entry_speed_mmps + 1e-4,
                    "block {n} exit {} > next entry {}",
                    block.exit_speed_mmps,
                    next.entry_speed_mmps
                );
            }
        }
        // The newest block must plan to stop.
        let newest = pipeline.peek_nth_from_put(0).unwrap();
        assert_eq!(newest.exit_speed_mmps, 0.0);
    }

    #[test]
    fn straight_line_chain_carries_speed() {
        let axes = test_axes();
        let mut planner = MotionPlanner::new(PlannerConfig::default());
        let mut pipeline = MotionPipeline::new(20);
        let mut position = AxisPosition::default();
        // Four collinear segments: junctions are straight so intermediate
        // entry speeds should be well above zero after planning.
        for i in 1..=4 {
            assert!(submit(
                &mut planner,
                &mut pipeline,
                &mut position,
                &axes,
                20.0 * i as f32,
                0.0,
                50.0
            ));
        }
        let mid = pipeline.peek_nth_from_get(2).unwrap();
        assert!(mid.entry_speed_mmps > 10.0, "entry {}", mid.entry_speed_mmps);
    }

    #[test]
    fn executing_block_is_left_alone() {
        let axes = test_axes();
        let mut planner = MotionPlanner::new(PlannerConfig::default());
        let mut pipeline = MotionPipeline::new(20);
        let mut position = AxisPosition::default();
        assert!(submit(&mut planner, &mut pipeline, &mut position, &axes, 10.0, 0.0, 50.0));
        // Actuator claims the head block.
        let head = pipeline.peek_get().unwrap();
        assert!(head.begin_executing());
        let schedule_before = head.axis_step_data;
        let exit_before = head.exit_speed_mmps;
        // More moves arrive; re-planning must not touch the executing head.
        assert!(submit(&mut planner, &mut pipeline, &mut position, &axes, 20.0, 0.0, 50.0));
        assert!(submit(&mut planner, &mut pipeline, &mut position, &axes, 30.0, 0.0, 50.0));
        let head = pipeline.peek_get().unwrap();
        assert_eq!(head.axis_step_data, schedule_before);
        assert_eq!(head.exit_speed_mmps, exit_before);
    }

    #[test]
    fn lookahead_window_limits_reverse_pass() {
        let axes = test_axes();
        let mut planner = MotionPlanner::new(PlannerConfig {
            lookahead_blocks: 2,
            ..Default::default()
        });
        let mut pipeline = MotionPipeline::new(20);
        let mut position = AxisPosition::default();
        for i in 1..=5 {
            assert!(submit(
                &mut planner,
                &mut pipeline,
                &mut position,
                &axes,
                10.0 * i as f32,
                0.0,
                50.0
            ));
        }
        // Only the newest two blocks are ever revisited; older blocks keep
        // the schedule from when they were inside the window and must still
        // be executable.
        for n in 0..pipeline.count() {
            assert!(pipeline.peek_nth_from_get(n).unwrap().can_execute());
        }
    }
}
