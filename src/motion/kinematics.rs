// src/motion/kinematics.rs - point-to-actuator coordinate transforms

use super::MAX_AXES;
use super::axes_params::AxesParams;
use super::axis_values::AxisFloats;
use super::geometry::{cosine_rule, wrap_radians};

/// Geometry of the machine: converts a Cartesian point (mm) into per-axis
/// actuator step positions. The planner plans in Cartesian space and steps in
/// actuator space, so the transform sits exactly at that boundary.
pub trait Kinematics: Send + Sync {
    fn point_to_actuator(&self, point_mm: &AxisFloats, axes_params: &AxesParams) -> AxisFloats;
}

/// Steps are directly proportional to mm on every axis.
#[derive(Debug, Default)]
pub struct CartesianKinematics;

impl Kinematics for CartesianKinematics {
    fn point_to_actuator(&self, point_mm: &AxisFloats, axes_params: &AxesParams) -> AxisFloats {
        let mut actuator = AxisFloats::new();
        for axis_idx in 0..MAX_AXES {
            if point_mm.is_valid(axis_idx) {
                actuator.set(
                    axis_idx,
                    point_mm.get(axis_idx) * axes_params.steps_per_mm(axis_idx),
                );
            }
        }
        actuator
    }
}

/// Two-link SCARA arm: axis 0 is the shoulder rotation, axis 1 the elbow
/// rotation, both in steps where steps_per_mm is read as steps per radian.
/// Axis 2 passes through untransformed.
#[derive(Debug)]
pub struct ScaraKinematics {
    pub shoulder_elbow_mm: f32,
    pub elbow_hand_mm: f32,
}

impl Kinematics for ScaraKinematics {
    fn point_to_actuator(&self, point_mm: &AxisFloats, axes_params: &AxesParams) -> AxisFloats {
        let x = point_mm.get(0);
        let y = point_mm.get(1);
        // Distance from the shoulder to the target and its bearing.
        let third_side = (x * x + y * y).sqrt();
        let delta1 = y.atan2(x);
        // Angle between the bearing and the upper arm, and the elbow's
        // interior angle, both from the cosine rule.
        let delta2 = cosine_rule(third_side, self.shoulder_elbow_mm, self.elbow_hand_mm);
        let inner_angle = cosine_rule(self.shoulder_elbow_mm, self.elbow_hand_mm, third_side);

        let alpha = wrap_radians(delta1 + delta2);
        let beta = wrap_radians(delta1 + delta2 + std::f32::consts::PI + inner_angle);

        let mut actuator = AxisFloats::new();
        actuator.set(0, alpha * axes_params.steps_per_mm(0));
        actuator.set(1, beta * axes_params.steps_per_mm(1));
        if point_mm.is_valid(2) {
            actuator.set(2, point_mm.get(2) * axes_params.steps_per_mm(2));
        }
        actuator
    }
}

/// Transform factory keyed by the config string.
pub fn create_kinematics(
    kind: &str,
    shoulder_elbow_mm: f32,
    elbow_hand_mm: f32,
) -> Box<dyn Kinematics> {
    match kind {
        "scara" => Box::new(ScaraKinematics {
            shoulder_elbow_mm,
            elbow_hand_mm,
        }),
        _ => Box::new(CartesianKinematics),
    }
}
