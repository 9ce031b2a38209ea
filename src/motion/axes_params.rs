// src/motion/axes_params.rs - per-axis kinematic parameters

use crate::config::AxisConfig;

use super::MAX_AXES;
use super::block::MotionParams;

/// Kinematic limits and geometry for a single axis.
#[derive(Debug, Clone)]
pub struct AxisParams {
    pub max_speed_mmps: f32,
    pub min_speed_mmps: f32,
    pub max_accel_mmps2: f32,
    pub steps_per_mm: f32,
    pub min_step_rate_per_sec: f32,
    pub max_step_rate_per_sec: f32,
    pub min_val_mm: Option<f32>,
    pub max_val_mm: Option<f32>,
    pub is_primary: bool,
    pub is_dominant: bool,
}

impl AxisParams {
    pub const MAX_SPEED_DEFAULT: f32 = 100.0;
    pub const ACCELERATION_DEFAULT: f32 = 100.0;
    pub const STEPS_PER_MM_DEFAULT: f32 = 100.0;
    pub const MAX_RANGE_DEFAULT_MM: f32 = 100.0;

    pub fn step_dist_mm(&self) -> f32 {
        if self.steps_per_mm != 0.0 { 1.0 / self.steps_per_mm } else { 1.0 }
    }

    /// Total travel of the axis, used as the default homing seek distance.
    pub fn max_range_mm(&self) -> f32 {
        match (self.min_val_mm, self.max_val_mm) {
            (Some(min), Some(max)) if max > min => max - min,
            (None, Some(max)) if max > 0.0 => max,
            _ => Self::MAX_RANGE_DEFAULT_MM,
        }
    }

    /// Check a position against the axis bounds, optionally clamping it in
    /// place. Returns false if the original value was outside the bounds.
    pub fn pt_in_bounds(&self, val: &mut f32, correct_in_place: bool) -> bool {
        let mut was_valid = true;
        if let Some(min) = self.min_val_mm {
            if *val < min {
                was_valid = false;
                if correct_in_place {
                    *val = min;
                }
            }
        }
        if let Some(max) = self.max_val_mm {
            if *val > max {
                was_valid = false;
                if correct_in_place {
                    *val = max;
                }
            }
        }
        was_valid
    }
}

impl Default for AxisParams {
    fn default() -> Self {
        Self {
            max_speed_mmps: Self::MAX_SPEED_DEFAULT,
            min_speed_mmps: 0.0,
            max_accel_mmps2: Self::ACCELERATION_DEFAULT,
            steps_per_mm: Self::STEPS_PER_MM_DEFAULT,
            min_step_rate_per_sec: 0.0,
            max_step_rate_per_sec: 50_000.0,
            min_val_mm: None,
            max_val_mm: None,
            is_primary: true,
            is_dominant: false,
        }
    }
}

impl From<&AxisConfig> for AxisParams {
    fn from(cfg: &AxisConfig) -> Self {
        Self {
            max_speed_mmps: cfg.max_speed_mmps,
            min_speed_mmps: cfg.min_speed_mmps,
            max_accel_mmps2: cfg.max_accel_mmps2,
            steps_per_mm: cfg.steps_per_mm,
            min_step_rate_per_sec: cfg.min_step_rate_per_sec,
            max_step_rate_per_sec: cfg.max_step_rate_per_sec,
            min_val_mm: cfg.min_val_mm,
            max_val_mm: cfg.max_val_mm,
            is_primary: cfg.is_primary,
            is_dominant: cfg.is_dominant,
        }
    }
}

/// All axes plus cached master-axis values. The master axis is the dominant
/// axis if one is flagged, otherwise the first primary axis, otherwise axis 0.
/// Its acceleration and step distance drive the scalar planning math.
#[derive(Debug, Clone, Default)]
pub struct AxesParams {
    axes: [AxisParams; MAX_AXES],
    master_axis_idx: usize,
    master_max_accel_mmps2: f32,
}

impl AxesParams {
    pub fn new(axes: [AxisParams; MAX_AXES]) -> Self {
        let mut params = Self {
            axes,
            master_axis_idx: 0,
            master_max_accel_mmps2: AxisParams::ACCELERATION_DEFAULT,
        };
        params.set_master_axis();
        params
    }

    fn set_master_axis(&mut self) {
        let dominant = self.axes.iter().position(|a| a.is_dominant);
        let primary = self.axes.iter().position(|a| a.is_primary);
        self.master_axis_idx = dominant.or(primary).unwrap_or(0);
        self.master_max_accel_mmps2 = self.axes[self.master_axis_idx].max_accel_mmps2;
    }

    pub fn axis(&self, axis_idx: usize) -> &AxisParams {
        &self.axes[axis_idx.min(MAX_AXES - 1)]
    }

    pub fn set_axis(&mut self, axis_idx: usize, params: AxisParams) {
        if axis_idx < MAX_AXES {
            self.axes[axis_idx] = params;
            self.set_master_axis();
        }
    }

    pub fn master_axis_idx(&self) -> usize {
        self.master_axis_idx
    }

    pub fn master_max_accel_mmps2(&self) -> f32 {
        self.master_max_accel_mmps2
    }

    pub fn is_primary_axis(&self, axis_idx: usize) -> bool {
        self.axis(axis_idx).is_primary
    }

    pub fn max_speed(&self, axis_idx: usize) -> f32 {
        self.axis(axis_idx).max_speed_mmps
    }

    pub fn steps_per_mm(&self, axis_idx: usize) -> f32 {
        self.axis(axis_idx).steps_per_mm
    }

    pub fn step_dist_mm(&self, axis_idx: usize) -> f32 {
        self.axis(axis_idx).step_dist_mm()
    }

    /// First primary axis index, used to clamp feedrates.
    pub fn first_primary_axis(&self) -> usize {
        self.axes.iter().position(|a| a.is_primary).unwrap_or(0)
    }

    /// Scalar planning parameters derived from the master axis.
    pub fn motion_params(&self) -> MotionParams {
        let master = &self.axes[self.master_axis_idx];
        MotionParams {
            master_max_accel_mmps2: self.master_max_accel_mmps2,
            master_step_dist_mm: master.step_dist_mm(),
            min_step_rate_per_sec: master.min_step_rate_per_sec,
            max_step_rate_per_sec: master.max_step_rate_per_sec,
        }
    }
}
