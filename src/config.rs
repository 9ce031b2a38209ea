//! Host configuration, loaded from a TOML file.
//!
//! ## Example
//!
//! ```toml
//! [robot]
//! robot_name = "sand table"
//! pipeline_len = 50
//! junction_deviation_mm = 0.05
//! block_dist_mm = 10.0
//!
//! [axes.x]
//! steps_per_mm = 100.0
//! max_speed_mmps = 100.0
//! max_accel_mmps2 = 100.0
//! min_val_mm = 0.0
//! max_val_mm = 200.0
//!
//! [homing]
//! sequence = "X-S;X=H;Y-S;Y=H;$"
//! max_duration_secs = 120
//! ```

// src/config.rs - single configuration file

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration struct for the robot, axes, homing and motors.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub axes: AxesConfig,
    #[serde(default)]
    pub homing: HomingConfig,
    #[serde(default)]
    pub motors: MotorsConfig,
}

/// Robot-level motion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    #[serde(default)]
    pub robot_name: Option<String>,
    /// Coordinate transform: "cartesian" or "scara".
    #[serde(default = "default_kinematics")]
    pub kinematics: String,
    /// SCARA link lengths; unused for cartesian machines.
    #[serde(default = "default_arm_mm")]
    pub shoulder_elbow_mm: f32,
    #[serde(default = "default_arm_mm")]
    pub elbow_hand_mm: f32,
    /// Long moves are split into blocks of at most this length (0 = no max).
    #[serde(default)]
    pub block_dist_mm: f32,
    #[serde(default = "default_junction_deviation")]
    pub junction_deviation_mm: f32,
    /// Ring-buffer size for the motion pipeline.
    #[serde(default = "default_pipeline_len")]
    pub pipeline_len: usize,
    /// Look-ahead window for re-planning passes (0 = whole queue).
    #[serde(default)]
    pub lookahead_blocks: usize,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            robot_name: None,
            kinematics: default_kinematics(),
            shoulder_elbow_mm: default_arm_mm(),
            elbow_hand_mm: default_arm_mm(),
            block_dist_mm: 0.0,
            junction_deviation_mm: default_junction_deviation(),
            pipeline_len: default_pipeline_len(),
            lookahead_blocks: 0,
        }
    }
}

/// One axis section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AxisConfig {
    #[serde(default = "default_steps_per_mm")]
    pub steps_per_mm: f32,
    #[serde(default = "default_max_speed")]
    pub max_speed_mmps: f32,
    #[serde(default)]
    pub min_speed_mmps: f32,
    #[serde(default = "default_max_accel")]
    pub max_accel_mmps2: f32,
    #[serde(default)]
    pub min_step_rate_per_sec: f32,
    #[serde(default = "default_max_step_rate")]
    pub max_step_rate_per_sec: f32,
    #[serde(default)]
    pub min_val_mm: Option<f32>,
    #[serde(default)]
    pub max_val_mm: Option<f32>,
    /// Primary axes contribute to move distance and feedrate limits.
    #[serde(default = "default_true")]
    pub is_primary: bool,
    /// The dominant axis, if flagged, supplies the planning acceleration.
    #[serde(default)]
    pub is_dominant: bool,
    /// Step/direction pin numbers for a real GPIO platform layer.
    #[serde(default = "default_pin_unassigned")]
    pub step_pin: i32,
    #[serde(default = "default_pin_unassigned")]
    pub dirn_pin: i32,
    #[serde(default)]
    pub direction_reversed: bool,
    #[serde(default)]
    pub endstop_min: Option<EndstopConfig>,
    #[serde(default)]
    pub endstop_max: Option<EndstopConfig>,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            steps_per_mm: default_steps_per_mm(),
            max_speed_mmps: default_max_speed(),
            min_speed_mmps: 0.0,
            max_accel_mmps2: default_max_accel(),
            min_step_rate_per_sec: 0.0,
            max_step_rate_per_sec: default_max_step_rate(),
            min_val_mm: None,
            max_val_mm: None,
            is_primary: true,
            is_dominant: false,
            step_pin: default_pin_unassigned(),
            dirn_pin: default_pin_unassigned(),
            direction_reversed: false,
            endstop_min: None,
            endstop_max: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AxesConfig {
    #[serde(default)]
    pub x: AxisConfig,
    #[serde(default)]
    pub y: AxisConfig,
    #[serde(default)]
    pub z: AxisConfig,
}

impl AxesConfig {
    pub fn get(&self, axis_idx: usize) -> &AxisConfig {
        match axis_idx {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndstopConfig {
    pub pin: i32,
    #[serde(default = "default_true")]
    pub active_level: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HomingConfig {
    /// Homing sequence in the textual DSL, e.g. "X-S;X=H;$".
    #[serde(default)]
    pub sequence: String,
    #[serde(default = "default_max_homing_secs")]
    pub max_duration_secs: u64,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            sequence: String::new(),
            max_duration_secs: default_max_homing_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotorsConfig {
    /// Disable motor drivers after this many seconds without motion (0 =
    /// never disable).
    #[serde(default = "default_idle_disable_secs")]
    pub idle_disable_secs: u64,
}

impl Default for MotorsConfig {
    fn default() -> Self {
        Self {
            idle_disable_secs: default_idle_disable_secs(),
        }
    }
}

fn default_kinematics() -> String {
    "cartesian".to_string()
}

fn default_arm_mm() -> f32 {
    100.0
}

fn default_junction_deviation() -> f32 {
    0.05
}

fn default_pipeline_len() -> usize {
    50
}

fn default_steps_per_mm() -> f32 {
    100.0
}

fn default_max_speed() -> f32 {
    100.0
}

fn default_max_accel() -> f32 {
    100.0
}

fn default_max_step_rate() -> f32 {
    50_000.0
}

fn default_true() -> bool {
    true
}

fn default_pin_unassigned() -> i32 {
    -1
}

fn default_max_homing_secs() -> u64 {
    1000
}

fn default_idle_disable_secs() -> u64 {
    60
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.robot.pipeline_len < 2 {
            return Err(ConfigError::Invalid(
                "robot.pipeline_len must be at least 2".to_string(),
            ));
        }
        for (name, axis) in [("x", &self.axes.x), ("y", &self.axes.y), ("z", &self.axes.z)] {
            if axis.steps_per_mm <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "axes.{name}.steps_per_mm must be positive"
                )));
            }
            if axis.max_speed_mmps <= 0.0 || axis.max_accel_mmps2 <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "axes.{name} speed and acceleration must be positive"
                )));
            }
            if let (Some(min), Some(max)) = (axis.min_val_mm, axis.max_val_mm) {
                if min >= max {
                    return Err(ConfigError::Invalid(format!(
                        "axes.{name}.min_val_mm must be below max_val_mm"
                    )));
                }
            }
        }
        if self.robot.junction_deviation_mm < 0.0 {
            return Err(ConfigError::Invalid(
                "robot.junction_deviation_mm must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.robot.pipeline_len, 50);
        assert_eq!(config.axes.x.steps_per_mm, 100.0);
        assert_eq!(config.homing.max_duration_secs, 1000);
    }

    #[test]
    fn parses_partial_toml() {
        let toml_str = r#"
            [robot]
            robot_name = "test table"
            block_dist_mm = 5.0

            [axes.x]
            steps_per_mm = 80.0
            max_val_mm = 300.0

            [homing]
            sequence = "X-S;X=H;$"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.robot.robot_name.as_deref(), Some("test table"));
        assert_eq!(config.robot.block_dist_mm, 5.0);
        assert_eq!(config.axes.x.steps_per_mm, 80.0);
        assert_eq!(config.axes.x.max_val_mm, Some(300.0));
        // Untouched sections keep defaults.
        assert_eq!(config.axes.y.steps_per_mm, 100.0);
        assert_eq!(config.homing.sequence, "X-S;X=H;$");
    }

    #[test]
    fn rejects_bad_bounds() {
        let toml_str = r#"
            [axes.y]
            min_val_mm = 100.0
            max_val_mm = 50.0
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[robot]\npipeline_len = 20\n\n[motors]\nidle_disable_secs = 5"
        )
        .unwrap();
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.robot.pipeline_len, 20);
        assert_eq!(config.motors.idle_disable_secs, 5);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_config("/nonexistent/sandbot.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
