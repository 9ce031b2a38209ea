// src/robot.rs - host-side wiring of the motion system
//
// Owns the MotionHelper behind a lock and drives it from two tasks: a service
// loop at millisecond cadence and a tick loop that converts elapsed wall time
// into a bounded batch of fixed-period actuator ticks. On an MCU the tick
// loop is a hardware timer interrupt; here it is emulated.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

use crate::config::{Config, ConfigError};
use crate::hardware::{HardwareProbe, MotionHardware, SimulatedHardware};
use crate::motion::block::MotionBlock;
use crate::motion::{MAX_AXES, MotionError, MotionHelper, MoveCommand};

#[derive(Debug, Error)]
pub enum RobotError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),
    #[error("Other: {0}")]
    Other(String),
}

/// Snapshot reported to upstream layers.
#[derive(Debug, Clone, Serialize)]
pub struct RobotStatus {
    pub position_mm: [f32; MAX_AXES],
    pub queue_depth: usize,
    pub moving: bool,
    pub paused: bool,
    pub homed_ok: bool,
    pub homing_in_progress: bool,
    pub last_completed_index: i32,
}

pub struct RobotSystem {
    config: Config,
    motion: Arc<RwLock<MotionHelper>>,
    probe: Option<Arc<HardwareProbe>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RobotSystem {
    /// Build a system driving the simulated pin layer.
    pub fn new(config: Config) -> Result<Self, RobotError> {
        config.validate()?;
        let reversed = [
            config.axes.x.direction_reversed,
            config.axes.y.direction_reversed,
            config.axes.z.direction_reversed,
        ];
        let (hw, probe) = SimulatedHardware::with_direction_reversed(reversed);
        let mut system = Self::with_hardware(config, Box::new(hw))?;
        system.probe = Some(probe);
        Ok(system)
    }

    /// Build a system over any pin implementation (real GPIO layer, tests).
    pub fn with_hardware(
        config: Config,
        hw: Box<dyn MotionHardware>,
    ) -> Result<Self, RobotError> {
        config.validate()?;
        let motion = Arc::new(RwLock::new(MotionHelper::new(&config, hw)));
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            motion,
            probe: None,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Probe into the simulated pins, when using the simulated layer.
    pub fn probe(&self) -> Option<Arc<HardwareProbe>> {
        self.probe.clone()
    }

    /// Spawn the tick and service loops.
    pub fn start(&self) {
        self.start_tick_loop();
        self.start_service_loop();
        tracing::info!(
            "robot {} ready",
            self.config.robot.robot_name.as_deref().unwrap_or("(unnamed)")
        );
    }

    fn start_tick_loop(&self) {
        let motion = self.motion.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_wake = Instant::now();
            // Bound the batch so a stalled host cannot wedge the lock.
            const MAX_TICKS_PER_WAKE: u32 = 250_000;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("tick loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let now = Instant::now();
                        let elapsed_ns = now.duration_since(last_wake).as_nanos() as u64;
                        last_wake = now;
                        let ticks = (elapsed_ns / MotionBlock::TICK_INTERVAL_NS as u64)
                            .min(MAX_TICKS_PER_WAKE as u64) as u32;
                        if ticks > 0 {
                            motion.write().await.service_ticks(ticks);
                        }
                    }
                }
            }
        });
    }

    fn start_service_loop(&self) {
        let motion = self.motion.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(10));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("service loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        motion.write().await.service();
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn submit_move(&self, command: MoveCommand) -> Result<(), RobotError> {
        self.motion.write().await.submit_move(command)?;
        Ok(())
    }

    pub async fn pause(&self, pause_it: bool) {
        self.motion.write().await.pause(pause_it);
    }

    pub async fn stop(&self) {
        self.motion.write().await.stop();
    }

    pub async fn start_homing(&self, axes_to_home: [bool; MAX_AXES]) {
        self.motion.write().await.start_homing(axes_to_home);
    }

    pub async fn is_idle(&self) -> bool {
        self.motion.read().await.is_idle()
    }

    pub async fn is_homing_in_progress(&self) -> bool {
        self.motion.read().await.is_homing_in_progress()
    }

    pub async fn is_homed_ok(&self) -> bool {
        self.motion.read().await.is_homed_ok()
    }

    pub async fn status(&self) -> RobotStatus {
        let motion = self.motion.read().await;
        let pos = motion.position_mm();
        RobotStatus {
            position_mm: [pos.get(0), pos.get(1), pos.get(2)],
            queue_depth: motion.queue_depth(),
            moving: motion.is_moving(),
            paused: motion.is_paused(),
            homed_ok: motion.is_homed_ok(),
            homing_in_progress: motion.is_homing_in_progress(),
            last_completed_index: motion.last_completed_numbered_index(),
        }
    }

    pub async fn status_json(&self) -> String {
        serde_json::to_string(&self.status().await).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::AxisFloats;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.axes.x.max_val_mm = Some(500.0);
        config.axes.y.max_val_mm = Some(500.0);
        config
    }

    #[tokio::test]
    async fn submit_and_status() {
        let system = RobotSystem::new(test_config()).unwrap();
        system
            .submit_move(MoveCommand::to_point(AxisFloats::from_xy(10.0, 5.0)))
            .await
            .unwrap();
        let status = system.status().await;
        assert_eq!(status.queue_depth, 1);
        assert!(status.moving);
        assert_eq!(status.position_mm[0], 10.0);
        let json = system.status_json().await;
        assert!(json.contains("\"queue_depth\":1"));
    }

    #[tokio::test]
    async fn moves_complete_under_the_tick_loop() {
        let system = RobotSystem::new(test_config()).unwrap();
        system.start();
        system
            .submit_move(MoveCommand::to_point(AxisFloats::from_xy(2.0, 1.0)))
            .await
            .unwrap();
        let deadline = Instant::now() + std::time::Duration::from_secs(30);
        while !system.is_idle().await {
            assert!(Instant::now() < deadline, "move did not complete");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let probe = system.probe().unwrap();
        assert_eq!(probe.step_count(0), 200);
        assert_eq!(probe.step_count(1), 100);
        system.shutdown();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.robot.pipeline_len = 1;
        assert!(matches!(
            RobotSystem::new(config),
            Err(RobotError::Config(_))
        ));
    }
}
