// src/main.rs - sandbot host binary

use clap::Parser;
use sandbot_rs::motion::{AxisEndstopChecks, AxisFloats};
use sandbot_rs::{MoveCommand, RobotSystem, config};

#[derive(Parser, Debug)]
#[command(name = "sandbot-host", about = "Multi-axis motion control host")]
struct Args {
    /// Configuration file path
    #[arg(default_value = "sandbot.toml")]
    config: String,
    /// Run the homing sequence, then exit
    #[arg(long)]
    home: bool,
    /// Queue a demo pattern and run it to completion, then exit
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    tracing::info!("starting sandbot motion host");
    tracing::info!("loading configuration from: {}", args.config);

    let config = config::load_config(&args.config).map_err(|e| {
        tracing::error!("failed to load config from '{}': {}", args.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    tracing::info!(
        "robot: {} ({} kinematics)",
        config.robot.robot_name.as_deref().unwrap_or("unnamed"),
        config.robot.kinematics
    );
    tracing::info!(
        "axes: x {} steps/mm, y {} steps/mm, z {} steps/mm",
        config.axes.x.steps_per_mm,
        config.axes.y.steps_per_mm,
        config.axes.z.steps_per_mm
    );

    let system = RobotSystem::new(config)?;
    system.start();

    if args.home {
        run_homing(&system).await;
        return Ok(());
    }

    if args.demo {
        run_demo(&system).await?;
        return Ok(());
    }

    tracing::info!("idle; press ctrl-c to exit");
    tokio::signal::ctrl_c().await?;
    system.shutdown();
    Ok(())
}

/// Run the configured homing sequence against the simulated endstops; the
/// endstop trips after a randomized delay the way a real carriage would reach
/// the switch at an unknown distance.
async fn run_homing(system: &RobotSystem) {
    use rand::Rng;

    if let Some(probe) = system.probe() {
        let delay_ms = rand::rng().random_range(150..600);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            probe.set_endstop(0, AxisEndstopChecks::MIN_ENDSTOP, true);
            probe.set_endstop(1, AxisEndstopChecks::MIN_ENDSTOP, true);
            tracing::info!("simulated endstops triggered after {delay_ms}ms");
        });
    }

    system.start_homing([true, true, false]).await;
    while system.is_homing_in_progress().await {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    if system.is_homed_ok().await {
        tracing::info!("homing complete: {}", system.status_json().await);
    } else {
        tracing::warn!("homing failed: {}", system.status_json().await);
    }
    system.shutdown();
}

/// Trace a small square so the pipeline, look-ahead and actuator all get
/// exercised end to end.
async fn run_demo(
    system: &RobotSystem,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let corners = [
        (20.0f32, 0.0f32),
        (20.0, 20.0),
        (0.0, 20.0),
        (0.0, 0.0),
    ];
    for (x, y) in corners {
        system
            .submit_move(MoveCommand::to_point(AxisFloats::from_xy(x, y)).with_feedrate(40.0))
            .await?;
    }
    while !system.is_idle().await {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    tracing::info!("demo complete: {}", system.status_json().await);
    system.shutdown();
    Ok(())
}
