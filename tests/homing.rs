// Homing sequence tests over the simulated endstops.

use sandbot_rs::config::Config;
use sandbot_rs::hardware::SimulatedHardware;
use sandbot_rs::motion::axis_values::AxisEndstopChecks;
use sandbot_rs::motion::MotionHelper;

fn homing_config(sequence: &str, max_secs: u64) -> Config {
    let mut config = Config::default();
    config.axes.x.min_val_mm = Some(0.0);
    config.axes.x.max_val_mm = Some(200.0);
    config.axes.y.min_val_mm = Some(0.0);
    config.axes.y.max_val_mm = Some(200.0);
    config.homing.sequence = sequence.to_string();
    config.homing.max_duration_secs = max_secs;
    config
}

#[test]
fn homing_seeks_until_endstop_then_zeroes() {
    let config = homing_config("X-S;X=H;$", 120);
    let (hw, probe) = SimulatedHardware::new();
    let mut helper = MotionHelper::new(&config, Box::new(hw));

    helper.start_homing([true, false, false]);
    helper.service();
    // The seek move is queued: 200mm towards min at max_speed/10.
    assert!(helper.is_homing_in_progress());
    assert!(!helper.is_idle());

    // Let the carriage run; trip the endstop after ~30mm of travel.
    let mut ticks: u64 = 0;
    while helper.is_homing_in_progress() {
        helper.service_tick();
        ticks += 1;
        if probe.step_count(0) == 3000 {
            probe.set_endstop(0, AxisEndstopChecks::MIN_ENDSTOP, true);
        }
        if ticks % 512 == 0 {
            helper.service();
        }
        assert!(ticks < 50_000_000, "homing did not converge");
    }

    assert!(helper.is_homed_ok());
    assert!(helper.endstop_reached());
    // The seek was cut short by the endstop, well before 20000 steps.
    assert!(probe.step_count(0) < 20_000);
    // X=H zeroed the axis at the stop position.
    assert_eq!(helper.steps_from_zero(0).unwrap(), 0);
    let position = helper.position_mm();
    assert_eq!(position.get(0), 0.0);
}

#[test]
fn homing_two_axes_in_sequence() {
    let config = homing_config("X-S;X=H;Y-S;Y=H;$", 120);
    let (hw, probe) = SimulatedHardware::new();
    let mut helper = MotionHelper::new(&config, Box::new(hw));

    helper.start_homing([true, true, false]);
    let mut ticks: u64 = 0;
    while helper.is_homing_in_progress() {
        helper.service_tick();
        ticks += 1;
        if probe.step_count(0) == 2000 {
            probe.set_endstop(0, AxisEndstopChecks::MIN_ENDSTOP, true);
        }
        if probe.step_count(1) == 1500 {
            probe.set_endstop(1, AxisEndstopChecks::MIN_ENDSTOP, true);
        }
        if ticks % 512 == 0 {
            helper.service();
        }
        assert!(ticks < 100_000_000, "homing did not converge");
    }

    assert!(helper.is_homed_ok());
    assert_eq!(helper.steps_from_zero(0).unwrap(), 0);
    assert_eq!(helper.steps_from_zero(1).unwrap(), 0);
}

#[test]
fn homing_times_out_when_nothing_completes() {
    let config = homing_config("X-S;$", 1);
    let (hw, _probe) = SimulatedHardware::new();
    let mut helper = MotionHelper::new(&config, Box::new(hw));

    // Paused actuator: the seek move can never complete.
    helper.pause(true);
    helper.start_homing([true, false, false]);
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while helper.is_homing_in_progress() {
        helper.service();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(
            std::time::Instant::now() < deadline,
            "timeout never fired"
        );
    }
    assert!(!helper.is_homed_ok());
}

#[test]
fn homing_without_sequence_finishes_not_ok() {
    let config = homing_config("", 10);
    let (hw, _probe) = SimulatedHardware::new();
    let mut helper = MotionHelper::new(&config, Box::new(hw));
    helper.start_homing([true, true, true]);
    helper.service();
    assert!(!helper.is_homing_in_progress());
    assert!(!helper.is_homed_ok());
}
