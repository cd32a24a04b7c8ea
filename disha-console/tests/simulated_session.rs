//! End-to-end sessions against the simulated robot

#![cfg(feature = "mock")]

use approx::assert_relative_eq;
use disha_console::calibration::{CalibrationEngine, CalibrationSettings, Precision};
use disha_console::channel::{ChannelSettings, CommandChannel};
use disha_console::robot::{RobotController, RobotSettings};
use disha_console::transport::{SimSettings, SimulatedRobot, SIM_GREETING};
use disha_console::{Config, Console, ConsoleEvent, Error, Intent, Outcome};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn quiet() -> SimSettings {
    SimSettings {
        seed: 11,
        mag_noise_stddev: 0.0,
        spike_probability: 0.0,
        range_noise_stddev: 0.0,
        dropout_probability: 0.0,
        posts: Vec::new(),
        ..SimSettings::default()
    }
}

fn channel(sim: SimSettings) -> Arc<CommandChannel> {
    Arc::new(CommandChannel::new(
        Box::new(SimulatedRobot::new(sim)),
        ChannelSettings {
            timeout: Duration::from_millis(200),
            transcript_capacity: 1000,
        },
    ))
}

#[test]
fn test_greeting_then_distance() {
    let channel = channel(quiet());
    assert_eq!(channel.read_greeting().unwrap().as_deref(), Some(SIM_GREETING));

    let mut robot = RobotController::new(channel, RobotSettings::default());
    assert_relative_eq!(robot.get_distance().unwrap(), 150.0);
}

#[test]
fn test_scan_maps_onto_room_wall() {
    let channel = channel(quiet());
    channel.read_greeting().unwrap();
    let robot = RobotController::new(channel, RobotSettings::default());
    let mut console = Console::new(robot, &Config::default());

    console.dispatch_line("move 50").unwrap();
    console.dispatch_line("rotate-to 90").unwrap();
    match console.dispatch(Intent::Scan).unwrap() {
        Outcome::Scan { samples, accepted } => {
            assert_eq!(samples, 180);
            assert_eq!(accepted, 180);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    // Pose and simulator agree, so every pole lands on the circular wall
    for pole in console.mapper().poles() {
        let radius = (pole.x * pole.x + pole.y * pole.y).sqrt();
        assert!((radius - 150.0).abs() < 1.0, "pole at radius {}", radius);
    }
}

#[test]
fn test_timed_calibration_recovers_hard_iron() {
    let sim = SimSettings {
        seed: 5,
        spike_probability: 0.0,
        ..SimSettings::default()
    };
    let hard_iron = sim.hard_iron;
    let channel = channel(sim);
    channel.read_greeting().unwrap();
    let mut robot = RobotController::new(channel, RobotSettings::default());
    let mut engine = CalibrationEngine::new(CalibrationSettings {
        interval: Duration::from_millis(1),
        repeat_count: 50,
        precision: Precision::Integer,
    });

    let bounds = engine.run_blocking(&mut robot).unwrap();

    assert_eq!(engine.point_cloud().len(), 50);
    assert!(engine.point_cloud().iter().all(|s| s.x.fract() == 0.0));
    for (axis, expected) in bounds.axes().iter().zip(hard_iron) {
        assert_eq!(axis.offset, ((axis.min + axis.max) / 2.0).trunc());
        assert!(
            (axis.offset - expected).abs() < 60.0,
            "offset {} far from {}",
            axis.offset,
            expected
        );
    }
}

#[test]
fn test_autocal_spins_and_samples() {
    let channel = channel(quiet());
    channel.read_greeting().unwrap();
    let robot = RobotController::new(Arc::clone(&channel), RobotSettings::default());
    let mut config = Config::default();
    config.calibration.auto.steps = 6;
    config.calibration.auto.spin_ms = 0;
    config.calibration.auto.settle_ms = 0;
    let mut console = Console::new(robot, &config);
    let events = console.subscribe();

    match console.dispatch(Intent::AutoCalibrate).unwrap() {
        Outcome::Bounds(bounds) => assert_eq!(bounds.samples(), 6),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(console.robot().wheels().is_at_rest());
    assert_eq!(console.calibration().point_cloud().len(), 6);

    let sent: Vec<String> = channel
        .transcript()
        .into_iter()
        .filter(|e| e.direction == disha_console::channel::Direction::Sent)
        .map(|e| e.text)
        .collect();
    assert_eq!(sent.iter().filter(|t| t.as_str() == "D 90 -90").count(), 6);
    assert_eq!(sent.iter().filter(|t| t.as_str() == "C").count(), 18);

    assert!(events.try_iter().any(|e| matches!(
        e,
        ConsoleEvent::Calibration(disha_console::calibration::CalibrationEvent::Finished { .. })
    )));
}

#[test]
fn test_raw_command_and_flush() {
    let channel = channel(quiet());
    let robot = RobotController::new(Arc::clone(&channel), RobotSettings::default());
    let mut console = Console::new(robot, &Config::default());

    // Greeting still buffered: the raw exchange reads it as the reply
    match console.dispatch_line("raw Q").unwrap() {
        Outcome::Raw(response) => assert_eq!(response.text(), SIM_GREETING),
        other => panic!("unexpected outcome {:?}", other),
    }
    console.dispatch(Intent::Flush).unwrap();
    assert!(channel.transcript().is_empty());

    match console.dispatch_line("raw Q").unwrap() {
        Outcome::Raw(response) => assert!(response.text().starts_with("ERR")),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_concurrent_exchange_is_rejected() {
    let channel = channel(quiet());
    let exchange = channel.begin().unwrap();

    let other = Arc::clone(&channel);
    let result = thread::spawn(move || other.round_trip("G")).join().unwrap();
    assert!(matches!(result, Err(Error::Busy(_))));

    drop(exchange);
    channel.read_greeting().unwrap();
    assert_eq!(channel.round_trip("G").unwrap().text(), "150");
}
