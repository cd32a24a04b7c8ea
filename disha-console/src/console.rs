//! Intent dispatch
//!
//! Every operator action is an [`Intent`]. Front ends build intents (the
//! terminal parses them from text with [`str::parse`]) and hand them to
//! [`Console::dispatch`], the single table mapping intents to robot,
//! calibration and mapping operations. Observers receive [`ConsoleEvent`]s
//! for everything that changes.

use crate::calibration::{
    AutoCalibration, CalibrationBounds, CalibrationEngine, CalibrationEvent,
};
use crate::channel::{Response, TranscriptEntry};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::Observers;
use crate::mapping::{Color, PolarMapper, Pole};
use crate::robot::{RobotController, RobotPose, WheelCommand};
use crate::types::{ScanSample, Vector3};
use crossbeam_channel::Receiver;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Default `beep` frequency and duration
pub const DEFAULT_BEEP: (u32, u32) = (30, 3);

/// Shown on the robot display by a bare `print`
pub const DUCK: &str = "   __\n <(o )___\n  ( ._> /\n   `---'";

pub const HELP: &str = "\
motion:   hold forward|backward|left|right, release, drive <l> <r>, stop,
          move <cm>, rotate <deg>, rotate-to <deg>, tower <deg>, kill
sensors:  scan, distance, azimuth, mag, mag-cal
output:   beep [freq dur], print [text]
pose:     pose, odometry <x> <y>, heading <deg>
calib:    calibrate, autocal, reset-cal, bounds
map:      poles, clear
link:     raw <text>, flush, transcript
session:  help, quit";

/// Direction for momentary hold-to-drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldDirection {
    Forward,
    Backward,
    Left,
    Right,
}

impl HoldDirection {
    /// Wheel speeds for this direction at `speed`
    pub fn wheels(self, speed: i32) -> (i32, i32) {
        match self {
            HoldDirection::Forward => (speed, speed),
            HoldDirection::Backward => (-speed, -speed),
            HoldDirection::Left => (-speed, speed),
            HoldDirection::Right => (speed, -speed),
        }
    }
}

impl FromStr for HoldDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forward" | "f" => Ok(HoldDirection::Forward),
            "backward" | "back" | "b" => Ok(HoldDirection::Backward),
            "left" | "l" => Ok(HoldDirection::Left),
            "right" | "r" => Ok(HoldDirection::Right),
            other => Err(Error::InvalidParameter(format!("unknown direction '{}'", other))),
        }
    }
}

/// Operator action
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Hold(HoldDirection),
    Release,
    Drive { left: i32, right: i32 },
    Stop,
    Move(f64),
    Rotate(f64),
    RotateTo(f64),
    Tower(f64),
    Kill,
    Scan,
    Distance,
    Azimuth,
    Mag,
    MagCal,
    Beep { frequency: u32, duration: u32 },
    /// `None` prints the duck
    Print(Option<String>),
    ShowPose,
    Odometry { x: f64, y: f64 },
    Heading(f64),
    Calibrate,
    AutoCalibrate,
    ResetCalibration,
    ShowBounds,
    ShowPoles,
    ClearPoles,
    Raw(String),
    Flush,
    ShowTranscript,
    Help,
    Quit,
}

fn arg<T: FromStr>(args: &[&str], index: usize, name: &str) -> Result<T> {
    let text = args
        .get(index)
        .ok_or_else(|| Error::InvalidParameter(format!("missing {}", name)))?;
    text.parse()
        .map_err(|_| Error::InvalidParameter(format!("invalid {} '{}'", name, text)))
}

impl FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let intent = match word.to_ascii_lowercase().as_str() {
            "hold" => Intent::Hold(arg(&args, 0, "direction")?),
            "release" => Intent::Release,
            "drive" => Intent::Drive {
                left: arg(&args, 0, "left speed")?,
                right: arg(&args, 1, "right speed")?,
            },
            "stop" => Intent::Stop,
            "move" => Intent::Move(arg(&args, 0, "distance")?),
            "rotate" => Intent::Rotate(arg(&args, 0, "angle")?),
            "rotate-to" => Intent::RotateTo(arg(&args, 0, "angle")?),
            "tower" => Intent::Tower(arg(&args, 0, "angle")?),
            "kill" => Intent::Kill,
            "scan" => Intent::Scan,
            "distance" => Intent::Distance,
            "azimuth" => Intent::Azimuth,
            "mag" => Intent::Mag,
            "mag-cal" => Intent::MagCal,
            "beep" if args.is_empty() => Intent::Beep {
                frequency: DEFAULT_BEEP.0,
                duration: DEFAULT_BEEP.1,
            },
            "beep" => Intent::Beep {
                frequency: arg(&args, 0, "frequency")?,
                duration: arg(&args, 1, "duration")?,
            },
            "print" if rest.is_empty() => Intent::Print(None),
            "print" => Intent::Print(Some(rest.to_string())),
            "pose" => Intent::ShowPose,
            "odometry" => Intent::Odometry {
                x: arg(&args, 0, "x")?,
                y: arg(&args, 1, "y")?,
            },
            "heading" => Intent::Heading(arg(&args, 0, "heading")?),
            "calibrate" => Intent::Calibrate,
            "autocal" => Intent::AutoCalibrate,
            "reset-cal" => Intent::ResetCalibration,
            "bounds" => Intent::ShowBounds,
            "poles" => Intent::ShowPoles,
            "clear" => Intent::ClearPoles,
            "raw" if rest.is_empty() => {
                return Err(Error::InvalidParameter("missing raw command".into()))
            }
            "raw" => Intent::Raw(rest.to_string()),
            "flush" => Intent::Flush,
            "transcript" => Intent::ShowTranscript,
            "help" | "?" => Intent::Help,
            "quit" | "exit" => Intent::Quit,
            _ => return Err(Error::UnknownIntent(line.to_string())),
        };
        Ok(intent)
    }
}

/// Result of one dispatched intent
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Acknowledged, nothing to show
    Done,
    Distance(f64),
    Azimuth(f64),
    Mag(Vector3),
    Scan { samples: usize, accepted: usize },
    Raw(Response),
    Pose(RobotPose),
    Bounds(CalibrationBounds),
    /// Timed calibration armed; ticks arrive through `poll`
    CalibrationStarted { total: u32 },
    Poles(Vec<Pole>),
    Transcript(Vec<TranscriptEntry>),
    Help,
    Quit,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => write!(f, "ok"),
            Outcome::Distance(d) => write!(f, "distance {} cm", d),
            Outcome::Azimuth(a) => write!(f, "azimuth {} deg", a),
            Outcome::Mag(v) => write!(f, "mag {}", v),
            Outcome::Scan { samples, accepted } => {
                write!(f, "scan: {} samples, {} poles placed", samples, accepted)
            }
            Outcome::Raw(response) if response.is_complete() => write!(f, "{}", response.text()),
            Outcome::Raw(response) => write!(f, "{} (timeout)", response.raw()),
            Outcome::Pose(pose) => write!(
                f,
                "position ({:.1}, {:.1}) cm, azimuth {:.1} deg, tower {:.1} deg",
                pose.position.0, pose.position.1, pose.azimuth, pose.tower_angle
            ),
            Outcome::Bounds(bounds) => {
                for (name, axis) in ["x", "y", "z"].iter().zip(bounds.axes()) {
                    writeln!(
                        f,
                        "{}: min {} max {} offset {}",
                        name, axis.min, axis.max, axis.offset
                    )?;
                }
                write!(f, "{} samples", bounds.samples())
            }
            Outcome::CalibrationStarted { total } => {
                write!(f, "calibrating: {} samples, rotate the robot", total)
            }
            Outcome::Poles(poles) => {
                for pole in poles {
                    writeln!(f, "({:.1}, {:.1}) {}", pole.x, pole.y, pole.color)?;
                }
                write!(f, "{} poles", poles.len())
            }
            Outcome::Transcript(entries) => {
                for entry in entries {
                    writeln!(f, "{}", entry)?;
                }
                write!(f, "{} lines", entries.len())
            }
            Outcome::Help => write!(f, "{}", HELP),
            Outcome::Quit => write!(f, "bye"),
        }
    }
}

/// Notifications for presentation observers
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    Transcript(TranscriptEntry),
    Pose(RobotPose),
    Wheels(WheelCommand),
    Scan(Vec<ScanSample>),
    PoleAdded(Pole),
    PolesCleared,
    Calibration(CalibrationEvent),
}

/// Console behaviour knobs
#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub drive_speed: i32,
    pub clear_poles_on_scan: bool,
    pub color_per_scan: bool,
}

impl From<&Config> for ConsoleSettings {
    fn from(config: &Config) -> Self {
        Self {
            drive_speed: config.robot.drive_speed,
            clear_poles_on_scan: config.mapping.clear_poles_on_scan,
            color_per_scan: config.mapping.color_per_scan,
        }
    }
}

/// Session state and the intent dispatch table
pub struct Console {
    robot: RobotController,
    calibration: CalibrationEngine,
    autocal: AutoCalibration,
    mapper: PolarMapper,
    settings: ConsoleSettings,
    rng: SmallRng,
    observers: Observers<ConsoleEvent>,
    calibration_rx: Receiver<CalibrationEvent>,
    transcript_rx: Receiver<TranscriptEntry>,
}

impl Console {
    pub fn new(robot: RobotController, config: &Config) -> Self {
        let mut calibration = CalibrationEngine::new(config.calibration_settings());
        let calibration_rx = calibration.subscribe();
        let transcript_rx = robot.channel().subscribe_transcript();
        Self {
            robot,
            calibration,
            autocal: AutoCalibration::new(config.autocal_settings()),
            mapper: PolarMapper::new(config.mapping.min_distance_cm),
            settings: ConsoleSettings::from(config),
            rng: SmallRng::from_entropy(),
            observers: Observers::new(),
            calibration_rx,
            transcript_rx,
        }
    }

    pub fn subscribe(&mut self) -> Receiver<ConsoleEvent> {
        self.observers.subscribe()
    }

    /// Run one intent
    ///
    /// Errors leave the session in its last known state.
    pub fn dispatch(&mut self, intent: Intent) -> Result<Outcome> {
        log::debug!("Dispatching {:?}", intent);
        let pose_before = self.robot.pose();
        let wheels_before = self.robot.wheels();

        let result = self.execute(intent);

        self.forward_side_events();
        let pose = self.robot.pose();
        if pose != pose_before {
            self.observers.publish(ConsoleEvent::Pose(pose));
        }
        let wheels = self.robot.wheels();
        if wheels != wheels_before {
            self.observers.publish(ConsoleEvent::Wheels(wheels));
        }
        result
    }

    /// Parse and run one line of operator text
    pub fn dispatch_line(&mut self, line: &str) -> Result<Outcome> {
        let intent = line.parse()?;
        self.dispatch(intent)
    }

    fn execute(&mut self, intent: Intent) -> Result<Outcome> {
        let speed = self.settings.drive_speed;
        match intent {
            Intent::Hold(direction) => {
                let (left, right) = direction.wheels(speed);
                self.robot.drive(left, right)?;
            }
            Intent::Release | Intent::Stop => self.robot.stop()?,
            Intent::Drive { left, right } => self.robot.drive(left, right)?,
            Intent::Move(cm) => self.robot.move_by(cm)?,
            Intent::Rotate(deg) => self.robot.rotate(deg)?,
            Intent::RotateTo(deg) => self.robot.rotate_to(deg)?,
            Intent::Tower(deg) => self.robot.rotate_tower(deg)?,
            Intent::Kill => self.robot.kill()?,
            Intent::Scan => return self.scan(),
            Intent::Distance => return Ok(Outcome::Distance(self.robot.get_distance()?)),
            Intent::Azimuth => return Ok(Outcome::Azimuth(self.robot.get_azimuth()?)),
            Intent::Mag => return Ok(Outcome::Mag(self.robot.get_mag()?)),
            Intent::MagCal => return Ok(Outcome::Mag(self.robot.get_mag_cal()?)),
            Intent::Beep {
                frequency,
                duration,
            } => self.robot.beep(frequency, duration)?,
            Intent::Print(text) => self.robot.print(text.as_deref().unwrap_or(DUCK))?,
            Intent::ShowPose => return Ok(Outcome::Pose(self.robot.pose())),
            Intent::Odometry { x, y } => self.robot.report_odometry((x, y)),
            Intent::Heading(deg) => self.robot.report_azimuth(deg),
            Intent::Calibrate => {
                self.calibration.start(Instant::now())?;
                return Ok(Outcome::CalibrationStarted {
                    total: self.calibration.settings().repeat_count,
                });
            }
            Intent::AutoCalibrate => {
                let bounds = self.autocal.run(&mut self.robot, &mut self.calibration)?;
                return Ok(Outcome::Bounds(bounds));
            }
            Intent::ResetCalibration => self.calibration.reset(),
            Intent::ShowBounds => return Ok(Outcome::Bounds(*self.calibration.bounds())),
            Intent::ShowPoles => return Ok(Outcome::Poles(self.mapper.poles().to_vec())),
            Intent::ClearPoles => self.clear_poles(),
            Intent::Raw(text) => return Ok(Outcome::Raw(self.robot.send_raw(&text)?)),
            Intent::Flush => self.robot.channel().flush()?,
            Intent::ShowTranscript => {
                return Ok(Outcome::Transcript(self.robot.channel().transcript()))
            }
            Intent::Help => return Ok(Outcome::Help),
            Intent::Quit => return Ok(Outcome::Quit),
        }
        Ok(Outcome::Done)
    }

    fn scan(&mut self) -> Result<Outcome> {
        let samples = self.robot.scan()?;
        if self.settings.clear_poles_on_scan {
            self.clear_poles();
        }
        let color = if self.settings.color_per_scan {
            Color::random_bright(&mut self.rng)
        } else {
            Color::MAGENTA
        };

        let pose = self.robot.pose();
        let first_new = self.mapper.poles().len();
        let accepted = self.mapper.map_scan(&samples, &pose, color);

        self.observers.publish(ConsoleEvent::Scan(samples.clone()));
        for pole in &self.mapper.poles()[first_new..] {
            self.observers.publish(ConsoleEvent::PoleAdded(*pole));
        }
        Ok(Outcome::Scan {
            samples: samples.len(),
            accepted,
        })
    }

    fn clear_poles(&mut self) {
        self.mapper.clear_poles();
        self.observers.publish(ConsoleEvent::PolesCleared);
    }

    /// Timer hook for the event loop; runs a calibration tick when due
    pub fn poll(&mut self, now: Instant) -> Result<Option<u32>> {
        let result = self.calibration.poll(now, &mut self.robot);
        self.forward_side_events();
        result
    }

    /// Stop the wheels unless the last wheel command was an acknowledged stop
    pub fn shutdown(&mut self) -> Result<()> {
        if !self.robot.may_be_moving() {
            return Ok(());
        }
        log::info!("Stopping wheels before exit");
        let result = self.robot.stop();
        self.forward_side_events();
        result
    }

    fn forward_side_events(&mut self) {
        while let Ok(entry) = self.transcript_rx.try_recv() {
            self.observers.publish(ConsoleEvent::Transcript(entry));
        }
        while let Ok(event) = self.calibration_rx.try_recv() {
            self.observers.publish(ConsoleEvent::Calibration(event));
        }
    }

    pub fn robot(&self) -> &RobotController {
        &self.robot
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn mapper(&self) -> &PolarMapper {
        &self.mapper
    }

    /// When the next calibration tick is due, if a run is active
    pub fn next_tick(&self) -> Option<Instant> {
        self.calibration.next_due()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelSettings, CommandChannel};
    use crate::robot::RobotSettings;
    use crate::transport::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn console(mock: &MockTransport, config: &Config) -> Console {
        let channel = CommandChannel::new(
            Box::new(mock.clone()),
            ChannelSettings {
                timeout: Duration::from_millis(30),
                transcript_capacity: 64,
            },
        );
        let robot = RobotController::new(Arc::new(channel), RobotSettings::default());
        Console::new(robot, config)
    }

    #[test]
    fn test_parse_intents() {
        assert_eq!(
            "hold left".parse::<Intent>().unwrap(),
            Intent::Hold(HoldDirection::Left)
        );
        assert_eq!(
            "DRIVE 10 -20".parse::<Intent>().unwrap(),
            Intent::Drive { left: 10, right: -20 }
        );
        assert_eq!("rotate-to 90".parse::<Intent>().unwrap(), Intent::RotateTo(90.0));
        assert_eq!(
            "beep".parse::<Intent>().unwrap(),
            Intent::Beep {
                frequency: 30,
                duration: 3
            }
        );
        assert_eq!("print".parse::<Intent>().unwrap(), Intent::Print(None));
        assert_eq!(
            "print hello  world".parse::<Intent>().unwrap(),
            Intent::Print(Some("hello  world".to_string()))
        );
        assert_eq!(
            "raw  D 1 1".parse::<Intent>().unwrap(),
            Intent::Raw("D 1 1".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "dance".parse::<Intent>(),
            Err(Error::UnknownIntent(_))
        ));
        assert!(matches!(
            "move far".parse::<Intent>(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            "hold up".parse::<Intent>(),
            Err(Error::InvalidParameter(_))
        ));
        assert!("drive 10".parse::<Intent>().is_err());
        assert!("raw".parse::<Intent>().is_err());
    }

    #[test]
    fn test_hold_and_release() {
        let mock = MockTransport::new();
        mock.script(["OK\r\n", "OK\r\n"]);
        let mut console = console(&mock, &Config::default());
        let events = console.subscribe();

        console.dispatch(Intent::Hold(HoldDirection::Right)).unwrap();
        console.dispatch(Intent::Release).unwrap();

        assert_eq!(mock.written_lines(), vec!["D 90 -90", "D 0 0"]);
        assert!(console.robot().wheels().is_at_rest());
        let wheel_events = events
            .try_iter()
            .filter(|e| matches!(e, ConsoleEvent::Wheels(_)))
            .count();
        assert_eq!(wheel_events, 2);
    }

    #[test]
    fn test_scan_places_poles_and_publishes() {
        let mock = MockTransport::new();
        mock.script(["20,5,30\r\n", "40\r\n"]);
        let mut console = console(&mock, &Config::default());
        let events = console.subscribe();

        match console.dispatch(Intent::Scan).unwrap() {
            Outcome::Scan { samples, accepted } => {
                assert_eq!(samples, 3);
                assert_eq!(accepted, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        console.dispatch(Intent::Scan).unwrap();
        assert_eq!(console.mapper().poles().len(), 3);
        assert!(console.mapper().poles().iter().all(|p| p.color == Color::MAGENTA));

        let added = events
            .try_iter()
            .filter(|e| matches!(e, ConsoleEvent::PoleAdded(_)))
            .count();
        assert_eq!(added, 3);

        console.dispatch(Intent::ClearPoles).unwrap();
        assert!(console.mapper().poles().is_empty());
    }

    #[test]
    fn test_clear_poles_on_scan() {
        let mock = MockTransport::new();
        mock.script(["20,30\r\n", "40\r\n"]);
        let mut config = Config::default();
        config.mapping.clear_poles_on_scan = true;
        let mut console = console(&mock, &config);

        console.dispatch(Intent::Scan).unwrap();
        console.dispatch(Intent::Scan).unwrap();
        assert_eq!(console.mapper().poles().len(), 1);
    }

    #[test]
    fn test_pose_events_follow_motion() {
        let mock = MockTransport::new();
        mock.script(["OK\r\n"]);
        let mut console = console(&mock, &Config::default());
        let events = console.subscribe();

        console.dispatch_line("move 25").unwrap();
        let pose = events.try_iter().find_map(|e| match e {
            ConsoleEvent::Pose(pose) => Some(pose),
            _ => None,
        });
        assert_eq!(pose.map(|p| p.position), Some((25.0, 0.0)));
    }

    #[test]
    fn test_transcript_is_forwarded() {
        let mock = MockTransport::new();
        mock.script(["42\r\n"]);
        let mut console = console(&mock, &Config::default());
        let events = console.subscribe();

        assert!(matches!(
            console.dispatch(Intent::Distance).unwrap(),
            Outcome::Distance(d) if d == 42.0
        ));
        let lines: Vec<String> = events
            .try_iter()
            .filter_map(|e| match e {
                ConsoleEvent::Transcript(entry) => Some(entry.text),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["G", "42"]);
    }

    #[test]
    fn test_calibration_through_poll() {
        let mock = MockTransport::new();
        let mut config = Config::default();
        config.calibration.repeat_count = 2;
        let mut console = console(&mock, &config);
        mock.script(std::iter::repeat("100 -50 10\r\n").take(6));

        assert!(matches!(
            console.dispatch(Intent::Calibrate).unwrap(),
            Outcome::CalibrationStarted { total: 2 }
        ));
        assert!(matches!(
            console.dispatch(Intent::Calibrate),
            Err(Error::Busy(_))
        ));
        assert!(matches!(
            console.dispatch(Intent::AutoCalibrate),
            Err(Error::Busy(_))
        ));

        let mut now = Instant::now();
        while console.next_tick().is_some() {
            now += Duration::from_secs(5);
            console.poll(now).unwrap();
        }
        assert_eq!(console.calibration().point_cloud().len(), 2);
        assert_eq!(
            console.calibration().bounds().offset(),
            Vector3::new(100.0, -50.0, 10.0)
        );

        console.dispatch(Intent::ResetCalibration).unwrap();
        assert!(console.calibration().point_cloud().is_empty());
    }

    #[test]
    fn test_shutdown_stops_moving_wheels() {
        let mock = MockTransport::new();
        mock.script(["OK\r\n", "OK\r\n"]);
        let mut console = console(&mock, &Config::default());

        console.shutdown().unwrap();
        assert!(mock.get_written().is_empty());

        console.dispatch(Intent::Drive { left: 40, right: 40 }).unwrap();
        console.shutdown().unwrap();
        assert_eq!(mock.written_lines(), vec!["D 40 40", "D 0 0"]);
    }

    #[test]
    fn test_shutdown_stops_after_unacknowledged_drive() {
        let mock = MockTransport::new();
        mock.script(["", "OK\r\n"]);
        let mut console = console(&mock, &Config::default());

        assert!(console.dispatch_line("hold forward").is_err());
        assert!(console.robot().wheels().is_at_rest());

        console.shutdown().unwrap();
        assert_eq!(mock.written_lines(), vec!["D 90 90", "D 0 0"]);
        assert!(!console.robot().may_be_moving());
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(Outcome::Distance(42.0).to_string(), "distance 42 cm");
        let raw = Outcome::Raw(Response::Partial("4".into()));
        assert_eq!(raw.to_string(), "4 (timeout)");
    }
}
