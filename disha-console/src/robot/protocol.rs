//! Robot line protocol
//!
//! Request format: `<LETTER> [ARG]...\n`, arguments separated by one space.
//! Responses are a single line terminated by `\r\n`:
//!
//! - motion and output commands answer with an ack line (content ignored)
//! - `G`, `A` answer with one number
//! - `C`, `L` answer with three numbers `x y z`
//! - `S` answers with distances separated by commas and/or whitespace
//!
//! Numbers on the wire are decimal ASCII. Integral values are sent without a
//! fractional part so the firmware's integer parser accepts them.

use crate::error::{Error, Result};
use crate::types::Vector3;

/// Largest wheel speed magnitude the firmware accepts
pub const MAX_WHEEL_SPEED: i32 = 100;

/// Command letters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandLetter {
    Drive = b'D',
    Move = b'M',
    Rotate = b'R',
    RotateTo = b'T',
    Tower = b'W',
    Scan = b'S',
    Distance = b'G',
    Azimuth = b'A',
    Mag = b'C',
    MagCal = b'L',
    Beep = b'B',
    Print = b'P',
    Kill = b'X',
}

/// One robot request
#[derive(Debug, Clone, PartialEq)]
pub enum RobotCommand {
    /// Differential wheel speeds, each in [-100, 100]
    Drive { left: i32, right: i32 },
    /// Drive straight by a distance in centimetres
    Move(f64),
    /// Turn by a relative angle in degrees
    Rotate(f64),
    /// Turn to an absolute heading in degrees
    RotateTo(f64),
    /// Point the range-finder tower
    Tower(f64),
    Scan,
    Distance,
    Azimuth,
    /// Raw magnetometer reading
    Mag,
    /// Firmware-corrected magnetometer reading
    MagCal,
    Beep { frequency: u32, duration: u32 },
    /// Text for the robot's display
    Print(String),
    /// Emergency stop
    Kill,
}

impl RobotCommand {
    pub fn letter(&self) -> CommandLetter {
        match self {
            RobotCommand::Drive { .. } => CommandLetter::Drive,
            RobotCommand::Move(_) => CommandLetter::Move,
            RobotCommand::Rotate(_) => CommandLetter::Rotate,
            RobotCommand::RotateTo(_) => CommandLetter::RotateTo,
            RobotCommand::Tower(_) => CommandLetter::Tower,
            RobotCommand::Scan => CommandLetter::Scan,
            RobotCommand::Distance => CommandLetter::Distance,
            RobotCommand::Azimuth => CommandLetter::Azimuth,
            RobotCommand::Mag => CommandLetter::Mag,
            RobotCommand::MagCal => CommandLetter::MagCal,
            RobotCommand::Beep { .. } => CommandLetter::Beep,
            RobotCommand::Print(_) => CommandLetter::Print,
            RobotCommand::Kill => CommandLetter::Kill,
        }
    }

    /// Check arguments against what the firmware accepts
    pub fn validate(&self) -> Result<()> {
        match self {
            RobotCommand::Drive { left, right } => {
                for speed in [*left, *right] {
                    if !(-MAX_WHEEL_SPEED..=MAX_WHEEL_SPEED).contains(&speed) {
                        return Err(Error::InvalidParameter(format!(
                            "wheel speed {} outside [-{}, {}]",
                            speed, MAX_WHEEL_SPEED, MAX_WHEEL_SPEED
                        )));
                    }
                }
                Ok(())
            }
            RobotCommand::Move(v)
            | RobotCommand::Rotate(v)
            | RobotCommand::RotateTo(v)
            | RobotCommand::Tower(v) => {
                if v.is_finite() {
                    Ok(())
                } else {
                    Err(Error::InvalidParameter(format!("non-finite argument {}", v)))
                }
            }
            RobotCommand::Print(text) => {
                if text.is_ascii() {
                    Ok(())
                } else {
                    Err(Error::InvalidParameter(
                        "display text must be ASCII".to_string(),
                    ))
                }
            }
            _ => Ok(()),
        }
    }

    /// Encode into a request line (without terminator)
    pub fn encode(&self) -> String {
        let letter = self.letter() as u8 as char;
        match self {
            RobotCommand::Drive { left, right } => format!("{} {} {}", letter, left, right),
            RobotCommand::Move(v)
            | RobotCommand::Rotate(v)
            | RobotCommand::RotateTo(v)
            | RobotCommand::Tower(v) => format!("{} {}", letter, format_number(*v)),
            RobotCommand::Beep {
                frequency,
                duration,
            } => format!("{} {} {}", letter, frequency, duration),
            RobotCommand::Print(text) => format!("{} {}", letter, escape_text(text)),
            _ => letter.to_string(),
        }
    }
}

/// Decimal text for a wire argument
///
/// Integral values print without a fraction; others keep two decimals with
/// trailing zeros removed.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Line breaks become the two-character escapes `\n` and `\r`
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\\' => escaped.push_str("\\\\"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

fn parse_token(command: &str, text: &str, token: &str) -> Result<f64> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(Error::protocol(
            command,
            text,
            format!("'{}' is not a number", token),
        )),
    }
}

/// Every number in a response
pub fn parse_numbers(command: &str, text: &str) -> Result<Vec<f64>> {
    tokens(text)
        .map(|token| parse_token(command, text, token))
        .collect()
}

/// Exactly one number
pub fn parse_scalar(command: &str, text: &str) -> Result<f64> {
    match parse_numbers(command, text)?.as_slice() {
        [value] => Ok(*value),
        values => Err(Error::protocol(
            command,
            text,
            format!("expected 1 value, got {}", values.len()),
        )),
    }
}

/// Exactly three numbers
pub fn parse_vector(command: &str, text: &str) -> Result<Vector3> {
    match parse_numbers(command, text)?.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        values => Err(Error::protocol(
            command,
            text,
            format!("expected 3 values, got {}", values.len()),
        )),
    }
}
