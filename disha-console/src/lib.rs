//! DishaConsole - serial control console for a small mobile robot
//!
//! Drives a differential-drive robot with a range-finder tower and a 3-axis
//! magnetometer over a line-oriented serial protocol. One request is in flight
//! at a time; every line crossing the link is kept in a transcript.
//!
//! ## Layers
//!
//! - [`transport`]: byte streams (serial port, scripted mock, simulated robot)
//! - [`channel`]: request/response framing with an exclusive exchange guard
//! - [`robot`]: typed robot operations and pose tracking
//! - [`calibration`]: median-filtered magnetometer sampling and hard-iron bounds
//! - [`mapping`]: scan samples to world-frame poles
//! - [`console`]: intent dispatch table for front ends
//!
//! ## Features
//!
//! - `mock`: simulated robot transport for hardware-free runs and tests

pub mod calibration;
pub mod channel;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod mapping;
pub mod robot;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use console::{Console, ConsoleEvent, Intent, Outcome};
pub use error::{Error, ErrorKind, Result};
