//! Serial link to the robot's UART

use super::Transport;
use crate::config::SerialConfig;
use crate::error::Result;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Per-read poll timeout. The response deadline is enforced by the channel,
/// so the port only needs to wake up often enough to check it.
const POLL_TIMEOUT: Duration = Duration::from_millis(20);

/// 8N1 serial port without flow control
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` (the robot firmware uses 38400)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_TIMEOUT)
            .open()?;
        log::info!("Serial link up: {} @ {} baud, 8N1", path, baud_rate);
        Ok(Self { port })
    }

    pub fn from_config(config: &SerialConfig) -> Result<Self> {
        Self::open(&config.port, config.baud_rate)
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(0),
            other => Ok(other?),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.port.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.port.flush()?)
    }

    /// Drop whatever sits in the driver's input and output queues
    fn clear(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        log::debug!("Serial buffers cleared");
        Ok(())
    }
}
