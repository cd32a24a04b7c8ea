//! Transport layer for I/O abstraction
//!
//! The command channel only needs a byte stream. Real sessions use
//! [`SerialTransport`]; tests use [`MockTransport`] and, with the `mock`
//! feature, [`SimulatedRobot`].

use crate::error::Result;

mod mock;
mod serial;
#[cfg(feature = "mock")]
mod sim;

pub use mock::MockTransport;
pub use serial::SerialTransport;
#[cfg(feature = "mock")]
pub use sim::{SimSettings, SimulatedRobot, SIM_GREETING};

/// Transport trait for robot communication
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read
    ///
    /// Returns `Ok(0)` when nothing arrived within the transport's own poll
    /// timeout. The caller owns the overall response deadline.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Discard unread input and unsent output
    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write the whole buffer, looping over short writes
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                )
                .into());
            }
            data = &data[n..];
        }
        Ok(())
    }
}
