//! Mock transport for testing

use super::Transport;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Mock transport for unit testing
///
/// Clones share state, so a test can keep a handle after moving the transport
/// into a channel. Replies queued with [`MockTransport::script`] are released
/// one per newline-terminated request, which is how the firmware behaves.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    scripted: VecDeque<Vec<u8>>,
    clears: usize,
    fail_writes: bool,
    fail_drained_reads: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
        }
    }

    /// Inject data to be read immediately
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Queue replies, one released per request line written
    pub fn script<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut inner = self.inner.lock();
        inner
            .scripted
            .extend(replies.into_iter().map(|r| r.as_ref().to_vec()));
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Written data split into request lines (terminators removed)
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.inner.lock().write_buffer)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of scripted replies not yet released
    pub fn pending_replies(&self) -> usize {
        self.inner.lock().scripted.len()
    }

    /// Number of times [`Transport::clear`] was called
    pub fn clear_count(&self) -> usize {
        self.inner.lock().clears
    }

    /// Make every subsequent write fail with a broken pipe
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Once injected bytes run out, fail reads as if the link dropped
    pub fn fail_reads_when_drained(&self, fail: bool) {
        self.inner.lock().fail_drained_reads = fail;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.read_buffer.is_empty() && inner.fail_drained_reads {
            let e = io::Error::new(io::ErrorKind::ConnectionReset, "mock read failure");
            return Err(e.into());
        }
        let available = inner.read_buffer.len().min(buffer.len());

        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }

        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            let e = io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure");
            return Err(e.into());
        }
        inner.write_buffer.extend_from_slice(data);

        for _ in data.iter().filter(|&&b| b == b'\n') {
            if let Some(reply) = inner.scripted.pop_front() {
                inner.read_buffer.extend(reply);
            }
        }

        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.read_buffer.clear();
        inner.clears += 1;
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reply_released_per_line() {
        let mock = MockTransport::new();
        mock.script(["OK\r\n", "42\r\n"]);
        let mut transport = mock.clone();

        let mut buf = [0u8; 16];
        assert_eq!(transport.read(&mut buf).unwrap(), 0);

        transport.write_all(b"D 90 ").unwrap();
        assert_eq!(transport.read(&mut buf).unwrap(), 0);

        transport.write_all(b"90\n").unwrap();
        let n = transport.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"OK\r\n");
        assert_eq!(mock.pending_replies(), 1);
        assert_eq!(mock.written_lines(), vec!["D 90 90".to_string()]);
    }

    #[test]
    fn test_clear_discards_input() {
        let mock = MockTransport::new();
        mock.inject_read(b"stale");
        let mut transport = mock.clone();
        transport.clear().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert_eq!(mock.clear_count(), 1);
    }
}
