//! Line-framed command channel
//!
//! Frames outgoing request lines and reads the matching response line from a
//! [`Transport`]. The channel owns no robot semantics.
//!
//! # Exchange discipline
//!
//! At most one request may be outstanding. Every round trip runs inside an
//! [`Exchange`], which holds the link exclusively. Asking for a second exchange
//! while one is open fails with [`Error::Busy`]; bytes from two requests can
//! never interleave on the wire.
//!
//! ```text
//! begin() ──▶ send_line("G") ──▶ read_line(b'\n') ──▶ drop(exchange)
//!                 │                      │
//!                 ▼                      ▼
//!           transcript SENT       transcript RECEIVED
//! ```
//!
//! # Timeouts
//!
//! `read_line` blocks until the terminator arrives or the configured timeout
//! elapses. A timeout is not an error here: the bytes gathered so far come
//! back as [`Response::Partial`]. Only transport failures are errors, and
//! they discard any unterminated bytes so the next exchange starts clean.

mod transcript;

pub use transcript::{Direction, Transcript, TranscriptEntry};

use crate::error::{Error, Result};
use crate::transport::Transport;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Line terminator used by the firmware in both directions
pub const LINE_TERMINATOR: u8 = b'\n';

/// Read chunk size per transport poll
const READ_CHUNK: usize = 256;

/// Back-off between empty transport polls
const IDLE_POLL: Duration = Duration::from_millis(1);

/// One response as read from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Terminated line (raw, terminator included)
    Line(String),
    /// Bytes gathered before the read timed out (no terminator)
    Partial(String),
}

impl Response {
    /// Raw text as received
    pub fn raw(&self) -> &str {
        match self {
            Response::Line(s) | Response::Partial(s) => s,
        }
    }

    /// Text with any trailing `\r`/`\n` removed
    pub fn text(&self) -> &str {
        strip_terminator(self.raw())
    }

    /// True when the terminator was seen
    pub fn is_complete(&self) -> bool {
        matches!(self, Response::Line(_))
    }

    /// Stripped text of a complete line, or [`Error::Timeout`] for a partial one
    pub fn into_text(self) -> Result<String> {
        match self {
            Response::Line(raw) => Ok(strip_terminator(&raw).to_string()),
            Response::Partial(partial) => Err(Error::Timeout { partial }),
        }
    }
}

/// Remove trailing CR/LF characters
pub fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(|c: char| c == '\r' || c == '\n')
}

/// Channel parameters
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Response deadline for one `read_line`
    pub timeout: Duration,
    /// Transcript lines kept in memory (0 = log only)
    pub transcript_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            transcript_capacity: 500,
        }
    }
}

/// Transport plus bytes read past the last terminator
struct Link {
    transport: Box<dyn Transport>,
    pending: Vec<u8>,
}

/// Request/response channel over a byte stream
pub struct CommandChannel {
    link: Mutex<Link>,
    transcript: Mutex<Transcript>,
    settings: ChannelSettings,
}

impl CommandChannel {
    pub fn new(transport: Box<dyn Transport>, settings: ChannelSettings) -> Self {
        log::debug!(
            "Command channel ready (timeout {:?}, transcript {} lines)",
            settings.timeout,
            settings.transcript_capacity
        );
        Self {
            link: Mutex::new(Link {
                transport,
                pending: Vec::new(),
            }),
            transcript: Mutex::new(Transcript::new(settings.transcript_capacity)),
            settings,
        }
    }

    /// Open an exclusive exchange
    ///
    /// Fails with [`Error::Busy`] if another exchange is still open.
    pub fn begin(&self) -> Result<Exchange<'_>> {
        let link = self
            .link
            .try_lock()
            .ok_or(Error::Busy("command already in flight"))?;
        Ok(Exchange {
            link,
            channel: self,
        })
    }

    /// One command round trip: send a line, read one response line
    pub fn round_trip(&self, command: &str) -> Result<Response> {
        let mut exchange = self.begin()?;
        exchange.send_line(command)?;
        exchange.read_line(LINE_TERMINATOR)
    }

    /// Read the banner line the firmware prints after the port opens
    ///
    /// Returns `None` if nothing complete arrived before the timeout.
    pub fn read_greeting(&self) -> Result<Option<String>> {
        let response = self.begin()?.read_line(LINE_TERMINATOR)?;
        if response.is_complete() {
            return Ok(Some(response.text().to_string()));
        }
        log::warn!("No greeting from robot (partial: {:?})", response.raw());
        Ok(None)
    }

    /// Discard unread bytes on both sides and clear the transcript
    pub fn flush(&self) -> Result<()> {
        let mut link = self
            .link
            .try_lock()
            .ok_or(Error::Busy("command already in flight"))?;
        let dropped = link.pending.len();
        link.pending.clear();
        link.transport.clear()?;
        self.transcript.lock().clear();
        log::info!("Channel flushed ({} buffered bytes dropped)", dropped);
        Ok(())
    }

    /// True while an exchange is open
    pub fn is_busy(&self) -> bool {
        self.link.is_locked()
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Snapshot of the in-memory transcript
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().entries().cloned().collect()
    }

    /// Live feed of transcript lines
    pub fn subscribe_transcript(&self) -> Receiver<TranscriptEntry> {
        self.transcript.lock().subscribe()
    }

    fn record(&self, direction: Direction, text: &str, complete: bool) {
        self.transcript.lock().record(direction, text, complete);
    }
}

/// Exclusive access to the link for one request/response pair
pub struct Exchange<'a> {
    link: MutexGuard<'a, Link>,
    channel: &'a CommandChannel,
}

impl Exchange<'_> {
    /// Write raw bytes and flush them to the wire
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.link.transport.write_all(bytes)?;
        self.link.transport.flush()?;

        let text = String::from_utf8_lossy(bytes);
        self.channel
            .record(Direction::Sent, strip_terminator(&text), true);
        Ok(())
    }

    /// Write one request line, appending the terminator if missing
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        if line.as_bytes().last() == Some(&LINE_TERMINATOR) {
            self.send(line.as_bytes())
        } else {
            let mut bytes = Vec::with_capacity(line.len() + 1);
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(LINE_TERMINATOR);
            self.send(&bytes)
        }
    }

    /// Read up to and including `terminator`, or until the timeout
    pub fn read_line(&mut self, terminator: u8) -> Result<Response> {
        let deadline = Instant::now() + self.channel.settings.timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(pos) = self.link.pending.iter().position(|&b| b == terminator) {
                let line: Vec<u8> = self.link.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).into_owned();
                self.channel
                    .record(Direction::Received, strip_terminator(&line), true);
                return Ok(Response::Line(line));
            }

            if Instant::now() >= deadline {
                return Ok(Response::Partial(self.take_pending()));
            }

            let n = match self.link.transport.read(&mut chunk) {
                Ok(n) => n,
                Err(e) => {
                    if !self.link.pending.is_empty() {
                        let dropped = self.take_pending();
                        log::warn!("Read failed, dropping partial line {:?}", dropped);
                    }
                    return Err(e);
                }
            };
            if n > 0 {
                log::trace!("Read {} bytes: {:02X?}", n, &chunk[..n]);
                self.link.pending.extend_from_slice(&chunk[..n]);
            } else {
                thread::sleep(IDLE_POLL);
            }
        }
    }

    /// Empty the carry-over buffer, recording it as an incomplete line
    fn take_pending(&mut self) -> String {
        let bytes: Vec<u8> = self.link.pending.drain(..).collect();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.channel.record(Direction::Received, &text, false);
        text
    }
}
