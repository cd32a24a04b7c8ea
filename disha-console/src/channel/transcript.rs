//! Operator transcript of every line crossing the channel

use crate::events::Observers;
use chrono::{DateTime, Local};
use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use std::fmt;

/// Which way a transcript line travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// One timestamped transcript line
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub time: DateTime<Local>,
    pub direction: Direction,
    /// Line text without its terminator
    pub text: String,
    /// False when the line was cut short by a timeout or read failure
    pub complete: bool,
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.direction {
            Direction::Sent => "SENT",
            Direction::Received => "RECEIVED",
        };
        write!(f, "[{}] {}> {}", self.time.format("%H:%M:%S"), label, self.text)?;
        if !self.complete {
            write!(f, " (timeout)")?;
        }
        Ok(())
    }
}

/// Bounded transcript with live subscribers
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    capacity: usize,
    observers: Observers<TranscriptEntry>,
}

impl Transcript {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            observers: Observers::new(),
        }
    }

    /// Append a line, log it, and fan it out
    pub fn record(&mut self, direction: Direction, text: &str, complete: bool) {
        let entry = TranscriptEntry {
            time: Local::now(),
            direction,
            text: text.to_string(),
            complete,
        };
        if complete {
            log::info!("{}", entry);
        } else {
            log::warn!("{}", entry);
        }

        if self.capacity > 0 {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(entry.clone());
        }
        self.observers.publish(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn subscribe(&mut self) -> Receiver<TranscriptEntry> {
        self.observers.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_format() {
        let mut transcript = Transcript::new(4);
        transcript.record(Direction::Sent, "G", true);
        transcript.record(Direction::Received, "4", false);

        let lines: Vec<String> = transcript.entries().map(|e| e.to_string()).collect();
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] SENT> G"));
        assert!(lines[1].ends_with("] RECEIVED> 4 (timeout)"));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut transcript = Transcript::new(2);
        for text in ["a", "b", "c"] {
            transcript.record(Direction::Sent, text, true);
        }
        let texts: Vec<&str> = transcript.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn test_subscriber_sees_cleared_lines() {
        let mut transcript = Transcript::new(8);
        let rx = transcript.subscribe();
        transcript.record(Direction::Sent, "X", true);
        transcript.clear();
        assert!(transcript.is_empty());
        assert_eq!(rx.try_recv().unwrap().text, "X");
    }
}
