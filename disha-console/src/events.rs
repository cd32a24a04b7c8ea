//! Observer fan-out over crossbeam channels

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Set of subscribers receiving cloned events
///
/// Disconnected receivers are pruned on the next publish.
#[derive(Debug)]
pub struct Observers<E> {
    senders: Vec<Sender<E>>,
}

impl<E: Clone> Observers<E> {
    /// Create an empty observer set
    pub fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&mut self, event: E) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers (as of the last publish)
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl<E: Clone> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}
