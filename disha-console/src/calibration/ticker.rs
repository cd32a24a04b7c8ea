//! Fixed-count interval timer driven by the caller's clock

use std::time::{Duration, Instant};

/// Repeating timer that fires `count` times, `interval` apart
///
/// The timer never fires on its own. The owner asks [`Ticker::take_due`]
/// whether a tick is due and calls [`Ticker::rearm`] once the tick's work is
/// done, so a slow tick pushes every later tick back.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    count: u32,
    fired: u32,
    next_due: Option<Instant>,
}

impl Ticker {
    pub fn new(interval: Duration, count: u32) -> Self {
        Self {
            interval,
            count,
            fired: 0,
            next_due: None,
        }
    }

    /// Arm for a fresh run; the first tick is due one interval from `now`
    pub fn start(&mut self, now: Instant) {
        self.fired = 0;
        self.next_due = (self.count > 0).then(|| now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Claim the due tick, returning its 1-based index
    pub fn take_due(&mut self, now: Instant) -> Option<u32> {
        let due = self.next_due?;
        if now < due || self.fired >= self.count {
            return None;
        }
        self.fired += 1;
        self.next_due = None;
        Some(self.fired)
    }

    /// Schedule the next tick after one completed at `now`
    ///
    /// Returns false once every tick has fired.
    pub fn rearm(&mut self, now: Instant) -> bool {
        if self.fired < self.count {
            self.next_due = Some(now + self.interval);
            true
        } else {
            self.next_due = None;
            false
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn fired(&self) -> u32 {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_exactly_count_times() {
        let interval = Duration::from_millis(200);
        let mut ticker = Ticker::new(interval, 3);
        let mut now = Instant::now();
        ticker.start(now);

        assert_eq!(ticker.take_due(now), None);

        let mut fired = Vec::new();
        for _ in 0..10 {
            now += interval;
            if let Some(tick) = ticker.take_due(now) {
                fired.push(tick);
                if !ticker.rearm(now) {
                    break;
                }
            }
        }
        assert_eq!(fired, vec![1, 2, 3]);
        assert_eq!(ticker.next_due(), None);
    }

    #[test]
    fn test_not_due_until_rearmed() {
        let mut ticker = Ticker::new(Duration::from_millis(10), 5);
        let start = Instant::now();
        ticker.start(start);

        let later = start + Duration::from_secs(1);
        assert_eq!(ticker.take_due(later), Some(1));
        assert_eq!(ticker.take_due(later), None);

        ticker.rearm(later);
        assert_eq!(ticker.next_due(), Some(later + Duration::from_millis(10)));
    }

    #[test]
    fn test_zero_count_never_fires() {
        let mut ticker = Ticker::new(Duration::ZERO, 0);
        let now = Instant::now();
        ticker.start(now);
        assert_eq!(ticker.take_due(now), None);
    }
}
