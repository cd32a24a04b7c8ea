//! Magnetometer calibration
//!
//! A timed run takes `repeat_count` samples, `interval` apart. Each sample is
//! the per-axis median of three raw reads, which discards single-read spikes.
//! Samples widen running per-axis bounds whose midpoints are the hard-iron
//! offsets, and are kept in an append-only point cloud for display.
//!
//! ```text
//!          start()                      last tick
//!   Idle ───────────▶ Running ──tick──▶ ... ──────▶ Idle (Finished)
//!     ▲                  │
//!     └──── reset() ─────┘
//! ```
//!
//! The engine owns no thread. A single-threaded event loop calls
//! [`CalibrationEngine::poll`]; [`CalibrationEngine::run_blocking`] drives the
//! same timer to completion on the calling thread.

mod autocal;
mod bounds;
mod ticker;

pub use autocal::{AutoCalSettings, AutoCalibration};
pub use bounds::{median3, median_of_three, AxisBounds, CalibrationBounds, Precision};
pub use ticker::Ticker;

use crate::error::{Error, Result};
use crate::events::Observers;
use crate::types::Vector3;
use crossbeam_channel::Receiver;
use std::thread;
use std::time::{Duration, Instant};

/// Anything that can produce one raw magnetometer reading
pub trait MagnetometerSource {
    fn read_mag(&mut self) -> Result<Vector3>;
}

/// Engine run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Running,
}

/// Notifications for calibration observers
#[derive(Debug, Clone)]
pub enum CalibrationEvent {
    Started {
        total: u32,
    },
    /// One filtered sample was folded in
    Sample {
        /// 1-based index within the run
        tick: u32,
        total: u32,
        sample: Vector3,
        bounds: CalibrationBounds,
    },
    Finished {
        bounds: CalibrationBounds,
        samples: usize,
    },
    /// A run stopped on an error
    Aborted {
        tick: u32,
        reason: String,
    },
    Reset,
}

/// Calibration run parameters
#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    pub interval: Duration,
    pub repeat_count: u32,
    pub precision: Precision,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            repeat_count: 50,
            precision: Precision::Integer,
        }
    }
}

/// Timed magnetometer sampling with running bounds
pub struct CalibrationEngine {
    settings: CalibrationSettings,
    state: CalibrationState,
    ticker: Ticker,
    bounds: CalibrationBounds,
    cloud: Vec<Vector3>,
    observers: Observers<CalibrationEvent>,
}

impl CalibrationEngine {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            ticker: Ticker::new(settings.interval, settings.repeat_count),
            bounds: CalibrationBounds::new(settings.precision),
            state: CalibrationState::Idle,
            cloud: Vec::new(),
            observers: Observers::new(),
            settings,
        }
    }

    /// Begin a timed run; the first tick is due one interval after `now`
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.is_running() {
            return Err(Error::Busy("calibration already running"));
        }
        self.ticker.start(now);
        self.state = CalibrationState::Running;
        log::info!(
            "Calibration started: {} samples every {:?}",
            self.settings.repeat_count,
            self.settings.interval
        );
        self.observers.publish(CalibrationEvent::Started {
            total: self.settings.repeat_count,
        });
        if self.ticker.next_due().is_none() {
            self.finish();
        }
        Ok(())
    }

    /// Run the due tick, if any
    ///
    /// Returns the index of the tick performed. A failed tick is reported
    /// and the run carries on with the next one.
    pub fn poll(&mut self, now: Instant, source: &mut dyn MagnetometerSource) -> Result<Option<u32>> {
        if !self.is_running() {
            return Ok(None);
        }
        let Some(tick) = self.ticker.take_due(now) else {
            return Ok(None);
        };

        let began = Instant::now();
        let result = self.measure(source, tick, self.settings.repeat_count);
        let completed = now + began.elapsed();
        if !self.ticker.rearm(completed) {
            self.finish();
        }
        result.map(|_| Some(tick))
    }

    /// Run the next tick of the active run now, ahead of its schedule
    ///
    /// For front ends whose own timer fires the ticks. Returns `None` when
    /// no run is active.
    pub fn tick(&mut self, source: &mut dyn MagnetometerSource) -> Result<Option<u32>> {
        match self.ticker.next_due() {
            Some(due) if self.is_running() => self.poll(Instant::now().max(due), source),
            _ => Ok(None),
        }
    }

    /// Take one filtered sample and fold it into the bounds
    ///
    /// `tick` and `total` only label the published progress.
    pub fn measure(
        &mut self,
        source: &mut dyn MagnetometerSource,
        tick: u32,
        total: u32,
    ) -> Result<Vector3> {
        let reads = [source.read_mag()?, source.read_mag()?, source.read_mag()?];
        let precision = self.settings.precision;
        let sample = median_of_three(reads).map(|v| precision.apply(v));

        self.bounds.update(sample);
        self.cloud.push(sample);
        log::debug!(
            "Calibration tick {}/{}: raw {} {} {} -> {}",
            tick,
            total,
            reads[0],
            reads[1],
            reads[2],
            sample
        );
        self.observers.publish(CalibrationEvent::Sample {
            tick,
            total,
            sample,
            bounds: self.bounds,
        });
        Ok(sample)
    }

    /// Start a run and drive it to completion on this thread
    ///
    /// The first failing tick aborts the run.
    pub fn run_blocking(&mut self, source: &mut dyn MagnetometerSource) -> Result<CalibrationBounds> {
        self.start(Instant::now())?;
        while let Some(due) = self.ticker.next_due() {
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
            if let Err(e) = self.poll(Instant::now(), source) {
                self.abort(&e);
                return Err(e);
            }
        }
        Ok(self.bounds)
    }

    /// Cancel any run, zero the bounds and drop the point cloud
    pub fn reset(&mut self) {
        self.ticker.stop();
        self.state = CalibrationState::Idle;
        self.bounds.reset();
        self.cloud.clear();
        log::info!("Calibration reset");
        self.observers.publish(CalibrationEvent::Reset);
    }

    fn finish(&mut self) {
        self.ticker.stop();
        self.state = CalibrationState::Idle;
        log::info!(
            "Calibration finished: offsets {} from {} samples",
            self.bounds.offset(),
            self.cloud.len()
        );
        self.observers.publish(CalibrationEvent::Finished {
            bounds: self.bounds,
            samples: self.cloud.len(),
        });
    }

    fn abort(&mut self, error: &Error) {
        self.ticker.stop();
        self.state = CalibrationState::Idle;
        log::warn!("Calibration aborted at tick {}: {}", self.ticker.fired(), error);
        self.observers.publish(CalibrationEvent::Aborted {
            tick: self.ticker.fired(),
            reason: error.to_string(),
        });
    }

    /// Publish `Finished` for samples taken outside a timed run
    pub(crate) fn announce_finished(&mut self) {
        self.finish();
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == CalibrationState::Running
    }

    pub fn bounds(&self) -> &CalibrationBounds {
        &self.bounds
    }

    /// Every sample since the last reset, oldest first
    pub fn point_cloud(&self) -> &[Vector3] {
        &self.cloud
    }

    /// Ticks performed in the current or last run
    pub fn ticks_done(&self) -> u32 {
        self.ticker.fired()
    }

    /// When the next tick is due, if running
    pub fn next_due(&self) -> Option<Instant> {
        self.ticker.next_due()
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    pub fn subscribe(&mut self) -> Receiver<CalibrationEvent> {
        self.observers.subscribe()
    }
}
