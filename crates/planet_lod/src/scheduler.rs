//! TreeScheduler - throttled, non-blocking driver for [`Planet::run_cycle`].
//!
//! ```text
//! Host thread                          rayon
//! ┌─────────────────┐
//! │ tick(now, cam)  │── interval elapsed since last completion? ──┐
//! └─────────────────┘                                             ▼
//!                                                    ┌──────────────────┐
//!                                                    │ planet.run_cycle │
//!                                                    └────────┬─────────┘
//! ┌─────────────────┐                                         │
//! │ poll(now)       │◀───────── bounded(1) channel ───────────┘
//! │ - re-arm timer  │
//! │ - update metrics│
//! └─────────────────┘
//! ```
//!
//! At most one cycle is in flight. The timer re-arms only when a cycle's
//! result has been polled, so a slow cycle delays the next one instead of
//! queueing behind it. Neither call blocks.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, TryRecvError};
use tracing::warn;
use web_time::Instant;

use crate::camera::CameraState;
use crate::metrics::PlanetMetrics;
use crate::tree::{CycleStats, Planet};

/// Result of one completed cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleReport {
  pub stats: CycleStats,
  /// Wall time of the cycle in microseconds.
  pub elapsed_us: u64,
}

/// Runs update cycles on rayon's thread pool.
pub struct TreeScheduler {
  planet: Arc<Planet>,
  interval: Duration,
  receiver: Option<Receiver<CycleReport>>,
  last_completed: Option<Instant>,
  metrics: PlanetMetrics,
}

impl TreeScheduler {
  /// Scheduler ticking at the planet's configured interval.
  pub fn new(planet: Arc<Planet>) -> Self {
    let interval = planet.config().tick_interval;
    Self {
      planet,
      interval,
      receiver: None,
      last_completed: None,
      metrics: PlanetMetrics::new(),
    }
  }

  #[inline]
  pub fn planet(&self) -> &Arc<Planet> {
    &self.planet
  }

  #[inline]
  pub fn metrics(&self) -> &PlanetMetrics {
    &self.metrics
  }

  #[inline]
  pub fn metrics_mut(&mut self) -> &mut PlanetMetrics {
    &mut self.metrics
  }

  /// Check if a cycle is running.
  pub fn is_busy(&self) -> bool {
    self.receiver.is_some()
  }

  /// True when no cycle is running and the interval since the last
  /// completion has elapsed.
  pub fn is_due(&self, now: Instant) -> bool {
    !self.is_busy()
      && self
        .last_completed
        .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
  }

  /// Start a cycle for this camera snapshot if one is due.
  ///
  /// Returns `true` if started.
  pub fn tick(&mut self, now: Instant, camera: &CameraState) -> bool {
    if !self.is_due(now) {
      return false;
    }

    let (sender, receiver) = channel::bounded(1);
    self.receiver = Some(receiver);

    let planet = Arc::clone(&self.planet);
    let camera = *camera;
    rayon::spawn(move || {
      let started = Instant::now();
      let stats = planet.run_cycle(&camera);
      let report = CycleReport {
        stats,
        elapsed_us: started.elapsed().as_micros() as u64,
      };
      // Receiver dropped = scheduler gone.
      let _ = sender.send(report);
    });

    true
  }

  /// Poll for a finished cycle (non-blocking).
  ///
  /// Returns `Some(report)` once, when the running cycle completes.
  pub fn poll(&mut self, now: Instant) -> Option<CycleReport> {
    let receiver = self.receiver.as_ref()?;

    match receiver.try_recv() {
      Ok(report) => {
        self.receiver = None;
        self.last_completed = Some(now);
        self.metrics.record_cycle(&report.stats, report.elapsed_us);
        self.metrics.record_leaves(&self.planet.leaves_per_depth());
        Some(report)
      }
      Err(TryRecvError::Empty) => None,
      Err(TryRecvError::Disconnected) => {
        // The cycle panicked; allow the next tick.
        warn!("update cycle ended without a result");
        self.receiver = None;
        self.last_completed = Some(now);
        None
      }
    }
  }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;
