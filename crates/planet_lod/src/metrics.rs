//! Engine-agnostic statistics for a planet's quadtree.
//!
//! Updated by the [`TreeScheduler`](crate::scheduler::TreeScheduler) after
//! every completed cycle and by hosts after every render-queue drain.
//!
//! # Usage
//!
//! ```ignore
//! use planet_lod::metrics::PlanetMetrics;
//!
//! let mut metrics = PlanetMetrics::new();
//! metrics.record_cycle(&report.stats, report.elapsed_us);
//! metrics.record_apply(&planet.render_queue().apply(&mut sink));
//! println!("{} leaves, {:.1} us/cycle", metrics.total_leaves(), metrics.avg_cycle_us());
//! ```

use std::collections::VecDeque;

use crate::address::MAX_PATCH_DEPTH;
use crate::render::ApplyReport;
use crate::tree::CycleStats;

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
  buffer: VecDeque<T>,
  capacity: usize,
}

impl<T> RollingWindow<T> {
  /// Create a new rolling window with the given capacity.
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Push a new value, evicting the oldest if at capacity.
  pub fn push(&mut self, value: T) {
    if self.capacity == 0 {
      return;
    }
    if self.buffer.len() >= self.capacity {
      self.buffer.pop_front();
    }
    self.buffer.push_back(value);
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  /// Iterate over values (oldest to newest).
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.buffer.iter()
  }

  /// Get the most recent value.
  pub fn last(&self) -> Option<&T> {
    self.buffer.back()
  }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
  pub fn sum(&self) -> T {
    self.buffer.iter().copied().fold(T::default(), |acc, x| acc + x)
  }
}

impl RollingWindow<u64> {
  pub fn average(&self) -> f64 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.sum() as f64 / self.buffer.len() as f64
    }
  }

  /// Smallest and largest value in the window.
  pub fn min_max(&self) -> Option<(u64, u64)> {
    let min = self.buffer.iter().min()?;
    let max = self.buffer.iter().max()?;
    Some((*min, *max))
  }
}

impl Default for RollingWindow<u64> {
  fn default() -> Self {
    Self::new(128)
  }
}

const DEPTH_SLOTS: usize = MAX_PATCH_DEPTH as usize + 1;

/// Planet-level statistics.
#[derive(Debug, Clone)]
pub struct PlanetMetrics {
  /// Leaves at each depth after the last cycle (index = depth).
  pub leaves_per_depth: [u32; DEPTH_SLOTS],
  /// Deepest leaf after the last cycle.
  pub max_depth: u8,

  /// Cycle wall time in microseconds.
  pub cycle_timings: RollingWindow<u64>,
  pub last_cycle_us: u64,
  pub cycles: u64,

  // Cumulative counters
  pub total_splits: u64,
  pub total_merges: u64,
  pub total_rollbacks: u64,
  pub total_deferred: u64,
  pub total_reemitted: u64,
  pub total_sink_failures: u64,
}

impl Default for PlanetMetrics {
  fn default() -> Self {
    Self {
      leaves_per_depth: [0; DEPTH_SLOTS],
      max_depth: 0,
      cycle_timings: RollingWindow::new(128),
      last_cycle_us: 0,
      cycles: 0,
      total_splits: 0,
      total_merges: 0,
      total_rollbacks: 0,
      total_deferred: 0,
      total_reemitted: 0,
      total_sink_failures: 0,
    }
  }
}

impl PlanetMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fold in one completed cycle.
  pub fn record_cycle(&mut self, stats: &CycleStats, elapsed_us: u64) {
    self.cycle_timings.push(elapsed_us);
    self.last_cycle_us = elapsed_us;
    self.cycles += 1;
    self.max_depth = stats.max_depth;
    self.total_splits += stats.splits as u64;
    self.total_merges += stats.merges as u64;
    self.total_rollbacks += stats.rollbacks as u64;
    self.total_deferred += stats.deferred as u64;
    self.total_reemitted += stats.reemitted as u64;
  }

  /// Replace the per-depth leaf histogram.
  pub fn record_leaves(&mut self, per_depth: &[usize]) {
    self.leaves_per_depth.fill(0);
    for (slot, count) in self.leaves_per_depth.iter_mut().zip(per_depth) {
      *slot = *count as u32;
    }
  }

  /// Count sink failures from a render-queue drain.
  pub fn record_apply(&mut self, report: &ApplyReport) {
    self.total_sink_failures += report.errors.len() as u64;
  }

  pub fn total_leaves(&self) -> u32 {
    self.leaves_per_depth.iter().sum()
  }

  pub fn avg_cycle_us(&self) -> f64 {
    self.cycle_timings.average()
  }

  /// Reset everything but the cumulative counters.
  pub fn reset(&mut self) {
    self.leaves_per_depth.fill(0);
    self.max_depth = 0;
    self.cycle_timings.clear();
    self.last_cycle_us = 0;
  }
}
