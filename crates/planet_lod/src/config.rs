//! PlanetConfig - tree bounds, mesh resolution, terrain and scheduling
//! settings shared by the whole planet.

use std::time::Duration;

use crate::address::MAX_PATCH_DEPTH;
use crate::error::ConfigError;
use crate::sampler::TerrainKind;

/// Quality constant `k` of the screen-size split rule.
pub const DEFAULT_LOD_QUALITY: f64 = 8.0;

/// Factor applied to `k` on the merge side of the rule.
pub const DEFAULT_MERGE_HYSTERESIS: f64 = 1.05;

/// Fraction of the centroid-to-edge distance the virtual neighbour is pushed
/// past an edge.
pub const DEFAULT_SEAM_EXTRAPOLATION: f64 = 0.1;

/// Sea geometry is emitted when the lowest land point is this far below the
/// sea surface.
pub const DEFAULT_SEA_TOLERANCE: f64 = 10.0;

/// Configuration for a planet's quadtree.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanetConfig {
  /// Radius of the undisplaced sphere (sea surface) in world units.
  pub sphere_radius: f64,

  /// Edge length of the cube the faces are laid out on (face-local units).
  pub cube_size: f64,

  /// Depth every branch is forced down to.
  pub min_depth: u8,

  /// Depth no branch may exceed.
  pub max_depth: u8,

  /// Vertices per patch edge (R in an R×R grid).
  pub face_resolution: usize,

  /// Terrain elevation (`[-1, 1]`) that sits exactly on the sea surface.
  /// The terrain sampler shifts every flavour by it; raising it floods more
  /// of the planet.
  pub sea_level: f64,

  /// Terrain flavour built at construction.
  pub terrain: TerrainKind,

  /// Sampler seed.
  pub seed: u32,

  /// Relative displacement amplitude of the terrain.
  pub noise_amplitude: f64,

  /// Frequency multiplier of the terrain.
  pub noise_frequency: f64,

  /// `k` in `k * max_node_radius > s(d, fov)`. Larger = finer subdivision.
  pub lod_quality: f64,

  /// Extra factor on `k` for merges; `> 1` widens the split/merge band.
  pub merge_hysteresis: f64,

  /// Virtual neighbour extrapolation past an edge.
  pub seam_extrapolation: f64,

  /// Land radius margin below the sea surface that triggers sea geometry.
  pub sea_tolerance: f64,

  /// Minimum time between the end of one update cycle and the next start.
  pub tick_interval: Duration,
}

impl PlanetConfig {
  /// Half edge of the cube.
  #[inline]
  pub fn cube_half_size(&self) -> f64 {
    self.cube_size * 0.5
  }

  /// Grid cells per patch edge.
  #[inline]
  pub fn cells_per_edge(&self) -> usize {
    self.face_resolution - 1
  }

  pub fn with_sphere_radius(mut self, radius: f64) -> Self {
    self.sphere_radius = radius;
    self
  }

  pub fn with_depth_range(mut self, min_depth: u8, max_depth: u8) -> Self {
    self.min_depth = min_depth;
    self.max_depth = max_depth;
    self
  }

  pub fn with_face_resolution(mut self, resolution: usize) -> Self {
    self.face_resolution = resolution;
    self
  }

  pub fn with_terrain(mut self, terrain: TerrainKind, seed: u32) -> Self {
    self.terrain = terrain;
    self.seed = seed;
    self
  }

  pub fn with_noise(mut self, amplitude: f64, frequency: f64) -> Self {
    self.noise_amplitude = amplitude;
    self.noise_frequency = frequency;
    self
  }

  pub fn with_sea_level(mut self, sea_level: f64) -> Self {
    self.sea_level = sea_level;
    self
  }

  pub fn with_merge_hysteresis(mut self, factor: f64) -> Self {
    self.merge_hysteresis = factor;
    self
  }

  pub fn with_tick_interval(mut self, interval: Duration) -> Self {
    self.tick_interval = interval;
    self
  }

  /// Check ranges the tree relies on.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_depth > MAX_PATCH_DEPTH {
      return Err(ConfigError::DepthTooLarge(self.max_depth, MAX_PATCH_DEPTH));
    }
    if self.min_depth > self.max_depth {
      return Err(ConfigError::DepthRange {
        min: self.min_depth,
        max: self.max_depth,
      });
    }
    // Corner cells must never have two opposite flagged edges.
    if self.face_resolution < 3 {
      return Err(ConfigError::ResolutionTooSmall(self.face_resolution));
    }
    for (name, value) in [
      ("sphere_radius", self.sphere_radius),
      ("cube_size", self.cube_size),
      ("lod_quality", self.lod_quality),
      ("merge_hysteresis", self.merge_hysteresis),
      ("seam_extrapolation", self.seam_extrapolation),
    ] {
      if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::NotPositive { name, value });
      }
    }
    // Below 1 the merge threshold moves inside the split threshold.
    if self.merge_hysteresis < 1.0 {
      return Err(ConfigError::HysteresisBelowOne(self.merge_hysteresis));
    }
    Ok(())
  }
}

impl Default for PlanetConfig {
  fn default() -> Self {
    Self {
      sphere_radius: 20_000_000.0,
      cube_size: 1000.0,
      min_depth: 4,
      max_depth: 12,
      face_resolution: 17,
      sea_level: -0.1,
      terrain: TerrainKind::Terrestrial,
      seed: 666,
      noise_amplitude: 0.1,
      noise_frequency: 1.0,
      lod_quality: DEFAULT_LOD_QUALITY,
      merge_hysteresis: DEFAULT_MERGE_HYSTERESIS,
      seam_extrapolation: DEFAULT_SEAM_EXTRAPOLATION,
      sea_tolerance: DEFAULT_SEA_TOLERANCE,
      tick_interval: Duration::from_millis(100),
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
