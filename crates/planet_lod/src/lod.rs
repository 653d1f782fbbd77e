//! LodDecisionEngine - screen-size split/merge rules.
//!
//! ```text
//! s(d, fov) = 2 · d · tan(fov / 2)
//!
//! split(N)  = depth < min
//!           ∨ (depth < max ∧ k · r(N) > s(|cam - c(N)|))
//!
//! merge(P)  = depth(P) ≥ min ∧ k · h · r(P) < s(|cam - c(P)|)
//! ```
//!
//! `r` is the node's `max_node_radius`, `c` its point of interest, `k` the
//! quality constant and `h` the merge hysteresis factor. Merges are judged
//! on the parent with the parent's own (roughly doubled) radius, so the two
//! rules never fire for the same camera distance.

use glam::DVec3;

use crate::camera::CameraState;
use crate::config::PlanetConfig;

/// Projected size of an object at distance `d` for a field of view in degrees.
#[inline]
pub fn projected_size(distance: f64, fov_degrees: f64) -> f64 {
  2.0 * distance * (fov_degrees.to_radians() * 0.5).tan()
}

/// Geometric inputs of one LOD decision, taken from a patch's last build.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodMetrics {
  pub depth: u8,
  /// Point the camera distance is measured to.
  pub centroid: DVec3,
  pub max_node_radius: f64,
}

/// Camera data captured once per cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodView {
  pub position: DVec3,
  pub fov_degrees: f64,
}

impl LodView {
  pub fn from_camera(camera: &CameraState) -> Self {
    Self {
      position: camera.lod_position(),
      fov_degrees: camera.effective_fov(),
    }
  }

  /// `s(d, fov)` for a point.
  #[inline]
  pub fn screen_size_at(&self, point: DVec3) -> f64 {
    projected_size(self.position.distance(point), self.fov_degrees)
  }
}

/// Split/merge rules with the planet's depth bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodRules {
  pub min_depth: u8,
  pub max_depth: u8,
  /// Quality constant `k`.
  pub quality: f64,
  /// Hysteresis factor applied to `k` on merges.
  pub merge_hysteresis: f64,
}

impl LodRules {
  pub fn from_config(config: &PlanetConfig) -> Self {
    Self {
      min_depth: config.min_depth,
      max_depth: config.max_depth,
      quality: config.lod_quality,
      merge_hysteresis: config.merge_hysteresis,
    }
  }

  /// Split rule evaluated at an arbitrary point of interest.
  #[inline]
  pub fn should_split_at(&self, depth: u8, max_node_radius: f64, point: DVec3, view: &LodView) -> bool {
    if depth >= self.max_depth {
      return false;
    }
    depth < self.min_depth || self.quality * max_node_radius > view.screen_size_at(point)
  }

  /// Should this leaf split?
  #[inline]
  pub fn should_split(&self, node: &LodMetrics, view: &LodView) -> bool {
    self.should_split_at(node.depth, node.max_node_radius, node.centroid, view)
  }

  /// May the children of `parent` collapse back into it?
  #[inline]
  pub fn should_merge(&self, parent: &LodMetrics, view: &LodView) -> bool {
    parent.depth >= self.min_depth
      && self.quality * self.merge_hysteresis * parent.max_node_radius
        < view.screen_size_at(parent.centroid)
  }

  /// Camera distance at which a node of this radius stops splitting.
  pub fn split_distance(&self, max_node_radius: f64, fov_degrees: f64) -> f64 {
    self.quality * max_node_radius / projected_size(1.0, fov_degrees)
  }

  /// Camera distance beyond which children collapse into a parent of this
  /// radius.
  pub fn merge_distance(&self, parent_radius: f64, fov_degrees: f64) -> f64 {
    self.split_distance(parent_radius, fov_degrees) * self.merge_hysteresis
  }
}

impl Default for LodRules {
  fn default() -> Self {
    Self::from_config(&PlanetConfig::default())
  }
}

#[cfg(test)]
#[path = "lod_test.rs"]
mod lod_test;
