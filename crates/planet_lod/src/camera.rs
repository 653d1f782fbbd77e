//! CameraState - the polled viewer pose, expressed in planet-local space
//! (planet centre at the origin).

use glam::{DQuat, DVec3};

/// Field of view used when a camera reports none.
pub const DEFAULT_FOV_DEGREES: f64 = 90.0;

/// Viewer pose snapshot taken once per update cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
  pub position: DVec3,
  pub rotation: DQuat,
  /// Horizontal field of view in degrees.
  pub fov_degrees: f64,
  /// When set, LOD is driven from this point instead of `position`
  /// (pre-loading geometry ahead of a viewpoint jump).
  pub override_position: Option<DVec3>,
}

impl CameraState {
  pub fn new(position: DVec3) -> Self {
    Self {
      position,
      rotation: DQuat::IDENTITY,
      fov_degrees: DEFAULT_FOV_DEGREES,
      override_position: None,
    }
  }

  pub fn with_fov(mut self, fov_degrees: f64) -> Self {
    self.fov_degrees = fov_degrees;
    self
  }

  pub fn with_rotation(mut self, rotation: DQuat) -> Self {
    self.rotation = rotation;
    self
  }

  /// Substitute a fixed viewpoint for LOD decisions.
  pub fn with_override(mut self, position: DVec3) -> Self {
    self.override_position = Some(position);
    self
  }

  pub fn clear_override(&mut self) {
    self.override_position = None;
  }

  /// Point LOD distances are measured from.
  #[inline]
  pub fn lod_position(&self) -> DVec3 {
    self.override_position.unwrap_or(self.position)
  }

  /// View direction (-Z forward).
  pub fn forward(&self) -> DVec3 {
    self.rotation * DVec3::NEG_Z
  }

  /// Field of view, falling back to the default for unusable values.
  pub fn effective_fov(&self) -> f64 {
    if self.fov_degrees.is_finite() && self.fov_degrees > 0.0 && self.fov_degrees < 180.0 {
      self.fov_degrees
    } else {
      DEFAULT_FOV_DEGREES
    }
  }
}

impl Default for CameraState {
  fn default() -> Self {
    Self::new(DVec3::ZERO)
  }
}
