//! Error types for configuration, mesh sinks and per-patch failures.

use thiserror::Error;

use crate::address::PatchId;

/// Rejected [`PlanetConfig`](crate::config::PlanetConfig) values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
  #[error("min_depth {min} exceeds max_depth {max}")]
  DepthRange { min: u8, max: u8 },

  #[error("max_depth {0} exceeds the addressable depth {1}")]
  DepthTooLarge(u8, u8),

  #[error("face_resolution must be at least 3, got {0}")]
  ResolutionTooSmall(usize),

  #[error("{name} must be finite and positive, got {value}")]
  NotPositive { name: &'static str, value: f64 },

  #[error("merge_hysteresis must be at least 1.0, got {0}")]
  HysteresisBelowOne(f64),
}

/// Failure reported by a [`MeshSink`](crate::render::MeshSink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
  #[error("patch {0} is not attached")]
  UnknownPatch(PatchId),

  #[error("sink rejected patch {patch}: {reason}")]
  Rejected { patch: PatchId, reason: String },
}

/// Sink failure for one patch, surfaced from a render-queue drain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed for patch {patch}")]
pub struct PatchError {
  pub patch: PatchId,
  pub operation: SinkOperation,
  #[source]
  pub source: SinkError,
}

/// Which sink call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOperation {
  Attach,
  Show,
  Hide,
  Destroy,
}

impl std::fmt::Display for SinkOperation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      SinkOperation::Attach => "attach",
      SinkOperation::Show => "show",
      SinkOperation::Hide => "hide",
      SinkOperation::Destroy => "destroy",
    };
    f.write_str(name)
  }
}
