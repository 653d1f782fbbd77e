//! Test utilities: recording/failing mesh sinks and small planet fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::DVec3;

use crate::address::PatchId;
use crate::camera::CameraState;
use crate::config::PlanetConfig;
use crate::error::SinkError;
use crate::geometry::PatchMesh;
use crate::render::{ApplyReport, MeshSink};
use crate::sampler::{HeightFieldSampler, SphereSampler};
use crate::tree::{CycleStats, Planet};

// =============================================================================
// Sinks
// =============================================================================

/// One sink call, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkCall {
  Attach(PatchId),
  Show(PatchId),
  Hide(PatchId),
  Destroy(PatchId),
}

/// A patch as the sink currently holds it.
#[derive(Clone, Debug)]
pub struct SinkPatch {
  pub mesh: PatchMesh,
  pub visible: bool,
}

/// Strict in-memory sink: visibility changes and destroys of patches that
/// were never attached are errors.
#[derive(Debug, Default)]
pub struct RecordingSink {
  pub patches: HashMap<PatchId, SinkPatch>,
  pub calls: Vec<SinkCall>,
}

impl RecordingSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn visible(&self) -> impl Iterator<Item = (&PatchId, &SinkPatch)> {
    self.patches.iter().filter(|(_, p)| p.visible)
  }

  pub fn visible_count(&self) -> usize {
    self.visible().count()
  }

  pub fn is_visible(&self, patch: PatchId) -> bool {
    self.patches.get(&patch).is_some_and(|p| p.visible)
  }
}

impl MeshSink for RecordingSink {
  fn attach(&mut self, patch: PatchId, mesh: PatchMesh) -> Result<(), SinkError> {
    self.calls.push(SinkCall::Attach(patch));
    let visible = self.patches.get(&patch).is_some_and(|p| p.visible);
    self.patches.insert(patch, SinkPatch { mesh, visible });
    Ok(())
  }

  fn set_visible(&mut self, patch: PatchId, visible: bool) -> Result<(), SinkError> {
    self.calls.push(if visible {
      SinkCall::Show(patch)
    } else {
      SinkCall::Hide(patch)
    });
    let entry = self
      .patches
      .get_mut(&patch)
      .ok_or(SinkError::UnknownPatch(patch))?;
    entry.visible = visible;
    Ok(())
  }

  fn destroy(&mut self, patch: PatchId) -> Result<(), SinkError> {
    self.calls.push(SinkCall::Destroy(patch));
    self
      .patches
      .remove(&patch)
      .map(|_| ())
      .ok_or(SinkError::UnknownPatch(patch))
  }
}

/// Recording sink that rejects selected commands.
#[derive(Debug, Default)]
pub struct FailingSink {
  pub inner: RecordingSink,
  /// Reject attaches of patches at this depth or deeper.
  pub fail_attach_from_depth: Option<u8>,
  /// Reject showing these patches.
  pub fail_show: HashSet<PatchId>,
}

impl FailingSink {
  pub fn attach_from_depth(depth: u8) -> Self {
    Self {
      fail_attach_from_depth: Some(depth),
      ..Self::default()
    }
  }
}

impl MeshSink for FailingSink {
  fn attach(&mut self, patch: PatchId, mesh: PatchMesh) -> Result<(), SinkError> {
    if self.fail_attach_from_depth.is_some_and(|d| patch.lod >= d) {
      return Err(SinkError::Rejected {
        patch,
        reason: "attach disabled".into(),
      });
    }
    self.inner.attach(patch, mesh)
  }

  fn set_visible(&mut self, patch: PatchId, visible: bool) -> Result<(), SinkError> {
    if visible && self.fail_show.contains(&patch) {
      return Err(SinkError::Rejected {
        patch,
        reason: "show disabled".into(),
      });
    }
    self.inner.set_visible(patch, visible)
  }

  fn destroy(&mut self, patch: PatchId) -> Result<(), SinkError> {
    self.inner.destroy(patch)
  }
}

// =============================================================================
// Planet fixtures
// =============================================================================

pub const TEST_RADIUS: f64 = 1000.0;

/// Small unit-test planet: radius 1000, 5×5 patches.
pub fn small_config(min_depth: u8, max_depth: u8) -> PlanetConfig {
  PlanetConfig::default()
    .with_sphere_radius(TEST_RADIUS)
    .with_face_resolution(5)
    .with_depth_range(min_depth, max_depth)
}

pub fn sphere_planet(config: PlanetConfig) -> Planet {
  let sampler: Arc<dyn HeightFieldSampler> = Arc::new(SphereSampler);
  Planet::new(config, sampler).expect("valid test config")
}

pub fn camera_at(position: DVec3) -> CameraState {
  CameraState::new(position)
}

/// Run cycles and drain the queue until a cycle changes nothing.
///
/// Returns the last cycle's stats and every drain report.
pub fn settle(
  planet: &Planet,
  camera: &CameraState,
  sink: &mut dyn MeshSink,
  max_cycles: usize,
) -> (CycleStats, Vec<ApplyReport>) {
  let mut reports = Vec::new();
  let mut last = CycleStats::default();
  for _ in 0..max_cycles {
    last = planet.run_cycle(camera);
    reports.push(planet.render_queue().apply(sink));
    if last.splits == 0 && last.merges == 0 && last.rollbacks == 0 && last.deferred == 0 {
      return (last, reports);
    }
  }
  panic!("planet did not settle within {max_cycles} cycles: {last:?}");
}
