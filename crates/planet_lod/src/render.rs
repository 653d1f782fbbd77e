//! Render queue - the only path from the tree to a [`MeshSink`].
//!
//! Update cycles run on worker threads and never touch the sink. They push
//! [`Transition`]s into a channel; the host drains it on its render thread.
//! Every command of one transition is applied in the same drain.
//!
//! ```text
//! Split   attach + show 4 children ─▶ hide parent
//! Merge   show parent ─▶ destroy 4 children
//! Refresh attach (replace) mesh [─▶ show]
//! Destroy destroy patches (children before parents)
//! ```
//!
//! Sink results are the visibility acknowledgement: a successful show sets
//! `last_rendered_visible`, which merges wait on. Failures are returned per
//! patch and never stop the drain.

use std::sync::Arc;

use crossbeam_channel::{self as channel, Receiver, Sender};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::address::PatchId;
use crate::error::{PatchError, SinkError, SinkOperation};
use crate::geometry::PatchMesh;
use crate::node::PatchStatus;

/// Receives patch meshes on the render thread.
pub trait MeshSink {
  /// Attach a mesh for `patch`, replacing any mesh already attached. New
  /// patches start hidden.
  fn attach(&mut self, patch: PatchId, mesh: PatchMesh) -> Result<(), SinkError>;

  fn set_visible(&mut self, patch: PatchId, visible: bool) -> Result<(), SinkError>;

  /// Release a patch's mesh.
  fn destroy(&mut self, patch: PatchId) -> Result<(), SinkError>;
}

/// Sink that accepts and discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MeshSink for NullSink {
  fn attach(&mut self, _patch: PatchId, _mesh: PatchMesh) -> Result<(), SinkError> {
    Ok(())
  }

  fn set_visible(&mut self, _patch: PatchId, _visible: bool) -> Result<(), SinkError> {
    Ok(())
  }

  fn destroy(&mut self, _patch: PatchId) -> Result<(), SinkError> {
    Ok(())
  }
}

/// Patch id plus the status flags a transition acknowledges into.
#[derive(Clone, Debug)]
pub struct PatchHandle {
  pub id: PatchId,
  pub status: Arc<PatchStatus>,
}

/// One atomic group of sink commands.
#[derive(Debug)]
pub enum Transition {
  /// Parent → 4 children.
  Split {
    parent: PatchHandle,
    children: Box<[(PatchHandle, PatchMesh); 4]>,
  },
  /// 4 children → parent.
  Merge {
    parent: PatchHandle,
    children: SmallVec<[PatchId; 4]>,
  },
  /// Replace a patch's mesh (seam change, first build or retry).
  Refresh {
    patch: PatchHandle,
    mesh: PatchMesh,
    show: bool,
  },
  /// Release patches.
  Destroy { patches: Vec<PatchId> },
}

/// Counts from one drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
  pub splits: usize,
  pub merges: usize,
  pub refreshes: usize,
  pub destroyed: usize,
}

/// Result of a drain.
#[derive(Debug, Default)]
pub struct ApplyReport {
  pub stats: ApplyStats,
  pub errors: Vec<PatchError>,
}

impl ApplyReport {
  pub fn is_ok(&self) -> bool {
    self.errors.is_empty()
  }
}

/// Multi-producer queue of [`Transition`]s.
#[derive(Clone)]
pub struct RenderQueue {
  sender: Sender<Transition>,
  receiver: Receiver<Transition>,
}

impl RenderQueue {
  pub fn new() -> Self {
    let (sender, receiver) = channel::unbounded();
    Self { sender, receiver }
  }

  pub fn push(&self, transition: Transition) {
    // Both ends live in self, so the channel cannot be disconnected.
    let _ = self.sender.send(transition);
  }

  /// Transitions waiting to be applied.
  pub fn len(&self) -> usize {
    self.receiver.len()
  }

  pub fn is_empty(&self) -> bool {
    self.receiver.is_empty()
  }

  /// Apply every queued transition.
  pub fn apply(&self, sink: &mut dyn MeshSink) -> ApplyReport {
    self.apply_budgeted(sink, usize::MAX)
  }

  /// Apply at most `max_transitions` transitions; the rest stay queued.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "render::apply"))]
  pub fn apply_budgeted(&self, sink: &mut dyn MeshSink, max_transitions: usize) -> ApplyReport {
    let mut report = ApplyReport::default();
    for _ in 0..max_transitions {
      let Ok(transition) = self.receiver.try_recv() else {
        break;
      };
      apply_transition(sink, transition, &mut report);
    }
    if !report.errors.is_empty() {
      warn!(failures = report.errors.len(), "sink rejected patch commands");
    }
    report
  }
}

impl Default for RenderQueue {
  fn default() -> Self {
    Self::new()
  }
}

fn record(
  report: &mut ApplyReport,
  patch: PatchId,
  operation: SinkOperation,
  result: Result<(), SinkError>,
) -> bool {
  match result {
    Ok(()) => true,
    Err(source) => {
      report.errors.push(PatchError {
        patch,
        operation,
        source,
      });
      false
    }
  }
}

fn show(sink: &mut dyn MeshSink, report: &mut ApplyReport, handle: &PatchHandle, visible: bool) -> bool {
  let operation = if visible {
    SinkOperation::Show
  } else {
    SinkOperation::Hide
  };
  let ok = record(report, handle.id, operation, sink.set_visible(handle.id, visible));
  if ok {
    handle.status.set_last_rendered_visible(visible);
  }
  ok
}

fn destroy_all(sink: &mut dyn MeshSink, report: &mut ApplyReport, patches: impl IntoIterator<Item = PatchId>) {
  for id in patches {
    if record(report, id, SinkOperation::Destroy, sink.destroy(id)) {
      report.stats.destroyed += 1;
    }
  }
}

fn apply_transition(sink: &mut dyn MeshSink, transition: Transition, report: &mut ApplyReport) {
  match transition {
    Transition::Split { parent, children } => {
      let statuses: SmallVec<[Arc<PatchStatus>; 4]> =
        children.iter().map(|(h, _)| Arc::clone(&h.status)).collect();
      let mut attached: SmallVec<[PatchId; 4]> = SmallVec::new();
      let mut failed = false;
      for (handle, mesh) in *children {
        let ok = record(report, handle.id, SinkOperation::Attach, sink.attach(handle.id, mesh));
        if !ok {
          failed = true;
          break;
        }
        attached.push(handle.id);
        if !show(sink, report, &handle, true) {
          failed = true;
          break;
        }
      }

      if failed {
        // Parent stays visible; the next cycle drops the children.
        destroy_all(sink, report, attached);
        // Marks the dropped children too, so refreshes queued for them
        // behind this transition are skipped.
        for status in &statuses {
          status.set_split_failed(true);
        }
        parent.status.set_split_failed(true);
        debug!(patch = %parent.id, "split rolled back");
        return;
      }

      show(sink, report, &parent, false);
      parent.status.set_restructuring(false);
      report.stats.splits += 1;
    }
    Transition::Merge { parent, children } => {
      if !show(sink, report, &parent, true) {
        parent.status.set_needs_refresh(true);
      }
      destroy_all(sink, report, children);
      parent.status.set_restructuring(false);
      report.stats.merges += 1;
    }
    Transition::Refresh { patch, mesh, show: visible } => {
      if patch.status.split_failed() {
        return;
      }
      let ok = record(report, patch.id, SinkOperation::Attach, sink.attach(patch.id, mesh));
      if !ok || (visible && !show(sink, report, &patch, true)) {
        patch.status.set_needs_refresh(true);
        return;
      }
      report.stats.refreshes += 1;
    }
    Transition::Destroy { patches } => destroy_all(sink, report, patches),
  }
}

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;
