//! PatchNode - one quadtree patch: bounds, LOD state and cached samples.
//!
//! ```text
//!            PatchNode (leaf)                   PatchNode (internal)
//!   ┌──────────────────────────┐      ┌────────────┬────────────┐
//!   │ status   (Arc, atomics)  │      │ TL (1)     │ TR (3)     │
//!   │ geometry (Mutex)         │ ───▶ │            │            │
//!   │ children None            │split ├────────────┼────────────┤
//!   │                          │ ◀─── │ BL (0)     │ BR (2)     │
//!   └──────────────────────────┘merge └────────────┴────────────┘
//! ```
//!
//! Children are owned as `Option<Box<[PatchNode; 4]>>`, so a node has
//! exactly zero or four. There is no parent pointer; upward queries go
//! through the [`PatchAddress`].
//!
//! Status flags live behind an `Arc` so render transitions can acknowledge
//! visibility without holding any tree lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::DVec3;
use parking_lot::Mutex;

use crate::address::{PatchAddress, PatchId, Quadrant};
use crate::config::PlanetConfig;
use crate::face::CubeFace;
use crate::geometry::{GeometryEmitter, PatchFrame, PatchMesh, PatchSamples};
use crate::lod::{LodMetrics, LodView};
use crate::sampler::HeightFieldSampler;
use crate::seams::{EdgeFlags, NeighborSubdivision, SeamReconciler};

/// Lock-free state shared between the tree and pending render transitions.
#[derive(Debug, Default)]
pub struct PatchStatus {
  can_merge: AtomicBool,
  last_rendered_visible: AtomicBool,
  is_restructuring: AtomicBool,
  is_initialized: AtomicBool,
  needs_refresh: AtomicBool,
  split_failed: AtomicBool,
}

macro_rules! status_flag {
  ($get:ident, $set:ident, $field:ident) => {
    #[inline]
    pub fn $get(&self) -> bool {
      self.$field.load(Ordering::Acquire)
    }

    #[inline]
    pub fn $set(&self, value: bool) {
      self.$field.store(value, Ordering::Release);
    }
  };
}

impl PatchStatus {
  status_flag!(can_merge, set_can_merge, can_merge);
  status_flag!(last_rendered_visible, set_last_rendered_visible, last_rendered_visible);
  status_flag!(is_restructuring, set_restructuring, is_restructuring);
  status_flag!(is_initialized, set_initialized, is_initialized);
  status_flag!(needs_refresh, set_needs_refresh, needs_refresh);
  status_flag!(split_failed, set_split_failed, split_failed);

  /// Claim the node for a structural operation. Returns false if another
  /// operation already holds it.
  pub fn try_begin_restructure(&self) -> bool {
    self
      .is_restructuring
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Consume a pending refresh request.
  pub fn take_refresh(&self) -> bool {
    self.needs_refresh.swap(false, Ordering::AcqRel)
  }
}

/// Samples and seam flags from a patch's most recent build.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchGeometry {
  pub samples: PatchSamples,
  pub flags: EdgeFlags,
}

/// One node of a face quadtree.
#[derive(Debug)]
pub struct PatchNode {
  address: PatchAddress,
  frame: PatchFrame,
  /// Cube-face-local centre.
  center: DVec3,
  /// Edge length in cube units.
  size: f64,
  sphere_radius: f64,
  status: Arc<PatchStatus>,
  geometry: Mutex<Option<PatchGeometry>>,
  children: Option<Box<[PatchNode; 4]>>,
}

impl PatchNode {
  /// Root patch covering a whole cube face.
  pub fn root(face: CubeFace, config: &PlanetConfig) -> Self {
    let address = PatchAddress::root(face);
    Self::with_bounds(
      address,
      config,
      face.transform().root_center(config.cube_half_size()),
      config.cube_size,
    )
  }

  fn with_bounds(address: PatchAddress, config: &PlanetConfig, center: DVec3, size: f64) -> Self {
    Self {
      frame: PatchFrame::new(&address, config),
      address,
      center,
      size,
      sphere_radius: config.sphere_radius,
      status: Arc::new(PatchStatus::default()),
      geometry: Mutex::new(None),
      children: None,
    }
  }

  /// The four (not yet built) children of this patch, in digit order.
  pub fn make_children(&self, config: &PlanetConfig) -> [PatchNode; 4] {
    let transform = self.face().transform();
    let quarter = self.quarter_size();
    Quadrant::ALL.map(|q| {
      let (su, sv) = q.offset_signs();
      let center = self.center + transform.in_face_offset(su * quarter, sv * quarter);
      Self::with_bounds(self.address.child(q), config, center, self.half_size())
    })
  }

  #[inline]
  pub fn address(&self) -> &PatchAddress {
    &self.address
  }

  #[inline]
  pub fn id(&self) -> PatchId {
    self.address.id()
  }

  #[inline]
  pub fn face(&self) -> CubeFace {
    self.address.face()
  }

  #[inline]
  pub fn depth(&self) -> u8 {
    self.address.depth()
  }

  #[inline]
  pub fn frame(&self) -> &PatchFrame {
    &self.frame
  }

  #[inline]
  pub fn center(&self) -> DVec3 {
    self.center
  }

  #[inline]
  pub fn size(&self) -> f64 {
    self.size
  }

  #[inline]
  pub fn half_size(&self) -> f64 {
    self.size * 0.5
  }

  #[inline]
  pub fn quarter_size(&self) -> f64 {
    self.size * 0.25
  }

  #[inline]
  pub fn sphere_radius(&self) -> f64 {
    self.sphere_radius
  }

  #[inline]
  pub fn status(&self) -> &Arc<PatchStatus> {
    &self.status
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.children.is_none()
  }

  pub fn children(&self) -> Option<&[PatchNode; 4]> {
    self.children.as_deref()
  }

  pub fn children_mut(&mut self) -> Option<&mut [PatchNode; 4]> {
    self.children.as_deref_mut()
  }

  /// Copy of the cached geometry state, if built.
  pub fn geometry(&self) -> Option<PatchGeometry> {
    self.geometry.lock().clone()
  }

  pub fn edge_flags(&self) -> EdgeFlags {
    self.geometry.lock().as_ref().map_or(EdgeFlags::NONE, |g| g.flags)
  }

  /// Sample the height field and emit this patch's first mesh (no seam
  /// flags).
  pub fn build(&self, emitter: &GeometryEmitter, sampler: &dyn HeightFieldSampler) -> PatchMesh {
    let (samples, mesh) = emitter.build(sampler, &self.frame, EdgeFlags::NONE);
    *self.geometry.lock() = Some(PatchGeometry {
      samples,
      flags: EdgeFlags::NONE,
    });
    self.status.set_initialized(true);
    mesh
  }

  /// Re-emit from cached samples with new seam flags.
  ///
  /// Returns `None` when the flags are unchanged (and no rebuild is forced)
  /// or the patch has never been built.
  pub fn reemit(
    &self,
    emitter: &GeometryEmitter,
    sampler: &dyn HeightFieldSampler,
    flags: EdgeFlags,
    force: bool,
  ) -> Option<PatchMesh> {
    let mut guard = self.geometry.lock();
    let geometry = guard.as_mut()?;
    if geometry.flags == flags && !force {
      return None;
    }
    geometry.flags = flags;
    Some(emitter.emit(sampler, &geometry.samples, flags))
  }

  /// LOD inputs from the cached samples.
  pub fn lod_metrics(&self, view: &LodView) -> Option<LodMetrics> {
    self.geometry.lock().as_ref().map(|g| LodMetrics {
      depth: self.depth(),
      centroid: g.samples.lod_point(view),
      max_node_radius: g.samples.max_node_radius,
    })
  }

  /// Seam flags for the current view; `None` before the first build.
  pub fn reconcile_seams(
    &self,
    seams: &SeamReconciler,
    sampler: &dyn HeightFieldSampler,
    view: &LodView,
    neighbors: &NeighborSubdivision,
  ) -> Option<EdgeFlags> {
    let guard = self.geometry.lock();
    let samples = &guard.as_ref()?.samples;
    let metrics = LodMetrics {
      depth: self.depth(),
      centroid: samples.land_centroid,
      max_node_radius: samples.max_node_radius,
    };
    Some(seams.reconcile(sampler, &metrics, &samples.corners(), view, neighbors))
  }

  /// Attach four built children.
  ///
  /// Panics unless this node is a leaf that has been claimed for
  /// restructuring.
  pub fn split(&mut self, children: Box<[PatchNode; 4]>) {
    assert!(self.is_leaf(), "split on internal patch {}", self.address);
    assert!(
      self.status.is_restructuring(),
      "split on patch {} without a restructure claim",
      self.address
    );
    for (child, q) in children.iter().zip(Quadrant::ALL) {
      debug_assert_eq!(child.address, self.address.child(q));
    }
    self.children = Some(children);
    self.status.set_can_merge(false);
  }

  /// True when all four children are visible leaves agreeing to merge.
  pub fn can_collapse(&self) -> bool {
    self.children.as_ref().is_some_and(|children| {
      children.iter().all(|c| {
        c.is_leaf()
          && c.status.can_merge()
          && c.status.last_rendered_visible()
          && !c.status.is_restructuring()
      })
    })
  }

  /// Detach the children if they all agree to merge, claiming this node for
  /// restructuring. The caller destroys the returned children.
  ///
  /// Panics on a leaf.
  pub fn try_merge(&mut self) -> Option<Box<[PatchNode; 4]>> {
    assert!(!self.is_leaf(), "merge on leaf patch {}", self.address);
    if !self.can_collapse() || !self.status.try_begin_restructure() {
      return None;
    }
    self.children.take()
  }

  /// Drop children after a failed split and release the claim.
  pub fn rollback_split(&mut self) -> Option<Box<[PatchNode; 4]>> {
    let children = self.children.take();
    self.status.set_split_failed(false);
    self.status.set_restructuring(false);
    children
  }

  /// Descendant (or self) at `address`.
  pub fn find(&self, address: &PatchAddress) -> Option<&PatchNode> {
    if address.face() != self.face() || !address.path().starts_with(self.address.path()) {
      return None;
    }
    let mut node = self;
    for q in &address.path()[self.address.path().len()..] {
      node = &node.children.as_ref()?[q.digit() as usize];
    }
    Some(node)
  }

  /// Deepest existing node on the path to `address`: the node itself when
  /// it exists, otherwise the leaf that covers it. `None` when `address` is
  /// not in this subtree.
  pub fn find_nearest(&self, address: &PatchAddress) -> Option<&PatchNode> {
    if address.face() != self.face() || !address.path().starts_with(self.address.path()) {
      return None;
    }
    let mut node = self;
    for q in &address.path()[self.address.path().len()..] {
      match &node.children {
        Some(children) => node = &children[q.digit() as usize],
        None => break,
      }
    }
    Some(node)
  }

  /// True when the node at `address` exists and has children that will
  /// stay, so every patch along its border is finer than `address`.
  pub fn is_subdivided_at(&self, address: &PatchAddress) -> bool {
    self.find_nearest(address).is_some_and(|node| {
      node.depth() == address.depth() && !node.is_leaf() && !node.status.split_failed()
    })
  }

  pub fn find_mut(&mut self, address: &PatchAddress) -> Option<&mut PatchNode> {
    if address.face() != self.face() || !address.path().starts_with(self.address.path()) {
      return None;
    }
    let skip = self.address.path().len();
    let mut node = self;
    for q in &address.path()[skip..] {
      node = &mut node.children.as_mut()?[q.digit() as usize];
    }
    Some(node)
  }

  /// Visit every leaf below (or at) this node.
  pub fn visit_leaves<'a>(&'a self, f: &mut impl FnMut(&'a PatchNode)) {
    match &self.children {
      Some(children) => {
        for child in children.iter() {
          child.visit_leaves(f);
        }
      }
      None => f(self),
    }
  }

  /// Visit every node, parents before children.
  pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a PatchNode)) {
    f(self);
    if let Some(children) = &self.children {
      for child in children.iter() {
        child.visit(f);
      }
    }
  }

  pub fn leaf_count(&self) -> usize {
    self
      .children
      .as_ref()
      .map_or(1, |c| c.iter().map(PatchNode::leaf_count).sum())
  }

  /// Depth of the deepest leaf.
  pub fn max_leaf_depth(&self) -> u8 {
    self
      .children
      .as_ref()
      .map_or(self.depth(), |c| c.iter().map(PatchNode::max_leaf_depth).max().unwrap_or(0))
  }

  /// Ids of every node in this subtree, children before parents.
  pub fn collect_ids_post_order(&self, out: &mut Vec<PatchId>) {
    if let Some(children) = &self.children {
      for child in children.iter() {
        child.collect_ids_post_order(out);
      }
    }
    out.push(self.id());
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
