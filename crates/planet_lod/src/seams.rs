//! SeamReconciler - per-edge decision whether the patch across an edge is
//! subdivided further than this one.
//!
//! Patches keep no neighbour pointers (a neighbour may hang off another
//! parent or another cube face). The planet resolves the same-depth
//! neighbour through [`PatchAddress::neighbor`] and reports whether that
//! node currently has children. A set flag then means the real neighbour is
//! finer along the shared edge; this patch inserts mid-edge vertices so its
//! boundary matches the neighbour's vertices.
//!
//! When the neighbour cannot be read (its face tree is being restructured
//! by another thread) the edge falls back to a virtual neighbour centroid:
//!
//! ```text
//!          corner a                         * virtual point
//!             o────────────┐               ╱  (sampled through the
//!             │            │  edge mid   ╱     height field)
//!             │     c ─────┼────── m ──▶ v
//!             │  centroid  │    projected onto the sphere,
//!             o────────────┘    pushed 10% of |m - c| past the edge
//!          corner b
//! ```
//!
//! The split rule is evaluated at `v` with this patch's own radius, i.e.
//! "would a patch of our size standing at `v` split".
//!
//! [`PatchAddress::neighbor`]: crate::address::PatchAddress::neighbor

use std::fmt;

use glam::DVec3;

use crate::address::Quadrant;
use crate::lod::{LodMetrics, LodRules, LodView};
use crate::sampler::HeightFieldSampler;

/// Patch edge, in face-local orientation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Edge {
  /// -u side
  Left = 0,
  /// +v side
  Top = 1,
  /// +u side
  Right = 2,
  /// -v side
  Bottom = 3,
}

impl Edge {
  pub const ALL: [Edge; 4] = [Edge::Left, Edge::Top, Edge::Right, Edge::Bottom];

  #[inline]
  pub fn bit(self) -> u8 {
    1 << self as u8
  }

  /// Lattice step from a patch to its neighbour across this edge.
  #[inline]
  pub fn step(self) -> (i64, i64) {
    match self {
      Edge::Left => (-1, 0),
      Edge::Top => (0, 1),
      Edge::Right => (1, 0),
      Edge::Bottom => (0, -1),
    }
  }

  /// The two corners bounding this edge, walking the patch outline
  /// clockwise (in corner order BL, TL, TR, BR).
  pub fn corners(self) -> (Quadrant, Quadrant) {
    match self {
      Edge::Left => (Quadrant::BottomLeft, Quadrant::TopLeft),
      Edge::Top => (Quadrant::TopLeft, Quadrant::TopRight),
      Edge::Right => (Quadrant::TopRight, Quadrant::BottomRight),
      Edge::Bottom => (Quadrant::BottomRight, Quadrant::BottomLeft),
    }
  }
}

/// Bit set of edges whose neighbour is one level finer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EdgeFlags(u8);

impl EdgeFlags {
  pub const NONE: Self = Self(0);
  pub const LEFT: Self = Self(1 << 0);
  pub const TOP: Self = Self(1 << 1);
  pub const RIGHT: Self = Self(1 << 2);
  pub const BOTTOM: Self = Self(1 << 3);
  pub const ALL: Self = Self(0b1111);

  #[inline]
  pub fn from_bits(bits: u8) -> Self {
    Self(bits & Self::ALL.0)
  }

  #[inline]
  pub fn bits(self) -> u8 {
    self.0
  }

  #[inline]
  pub fn contains(self, edge: Edge) -> bool {
    self.0 & edge.bit() != 0
  }

  #[inline]
  pub fn set(&mut self, edge: Edge, value: bool) {
    if value {
      self.0 |= edge.bit();
    } else {
      self.0 &= !edge.bit();
    }
  }

  #[inline]
  pub fn with(mut self, edge: Edge) -> Self {
    self.set(edge, true);
    self
  }

  #[inline]
  pub fn is_empty(self) -> bool {
    self.0 == 0
  }

  pub fn count(self) -> u32 {
    self.0.count_ones()
  }

  /// Flagged edges in [`Edge::ALL`] order.
  pub fn iter(self) -> impl Iterator<Item = Edge> {
    Edge::ALL.into_iter().filter(move |e| self.contains(*e))
  }
}

impl std::ops::BitOr for EdgeFlags {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}

impl fmt::Debug for EdgeFlags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.iter()).finish()
  }
}

/// Whether the real patch across each edge (indexed by [`Edge`]) is
/// subdivided; `None` where the neighbour could not be resolved.
pub type NeighborSubdivision = [Option<bool>; 4];

/// Computes [`EdgeFlags`] for leaves.
#[derive(Clone, Copy, Debug)]
pub struct SeamReconciler {
  rules: LodRules,
  sphere_radius: f64,
  /// Fraction of |edge mid - centroid| the virtual point is pushed outward.
  extrapolation: f64,
}

impl SeamReconciler {
  pub fn new(rules: LodRules, sphere_radius: f64, extrapolation: f64) -> Self {
    Self {
      rules,
      sphere_radius,
      extrapolation,
    }
  }

  /// Estimated centroid of the patch across `edge`.
  ///
  /// `corners` are the sampled land corner points indexed by quadrant digit.
  pub fn virtual_neighbor_centroid(
    &self,
    sampler: &dyn HeightFieldSampler,
    centroid: DVec3,
    corners: &[DVec3; 4],
    edge: Edge,
  ) -> DVec3 {
    let (a, b) = edge.corners();
    let mid = (corners[a.digit() as usize] + corners[b.digit() as usize]) * 0.5;
    let mid_dir = mid.normalize_or_zero();
    let on_sphere = mid_dir * self.sphere_radius;
    let pushed = on_sphere + (on_sphere - centroid) * self.extrapolation;
    let direction = pushed.try_normalize().unwrap_or(mid_dir);
    sampler.sample(direction) * self.sphere_radius
  }

  /// Flags for every edge of a leaf. Resolved neighbours decide directly;
  /// the rest are estimated from the sampled corners.
  pub fn reconcile(
    &self,
    sampler: &dyn HeightFieldSampler,
    node: &LodMetrics,
    corners: &[DVec3; 4],
    view: &LodView,
    neighbors: &NeighborSubdivision,
  ) -> EdgeFlags {
    let mut flags = EdgeFlags::NONE;
    for edge in Edge::ALL {
      let finer = match neighbors[edge as usize] {
        Some(subdivided) => subdivided,
        None => self.estimate(sampler, node, corners, view, edge),
      };
      flags.set(edge, finer);
    }
    flags
  }

  /// Virtual-centroid estimate for one edge.
  pub fn estimate(
    &self,
    sampler: &dyn HeightFieldSampler,
    node: &LodMetrics,
    corners: &[DVec3; 4],
    view: &LodView,
    edge: Edge,
  ) -> bool {
    let neighbor = self.virtual_neighbor_centroid(sampler, node.centroid, corners, edge);
    self
      .rules
      .should_split_at(node.depth, node.max_node_radius, neighbor, view)
  }
}

#[cfg(test)]
#[path = "seams_test.rs"]
mod seams_test;
