//! Seam-aware index generation for an R×R patch grid.
//!
//! Vertex layout: the `R*R` grid vertices first (`j * R + i`, `i` along u),
//! followed by the mid-edge vertices of every flagged edge in
//! [`Edge::ALL`] order, `R - 1` per edge, one per boundary segment.
//!
//! Each cell is walked counter-clockwise in (u, v) as a ring of corners plus
//! any mid-edge vertices on flagged boundary sides:
//!
//! ```text
//!  plain cell          one flagged side        corner cell
//!  d ───── c           d ───── c               d ───── c
//!  │     ╱ │           │╲     ╱│               │ ╲     │
//!  │   ╱   │           │  ╲ ╱  │              ml   ╲   │
//!  │ ╱     │           │   ╲   │               │ ╲   ╲ │
//!  a ───── b           a ── m ─ b              a ─ mb ─ b
//!  2 triangles         3-triangle fan from m   4-triangle fan from c
//! ```
//!
//! Plain cells alternate their diagonal on `(i + j) % 2`.

use smallvec::SmallVec;

use crate::seams::{Edge, EdgeFlags};

/// Maps grid and mid-edge coordinates to vertex indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionLayout {
  resolution: usize,
  flags: EdgeFlags,
  /// First vertex index of each edge's mid-edge run, if flagged.
  edge_base: [Option<u32>; 4],
}

impl TransitionLayout {
  pub fn new(resolution: usize, flags: EdgeFlags) -> Self {
    let cells = (resolution - 1) as u32;
    let mut next = (resolution * resolution) as u32;
    let mut edge_base = [None; 4];
    for edge in flags.iter() {
      edge_base[edge as usize] = Some(next);
      next += cells;
    }
    Self {
      resolution,
      flags,
      edge_base,
    }
  }

  #[inline]
  pub fn resolution(&self) -> usize {
    self.resolution
  }

  #[inline]
  pub fn flags(&self) -> EdgeFlags {
    self.flags
  }

  #[inline]
  pub fn cells(&self) -> usize {
    self.resolution - 1
  }

  /// Index of grid vertex `(i, j)`.
  #[inline]
  pub fn grid(&self, i: usize, j: usize) -> u32 {
    (j * self.resolution + i) as u32
  }

  /// Index of the mid-edge vertex on `segment` of `edge`; `None` when the
  /// edge is not flagged.
  #[inline]
  pub fn mid(&self, edge: Edge, segment: usize) -> Option<u32> {
    self.edge_base[edge as usize].map(|base| base + segment as u32)
  }

  /// Total vertex count, grid plus mid-edge vertices.
  pub fn vertex_count(&self) -> usize {
    self.resolution * self.resolution + self.flags.count() as usize * self.cells()
  }

  /// Position of every vertex in half-cell steps from the patch's lower-left
  /// corner, in vertex index order. Grid vertex `(i, j)` sits at
  /// `(2i, 2j)`; mid-edge vertices at odd offsets along their edge.
  pub fn half_steps(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
    let r = self.resolution;
    let n = self.cells();
    let grid = (0..r).flat_map(move |j| (0..r).map(move |i| (2 * i, 2 * j)));
    let mids = self.flags.iter().flat_map(move |edge| {
      (0..n).map(move |s| match edge {
        Edge::Left => (0, 2 * s + 1),
        Edge::Right => (2 * n, 2 * s + 1),
        Edge::Bottom => (2 * s + 1, 0),
        Edge::Top => (2 * s + 1, 2 * n),
      })
    });
    grid.chain(mids)
  }
}

/// Ring entry: vertex index and whether it is a mid-edge vertex.
type RingVertex = (u32, bool);

/// Triangle indices for the whole patch.
///
/// `flip` swaps the last two indices of every triangle (faces whose u × v
/// points inward).
pub fn triangulate(layout: &TransitionLayout, flip: bool) -> Vec<u32> {
  let n = layout.cells();
  let flagged_cells = layout.flags.count() as usize * n;
  let mut indices = Vec::with_capacity((n * n * 2 + flagged_cells * 2) * 3);

  let mut push = |a: u32, b: u32, c: u32| {
    if flip {
      indices.extend_from_slice(&[a, c, b]);
    } else {
      indices.extend_from_slice(&[a, b, c]);
    }
  };

  for j in 0..n {
    for i in 0..n {
      let ring = cell_ring(layout, i, j);
      let mids = ring.iter().filter(|(_, is_mid)| *is_mid).count();

      if mids == 0 {
        let (a, b, c, d) = (ring[0].0, ring[1].0, ring[2].0, ring[3].0);
        if (i + j) % 2 == 0 {
          push(a, b, c);
          push(a, c, d);
        } else {
          push(a, b, d);
          push(b, c, d);
        }
        continue;
      }

      let apex = fan_apex(&ring, mids);
      let len = ring.len();
      let at = |k: usize| ring[(apex + k) % len].0;
      for k in 1..len - 1 {
        push(at(0), at(k), at(k + 1));
      }
    }
  }

  indices
}

/// Counter-clockwise ring of cell `(i, j)`: corners a, b, c, d with the
/// flagged mid-edge vertices in between.
fn cell_ring(layout: &TransitionLayout, i: usize, j: usize) -> SmallVec<[RingVertex; 8]> {
  let last = layout.cells() - 1;
  let mut ring = SmallVec::new();

  let mut side = |ring: &mut SmallVec<[RingVertex; 8]>, on_boundary: bool, edge: Edge, segment: usize| {
    if on_boundary {
      if let Some(m) = layout.mid(edge, segment) {
        ring.push((m, true));
      }
    }
  };

  ring.push((layout.grid(i, j), false));
  side(&mut ring, j == 0, Edge::Bottom, i);
  ring.push((layout.grid(i + 1, j), false));
  side(&mut ring, i == last, Edge::Right, j);
  ring.push((layout.grid(i + 1, j + 1), false));
  side(&mut ring, j == last, Edge::Top, i);
  ring.push((layout.grid(i, j + 1), false));
  side(&mut ring, i == 0, Edge::Left, j);

  ring
}

/// Ring position the fan starts from.
///
/// One mid-edge vertex: the mid vertex itself. Two (a corner cell): the
/// corner with no mid-edge neighbour, opposite the shared corner.
fn fan_apex(ring: &[RingVertex], mids: usize) -> usize {
  let len = ring.len();
  if mids == 1 {
    return ring.iter().position(|(_, is_mid)| *is_mid).unwrap_or(0);
  }
  (0..len)
    .find(|&k| {
      let prev = ring[(k + len - 1) % len].1;
      let next = ring[(k + 1) % len].1;
      !ring[k].1 && !prev && !next
    })
    .unwrap_or(0)
}

#[cfg(test)]
#[path = "triangulation_test.rs"]
mod triangulation_test;
