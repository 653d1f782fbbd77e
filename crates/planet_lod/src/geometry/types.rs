//! Mesh data handed to a [`MeshSink`](crate::render::MeshSink).

use glam::DVec3;

use crate::seams::EdgeFlags;

/// Encodes a signed land depth (land radius - sea radius) into vertex colour
/// bytes and back.
pub mod depth_color {
  /// `f32` little-endian bytes as RGBA.
  #[inline(always)]
  pub fn encode(depth: f32) -> [u8; 4] {
    depth.to_le_bytes()
  }

  #[inline(always)]
  pub fn decode(color: [u8; 4]) -> f32 {
    f32::from_le_bytes(color)
  }
}

/// Output vertex with all mesh attributes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
  /// Position relative to the owning [`PatchMesh::origin`].
  pub position: [f32; 3],
  /// Surface normal (unit vector).
  pub normal: [f32; 3],
  /// Tangent xyz + bitangent handedness in w.
  pub tangent: [f32; 4],
  /// Face-wide texture coordinates in [0, 1].
  pub uv: [f32; 2],
  /// Land depth below/above the sea surface, see [`depth_color`].
  pub color: [u8; 4],
}

impl Default for Vertex {
  fn default() -> Self {
    Self {
      position: [0.0; 3],
      normal: [0.0, 0.0, 1.0],
      tangent: [1.0, 0.0, 0.0, 1.0],
      uv: [0.0; 2],
      color: [0; 4],
    }
  }
}

/// Axis-aligned bounding box.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMaxAABB {
  pub min: [f32; 3],
  pub max: [f32; 3],
}

impl MinMaxAABB {
  /// Create AABB with inverted extents (ready for encapsulation).
  pub fn empty() -> Self {
    Self {
      min: [f32::INFINITY; 3],
      max: [f32::NEG_INFINITY; 3],
    }
  }

  /// Expand AABB to include a point.
  #[inline]
  pub fn encapsulate(&mut self, point: [f32; 3]) {
    for i in 0..3 {
      self.min[i] = self.min[i].min(point[i]);
      self.max[i] = self.max[i].max(point[i]);
    }
  }

  /// Check if AABB is valid (min <= max on all axes).
  pub fn is_valid(&self) -> bool {
    self.min[0] <= self.max[0] && self.min[1] <= self.max[1] && self.min[2] <= self.max[2]
  }

  pub fn contains(&self, point: [f32; 3]) -> bool {
    (0..3).all(|i| self.min[i] <= point[i] && point[i] <= self.max[i])
  }
}

impl Default for MinMaxAABB {
  fn default() -> Self {
    Self::empty()
  }
}

/// One renderable section (land or sea) of a patch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshSection {
  pub vertices: Vec<Vertex>,
  /// Triangle indices (3 indices per triangle).
  pub indices: Vec<u32>,
  /// Bounding box encompassing all vertices.
  pub bounds: MinMaxAABB,
}

impl MeshSection {
  /// Returns true if no geometry was generated.
  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  /// Number of triangles in the section.
  pub fn triangle_count(&self) -> usize {
    self.indices.len() / 3
  }

  /// Triangles as index triples.
  pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
    self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
  }

  /// Absolute position of a vertex given the patch origin.
  pub fn world_position(&self, origin: DVec3, index: u32) -> DVec3 {
    origin + DVec3::from_array(self.vertices[index as usize].position.map(f64::from))
  }
}

/// Generated geometry of one leaf patch.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchMesh {
  /// Depth of the patch.
  pub lod: u8,
  /// Patch origin in planet space; vertex positions are relative to it.
  pub origin: DVec3,
  pub land: MeshSection,
  /// Present only for patches dipping below the sea surface.
  pub sea: Option<MeshSection>,
  /// Edges stitched to a finer neighbour.
  pub edge_flags: EdgeFlags,
}

impl PatchMesh {
  pub fn triangle_count(&self) -> usize {
    self.land.triangle_count() + self.sea.as_ref().map_or(0, MeshSection::triangle_count)
  }

  pub fn vertex_count(&self) -> usize {
    self.land.vertices.len() + self.sea.as_ref().map_or(0, |s| s.vertices.len())
  }
}
