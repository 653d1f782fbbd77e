//! GeometryEmitter - samples a patch and builds its land/sea mesh sections.
//!
//! Vertices sit on an integer lattice shared by every depth of a face:
//!
//! ```text
//! face fraction = (origin · 2n + half_steps) / (2^depth · 2n)
//! cube point    = face table (fraction · cube_size - half, ..., ±half)
//! direction     = normalize(cube point)
//! ```
//!
//! Both integers are exact in `f64`, so a coarse patch's mid-edge vertex and
//! the finer neighbour's grid vertex at the same spot produce the identical
//! direction, and points on a cube edge agree across the two faces.
//!
//! Sampling ([`PatchSamples`]) and emission are separate so a seam-flag
//! change only samples the new mid-edge vertices.

use glam::DVec3;

use super::triangulation::{triangulate, TransitionLayout};
use super::types::{depth_color, MeshSection, MinMaxAABB, PatchMesh, Vertex};
use crate::address::PatchAddress;
use crate::config::PlanetConfig;
use crate::face::CubeFace;
use crate::lod::LodView;
use crate::sampler::HeightFieldSampler;
use crate::seams::EdgeFlags;

/// Placement of one patch on its face lattice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchFrame {
  pub face: CubeFace,
  pub depth: u8,
  /// Patch position among the `2^depth × 2^depth` patches of its depth.
  pub lattice_origin: (u64, u64),
  pub resolution: usize,
  pub cube_size: f64,
  pub sphere_radius: f64,
}

impl PatchFrame {
  pub fn new(address: &PatchAddress, config: &PlanetConfig) -> Self {
    Self {
      face: address.face(),
      depth: address.depth(),
      lattice_origin: address.lattice_origin(),
      resolution: config.face_resolution,
      cube_size: config.cube_size,
      sphere_radius: config.sphere_radius,
    }
  }

  #[inline]
  fn cells(&self) -> u64 {
    (self.resolution - 1) as u64
  }

  /// Face-wide fraction in `[0, 1]` of a point `half_steps` half cells from
  /// the patch's lower-left corner.
  pub fn face_fraction(&self, half_steps: (usize, usize)) -> (f64, f64) {
    let steps = 2 * self.cells();
    let denom = ((1u64 << self.depth) * steps) as f64;
    let (x, y) = self.lattice_origin;
    (
      (x * steps + half_steps.0 as u64) as f64 / denom,
      (y * steps + half_steps.1 as u64) as f64 / denom,
    )
  }

  /// Unit direction of a lattice point.
  pub fn direction(&self, half_steps: (usize, usize)) -> DVec3 {
    let (fu, fv) = self.face_fraction(half_steps);
    let half = self.cube_size * 0.5;
    self
      .face
      .transform()
      .cube_point(fu * self.cube_size - half, fv * self.cube_size - half, half)
      .normalize()
  }

  /// Patch centre projected onto the sea surface; vertex positions are
  /// stored relative to it.
  pub fn origin(&self) -> DVec3 {
    let n = self.cells() as usize;
    self.direction((n, n)) * self.sphere_radius
  }
}

/// One sampled lattice point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfacePoint {
  pub direction: DVec3,
  /// Displaced land point in world units.
  pub land: DVec3,
}

impl SurfacePoint {
  pub fn sample(sampler: &dyn HeightFieldSampler, direction: DVec3, sphere_radius: f64) -> Self {
    Self {
      direction,
      land: sampler.sample(direction) * sphere_radius,
    }
  }

  #[inline]
  pub fn sea(&self, sphere_radius: f64) -> DVec3 {
    self.direction * sphere_radius
  }
}

/// Sampled grid of a patch plus the summary values LOD decisions use.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchSamples {
  pub frame: PatchFrame,
  /// `R*R` grid points, `j * R + i`.
  pub grid: Vec<SurfacePoint>,
  pub land_centroid: DVec3,
  pub sea_centroid: DVec3,
  /// Patch centre on the sea surface.
  pub sphere_centroid: DVec3,
  pub min_land_radius: f64,
  pub max_land_radius: f64,
  /// Largest distance from the land centroid to a grid land point.
  pub max_node_radius: f64,
  /// Sea geometry is emitted for this patch.
  pub render_sea: bool,
}

impl PatchSamples {
  /// Land corner points indexed by quadrant digit (BL, TL, BR, TR).
  pub fn corners(&self) -> [DVec3; 4] {
    let r = self.frame.resolution;
    let n = r - 1;
    [
      self.grid[0].land,
      self.grid[n * r].land,
      self.grid[n].land,
      self.grid[n * r + n].land,
    ]
  }

  /// Point the camera distance is measured to: the land centroid, or the
  /// sea centroid when sea is rendered and it is nearer.
  pub fn lod_point(&self, view: &LodView) -> DVec3 {
    if self.render_sea
      && view.position.distance_squared(self.sea_centroid)
        < view.position.distance_squared(self.land_centroid)
    {
      self.sea_centroid
    } else {
      self.land_centroid
    }
  }
}

/// Builds patch samples and meshes for one planet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryEmitter {
  sphere_radius: f64,
  sea_tolerance: f64,
}

impl GeometryEmitter {
  pub fn new(sphere_radius: f64, sea_tolerance: f64) -> Self {
    Self {
      sphere_radius,
      sea_tolerance,
    }
  }

  pub fn from_config(config: &PlanetConfig) -> Self {
    Self::new(config.sphere_radius, config.sea_tolerance)
  }

  /// Sample the `R*R` grid of a patch.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "emitter::sample"))]
  pub fn sample(&self, sampler: &dyn HeightFieldSampler, frame: &PatchFrame) -> PatchSamples {
    let r = frame.resolution;
    let mut grid = Vec::with_capacity(r * r);
    let mut land_sum = DVec3::ZERO;
    let mut sea_sum = DVec3::ZERO;
    let mut min_land = f64::INFINITY;
    let mut max_land = 0.0f64;

    for j in 0..r {
      for i in 0..r {
        let point = SurfacePoint::sample(sampler, frame.direction((2 * i, 2 * j)), self.sphere_radius);
        let len = point.land.length();
        min_land = min_land.min(len);
        max_land = max_land.max(len);
        land_sum += point.land;
        sea_sum += point.sea(self.sphere_radius);
        grid.push(point);
      }
    }

    let count = grid.len() as f64;
    let land_centroid = land_sum / count;
    let max_node_radius = grid
      .iter()
      .map(|p| p.land.distance(land_centroid))
      .fold(0.0, f64::max);

    PatchSamples {
      frame: *frame,
      land_centroid,
      sea_centroid: sea_sum / count,
      sphere_centroid: frame.origin(),
      min_land_radius: min_land,
      max_land_radius: max_land,
      max_node_radius,
      render_sea: min_land < self.sphere_radius - self.sea_tolerance,
      grid,
    }
  }

  /// Mesh for a sampled patch with the given seam flags.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "emitter::emit"))]
  pub fn emit(
    &self,
    sampler: &dyn HeightFieldSampler,
    samples: &PatchSamples,
    flags: EdgeFlags,
  ) -> PatchMesh {
    let frame = &samples.frame;
    let layout = TransitionLayout::new(frame.resolution, flags);
    let grid_len = samples.grid.len();

    let points: Vec<SurfacePoint> = samples
      .grid
      .iter()
      .copied()
      .chain(
        layout
          .half_steps()
          .skip(grid_len)
          .map(|hs| SurfacePoint::sample(sampler, frame.direction(hs), self.sphere_radius)),
      )
      .collect();
    let uvs: Vec<[f64; 2]> = layout
      .half_steps()
      .map(|hs| {
        let (fu, fv) = frame.face_fraction(hs);
        [fu, fv]
      })
      .collect();

    let indices = triangulate(&layout, frame.face.transform().flip_winding);
    let origin = frame.origin();
    let colors: Vec<[u8; 4]> = points
      .iter()
      .map(|p| depth_color::encode((p.land.length() - self.sphere_radius) as f32))
      .collect();

    let attributes = SectionAttributes {
      face: frame.face,
      origin,
      directions: points.iter().map(|p| p.direction).collect(),
      uvs,
      colors,
      indices,
    };

    let land_positions: Vec<DVec3> = points.iter().map(|p| p.land).collect();
    let land = attributes.build(&land_positions);

    let sea = samples.render_sea.then(|| {
      let sea_positions: Vec<DVec3> = points.iter().map(|p| p.sea(self.sphere_radius)).collect();
      attributes.build(&sea_positions)
    });

    PatchMesh {
      lod: frame.depth,
      origin,
      land,
      sea,
      edge_flags: flags,
    }
  }

  /// Sample and emit in one go.
  pub fn build(
    &self,
    sampler: &dyn HeightFieldSampler,
    frame: &PatchFrame,
    flags: EdgeFlags,
  ) -> (PatchSamples, PatchMesh) {
    let samples = self.sample(sampler, frame);
    let mesh = self.emit(sampler, &samples, flags);
    (samples, mesh)
  }
}

/// Everything the land and sea sections share.
struct SectionAttributes {
  face: CubeFace,
  origin: DVec3,
  directions: Vec<DVec3>,
  uvs: Vec<[f64; 2]>,
  colors: Vec<[u8; 4]>,
  indices: Vec<u32>,
}

impl SectionAttributes {
  /// Section for world-space `positions` (one per vertex).
  fn build(&self, positions: &[DVec3]) -> MeshSection {
    let normals = compute_normals(positions, &self.directions, &self.indices);
    let tangents = compute_tangents(self.face, positions, &normals, &self.uvs, &self.indices);

    let mut bounds = MinMaxAABB::empty();
    let vertices = positions
      .iter()
      .enumerate()
      .map(|(k, p)| {
        let position = (*p - self.origin).as_vec3().to_array();
        bounds.encapsulate(position);
        Vertex {
          position,
          normal: normals[k].as_vec3().to_array(),
          tangent: tangents[k],
          uv: [self.uvs[k][0] as f32, self.uvs[k][1] as f32],
          color: self.colors[k],
        }
      })
      .collect();

    MeshSection {
      vertices,
      indices: self.indices.clone(),
      bounds,
    }
  }
}

/// Area-weighted vertex normals, oriented to the same side as the vertex
/// direction. Vertices without any triangle area get the direction itself.
pub(crate) fn compute_normals(positions: &[DVec3], directions: &[DVec3], indices: &[u32]) -> Vec<DVec3> {
  let mut acc = vec![DVec3::ZERO; positions.len()];
  for t in indices.chunks_exact(3) {
    let (a, b, c) = (t[0] as usize, t[1] as usize, t[2] as usize);
    // Cross product length is twice the triangle area.
    let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
    acc[a] += n;
    acc[b] += n;
    acc[c] += n;
  }

  acc
    .into_iter()
    .zip(directions)
    .map(|(n, outward)| {
      let n = if n.dot(*outward) < 0.0 { -n } else { n };
      n.try_normalize().unwrap_or(*outward)
    })
    .collect()
}

/// Per-vertex tangents from UV deltas; `w` holds the bitangent handedness.
pub(crate) fn compute_tangents(
  face: CubeFace,
  positions: &[DVec3],
  normals: &[DVec3],
  uvs: &[[f64; 2]],
  indices: &[u32],
) -> Vec<[f32; 4]> {
  let mut tan = vec![DVec3::ZERO; positions.len()];
  let mut bitan = vec![DVec3::ZERO; positions.len()];

  for t in indices.chunks_exact(3) {
    let (a, b, c) = (t[0] as usize, t[1] as usize, t[2] as usize);
    let e1 = positions[b] - positions[a];
    let e2 = positions[c] - positions[a];
    let (du1, dv1) = uv_delta(uvs, a, b);
    let (du2, dv2) = uv_delta(uvs, a, c);
    let det = du1 * dv2 - du2 * dv1;
    if det.abs() <= f64::MIN_POSITIVE {
      continue;
    }
    let inv = 1.0 / det;
    let t_dir = (e1 * dv2 - e2 * dv1) * inv;
    let b_dir = (e2 * du1 - e1 * du2) * inv;
    for k in [a, b, c] {
      tan[k] += t_dir;
      bitan[k] += b_dir;
    }
  }

  let u_axis = face.transform().u_axis();
  normals
    .iter()
    .enumerate()
    .map(|(k, n)| {
      let project = |v: DVec3| (v - *n * n.dot(v)).try_normalize();
      let t = project(tan[k])
        .or_else(|| project(u_axis))
        .unwrap_or_else(|| n.any_orthonormal_vector());
      let w = if n.cross(t).dot(bitan[k]) < 0.0 { -1.0 } else { 1.0 };
      [t.x as f32, t.y as f32, t.z as f32, w]
    })
    .collect()
}

#[inline]
fn uv_delta(uvs: &[[f64; 2]], from: usize, to: usize) -> (f64, f64) {
  (uvs[to][0] - uvs[from][0], uvs[to][1] - uvs[from][1])
}

#[cfg(test)]
#[path = "emitter_test.rs"]
mod emitter_test;
