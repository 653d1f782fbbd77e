//! CubeFace - the six root faces of the cube-sphere and their orientation
//! table.
//!
//! Every face maps its two in-face axes (u, v) and its normal onto world
//! axes. `u × v` points outward on the positive faces and inward on the
//! negative ones, which is what `flip_winding` compensates for when indices
//! are emitted.
//!
//! ```text
//!            +Y
//!             │   (u = +Z, v = +X)
//!             │
//!   -X ───────┼─────── +X   (u = +Y, v = +Z)
//!            ╱│
//!          ╱  │
//!        +Z  -Y
//!   (u = +X, v = +Y)
//! ```

use std::fmt;

use glam::DVec3;

/// One of the six cube faces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
  PosX = 0,
  NegX = 1,
  PosY = 2,
  NegY = 3,
  PosZ = 4,
  NegZ = 5,
}

impl CubeFace {
  /// All faces in id order.
  pub const ALL: [CubeFace; 6] = [
    CubeFace::PosX,
    CubeFace::NegX,
    CubeFace::PosY,
    CubeFace::NegY,
    CubeFace::PosZ,
    CubeFace::NegZ,
  ];

  /// Face from its numeric id (0..=5).
  pub fn from_id(id: u8) -> Option<Self> {
    Self::ALL.get(id as usize).copied()
  }

  #[inline]
  pub fn id(self) -> u8 {
    self as u8
  }

  /// Orientation table entry for this face.
  #[inline]
  pub fn transform(self) -> &'static FaceTransform {
    &FACE_TRANSFORMS[self as usize]
  }

  /// Face whose outward normal points along world `axis` (0 = x, 1 = y,
  /// 2 = z), in the positive direction if `positive`.
  pub fn facing(axis: usize, positive: bool) -> Self {
    match (axis, positive) {
      (0, true) => CubeFace::PosX,
      (0, false) => CubeFace::NegX,
      (1, true) => CubeFace::PosY,
      (1, false) => CubeFace::NegY,
      (_, true) => CubeFace::PosZ,
      (_, false) => CubeFace::NegZ,
    }
  }

  /// Outward unit normal.
  pub fn normal(self) -> DVec3 {
    let t = self.transform();
    axis_vector(t.axis_map[2], t.axis_dir[2])
  }
}

impl fmt::Display for CubeFace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      CubeFace::PosX => "+X",
      CubeFace::NegX => "-X",
      CubeFace::PosY => "+Y",
      CubeFace::NegY => "-Y",
      CubeFace::PosZ => "+Z",
      CubeFace::NegZ => "-Z",
    };
    f.write_str(name)
  }
}

/// Maps face-local (u, v, normal) onto world axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceTransform {
  /// World axis index for u, v and the face normal.
  pub axis_map: [usize; 3],
  /// Sign applied along each mapped axis.
  pub axis_dir: [f64; 3],
  /// Swap the last two indices of every triangle so it faces outward.
  pub flip_winding: bool,
}

/// Per-face orientation table, indexed by [`CubeFace`] id.
pub const FACE_TRANSFORMS: [FaceTransform; 6] = [
  // +X: u = +Y, v = +Z
  FaceTransform { axis_map: [1, 2, 0], axis_dir: [1.0, 1.0, 1.0], flip_winding: false },
  // -X
  FaceTransform { axis_map: [1, 2, 0], axis_dir: [1.0, 1.0, -1.0], flip_winding: true },
  // +Y: u = +Z, v = +X
  FaceTransform { axis_map: [2, 0, 1], axis_dir: [1.0, 1.0, 1.0], flip_winding: false },
  // -Y
  FaceTransform { axis_map: [2, 0, 1], axis_dir: [1.0, 1.0, -1.0], flip_winding: true },
  // +Z: u = +X, v = +Y
  FaceTransform { axis_map: [0, 1, 2], axis_dir: [1.0, 1.0, 1.0], flip_winding: false },
  // -Z
  FaceTransform { axis_map: [0, 1, 2], axis_dir: [1.0, 1.0, -1.0], flip_winding: true },
];

impl FaceTransform {
  /// Sign of the u, v or normal mapping as an integer step.
  #[inline]
  pub fn axis_step(&self, index: usize) -> i64 {
    if self.axis_dir[index] < 0.0 {
      -1
    } else {
      1
    }
  }

  /// World-space u axis.
  #[inline]
  pub fn u_axis(&self) -> DVec3 {
    axis_vector(self.axis_map[0], self.axis_dir[0])
  }

  /// World-space v axis.
  #[inline]
  pub fn v_axis(&self) -> DVec3 {
    axis_vector(self.axis_map[1], self.axis_dir[1])
  }

  /// Offset along the two in-face axes, expressed in cube space.
  #[inline]
  pub fn in_face_offset(&self, du: f64, dv: f64) -> DVec3 {
    let mut d = [0.0; 3];
    d[self.axis_map[0]] = self.axis_dir[0] * du;
    d[self.axis_map[1]] = self.axis_dir[1] * dv;
    DVec3::from_array(d)
  }

  /// Centre of the root patch for a cube of the given half extent.
  pub fn root_center(&self, half_size: f64) -> DVec3 {
    axis_vector(self.axis_map[2], self.axis_dir[2]) * half_size
  }

  /// Cube-space point for face coordinates `u`, `v` in `[-half, half]`.
  pub fn cube_point(&self, u: f64, v: f64, half_size: f64) -> DVec3 {
    let mut p = [0.0; 3];
    p[self.axis_map[0]] = self.axis_dir[0] * u;
    p[self.axis_map[1]] = self.axis_dir[1] * v;
    p[self.axis_map[2]] = self.axis_dir[2] * half_size;
    DVec3::from_array(p)
  }
}

#[inline]
fn axis_vector(axis: usize, sign: f64) -> DVec3 {
  let mut v = [0.0; 3];
  v[axis] = sign;
  DVec3::from_array(v)
}

#[cfg(test)]
#[path = "face_test.rs"]
mod face_test;
