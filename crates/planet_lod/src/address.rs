//! PatchAddress - identifies a quadtree patch by face and quadrant path.
//!
//! The path is a sequence of quadrant digits, one per level below the root.
//! Depth is the path length; the root of each face has an empty path.
//!
//! ```text
//!   v
//!   ▲
//!   │ ┌─────────┬─────────┐
//!   │ │ TopLeft │TopRight │
//!   │ │    1    │    3    │
//!   │ ├─────────┼─────────┤
//!   │ │BotLeft  │BotRight │
//!   │ │    0    │    2    │
//!   │ └─────────┴─────────┘
//!   └──────────────────────────► u
//! ```
//!
//! Bit 1 of a digit selects the right half, bit 0 the top half.
//!
//! Edge neighbours are found on the integer lattice of the face; a
//! neighbour past the face border is folded onto the adjacent face, so
//! every patch has exactly one same-depth neighbour per edge.

use std::fmt;

use smallvec::SmallVec;

use crate::face::CubeFace;
use crate::seams::Edge;

/// Deepest level a packed address can represent (sentinel + 2 bits/level).
pub const MAX_PATCH_DEPTH: u8 = 31;

/// Child quadrant of a patch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[repr(u8)]
pub enum Quadrant {
  BottomLeft = 0,
  TopLeft = 1,
  BottomRight = 2,
  TopRight = 3,
}

impl Quadrant {
  /// All quadrants in digit order.
  pub const ALL: [Quadrant; 4] = [
    Quadrant::BottomLeft,
    Quadrant::TopLeft,
    Quadrant::BottomRight,
    Quadrant::TopRight,
  ];

  /// Quadrant from a path digit; `None` outside 0..=3.
  pub fn from_digit(digit: u8) -> Option<Self> {
    Self::ALL.get(digit as usize).copied()
  }

  #[inline]
  pub fn digit(self) -> u8 {
    self as u8
  }

  /// True for the two quadrants on the +u side.
  #[inline]
  pub fn is_right(self) -> bool {
    self.digit() & 0b10 != 0
  }

  /// True for the two quadrants on the +v side.
  #[inline]
  pub fn is_top(self) -> bool {
    self.digit() & 0b01 != 0
  }

  /// Sign of the child's centre offset along (u, v).
  #[inline]
  pub fn offset_signs(self) -> (f64, f64) {
    let su = if self.is_right() { 1.0 } else { -1.0 };
    let sv = if self.is_top() { 1.0 } else { -1.0 };
    (su, sv)
  }
}

/// Sink-facing patch identifier: face, packed path and LOD level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct PatchId {
  pub face: CubeFace,
  /// Path packed with [`PatchAddress::packed`].
  pub path: u64,
  /// Depth of the patch (0 = root).
  pub lod: u8,
}

impl fmt::Display for PatchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match PatchAddress::from_packed(self.face, self.path) {
      Some(address) => write!(f, "{address}"),
      None => write!(f, "{}/#{:x}", self.face, self.path),
    }
  }
}

/// Face id plus quadrant path.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PatchAddress {
  face: CubeFace,
  path: SmallVec<[Quadrant; 16]>,
}

impl PatchAddress {
  /// Root address of a face.
  pub fn root(face: CubeFace) -> Self {
    Self {
      face,
      path: SmallVec::new(),
    }
  }

  /// Build from a face and a digit sequence. Returns `None` if a digit is
  /// out of range or the path is deeper than [`MAX_PATCH_DEPTH`].
  pub fn from_digits(face: CubeFace, digits: &[u8]) -> Option<Self> {
    if digits.len() > MAX_PATCH_DEPTH as usize {
      return None;
    }
    let path = digits
      .iter()
      .map(|d| Quadrant::from_digit(*d))
      .collect::<Option<SmallVec<_>>>()?;
    Some(Self { face, path })
  }

  #[inline]
  pub fn face(&self) -> CubeFace {
    self.face
  }

  #[inline]
  pub fn path(&self) -> &[Quadrant] {
    &self.path
  }

  #[inline]
  pub fn depth(&self) -> u8 {
    self.path.len() as u8
  }

  #[inline]
  pub fn is_root(&self) -> bool {
    self.path.is_empty()
  }

  /// Last quadrant of the path; `None` for a root.
  pub fn quadrant(&self) -> Option<Quadrant> {
    self.path.last().copied()
  }

  /// Address of the given child.
  ///
  /// Panics when the child would exceed [`MAX_PATCH_DEPTH`].
  pub fn child(&self, quadrant: Quadrant) -> Self {
    assert!(
      self.depth() < MAX_PATCH_DEPTH,
      "patch {self} is already at the maximum addressable depth"
    );
    let mut path = self.path.clone();
    path.push(quadrant);
    Self {
      face: self.face,
      path,
    }
  }

  /// All four child addresses in digit order.
  pub fn children(&self) -> [Self; 4] {
    Quadrant::ALL.map(|q| self.child(q))
  }

  /// Parent address; `None` for a root.
  pub fn parent(&self) -> Option<Self> {
    if self.is_root() {
      return None;
    }
    let mut path = self.path.clone();
    path.pop();
    Some(Self {
      face: self.face,
      path,
    })
  }

  /// True if `other` lies strictly below this patch.
  pub fn is_ancestor_of(&self, other: &PatchAddress) -> bool {
    self.face == other.face
      && self.path.len() < other.path.len()
      && other.path.starts_with(&self.path)
  }

  /// Integer position of this patch among the `2^depth × 2^depth` patches of
  /// its depth on the face, counted from the (-u, -v) corner.
  pub fn lattice_origin(&self) -> (u64, u64) {
    self.path.iter().fold((0u64, 0u64), |(x, y), q| {
      (x * 2 + q.is_right() as u64, y * 2 + q.is_top() as u64)
    })
  }

  /// Inverse of [`lattice_origin`](Self::lattice_origin): the patch at
  /// column `x`, row `y` of the `2^depth` grid on `face`.
  ///
  /// Panics when `depth` exceeds [`MAX_PATCH_DEPTH`].
  pub fn from_lattice(face: CubeFace, depth: u8, x: u64, y: u64) -> Self {
    assert!(depth <= MAX_PATCH_DEPTH, "lattice depth {depth} out of range");
    let path = (0..depth)
      .rev()
      .map(|level| {
        let right = (x >> level) & 1;
        let top = (y >> level) & 1;
        Quadrant::ALL[(right << 1 | top) as usize]
      })
      .collect();
    Self { face, path }
  }

  /// Same-depth patch across `edge`, on the adjacent face when the edge is
  /// part of the face border.
  pub fn neighbor(&self, edge: Edge) -> Self {
    let depth = self.depth();
    let n = 1i64 << depth;
    let (x, y) = self.lattice_origin();
    let (dx, dy) = edge.step();
    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
    if (0..n).contains(&nx) && (0..n).contains(&ny) {
      return Self::from_lattice(self.face, depth, nx as u64, ny as u64);
    }

    // Cell centres in half-cell units: the face spans [-n, n] and column x
    // is centred on 2x + 1 - n. The neighbour's centre overhangs the border
    // by one unit; folding it over the cube edge moves that unit from the
    // in-face axis onto the normal.
    let t = self.face.transform();
    let su = 2 * nx + 1 - n;
    let sv = 2 * ny + 1 - n;
    let (over, sign) = if su.abs() > n { (0, su.signum()) } else { (1, sv.signum()) };

    let mut p = [0i64; 3];
    p[t.axis_map[0]] = t.axis_step(0) * su.clamp(-n, n);
    p[t.axis_map[1]] = t.axis_step(1) * sv.clamp(-n, n);
    p[t.axis_map[2]] = t.axis_step(2) * (n - 1);

    let face = CubeFace::facing(t.axis_map[over], t.axis_step(over) * sign > 0);
    let g = face.transform();
    let to_cell = |i: usize| ((g.axis_step(i) * p[g.axis_map[i]] + n - 1) / 2) as u64;
    Self::from_lattice(face, depth, to_cell(0), to_cell(1))
  }

  /// Path packed as a sentinel bit followed by two bits per level.
  pub fn packed(&self) -> u64 {
    self
      .path
      .iter()
      .fold(1u64, |acc, q| (acc << 2) | q.digit() as u64)
  }

  /// Inverse of [`packed`](Self::packed).
  pub fn from_packed(face: CubeFace, packed: u64) -> Option<Self> {
    if packed == 0 {
      return None;
    }
    let bits = 63 - packed.leading_zeros();
    if bits % 2 != 0 {
      return None;
    }
    let depth = bits / 2;
    let path = (0..depth)
      .rev()
      .map(|level| {
        let digit = ((packed >> (level * 2)) & 0b11) as u8;
        Quadrant::ALL[digit as usize]
      })
      .collect();
    Some(Self { face, path })
  }

  /// Identifier handed to the mesh sink.
  pub fn id(&self) -> PatchId {
    PatchId {
      face: self.face,
      path: self.packed(),
      lod: self.depth(),
    }
  }
}

impl fmt::Display for PatchAddress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/", self.face)?;
    for q in &self.path {
      write!(f, "{}", q.digit())?;
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "address_test.rs"]
mod address_test;
