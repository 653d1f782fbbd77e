//! Patch geometry: mesh types, seam-aware triangulation and the emitter
//! that samples the height field.

pub mod emitter;
pub mod triangulation;
pub mod types;

pub use emitter::{GeometryEmitter, PatchFrame, PatchSamples, SurfacePoint};
pub use triangulation::{triangulate, TransitionLayout};
pub use types::{depth_color, MeshSection, MinMaxAABB, PatchMesh, Vertex};
