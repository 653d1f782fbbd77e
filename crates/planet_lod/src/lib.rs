//! planet_lod - Adaptive cube-sphere quadtree level of detail
//!
//! Six root patches cover the faces of a cube projected onto a sphere. Each
//! patch splits into four children as the camera approaches and merges back
//! as it recedes, while the affected geometry is rebuilt on a worker pool.
//!
//! # Features
//!
//! - **Screen-size LOD**: split/merge rules on projected patch radius, with
//!   a hysteresis band between the two
//! - **Seam stitching without neighbour pointers**: neighbours are found by
//!   address, even across faces, and transition fans close the gaps
//! - **Exact shared vertices**: one integer lattice per face, so coincident
//!   vertices of different depths and faces are bit-identical
//! - **Non-blocking updates**: cycles run on rayon; sink commands are queued
//!   and applied atomically per split or merge on the host's render thread
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use planet_lod::{CameraState, NullSink, Planet, PlanetConfig, TreeScheduler};
//!
//! let planet = Arc::new(Planet::with_terrain(PlanetConfig::default())?);
//! let mut scheduler = TreeScheduler::new(planet.clone());
//! let mut sink = NullSink;
//!
//! loop {
//!   let now = web_time::Instant::now();
//!   scheduler.tick(now, &camera);
//!   if let Some(report) = scheduler.poll(now) {
//!     println!("{} leaves", report.stats.leaves);
//!   }
//!   let applied = planet.render_queue().apply(&mut sink);
//!   for error in applied.errors {
//!     eprintln!("{error}");
//!   }
//! }
//! ```

pub mod address;
pub mod camera;
pub mod config;
pub mod error;
pub mod face;
pub mod geometry;
pub mod lod;
pub mod metrics;
pub mod node;
pub mod render;
pub mod sampler;
pub mod scheduler;
pub mod seams;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_utils;

pub use address::{PatchAddress, PatchId, Quadrant, MAX_PATCH_DEPTH};
pub use camera::CameraState;
pub use config::PlanetConfig;
pub use error::{ConfigError, PatchError, SinkError, SinkOperation};
pub use face::{CubeFace, FaceTransform};
pub use geometry::{GeometryEmitter, MeshSection, PatchMesh, Vertex};
pub use lod::{LodRules, LodView};
pub use node::{PatchNode, PatchStatus};
pub use render::{ApplyReport, MeshSink, NullSink, RenderQueue, Transition};
pub use sampler::{HeightFieldSampler, SphereSampler, TerrainKind, TerrainSampler};
pub use scheduler::{CycleReport, TreeScheduler};
pub use seams::{Edge, EdgeFlags, SeamReconciler};
pub use tree::{CycleStats, Planet};
