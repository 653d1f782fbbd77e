//! Planet - six face quadtrees and the update cycle that restructures them.
//!
//! # Cycle
//!
//! ```text
//!  ┌──────────────┐  read lock per face, bottom-up
//!  │ 1. plan      │  leaves: can_merge from parent metrics, claim splits
//!  │              │  parents: record merge candidates, failed splits
//!  └──────┬───────┘
//!         ▼
//!  ┌──────────────┐  no tree lock, rayon
//!  │ 2. build     │  sample + emit the 4 children of every split
//!  └──────┬───────┘
//!         ▼
//!  ┌──────────────┐  write lock per face
//!  │ 3. commit    │  rollback failed splits, attach children, detach
//!  │              │  merged children, queue Split/Merge transitions
//!  └──────┬───────┘
//!         ▼
//!  ┌──────────────┐  read lock per face + per-node geometry lock, rayon
//!  │ 4. seams     │  flag edges whose same-depth neighbour is split,
//!  └──────────────┘  re-emit changed leaves as Refresh transitions
//! ```
//!
//! Sink calls never happen here; the host drains [`Planet::render_queue`]
//! on its render thread, which acknowledges visibility back into the
//! patches' status flags. A patch claimed by one cycle stays skipped until
//! its transition has been applied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::address::PatchAddress;
use crate::camera::CameraState;
use crate::config::PlanetConfig;
use crate::error::ConfigError;
use crate::face::CubeFace;
use crate::geometry::{GeometryEmitter, PatchMesh};
use crate::lod::{LodMetrics, LodRules, LodView};
use crate::node::PatchNode;
use crate::render::{PatchHandle, RenderQueue, Transition};
use crate::sampler::{HeightFieldSampler, TerrainSampler};
use crate::seams::{Edge, NeighborSubdivision, SeamReconciler};

/// Outcome counts of one update cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
  /// Splits committed (transitions queued).
  pub splits: usize,
  /// Merges committed.
  pub merges: usize,
  /// Failed splits whose children were dropped.
  pub rollbacks: usize,
  /// Decisions skipped because the patch was busy or not yet visible.
  pub deferred: usize,
  /// Leaves re-emitted by the seam pass.
  pub reemitted: usize,
  /// Leaves after the cycle.
  pub leaves: usize,
  /// Deepest leaf after the cycle.
  pub max_depth: u8,
}

/// Structural work found by the planning pass of one face.
#[derive(Debug, Default)]
struct FacePlan {
  splits: Vec<PatchAddress>,
  merges: Vec<PatchAddress>,
  rollbacks: Vec<PatchAddress>,
  deferred: usize,
}

/// Children built off-lock for one split.
struct BuiltSplit {
  parent: PatchAddress,
  children: Box<[PatchNode; 4]>,
  meshes: [PatchMesh; 4],
}

/// Cube-sphere planet: configuration, sampler and six face trees.
pub struct Planet {
  config: PlanetConfig,
  rules: LodRules,
  seams: SeamReconciler,
  emitter: GeometryEmitter,
  sampler: Arc<dyn HeightFieldSampler>,
  faces: [RwLock<PatchNode>; 6],
  queue: RenderQueue,
  initialized: AtomicBool,
}

impl Planet {
  pub fn new(config: PlanetConfig, sampler: Arc<dyn HeightFieldSampler>) -> Result<Self, ConfigError> {
    config.validate()?;
    let rules = LodRules::from_config(&config);
    Ok(Self {
      rules,
      seams: SeamReconciler::new(rules, config.sphere_radius, config.seam_extrapolation),
      emitter: GeometryEmitter::from_config(&config),
      faces: CubeFace::ALL.map(|face| RwLock::new(PatchNode::root(face, &config))),
      sampler,
      queue: RenderQueue::new(),
      initialized: AtomicBool::new(false),
      config,
    })
  }

  /// Planet sampled by the terrain flavour named in the config.
  pub fn with_terrain(config: PlanetConfig) -> Result<Self, ConfigError> {
    let sampler = Arc::new(TerrainSampler::from_config(&config));
    Self::new(config, sampler)
  }

  #[inline]
  pub fn config(&self) -> &PlanetConfig {
    &self.config
  }

  #[inline]
  pub fn rules(&self) -> &LodRules {
    &self.rules
  }

  #[inline]
  pub fn sampler(&self) -> &Arc<dyn HeightFieldSampler> {
    &self.sampler
  }

  /// Transitions waiting for the render thread.
  #[inline]
  pub fn render_queue(&self) -> &RenderQueue {
    &self.queue
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized.load(Ordering::Acquire)
  }

  /// Build the six roots and queue them for display. Runs once; later calls
  /// are no-ops until [`teardown`](Self::teardown).
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "planet::initialize"))]
  pub fn initialize(&self) {
    if self.initialized.swap(true, Ordering::AcqRel) {
      return;
    }
    let refreshes: Vec<Transition> = self
      .faces
      .par_iter()
      .map(|face| {
        let root = face.read();
        Transition::Refresh {
          patch: handle(&root),
          mesh: root.build(&self.emitter, &*self.sampler),
          show: true,
        }
      })
      .collect();
    for transition in refreshes {
      self.queue.push(transition);
    }
    info!(
      radius = self.config.sphere_radius,
      min_depth = self.config.min_depth,
      max_depth = self.config.max_depth,
      "planet initialized"
    );
  }

  /// One full update cycle for a camera snapshot.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "planet::run_cycle"))]
  pub fn run_cycle(&self, camera: &CameraState) -> CycleStats {
    self.initialize();
    let view = LodView::from_camera(camera);
    let mut stats = CycleStats::default();

    let plans: Vec<FacePlan> = self
      .faces
      .par_iter()
      .map(|face| {
        let mut plan = FacePlan::default();
        self.plan_node(&face.read(), None, &view, &mut plan);
        plan
      })
      .collect();

    let split_count: usize = plans.iter().map(|p| p.splits.len()).sum();
    let mut built = self.build_splits(&plans);
    debug_assert_eq!(built.len(), split_count);

    for (face, plan) in CubeFace::ALL.into_iter().zip(plans) {
      stats.deferred += plan.deferred;
      let face_built: Vec<BuiltSplit> = {
        let (mine, rest): (Vec<_>, Vec<_>) = built.into_iter().partition(|b| b.parent.face() == face);
        built = rest;
        mine
      };
      self.commit_face(face, plan, face_built, &mut stats);
    }

    stats.reemitted = self.reconcile_seams(&view);

    let (leaves, max_depth) = self.faces.iter().fold((0, 0), |(count, depth), face| {
      let root = face.read();
      (count + root.leaf_count(), depth.max(root.max_leaf_depth()))
    });
    stats.leaves = leaves;
    stats.max_depth = max_depth;

    debug!(
      splits = stats.splits,
      merges = stats.merges,
      rollbacks = stats.rollbacks,
      deferred = stats.deferred,
      reemitted = stats.reemitted,
      leaves = stats.leaves,
      "cycle complete"
    );
    stats
  }

  /// Bottom-up LOD decisions below `node`.
  fn plan_node(&self, node: &PatchNode, parent: Option<&LodMetrics>, view: &LodView, plan: &mut FacePlan) {
    let status = node.status();

    if let Some(children) = node.children() {
      if status.split_failed() {
        plan.rollbacks.push(node.address().clone());
        return;
      }
      let metrics = node.lod_metrics(view);
      for child in children.iter() {
        self.plan_node(child, metrics.as_ref(), view, plan);
      }
      if node.can_collapse() {
        plan.merges.push(node.address().clone());
      }
      return;
    }

    let Some(metrics) = node.lod_metrics(view) else {
      return;
    };
    let can_merge = parent.is_some_and(|p| self.rules.should_merge(p, view));
    status.set_can_merge(can_merge);

    if !self.rules.should_split(&metrics, view) {
      return;
    }
    if !status.last_rendered_visible() || !status.try_begin_restructure() {
      plan.deferred += 1;
      return;
    }
    plan.splits.push(node.address().clone());
  }

  /// Create and build the children of every planned split.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "planet::build_splits"))]
  fn build_splits(&self, plans: &[FacePlan]) -> Vec<BuiltSplit> {
    plans
      .par_iter()
      .flat_map_iter(|plan| plan.splits.iter())
      .filter_map(|address| {
        let children = {
          let root = self.faces[address.face().id() as usize].read();
          root.find(address)?.make_children(&self.config)
        };
        let meshes = children.each_ref().map(|c| c.build(&self.emitter, &*self.sampler));
        Some(BuiltSplit {
          parent: address.clone(),
          children: Box::new(children),
          meshes,
        })
      })
      .collect()
  }

  /// Apply one face's structural changes under its write lock.
  fn commit_face(&self, face: CubeFace, plan: FacePlan, built: Vec<BuiltSplit>, stats: &mut CycleStats) {
    let mut transitions = Vec::new();
    {
      let mut root = self.faces[face.id() as usize].write();

      for address in &plan.rollbacks {
        let Some(node) = root.find_mut(address) else {
          continue;
        };
        if node.status().split_failed() && node.rollback_split().is_some() {
          stats.rollbacks += 1;
          debug!(patch = %address, "dropped children of failed split");
        }
      }

      for BuiltSplit {
        parent,
        children,
        meshes,
      } in built
      {
        let Some(node) = root.find_mut(&parent) else {
          continue;
        };
        let [h0, h1, h2, h3] = children.each_ref().map(handle);
        let [m0, m1, m2, m3] = meshes;
        node.split(children);
        transitions.push(Transition::Split {
          parent: handle(node),
          children: Box::new([(h0, m0), (h1, m1), (h2, m2), (h3, m3)]),
        });
        stats.splits += 1;
      }

      for address in &plan.merges {
        let Some(node) = root.find_mut(address) else {
          continue;
        };
        if node.is_leaf() {
          continue;
        }
        match node.try_merge() {
          Some(children) => {
            let mut ids = Vec::with_capacity(4);
            for child in children.iter() {
              child.collect_ids_post_order(&mut ids);
            }
            transitions.push(Transition::Merge {
              parent: handle(node),
              children: SmallVec::from_vec(ids),
            });
            stats.merges += 1;
          }
          None => stats.deferred += 1,
        }
      }
    }

    for transition in transitions {
      self.queue.push(transition);
    }
  }

  /// Seam pass over every leaf; returns the number of re-emitted patches.
  #[cfg_attr(feature = "profiling", tracing::instrument(skip_all, name = "planet::reconcile_seams"))]
  fn reconcile_seams(&self, view: &LodView) -> usize {
    let mut reemitted = 0;
    for face in &self.faces {
      let root = face.read();
      let own: &PatchNode = &root;
      let mut leaves = Vec::new();
      own.visit_leaves(&mut |leaf| leaves.push(leaf));

      let refreshes: Vec<Transition> = leaves
        .par_iter()
        .filter_map(|leaf| {
          let neighbors = self.neighbor_subdivision(own, leaf.address());
          let flags = leaf.reconcile_seams(&self.seams, &*self.sampler, view, &neighbors)?;
          let force = leaf.status().take_refresh();
          let mesh = leaf.reemit(&self.emitter, &*self.sampler, flags, force)?;
          Some(Transition::Refresh {
            patch: handle(leaf),
            mesh,
            show: force,
          })
        })
        .collect();

      reemitted += refreshes.len();
      for transition in refreshes {
        self.queue.push(transition);
      }
    }
    reemitted
  }

  /// Subdivision of the same-depth neighbours of the patch at `address`.
  ///
  /// `own` is the already locked root of the patch's face. Other faces are
  /// only tried, never waited on; a face that is being written reports its
  /// edges as unresolved.
  fn neighbor_subdivision(&self, own: &PatchNode, address: &PatchAddress) -> NeighborSubdivision {
    Edge::ALL.map(|edge| {
      let neighbor = address.neighbor(edge);
      if neighbor.face() == address.face() {
        return Some(own.is_subdivided_at(&neighbor));
      }
      let root = self.faces[neighbor.face().id() as usize].try_read()?;
      Some(root.is_subdivided_at(&neighbor))
    })
  }

  /// Run `f` on the deepest existing node on the path to `address`.
  pub fn with_nearest_node<R>(&self, address: &PatchAddress, f: impl FnOnce(&PatchNode) -> R) -> Option<R> {
    let root = self.faces[address.face().id() as usize].read();
    root.find_nearest(address).map(f)
  }

  /// Run `f` on the node at `address`, if it exists.
  pub fn with_node<R>(&self, address: &PatchAddress, f: impl FnOnce(&PatchNode) -> R) -> Option<R> {
    let root = self.faces[address.face().id() as usize].read();
    root.find(address).map(f)
  }

  /// Run `f` on a face's root.
  pub fn with_face<R>(&self, face: CubeFace, f: impl FnOnce(&PatchNode) -> R) -> R {
    f(&self.faces[face.id() as usize].read())
  }

  /// Visit every leaf of every face.
  pub fn visit_leaves(&self, mut f: impl FnMut(&PatchNode)) {
    for face in &self.faces {
      face.read().visit_leaves(&mut |leaf| f(leaf));
    }
  }

  pub fn leaf_count(&self) -> usize {
    self.faces.iter().map(|f| f.read().leaf_count()).sum()
  }

  /// Depth of the deepest leaf on any face.
  pub fn max_depth(&self) -> u8 {
    self
      .faces
      .iter()
      .map(|f| f.read().max_leaf_depth())
      .max()
      .unwrap_or(0)
  }

  /// Leaf count per depth (index = depth).
  pub fn leaves_per_depth(&self) -> Vec<usize> {
    let mut counts = vec![0; self.config.max_depth as usize + 1];
    self.visit_leaves(|leaf| {
      let depth = leaf.depth() as usize;
      if depth >= counts.len() {
        counts.resize(depth + 1, 0);
      }
      counts[depth] += 1;
    });
    counts
  }

  /// Queue destruction of every patch and reset the faces to unbuilt roots.
  pub fn teardown(&self) {
    let mut ids = Vec::new();
    for (face, lock) in CubeFace::ALL.into_iter().zip(&self.faces) {
      let mut root = lock.write();
      if root.status().is_initialized() {
        root.collect_ids_post_order(&mut ids);
      }
      *root = PatchNode::root(face, &self.config);
    }
    info!(patches = ids.len(), "planet torn down");
    self.queue.push(Transition::Destroy { patches: ids });
    self.initialized.store(false, Ordering::Release);
  }
}

fn handle(node: &PatchNode) -> PatchHandle {
  PatchHandle {
    id: node.id(),
    status: node.status().clone(),
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
