use std::collections::{HashMap, HashSet};

use glam::DVec3;

use super::*;
use crate::address::{PatchId, Quadrant};
use crate::geometry::{triangulate, TransitionLayout};
use crate::render::ApplyReport;
use crate::seams::{Edge, EdgeFlags};
use crate::test_utils::{camera_at, settle, small_config, sphere_planet, FailingSink, RecordingSink, SinkCall, TEST_RADIUS};

/// Camera altitude of the far scenario view.
const D0: f64 = 1600.0;

/// Camera `altitude` above the centre of the patch at `digits` on +Z.
fn camera_above(config: &PlanetConfig, digits: &[u8], altitude: f64) -> CameraState {
  let address = PatchAddress::from_digits(CubeFace::PosZ, digits).expect("valid digits");
  let frame = crate::geometry::PatchFrame::new(&address, config);
  camera_at(frame.origin().normalize() * (TEST_RADIUS + altitude))
}

fn leaf_ids(planet: &Planet) -> HashSet<PatchId> {
  let mut ids = HashSet::new();
  planet.visit_leaves(|leaf| {
    ids.insert(leaf.id());
  });
  ids
}

/// Structural invariants that hold between cycles.
fn assert_tree_invariants(planet: &Planet) {
  let rules = *planet.rules();
  for face in CubeFace::ALL {
    planet.with_face(face, |root| {
      root.visit(&mut |node| {
        if let Some(children) = node.children() {
          assert_eq!(children.len(), 4);
          assert!(node.depth() < rules.max_depth, "internal node at max depth: {}", node.address());
          for (child, q) in children.iter().zip(Quadrant::ALL) {
            assert_eq!(child.address(), &node.address().child(q));
          }
        } else {
          assert!(node.depth() <= rules.max_depth, "leaf too deep: {}", node.address());
        }
      });
    });
  }
}

/// After a full drain the sink shows exactly the leaves, and every attached
/// patch is a node of the tree.
fn assert_sink_matches_tree(planet: &Planet, sink: &RecordingSink) {
  let visible: HashSet<PatchId> = sink.visible().map(|(id, _)| *id).collect();
  assert_eq!(visible, leaf_ids(planet));

  let mut nodes = Vec::new();
  for face in CubeFace::ALL {
    planet.with_face(face, |root| root.collect_ids_post_order(&mut nodes));
  }
  let nodes: HashSet<PatchId> = nodes.into_iter().collect();
  let attached: HashSet<PatchId> = sink.patches.keys().copied().collect();
  assert_eq!(attached, nodes);
}

// =========================================================================
// Construction and initialization
// =========================================================================

#[test]
fn test_new_rejects_invalid_config() {
  let sampler: Arc<dyn HeightFieldSampler> = Arc::new(crate::sampler::SphereSampler);
  let config = small_config(5, 2);
  assert!(matches!(
    Planet::new(config, sampler),
    Err(ConfigError::DepthRange { min: 5, max: 2 })
  ));
}

#[test]
fn test_initialize_queues_six_roots_once() {
  let planet = sphere_planet(small_config(0, 3));
  assert!(!planet.is_initialized());
  planet.initialize();
  planet.initialize();
  assert!(planet.is_initialized());
  assert_eq!(planet.render_queue().len(), 6);

  let mut sink = RecordingSink::new();
  let report = planet.render_queue().apply(&mut sink);
  assert!(report.is_ok());
  assert_eq!(report.stats.refreshes, 6);
  assert_eq!(sink.visible_count(), 6);
  assert_eq!(planet.leaf_count(), 6);
}

/// Roots must be visible before they may split, so the first cycle defers.
#[test]
fn test_first_cycle_defers_until_roots_are_shown() {
  let planet = sphere_planet(small_config(1, 3));
  let camera = camera_at(DVec3::Z * TEST_RADIUS * 50.0);

  let stats = planet.run_cycle(&camera);
  assert_eq!(stats.splits, 0);
  assert_eq!(stats.deferred, 6);
  assert_eq!(stats.leaves, 6);

  let mut sink = RecordingSink::new();
  planet.render_queue().apply(&mut sink);
  let stats = planet.run_cycle(&camera);
  assert_eq!(stats.splits, 6);
  assert_eq!(stats.leaves, 24);
}

// =========================================================================
// Scenario
// =========================================================================

#[test]
fn test_far_camera_stays_at_min_depth() {
  let config = small_config(2, 5);
  let planet = sphere_planet(config.clone());
  let camera = camera_at(DVec3::Z * TEST_RADIUS * 20.0);
  let mut sink = RecordingSink::new();

  let (stats, reports) = settle(&planet, &camera, &mut sink, 16);
  assert!(reports.iter().all(ApplyReport::is_ok));
  assert_eq!(stats.max_depth, 2);
  assert_eq!(planet.leaf_count(), 6 * 16);
  assert_eq!(planet.leaves_per_depth(), vec![0, 0, 96, 0, 0, 0]);
  assert_tree_invariants(&planet);
  assert_sink_matches_tree(&planet, &sink);
}

/// Far away every face sits at the minimum depth; close above one patch its
/// branch recurses to the maximum while the rest of the planet stays
/// shallow and transition fans appear where depths differ.
#[test]
fn test_camera_descent_refines_one_branch() {
  let config = small_config(4, 6);
  let planet = sphere_planet(config.clone());
  let target = [3, 0, 0, 3, 0, 0];
  let mut sink = RecordingSink::new();

  let far = camera_above(&config, &target, D0);
  let (stats, reports) = settle(&planet, &far, &mut sink, 32);
  assert!(reports.iter().all(ApplyReport::is_ok));
  assert_eq!(stats.max_depth, 4);
  assert_eq!(planet.leaf_count(), 6 * 256);

  let near = camera_above(&config, &target, D0 / 16.0);
  let (stats, reports) = settle(&planet, &near, &mut sink, 32);
  assert!(reports.iter().all(ApplyReport::is_ok));
  assert_eq!(stats.max_depth, 6);
  assert_tree_invariants(&planet);
  assert_sink_matches_tree(&planet, &sink);

  // The target's branch reaches the maximum depth.
  let target_address = PatchAddress::from_digits(CubeFace::PosZ, &target).expect("valid");
  assert_eq!(planet.with_node(&target_address, PatchNode::is_leaf), Some(true));

  // A distant branch of the same face and every other face stay shallow.
  let corner = PatchAddress::from_digits(CubeFace::PosZ, &[1, 1, 1, 1]).expect("valid");
  assert_eq!(planet.with_node(&corner, PatchNode::is_leaf), Some(true));
  for face in CubeFace::ALL.into_iter().filter(|f| *f != CubeFace::PosZ) {
    assert_eq!(planet.with_face(face, PatchNode::max_leaf_depth), 4);
  }

  // The live flags close every seam on the refined face.
  assert_face_watertight(&planet, &config, CubeFace::PosZ);
  assert_flags_match_neighbors(&planet);

  // Coarser leaves bordering the refined branch carry transition fans.
  let cells = config.cells_per_edge();
  let fans: Vec<_> = sink
    .visible()
    .filter(|(_, p)| !p.mesh.edge_flags.is_empty())
    .collect();
  assert!(!fans.is_empty());
  for (_, patch) in fans {
    let extra = patch.mesh.edge_flags.count() as usize * cells;
    assert_eq!(patch.mesh.land.triangle_count(), 2 * cells * cells + extra);
    assert_eq!(patch.mesh.land.vertices.len(), (cells + 1) * (cells + 1) + extra);
  }

  // Climbing back out collapses to the minimum depth.
  let (stats, reports) = settle(&planet, &far, &mut sink, 32);
  assert!(reports.iter().all(ApplyReport::is_ok));
  assert_eq!(stats.max_depth, 4);
  assert_eq!(planet.leaf_count(), 6 * 256);
  assert_sink_matches_tree(&planet, &sink);
}

// =========================================================================
// Hysteresis
// =========================================================================

/// Camera on the outward line through the +Z root's centroid.
fn camera_over_root(planet: &Planet, distance: f64) -> CameraState {
  let centroid = planet.with_face(CubeFace::PosZ, |root| {
    root.geometry().expect("built").samples.land_centroid
  });
  camera_at(centroid + centroid.normalize() * distance)
}

#[test]
fn test_hysteresis_band_holds_split() {
  let planet = sphere_planet(small_config(0, 1));
  planet.initialize();
  let mut sink = RecordingSink::new();
  planet.render_queue().apply(&mut sink);

  let radius = planet.with_face(CubeFace::PosZ, |root| {
    root.geometry().expect("built").samples.max_node_radius
  });
  let fov = crate::camera::DEFAULT_FOV_DEGREES;
  let split_at = planet.rules().split_distance(radius, fov);
  assert!(planet.rules().merge_distance(radius, fov) > split_at);

  let root_id = PatchAddress::root(CubeFace::PosZ);
  let is_split = |planet: &Planet| planet.with_node(&root_id, |n| !n.is_leaf()).unwrap_or(false);

  settle(&planet, &camera_over_root(&planet, split_at * 0.99), &mut sink, 8);
  assert!(is_split(&planet));

  // Inside the band: no merge.
  settle(&planet, &camera_over_root(&planet, split_at * 1.02), &mut sink, 8);
  assert!(is_split(&planet));

  // Past the merge distance: collapse.
  settle(&planet, &camera_over_root(&planet, split_at * 1.1), &mut sink, 8);
  assert!(!is_split(&planet));
  assert_sink_matches_tree(&planet, &sink);
}

/// Sweeping back and forth across the thresholds never splits and merges
/// the same subtree in one tick, and the deepest leaf moves at most one
/// level per tick.
#[test]
fn test_sweep_never_oscillates_within_a_tick() {
  let planet = sphere_planet(small_config(0, 4));
  let mut sink = RecordingSink::new();
  let altitudes = [2000.0, 900.0, 300.0, 120.0, 300.0, 900.0, 120.0, 2000.0, 60.0, 5000.0];
  let mut previous_depth = 0u8;

  for altitude in altitudes {
    let camera = camera_at(DVec3::new(0.1, 0.2, 1.0).normalize() * (TEST_RADIUS + altitude));
    for _ in 0..6 {
      sink.calls.clear();
      let stats = planet.run_cycle(&camera);
      let report = planet.render_queue().apply(&mut sink);
      assert!(report.is_ok());

      let mut attached = HashSet::new();
      let mut destroyed = HashSet::new();
      let mut shown = HashSet::new();
      let mut hidden = HashSet::new();
      for call in &sink.calls {
        match *call {
          SinkCall::Attach(id) => attached.insert(id),
          SinkCall::Destroy(id) => destroyed.insert(id),
          SinkCall::Show(id) => shown.insert(id),
          SinkCall::Hide(id) => hidden.insert(id),
        };
      }
      assert!(attached.is_disjoint(&destroyed));
      assert!(shown.is_disjoint(&hidden));

      assert!(stats.max_depth.abs_diff(previous_depth) <= 1);
      previous_depth = stats.max_depth;
      assert_tree_invariants(&planet);
    }
  }
  assert_sink_matches_tree(&planet, &sink);
}

// =========================================================================
// Seams
// =========================================================================

/// Global half-step lattice key of a patch vertex at `depth`, expressed at
/// `finest` depth.
fn lattice_key(frame: &crate::geometry::PatchFrame, half_steps: (usize, usize), finest: u8) -> (u64, u64) {
  let steps = 2 * (frame.resolution as u64 - 1);
  let shift = finest - frame.depth;
  let (x, y) = frame.lattice_origin;
  (
    (x * steps + half_steps.0 as u64) << shift,
    (y * steps + half_steps.1 as u64) << shift,
  )
}

/// Directed edges of the emitted patches, welded on the face lattice.
fn directed_edges(
  config: &PlanetConfig,
  patches: &[(PatchAddress, EdgeFlags)],
) -> HashMap<((u64, u64), (u64, u64)), usize> {
  let finest = patches.iter().map(|(a, _)| a.depth()).max().unwrap_or(0);
  let emitter = GeometryEmitter::from_config(config);
  let mut edges = HashMap::new();
  for (address, flags) in patches {
    let frame = crate::geometry::PatchFrame::new(address, config);
    let (_, mesh) = emitter.build(&crate::sampler::SphereSampler, &frame, *flags);
    let layout = TransitionLayout::new(frame.resolution, *flags);
    let keys: Vec<_> = layout.half_steps().map(|hs| lattice_key(&frame, hs, finest)).collect();
    assert_eq!(keys.len(), mesh.land.vertices.len());
    for [a, b, c] in mesh.land.triangles() {
      for (from, to) in [(a, b), (b, c), (c, a)] {
        *edges.entry((keys[from as usize], keys[to as usize])).or_insert(0) += 1;
      }
    }
  }
  edges
}

/// Welds one face's leaves with the edge flags the tree assigned them:
/// every directed edge is used once and has a twin unless it lies on the
/// face border.
fn assert_face_watertight(planet: &Planet, config: &PlanetConfig, face: CubeFace) {
  let mut patches = Vec::new();
  planet.with_face(face, |root| {
    root.visit_leaves(&mut |leaf| patches.push((leaf.address().clone(), leaf.edge_flags())));
  });
  let finest = patches.iter().map(|(a, _)| a.depth()).max().unwrap_or(0);
  let edges = directed_edges(config, &patches);
  let max = (1u64 << finest) * 2 * (config.face_resolution as u64 - 1);
  let on_face_border = |(x, y): (u64, u64)| x == 0 || y == 0 || x == max || y == max;

  let mut cracks = Vec::new();
  for (&(from, to), &count) in &edges {
    assert_eq!(count, 1, "directed edge {from:?} -> {to:?} used {count} times");
    let border = on_face_border(from) && on_face_border(to) && (from.0 == to.0 || from.1 == to.1);
    if !border && !edges.contains_key(&(to, from)) {
      cracks.push((from, to));
    }
  }
  assert!(cracks.is_empty(), "{} open edges on {face}: {:?}", cracks.len(), &cracks[..cracks.len().min(8)]);
}

/// Every leaf's flags say exactly which same-depth neighbours are split,
/// including neighbours on other faces.
fn assert_flags_match_neighbors(planet: &Planet) -> usize {
  let mut leaves = Vec::new();
  planet.visit_leaves(|leaf| leaves.push((leaf.address().clone(), leaf.edge_flags())));

  let mut flagged = 0;
  for (address, flags) in &leaves {
    for edge in Edge::ALL {
      let neighbor = address.neighbor(edge);
      let split = planet
        .with_nearest_node(&neighbor, |n| n.depth() == neighbor.depth() && !n.is_leaf())
        .unwrap_or(false);
      assert_eq!(flags.contains(edge), split, "{address} {edge:?} (neighbour {neighbor})");
      flagged += split as usize;
    }
  }
  flagged
}

/// Camera low over the +X side of the +Z/+X cube edge: the refined region
/// spills over the edge and every flag on every face, across face borders
/// too, matches the real neighbour.
#[test]
fn test_live_flags_follow_neighbours_across_faces() {
  let config = small_config(2, 6);
  let planet = sphere_planet(config.clone());
  let camera = camera_at(DVec3::new(1.0, 0.2, 0.8).normalize() * (TEST_RADIUS + 40.0));
  let mut sink = RecordingSink::new();

  let (stats, reports) = settle(&planet, &camera, &mut sink, 48);
  assert!(reports.iter().all(ApplyReport::is_ok));
  assert!(stats.max_depth > 2);

  assert!(assert_flags_match_neighbors(&planet) > 0);
  for face in CubeFace::ALL {
    assert_face_watertight(&planet, &config, face);
  }

  // The sink shows the flagged meshes.
  planet.visit_leaves(|leaf| {
    let shown = sink.patches.get(&leaf.id()).expect("leaf attached");
    assert_eq!(shown.mesh.edge_flags, leaf.edge_flags());
  });
}

/// A depth-1 patch next to three split depth-1 regions (one neighbour along
/// each flagged side plus the diagonal one): every edge inside the face is
/// shared by exactly two opposite triangles, edges on the face border by one.
#[test]
fn test_seam_watertight_across_depth_change() {
  let config = small_config(0, 4);
  let mut patches = vec![(
    PatchAddress::from_digits(CubeFace::PosZ, &[0]).expect("valid"),
    EdgeFlags::RIGHT.with(Edge::Top),
  )];
  for region in [1, 2, 3] {
    for q in 0..4 {
      let address = PatchAddress::from_digits(CubeFace::PosZ, &[region, q]).expect("valid");
      patches.push((address, EdgeFlags::NONE));
    }
  }
  let edges = directed_edges(&config, &patches);
  // Two depth-2 patches of 2n half steps across the face.
  let max = 2 * 2 * 2 * (config.face_resolution as u64 - 1);
  let on_face_border = |(x, y): (u64, u64)| x == 0 || y == 0 || x == max || y == max;

  for (&(from, to), &count) in &edges {
    assert_eq!(count, 1, "directed edge {from:?} -> {to:?} used {count} times");
    let twin = edges.contains_key(&(to, from));
    let border = on_face_border(from) && on_face_border(to) && (from.0 == to.0 || from.1 == to.1);
    assert_eq!(twin, !border, "edge {from:?} -> {to:?}");
  }
}

/// The same layout without transition vertices leaves cracks.
#[test]
fn test_unstitched_depth_change_cracks() {
  let config = small_config(0, 4);
  let mut patches = vec![(
    PatchAddress::from_digits(CubeFace::PosZ, &[0]).expect("valid"),
    EdgeFlags::NONE,
  )];
  for q in 0..4 {
    let address = PatchAddress::from_digits(CubeFace::PosZ, &[2, q]).expect("valid");
    patches.push((address, EdgeFlags::NONE));
  }
  let edges = directed_edges(&config, &patches);
  let seam_x = 2 * 2 * (config.face_resolution as u64 - 1);
  let unmatched = edges
    .keys()
    .filter(|(from, to)| from.0 == seam_x && to.0 == seam_x)
    .filter(|(from, to)| !edges.contains_key(&(*to, *from)))
    .count();
  assert!(unmatched > 0);
}

#[test]
fn test_stitch_indices_match_triangulation() {
  let layout = TransitionLayout::new(5, EdgeFlags::LEFT);
  let config = small_config(0, 4);
  let address = PatchAddress::from_digits(CubeFace::PosZ, &[1]).expect("valid");
  let frame = crate::geometry::PatchFrame::new(&address, &config);
  let (_, mesh) = GeometryEmitter::from_config(&config).build(&crate::sampler::SphereSampler, &frame, EdgeFlags::LEFT);
  assert_eq!(mesh.land.indices, triangulate(&layout, false));
}

// =========================================================================
// Determinism
// =========================================================================

#[test]
fn test_identical_planets_produce_identical_meshes() {
  let config = small_config(1, 4);
  let camera = camera_above(&config, &[3, 0, 0], 150.0);

  let mut sinks = [RecordingSink::new(), RecordingSink::new()];
  for sink in &mut sinks {
    let planet = Planet::with_terrain(config.clone()).expect("valid config");
    settle(&planet, &camera, sink, 32);
  }
  let [a, b] = &sinks;
  assert_eq!(a.patches.len(), b.patches.len());
  for (id, patch) in &a.patches {
    let other = b.patches.get(id).expect("same patches");
    assert_eq!(patch.mesh, other.mesh);
    assert_eq!(patch.visible, other.visible);
  }
}

#[test]
fn test_rebuild_is_identical() {
  let config = small_config(0, 4);
  let planet = sphere_planet(config.clone());
  let address = PatchAddress::from_digits(CubeFace::NegX, &[2, 1]).expect("valid");
  let node = PatchNode::root(CubeFace::NegX, &config);
  let emitter = GeometryEmitter::from_config(&config);
  let frame = crate::geometry::PatchFrame::new(&address, &config);
  let first = emitter.build(&**planet.sampler(), &frame, EdgeFlags::BOTTOM);
  let second = emitter.build(&**planet.sampler(), &frame, EdgeFlags::BOTTOM);
  assert_eq!(first, second);
  assert_eq!(node.build(&emitter, &**planet.sampler()), node.build(&emitter, &**planet.sampler()));
}

// =========================================================================
// Sink failures
// =========================================================================

/// A split the sink cannot attach leaves the parent shown and is rolled
/// back by the next cycle.
#[test]
fn test_failed_split_rolls_back() {
  let planet = sphere_planet(small_config(1, 2));
  let camera = camera_at(DVec3::Z * TEST_RADIUS * 50.0);
  let mut sink = FailingSink::attach_from_depth(1);

  planet.run_cycle(&camera);
  assert!(planet.render_queue().apply(&mut sink).is_ok());

  let stats = planet.run_cycle(&camera);
  assert_eq!(stats.splits, 6);
  let report = planet.render_queue().apply(&mut sink);
  assert_eq!(report.errors.len(), 6);
  assert_eq!(report.stats.splits, 0);
  assert_eq!(sink.inner.visible_count(), 6);

  let stats = planet.run_cycle(&camera);
  assert_eq!(stats.rollbacks, 6);
  assert_eq!(stats.leaves, 6);
  assert_tree_invariants(&planet);
  planet.visit_leaves(|leaf| {
    assert!(!leaf.status().is_restructuring());
    assert!(!leaf.status().split_failed());
    assert!(leaf.status().last_rendered_visible());
  });

  // The sink recovers: the next attempt goes through.
  sink.fail_attach_from_depth = None;
  let (stats, _) = settle(&planet, &camera, &mut sink, 8);
  assert_eq!(stats.leaves, 24);
  assert_sink_matches_tree(&planet, &sink.inner);
}

/// A merge whose parent cannot be shown is re-shown by a later seam pass.
#[test]
fn test_failed_merge_show_is_retried() {
  let planet = sphere_planet(small_config(0, 1));
  let mut sink = FailingSink::default();
  planet.initialize();
  planet.render_queue().apply(&mut sink);

  settle(&planet, &camera_over_root(&planet, 100.0), &mut sink, 8);
  assert_eq!(planet.max_depth(), 1);

  let root = PatchAddress::root(CubeFace::PosZ);
  sink.fail_show.insert(root.id());
  planet.run_cycle(&camera_at(DVec3::Z * TEST_RADIUS * 50.0));
  let report = planet.render_queue().apply(&mut sink);
  assert!(!report.is_ok());
  assert!(!sink.inner.is_visible(root.id()));

  sink.fail_show.clear();
  let stats = planet.run_cycle(&camera_at(DVec3::Z * TEST_RADIUS * 50.0));
  assert!(stats.reemitted >= 1);
  assert!(planet.render_queue().apply(&mut sink).is_ok());
  assert!(sink.inner.is_visible(root.id()));
  assert_sink_matches_tree(&planet, &sink.inner);
}

// =========================================================================
// Queries and teardown
// =========================================================================

#[test]
fn test_with_node_and_leaves_per_depth() {
  let config = small_config(1, 3);
  let planet = sphere_planet(config.clone());
  let mut sink = RecordingSink::new();
  settle(&planet, &camera_at(DVec3::Z * TEST_RADIUS * 50.0), &mut sink, 8);

  let child = PatchAddress::from_digits(CubeFace::NegY, &[2]).expect("valid");
  assert_eq!(planet.with_node(&child, PatchNode::depth), Some(1));
  let missing = PatchAddress::from_digits(CubeFace::NegY, &[2, 2]).expect("valid");
  assert!(planet.with_node(&missing, PatchNode::depth).is_none());

  assert_eq!(planet.leaves_per_depth(), vec![0, 24, 0, 0]);
  assert_eq!(planet.max_depth(), 1);
}

#[test]
fn test_teardown_releases_everything() {
  let config = small_config(1, 3);
  let planet = sphere_planet(config.clone());
  let camera = camera_above(&config, &[3], 200.0);
  let mut sink = RecordingSink::new();
  settle(&planet, &camera, &mut sink, 16);
  assert!(!sink.patches.is_empty());

  planet.teardown();
  let report = planet.render_queue().apply(&mut sink);
  assert!(report.is_ok());
  assert!(sink.patches.is_empty());
  assert!(!planet.is_initialized());
  assert_eq!(planet.leaf_count(), 6);
  assert!(matches!(sink.calls.last(), Some(SinkCall::Destroy(_))));

  // The planet can be rebuilt afterwards.
  settle(&planet, &camera, &mut sink, 16);
  assert_sink_matches_tree(&planet, &sink);
}

#[test]
fn test_override_position_drives_lod() {
  let config = small_config(0, 3);
  let planet = sphere_planet(config.clone());
  let mut sink = RecordingSink::new();
  let camera = camera_at(DVec3::Z * TEST_RADIUS * 50.0).with_override(DVec3::Z * (TEST_RADIUS + 100.0));
  let (stats, _) = settle(&planet, &camera, &mut sink, 16);
  assert!(stats.max_depth > 0);
  assert_sink_matches_tree(&planet, &sink);
}
