//! Mesh sink that keeps per-patch statistics instead of GPU buffers.

use std::collections::HashMap;

use planet_lod::{MeshSink, PatchId, PatchMesh, SinkError};

#[derive(Clone, Copy, Debug)]
struct PatchEntry {
	triangles: usize,
	vertices: usize,
	visible: bool,
}

/// Tracks attached patches, their visibility and sizes.
#[derive(Debug, Default)]
pub struct StatsSink {
	patches: HashMap<PatchId, PatchEntry>,
	pub peak_attached: usize,
	pub total_attaches: u64,
}

impl StatsSink {
	pub fn attached_count(&self) -> usize {
		self.patches.len()
	}

	pub fn visible_count(&self) -> usize {
		self.patches.values().filter(|p| p.visible).count()
	}

	pub fn visible_triangles(&self) -> usize {
		self.patches
			.values()
			.filter(|p| p.visible)
			.map(|p| p.triangles)
			.sum()
	}

	pub fn visible_vertices(&self) -> usize {
		self.patches
			.values()
			.filter(|p| p.visible)
			.map(|p| p.vertices)
			.sum()
	}
}

impl MeshSink for StatsSink {
	fn attach(&mut self, patch: PatchId, mesh: PatchMesh) -> Result<(), SinkError> {
		let visible = self.patches.get(&patch).is_some_and(|p| p.visible);
		self.patches.insert(
			patch,
			PatchEntry {
				triangles: mesh.triangle_count(),
				vertices: mesh.vertex_count(),
				visible,
			},
		);
		self.total_attaches += 1;
		self.peak_attached = self.peak_attached.max(self.patches.len());
		Ok(())
	}

	fn set_visible(&mut self, patch: PatchId, visible: bool) -> Result<(), SinkError> {
		let entry = self
			.patches
			.get_mut(&patch)
			.ok_or(SinkError::UnknownPatch(patch))?;
		entry.visible = visible;
		Ok(())
	}

	fn destroy(&mut self, patch: PatchId) -> Result<(), SinkError> {
		self.patches
			.remove(&patch)
			.map(|_| ())
			.ok_or(SinkError::UnknownPatch(patch))
	}
}
