use super::assign::BoneAssignment;
use super::capsule::CapsuleRig;
use crate::config::RigConfig;
use crate::error::Result;
use crate::progress::{Batches, ProgressSink, ProgressUpdate};
use crate::skeleton::{BoneMatrices, Character};
use crate::splat::{SplatBuffer, SplatScene};
use glam::{Mat4, Vec3};
use std::collections::BTreeMap;

/// Mesh vertices grouped by nearest capsule bone.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAssignment {
    /// Bone id per mesh vertex
    pub bones: Vec<usize>,
    /// Vertex indices per bone id; every capsule bone has an entry
    pub vertices_by_bone: BTreeMap<usize, Vec<usize>>,
}

impl VertexAssignment {
    pub fn candidates(&self, bone: usize) -> &[usize] {
        self.vertices_by_bone.get(&bone).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Per-splat reference vertex and rest-pose offset from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatBinding {
    /// `None` when the splat's bone owns no mesh vertices
    pub vertices: Vec<Option<usize>>,
    /// Character-local offset from the skinned reference vertex
    pub offsets: Vec<Vec3>,
}

impl SplatBinding {
    pub fn unresolved(&self) -> impl Iterator<Item = usize> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
    }
}

/// Posed mesh vertices in both frames the binding needs.
#[derive(Debug, Clone)]
struct SkinnedVertices {
    /// Character-local (model) space
    local: Vec<Vec3>,
    world: Vec<Vec3>,
}

impl SkinnedVertices {
    fn new(character: &Character, bones: &BoneMatrices) -> Self {
        let local: Vec<Vec3> = (0..character.mesh.vertex_count())
            .map(|v| character.mesh.skinned_position(v, bones))
            .collect();
        let world = local
            .iter()
            .map(|p| character.transform.transform_point3(*p))
            .collect();
        Self { local, world }
    }
}

/// Resumable nearest-capsule pass over the skinned mesh vertices (pass 2/3).
#[derive(Debug, Clone)]
pub struct VertexAssignPass {
    bone_ids: Vec<usize>,
    vertices_by_bone: BTreeMap<usize, Vec<usize>>,
    assigned: Vec<usize>,
    batches: Batches,
}

impl VertexAssignPass {
    pub fn new(rig: &CapsuleRig, vertex_count: usize, config: &RigConfig) -> Self {
        let bone_ids = rig.bone_ids();
        let vertices_by_bone = bone_ids.iter().map(|&b| (b, Vec::new())).collect();
        Self {
            bone_ids,
            vertices_by_bone,
            assigned: Vec::with_capacity(vertex_count),
            batches: Batches::new(2, 3, vertex_count, config.yield_batch),
        }
    }

    /// Assign one batch of vertices; `None` once all are assigned
    pub fn step(&mut self, character: &Character, rig: &CapsuleRig, bones: &BoneMatrices) -> Option<ProgressUpdate> {
        let range = self.batches.next_batch()?;
        for v in range {
            let p = character.skinned_vertex_world(v, bones);
            let bone = rig.nearest(p).map_or(0, |ci| self.bone_ids[ci]);
            self.vertices_by_bone.entry(bone).or_default().push(v);
            self.assigned.push(bone);
        }
        Some(self.batches.update())
    }

    pub fn finish(mut self, character: &Character, rig: &CapsuleRig, bones: &BoneMatrices) -> VertexAssignment {
        while self.step(character, rig, bones).is_some() {}

        log::info!(
            "Assigned {} mesh vertices across {} bones",
            self.assigned.len(),
            self.vertices_by_bone.values().filter(|vs| !vs.is_empty()).count()
        );
        VertexAssignment {
            bones: self.assigned,
            vertices_by_bone: self.vertices_by_bone,
        }
    }
}

/// Assign every skinned mesh vertex to its nearest capsule's bone.
pub fn assign_vertices(
    character: &Character,
    rig: &CapsuleRig,
    bones: &BoneMatrices,
    config: &RigConfig,
    sink: &mut dyn ProgressSink,
) -> Result<VertexAssignment> {
    rig.ensure_usable()?;
    let mut pass = VertexAssignPass::new(rig, character.mesh.vertex_count(), config);
    while let Some(update) = pass.step(character, rig, bones) {
        sink.report(&update);
    }
    Ok(pass.finish(character, rig, bones))
}

/// Resumable nearest-vertex binding of every splat (pass 3/3).
#[derive(Debug, Clone)]
pub struct SplatBindPass {
    skinned: SkinnedVertices,
    scene_matrix: Mat4,
    to_local: Mat4,
    step: usize,
    chosen: Vec<Option<usize>>,
    offsets: Vec<Vec3>,
    batches: Batches,
}

impl SplatBindPass {
    pub fn new(
        character: &Character,
        scene: &SplatScene,
        bones: &BoneMatrices,
        splat_count: usize,
        config: &RigConfig,
    ) -> Self {
        Self {
            skinned: SkinnedVertices::new(character, bones),
            scene_matrix: scene.matrix(),
            to_local: character.transform.inverse(),
            step: config.vertex_step(),
            chosen: Vec::with_capacity(splat_count),
            offsets: Vec::with_capacity(splat_count),
            batches: Batches::new(3, 3, splat_count, config.yield_batch),
        }
    }

    /// Bind one batch of splats; `None` once all are bound
    pub fn step(
        &mut self,
        splats: &SplatBuffer,
        assignment: &BoneAssignment,
        vertices: &VertexAssignment,
    ) -> Option<ProgressUpdate> {
        let range = self.batches.next_batch()?;
        for i in range {
            let target = splats.world_center(i, &self.scene_matrix);
            let bone = assignment.bones[i];
            let nearest = vertices
                .candidates(bone)
                .iter()
                .step_by(self.step)
                .map(|&v| (v, self.skinned.world[v].distance(target)))
                .fold(None, |best: Option<(usize, f32)>, (v, d)| match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((v, d)),
                })
                .map(|(v, _)| v);

            match nearest {
                Some(v) => {
                    self.offsets
                        .push(self.to_local.transform_point3(target) - self.skinned.local[v]);
                }
                None => {
                    log::warn!("Splat {} left unbound: bone {} has no mesh vertices", i, bone);
                    self.offsets.push(Vec3::ZERO);
                }
            }
            self.chosen.push(nearest);
        }
        Some(self.batches.update())
    }

    pub fn finish(
        mut self,
        splats: &SplatBuffer,
        assignment: &BoneAssignment,
        vertices: &VertexAssignment,
    ) -> SplatBinding {
        while self.step(splats, assignment, vertices).is_some() {}
        SplatBinding {
            vertices: self.chosen,
            offsets: self.offsets,
        }
    }
}

/// For every splat, pick the nearest mesh vertex among those owned by the
/// splat's bone and record the splat's offset from it in character space.
///
/// With `config.fast` only every `vertex_stride`-th candidate is tested.
#[allow(clippy::too_many_arguments)]
pub fn bind_splats(
    character: &Character,
    splats: &SplatBuffer,
    scene: &SplatScene,
    assignment: &BoneAssignment,
    vertices: &VertexAssignment,
    bones: &BoneMatrices,
    config: &RigConfig,
    sink: &mut dyn ProgressSink,
) -> SplatBinding {
    let mut pass = SplatBindPass::new(character, scene, bones, splats.len(), config);
    while let Some(update) = pass.step(splats, assignment, vertices) {
        sink.report(&update);
    }
    pass.finish(splats, assignment, vertices)
}
