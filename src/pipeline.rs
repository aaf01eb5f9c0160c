//! End-to-end binding and loading of a rigged point cloud.

use crate::artifact::{RigArtifact, RigBundle};
use crate::config::RigConfig;
use crate::deform::{PartitionPlacement, SkinDeformer};
use crate::error::{Result, RigError};
use crate::ply::PlyData;
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::rig::{
    partition_by_key, stray_splats, BoneAssignPass, BoneAssignment, CapsuleRig, Partition, SplatBindPass,
    SplatBinding, VertexAssignPass, VertexAssignment,
};
use crate::skeleton::{transfer_pose, BoneMatrices, BoneOperation, Character, Skeleton};
use crate::splat::{ColorMode, SplatBuffer, SplatScene};
use glam::Vec3;

/// Everything produced by one bind run.
#[derive(Debug, Clone)]
pub struct BindResult {
    pub rig: CapsuleRig,
    pub assignment: BoneAssignment,
    pub vertices: VertexAssignment,
    pub binding: SplatBinding,
    pub artifact: RigArtifact,
}

enum Stage {
    Bones(BoneAssignPass),
    Vertices(BoneAssignment, VertexAssignPass),
    Splats(BoneAssignment, VertexAssignment, SplatBindPass),
    Done(BoneAssignment, VertexAssignment, SplatBinding),
    Moved,
}

/// A bind run that advances one batch per [`BindJob::step`].
///
/// Between steps the driver owns control: a native caller just loops, a
/// browser caller awaits the event loop so the page can render progress.
pub struct BindJob<'a> {
    character: &'a Character,
    splats: &'a mut SplatBuffer,
    scene: SplatScene,
    config: RigConfig,
    rig: CapsuleRig,
    bones: BoneMatrices,
    stage: Stage,
}

impl<'a> BindJob<'a> {
    /// Start binding `splats` to the character's current pose.
    pub fn new(
        character: &'a Character,
        splats: &'a mut SplatBuffer,
        scene: &SplatScene,
        config: &RigConfig,
    ) -> Result<Self> {
        let rig = CapsuleRig::build(character);
        log::info!(
            "Built {} capsules ({} triangles) for {} splats",
            rig.len(),
            rig.triangle_count(),
            splats.len()
        );
        let stage = Stage::Bones(BoneAssignPass::new(&rig, scene, splats.len(), config)?);
        Ok(Self {
            character,
            splats,
            scene: *scene,
            config: config.clone(),
            bones: character.bone_matrices(),
            rig,
            stage,
        })
    }

    /// Run one batch of the current pass. Returns the progress made, or
    /// `None` once all three passes are complete.
    pub fn step(&mut self) -> Option<ProgressUpdate> {
        loop {
            let update = match &mut self.stage {
                Stage::Bones(pass) => pass.step(self.splats, &self.rig),
                Stage::Vertices(_, pass) => pass.step(self.character, &self.rig, &self.bones),
                Stage::Splats(assignment, vertices, pass) => pass.step(self.splats, assignment, vertices),
                Stage::Done(..) | Stage::Moved => return None,
            };
            if update.is_some() {
                return update;
            }
            self.advance();
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done(..))
    }

    fn advance(&mut self) {
        self.stage = match std::mem::replace(&mut self.stage, Stage::Moved) {
            Stage::Bones(pass) => {
                let assignment = pass.finish(self.splats, &self.rig);
                let pass = VertexAssignPass::new(&self.rig, self.character.mesh.vertex_count(), &self.config);
                Stage::Vertices(assignment, pass)
            }
            Stage::Vertices(assignment, pass) => {
                let vertices = pass.finish(self.character, &self.rig, &self.bones);
                let pass = SplatBindPass::new(
                    self.character,
                    &self.scene,
                    &self.bones,
                    self.splats.len(),
                    &self.config,
                );
                Stage::Splats(assignment, vertices, pass)
            }
            Stage::Splats(assignment, vertices, pass) => {
                let binding = pass.finish(self.splats, &assignment, &vertices);
                Stage::Done(assignment, vertices, binding)
            }
            done => done,
        };
    }

    /// Complete any remaining batches and assemble the result.
    pub fn finish(mut self) -> Result<BindResult> {
        while self.step().is_some() {}
        let Stage::Done(assignment, vertices, binding) = self.stage else {
            return Err(RigError::InvalidArtifact("bind job stopped before its last pass".into()));
        };

        let unresolved = binding.unresolved().count();
        if unresolved > 0 {
            log::warn!("{} splats have no reference vertex", unresolved);
        }

        let artifact = RigArtifact::new(
            self.character.model_scale(),
            self.character.skeleton.capture_pose(),
            self.scene.rotation,
            &assignment,
            &binding,
        );
        Ok(BindResult {
            rig: self.rig,
            assignment,
            vertices,
            binding,
            artifact,
        })
    }
}

/// Bind a point cloud to a posed character.
///
/// Runs the nearest-capsule pass (1/3), the vertex pass (2/3) and the
/// splat binding pass (3/3). The character's current pose is the bind pose
/// and is recorded in the artifact.
pub fn bind_character(
    character: &Character,
    splats: &mut SplatBuffer,
    scene: &SplatScene,
    config: &RigConfig,
    sink: &mut dyn ProgressSink,
) -> Result<BindResult> {
    let mut job = BindJob::new(character, splats, scene, config)?;
    while let Some(update) = job.step() {
        sink.report(&update);
    }
    job.finish()
}

/// A loaded rig ready to animate.
#[derive(Debug, Clone)]
pub struct BoundCharacter {
    pub character: Character,
    /// Splats in partition order
    pub splats: SplatBuffer,
    pub scene: SplatScene,
    pub partition: Partition<usize>,
    /// One byte-exact point cloud per partition
    pub point_clouds: Vec<Vec<u8>>,
    /// Metadata reindexed to partition order
    pub artifact: RigArtifact,
    pub deformer: SkinDeformer,
    /// Splats hidden at load (stray or unbound), partition order
    pub hidden: Vec<usize>,
}

/// Result of [`load_rig`].
#[derive(Debug, Clone)]
pub struct LoadedRig {
    pub bound: BoundCharacter,
    /// Only one partition: animate the cloud as a whole
    pub coarse: bool,
}

fn check_indices(artifact: &RigArtifact, character: &Character) -> Result<()> {
    let bone_count = character.skeleton.len();
    if let Some(&b) = artifact.splat_bone_indices.iter().find(|&&b| b as usize >= bone_count) {
        return Err(RigError::InvalidArtifact(format!(
            "bone index {} out of range for {} bones",
            b, bone_count
        )));
    }
    let vertex_count = character.mesh.vertex_count();
    if let Some(v) = artifact
        .splat_vertex_indices
        .iter()
        .flatten()
        .find(|&&v| v as usize >= vertex_count)
    {
        return Err(RigError::InvalidArtifact(format!(
            "vertex index {} out of range for {} vertices",
            v, vertex_count
        )));
    }
    Ok(())
}

/// Reconstruct a bound character from a saved bundle.
///
/// The character is re-posed with the stored bone operations, the splats
/// are reindexed into bone-contiguous partitions, and stray or unbound
/// splats are hidden.
pub fn load_rig(
    bundle: &RigBundle,
    mut character: Character,
    config: &RigConfig,
    sink: &mut dyn ProgressSink,
) -> Result<LoadedRig> {
    let artifact = &bundle.artifact;
    artifact.validate()?;
    check_indices(artifact, &character)?;

    let ply = PlyData::decode(
        bundle.point_cloud.as_slice(),
        Some(bundle.point_cloud.len()),
        config,
        sink,
    )?;
    if ply.vertex_count() != artifact.splat_count() {
        return Err(RigError::InvalidArtifact(format!(
            "point cloud has {} splats, metadata describes {}",
            ply.vertex_count(),
            artifact.splat_count()
        )));
    }

    character.skeleton.set_pose(&artifact.bone_operations)?;

    let partition = partition_by_key(&artifact.bones());
    let artifact = artifact.reindexed(&partition);
    let mut splats = SplatBuffer::from_ply(&ply)?.permuted(&partition.order);
    let point_clouds = partition.split_point_cloud(&ply);

    let rotation0 = artifact.rotation0();
    let scene = SplatScene::with_rotation(rotation0);
    let scene_matrix = scene.matrix();
    let offsets = artifact.offsets();
    let vertices = artifact.vertices();

    let world_centers: Vec<Vec3> = (0..splats.len())
        .map(|i| splats.world_center(i, &scene_matrix))
        .collect();
    let root = character.bone_world_position(character.skeleton.root());
    let mut hidden = stray_splats(&offsets, &world_centers, root, config);
    let stray = hidden.len();
    hidden.extend(
        vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i)),
    );
    hidden.sort_unstable();
    hidden.dedup();
    splats.hide(&hidden);

    let deformer = SkinDeformer::new(
        character.skeleton.len(),
        &partition,
        character.bone_matrices(),
        vertices,
        offsets,
    );

    let coarse = partition.is_coarse();
    log::info!(
        "Loaded rig: {} splats in {} partitions, {} hidden ({} stray){}",
        splats.len(),
        partition.len(),
        hidden.len(),
        stray,
        if coarse { ", coarse mode" } else { "" }
    );

    Ok(LoadedRig {
        bound: BoundCharacter {
            character,
            splats,
            scene,
            partition,
            point_clouds,
            artifact,
            deformer,
            hidden,
        },
        coarse,
    })
}

impl BoundCharacter {
    /// Apply pose edits on top of the current pose
    pub fn pose(&mut self, operations: &[BoneOperation]) -> Result<()> {
        self.character.skeleton.apply_bone_operations(operations)
    }

    /// Copy another skeleton's pose; aborts on any role mismatch
    pub fn transfer_pose_from(&mut self, source: &Skeleton) -> Result<()> {
        transfer_pose(source, &mut self.character.skeleton)
    }

    /// Coarse per-partition placement for this frame
    pub fn update_by_bones(&mut self) -> Vec<PartitionPlacement> {
        self.deformer.update_by_bones(&self.character, self.scene.rotation)
    }

    /// Fine per-splat correction for this frame; returns splats updated
    pub fn deform(&mut self) -> usize {
        let live = self.character.bone_matrices();
        self.deformer
            .deform(&self.character, &live, &self.scene, &mut self.splats)
    }

    pub fn set_color_mode(&mut self, mode: ColorMode) {
        self.splats.set_color_mode(mode);
    }
}
