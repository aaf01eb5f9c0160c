use super::capsule::{id_color, CapsuleRig};
use crate::config::RigConfig;
use crate::error::Result;
use crate::progress::{Batches, ProgressSink, ProgressUpdate};
use crate::splat::{SplatBuffer, SplatScene};
use glam::Mat4;

/// Per-splat owner bone, the output of the nearest-capsule pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneAssignment {
    /// Bone id per splat
    pub bones: Vec<usize>,
    /// Capsule index per splat (selects the id colour)
    pub capsules: Vec<usize>,
    /// Splats that got a full nearest-capsule search
    pub exact_evaluations: usize,
}

/// State threaded through the sampling loop: the last exact winner is
/// reused by skipped splats in fast mode.
#[derive(Debug, Clone, Copy, Default)]
struct Sticky {
    best: usize,
    exact: usize,
}

/// Resumable nearest-capsule pass over every splat (pass 1/3).
#[derive(Debug, Clone)]
pub struct BoneAssignPass {
    scene_matrix: Mat4,
    step: usize,
    fast: bool,
    batches: Batches,
    sticky: Sticky,
    capsules: Vec<usize>,
}

impl BoneAssignPass {
    pub fn new(rig: &CapsuleRig, scene: &SplatScene, splat_count: usize, config: &RigConfig) -> Result<Self> {
        rig.ensure_usable()?;
        Ok(Self {
            scene_matrix: scene.matrix(),
            step: config.bone_step(),
            fast: config.fast,
            batches: Batches::new(1, 3, splat_count, config.yield_batch),
            sticky: Sticky::default(),
            capsules: Vec::with_capacity(splat_count),
        })
    }

    /// Search one batch of splats; `None` once all are assigned
    pub fn step(&mut self, splats: &SplatBuffer, rig: &CapsuleRig) -> Option<ProgressUpdate> {
        let range = self.batches.next_batch()?;
        let (scene_matrix, step) = (self.scene_matrix, self.step);
        let capsules = &mut self.capsules;
        self.sticky = range.fold(self.sticky, |mut state, i| {
            if i % step == 0 {
                let p = splats.world_center(i, &scene_matrix);
                state.best = rig.nearest(p).unwrap_or(0);
                state.exact += 1;
            }
            capsules.push(state.best);
            state
        });
        Some(self.batches.update())
    }

    /// Paint the id colours and resolve capsules to bone ids. Batches not
    /// yet stepped are processed first.
    pub fn finish(mut self, splats: &mut SplatBuffer, rig: &CapsuleRig) -> BoneAssignment {
        while self.step(splats, rig).is_some() {}

        for (i, &ci) in self.capsules.iter().enumerate() {
            splats.set_rgb(i, id_color(ci));
        }
        splats.freeze_assignment_colors();

        let bone_ids = rig.bone_ids();
        let bones = self.capsules.iter().map(|&ci| bone_ids[ci]).collect();

        log::info!(
            "Assigned {} splats to bones ({} exact searches{})",
            self.capsules.len(),
            self.sticky.exact,
            if self.fast { ", fast mode" } else { "" }
        );

        BoneAssignment {
            bones,
            capsules: self.capsules,
            exact_evaluations: self.sticky.exact,
        }
    }
}

/// Assign every splat to the bone whose capsule surface is nearest to its
/// bind-pose world center, painting the capsule id colour onto the splat.
///
/// With `config.fast`, only every `bone_stride`-th splat is searched; the
/// rest inherit the preceding exact result.
pub fn assign_bones(
    splats: &mut SplatBuffer,
    scene: &SplatScene,
    rig: &CapsuleRig,
    config: &RigConfig,
    sink: &mut dyn ProgressSink,
) -> Result<BoneAssignment> {
    let mut pass = BoneAssignPass::new(rig, scene, splats.len(), config)?;
    while let Some(update) = pass.step(splats, rig) {
        sink.report(&update);
    }
    Ok(pass.finish(splats, rig))
}
