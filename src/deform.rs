//! Runtime deformation of bound splats.
//!
//! Coarse placement moves each bone's partition as one rigid body; fine
//! correction re-derives every splat from its reference vertex using the
//! change between the bind-time and live skin matrices.

use crate::math::{Covariance, Mat4Extended};
use crate::rig::Partition;
use crate::skeleton::{BoneMatrices, Character};
use crate::splat::{SplatBuffer, SplatScene};
use glam::{Mat3, Mat4, Quat, Vec3};

/// Whether a bone owns a splat partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoneState {
    #[default]
    Unbound,
    Bound {
        partition: usize,
    },
}

/// Rigid transform for one partition's scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionPlacement {
    pub partition: usize,
    pub bone: usize,
    pub position: Vec3,
    pub rotation: Quat,
}

/// Re-skins bound splats against a posed skeleton.
#[derive(Debug, Clone)]
pub struct SkinDeformer {
    /// Bind-time rotation of the point cloud root, recorded lazily
    rotation0: Option<Quat>,
    bone_states: Vec<BoneState>,
    /// Bone texture captured at bind time
    bind_bones: BoneMatrices,
    /// Reference vertex per splat, partition order
    vertices: Vec<Option<usize>>,
    /// Character-space offset per splat, partition order
    offsets: Vec<Vec3>,
}

impl SkinDeformer {
    pub fn new(
        bone_count: usize,
        partition: &Partition<usize>,
        bind_bones: BoneMatrices,
        vertices: Vec<Option<usize>>,
        offsets: Vec<Vec3>,
    ) -> Self {
        let mut bone_states = vec![BoneState::Unbound; bone_count];
        for (p, &bone) in partition.keys.iter().enumerate() {
            if let Some(state) = bone_states.get_mut(bone) {
                *state = BoneState::Bound { partition: p };
            }
        }
        Self {
            rotation0: None,
            bone_states,
            bind_bones,
            vertices,
            offsets,
        }
    }

    pub fn with_rotation0(mut self, rotation0: Quat) -> Self {
        self.rotation0 = Some(rotation0);
        self
    }

    pub fn rotation0(&self) -> Option<Quat> {
        self.rotation0
    }

    pub fn bone_state(&self, bone: usize) -> BoneState {
        self.bone_states.get(bone).copied().unwrap_or_default()
    }

    pub fn bind_bones(&self) -> &BoneMatrices {
        &self.bind_bones
    }

    /// Coarse placement for every bone with a child that owns a partition:
    /// the partition sits at the joint midpoint, rotated by the child's world
    /// rotation, the character rotation and the bind-time cloud rotation.
    ///
    /// The first call only records `scene_rotation` as the bind-time
    /// rotation and places nothing.
    pub fn update_by_bones(&mut self, character: &Character, scene_rotation: Quat) -> Vec<PartitionPlacement> {
        let Some(rotation0) = self.rotation0 else {
            self.rotation0 = Some(scene_rotation);
            return Vec::new();
        };

        let skeleton = &character.skeleton;
        let character_rotation = character.world_rotation();
        let mut placements = Vec::new();
        for (bone, def) in skeleton.bones().iter().enumerate() {
            for &child in &def.children {
                let BoneState::Bound { partition } = self.bone_state(child) else { continue };
                let start = character.bone_world_position(bone);
                let end = character.bone_world_position(child);
                let rotation = character.bone_world_rotation(child) * character_rotation * rotation0;
                placements.push(PartitionPlacement {
                    partition,
                    bone: child,
                    position: (start + end) * 0.5,
                    rotation: rotation.normalize(),
                });
            }
        }
        placements
    }

    /// `skinLive · inverse(skinBind)` for a splat's reference vertex;
    /// exactly identity when the vertex's skin matrix did not change.
    pub fn correction(&self, character: &Character, live: &BoneMatrices, splat: usize) -> Option<Mat4> {
        let vertex = self.vertices.get(splat).copied().flatten()?;
        let bind = character.mesh.skin_matrix(vertex, &self.bind_bones);
        let now = character.mesh.skin_matrix(vertex, live);
        if bind == now {
            return Some(Mat4::IDENTITY);
        }
        Some(now * bind.inverse())
    }

    /// Live center and covariance of one splat in the cloud's own frame.
    pub fn deform_splat(
        &self,
        character: &Character,
        live: &BoneMatrices,
        scene: &SplatScene,
        splats: &SplatBuffer,
        splat: usize,
    ) -> Option<(Vec3, Covariance)> {
        let m = self.correction(character, live, splat)?;
        let bind = splats.bind();
        if m == Mat4::IDENTITY {
            return Some((bind.centers[splat], bind.covariances[splat]));
        }

        let vertex = self.vertices[splat]?;
        let local = character.mesh.skinned_position(vertex, live) + m.transform_vector3(self.offsets[splat]);
        let world = character.transform.transform_point3(local);
        let center = scene.matrix().inverse().transform_point3(world);

        // Skin rotation is expressed in character space; move it into the cloud's frame
        let frame = Mat3::from_quat(scene.rotation.inverse() * character.world_rotation());
        let rotation = frame * m.rotation_part() * frame.transpose();
        Some((center, bind.covariances[splat].transformed(rotation)))
    }

    /// Write live centers and covariances for every bound splat.
    /// Returns the number of splats updated.
    pub fn deform(
        &self,
        character: &Character,
        live: &BoneMatrices,
        scene: &SplatScene,
        splats: &mut SplatBuffer,
    ) -> usize {
        let mut updated = 0;
        for i in 0..splats.len().min(self.vertices.len()) {
            if let Some((center, covariance)) = self.deform_splat(character, live, scene, splats, i) {
                splats.set_center(i, center);
                splats.set_covariance(i, covariance);
                updated += 1;
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RigConfig;
    use crate::fixtures;
    use crate::progress::NoProgress;
    use crate::rig::{assign_bones, assign_vertices, bind_splats, partition_by_key, CapsuleRig};
    use crate::skeleton::HumanoidBone;

    struct Bound {
        character: Character,
        splats: SplatBuffer,
        scene: SplatScene,
        deformer: SkinDeformer,
        bones: Vec<usize>,
    }

    fn bound() -> Bound {
        let character = fixtures::humanoid_character();
        let rig = CapsuleRig::build(&character);
        let config = RigConfig::default();
        let scene = SplatScene::identity();
        let points = fixtures::points_on_body(&character, 200, 5);
        let mut splats = fixtures::splats_at(&points);
        let bind_bones = character.bone_matrices();

        let assignment = assign_bones(&mut splats, &scene, &rig, &config, &mut NoProgress).unwrap();
        let vertices = assign_vertices(&character, &rig, &bind_bones, &config, &mut NoProgress).unwrap();
        let binding = bind_splats(
            &character,
            &splats,
            &scene,
            &assignment,
            &vertices,
            &bind_bones,
            &config,
            &mut NoProgress,
        );

        let partition = partition_by_key(&assignment.bones);
        let splats = splats.permuted(&partition.order);
        let deformer = SkinDeformer::new(
            character.skeleton.len(),
            &partition,
            bind_bones,
            partition.permute(&binding.vertices),
            partition.permute(&binding.offsets),
        );
        Bound {
            character,
            splats,
            scene,
            deformer,
            bones: partition.permute(&assignment.bones),
        }
    }

    #[test]
    fn test_first_update_only_records_rotation() {
        let mut b = bound();
        let flip = Quat::from_rotation_z(std::f32::consts::PI);
        assert!(b.deformer.update_by_bones(&b.character, flip).is_empty());
        assert_eq!(b.deformer.rotation0(), Some(flip));

        let placements = b.deformer.update_by_bones(&b.character, Quat::IDENTITY);
        assert!(!placements.is_empty());
        assert_eq!(b.deformer.rotation0(), Some(flip), "Later calls keep the first rotation");
    }

    #[test]
    fn test_coarse_placement_midpoint_and_rotation() {
        let mut b = bound();
        b.deformer = b.deformer.with_rotation0(Quat::IDENTITY);
        let skeleton = &b.character.skeleton;
        let hand = skeleton.bone_by_role(HumanoidBone::LeftHand).unwrap();
        let lower_arm = skeleton.bone_by_role(HumanoidBone::LeftLowerArm).unwrap();
        b.character
            .skeleton
            .set_local_rotation(lower_arm, Quat::from_rotation_z(0.5));

        let placements = b.deformer.update_by_bones(&b.character, Quat::IDENTITY);
        let hand_place = placements.iter().find(|p| p.bone == hand).unwrap();
        let expected = (b.character.bone_world_position(lower_arm) + b.character.bone_world_position(hand)) * 0.5;
        assert!(hand_place.position.distance(expected) < 1e-5);
        assert!(hand_place.rotation.angle_between(Quat::from_rotation_z(0.5)) < 1e-4);

        // Every placement belongs to a bound bone
        for p in &placements {
            assert_eq!(b.deformer.bone_state(p.bone), BoneState::Bound { partition: p.partition });
        }
        assert_eq!(b.deformer.bone_state(b.character.skeleton.root()), BoneState::Unbound);
    }

    #[test]
    fn test_identity_at_bind_pose_is_exact() {
        let mut b = bound();
        let live = b.character.bone_matrices();
        let updated = b.deformer.deform(&b.character, &live, &b.scene, &mut b.splats);
        assert!(updated > 0);
        assert_eq!(b.splats.centers(), &b.splats.bind().centers[..]);
        assert_eq!(b.splats.covariances(), &b.splats.bind().covariances[..]);
    }

    #[test]
    fn test_fine_correction_follows_bone() {
        let mut b = bound();
        let lower_arm = b.character.skeleton.bone_by_role(HumanoidBone::LeftLowerArm).unwrap();
        let hand = b.character.skeleton.bone_by_role(HumanoidBone::LeftHand).unwrap();
        let joint = b.character.bone_world_position(lower_arm);
        let turn = Quat::from_rotation_z(0.8);
        b.character.skeleton.set_local_rotation(lower_arm, turn);

        let live = b.character.bone_matrices();
        b.deformer.deform(&b.character, &live, &b.scene, &mut b.splats);

        let mut checked = 0;
        for i in 0..b.splats.len() {
            if b.bones[i] != hand {
                continue;
            }
            let rest = b.splats.bind().centers[i];
            let now = b.splats.centers()[i];
            let expected = joint + turn * (rest - joint);
            assert!(now.distance(expected) < 1e-4, "Splat {} should rotate rigidly with the forearm", i);

            let cov = b.splats.covariances()[i];
            let expected_cov = b.splats.bind().covariances[i].transformed(Mat3::from_quat(turn));
            for (a, e) in cov.0.iter().zip(expected_cov.0) {
                assert!((a - e).abs() < 1e-6);
            }
            checked += 1;
        }
        assert!(checked > 0, "Fixture should bind some splats to the hand capsule");
    }
}
