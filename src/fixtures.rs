//! Synthetic humanoid rig and captures shared by unit tests.

use crate::math::Covariance;
use crate::skeleton::{BoneDef, Character, HumanoidBone, Skeleton, SkinnedMesh};
use crate::splat::{SplatBuffer, SplatSnapshot};
use glam::{Mat4, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const HIPS_HEIGHT: f32 = 1.0;

const MESH_RADIUS: f32 = 0.04;
const MESH_RING: usize = 6;

/// (role, parent role, rest translation) in `HumanoidBone::ALL` order
fn humanoid_layout() -> Vec<(HumanoidBone, Option<HumanoidBone>, Vec3)> {
    use HumanoidBone::*;
    vec![
        (Hips, None, Vec3::new(0.0, HIPS_HEIGHT, 0.0)),
        (Spine, Some(Hips), Vec3::new(0.0, 0.1, 0.0)),
        (Chest, Some(Spine), Vec3::new(0.0, 0.15, 0.0)),
        (UpperChest, Some(Chest), Vec3::new(0.0, 0.15, 0.0)),
        (Neck, Some(UpperChest), Vec3::new(0.0, 0.1, 0.0)),
        (Head, Some(Neck), Vec3::new(0.0, 0.1, 0.0)),
        (HeadTopEnd, Some(Head), Vec3::new(0.0, 0.2, 0.0)),
        (LeftShoulder, Some(UpperChest), Vec3::new(0.05, 0.05, 0.0)),
        (LeftUpperArm, Some(LeftShoulder), Vec3::new(0.1, 0.0, 0.0)),
        (LeftLowerArm, Some(LeftUpperArm), Vec3::new(0.25, 0.0, 0.0)),
        (LeftHand, Some(LeftLowerArm), Vec3::new(0.25, 0.0, 0.0)),
        (RightShoulder, Some(UpperChest), Vec3::new(-0.05, 0.05, 0.0)),
        (RightUpperArm, Some(RightShoulder), Vec3::new(-0.1, 0.0, 0.0)),
        (RightLowerArm, Some(RightUpperArm), Vec3::new(-0.25, 0.0, 0.0)),
        (RightHand, Some(RightLowerArm), Vec3::new(-0.25, 0.0, 0.0)),
        (LeftUpperLeg, Some(Hips), Vec3::new(0.1, -0.05, 0.0)),
        (LeftLowerLeg, Some(LeftUpperLeg), Vec3::new(0.0, -0.42, 0.0)),
        (LeftFoot, Some(LeftLowerLeg), Vec3::new(0.0, -0.42, 0.0)),
        (LeftToes, Some(LeftFoot), Vec3::new(0.0, -0.05, 0.1)),
        (RightUpperLeg, Some(Hips), Vec3::new(-0.1, -0.05, 0.0)),
        (RightLowerLeg, Some(RightUpperLeg), Vec3::new(0.0, -0.42, 0.0)),
        (RightFoot, Some(RightLowerLeg), Vec3::new(0.0, -0.42, 0.0)),
        (RightToes, Some(RightFoot), Vec3::new(0.0, -0.05, 0.1)),
    ]
}

/// Humanoid skeleton with one bone per role, bone index == role index
pub fn humanoid_skeleton() -> Skeleton {
    humanoid_skeleton_without_roles(&[])
}

/// Humanoid skeleton lacking `role` (and anything below it)
pub fn humanoid_skeleton_without(role: HumanoidBone) -> Skeleton {
    humanoid_skeleton_without_roles(&[role])
}

fn humanoid_skeleton_without_roles(omit: &[HumanoidBone]) -> Skeleton {
    let mut index_of = std::collections::HashMap::new();
    let mut defs = Vec::new();
    for (role, parent, translation) in humanoid_layout() {
        if omit.contains(&role) {
            continue;
        }
        let parent = match parent {
            Some(p) => match index_of.get(&p) {
                Some(&i) => Some(i),
                None => continue,
            },
            None => None,
        };
        index_of.insert(role, defs.len());
        defs.push(BoneDef::new(format!("J_Bip_{}", role.name()), parent, translation).with_role(role));
    }
    Skeleton::new(defs).unwrap()
}

/// Tube mesh around every bone segment, rigidly skinned to the segment's parent bone
pub fn humanoid_mesh(skeleton: &Skeleton) -> SkinnedMesh {
    let mut positions = Vec::new();
    let mut skin_indices = Vec::new();
    for (bone, def) in skeleton.bones().iter().enumerate() {
        let Some(parent) = def.parent else { continue };
        let start = skeleton.world_position(parent);
        let end = skeleton.world_position(bone);
        let dir = (end - start).normalize();
        let up = if dir.abs().dot(Vec3::Y) > 0.99 { Vec3::X } else { Vec3::Y };
        let right = dir.cross(up).normalize();
        let up = right.cross(dir).normalize();

        for t in [0.25, 0.5, 0.75] {
            let center = start.lerp(end, t);
            for k in 0..MESH_RING {
                let (sin, cos) = (k as f32 / MESH_RING as f32 * std::f32::consts::TAU).sin_cos();
                positions.push(center + (right * cos + up * sin) * MESH_RADIUS);
                skin_indices.push([parent as u32, 0, 0, 0]);
            }
        }
    }
    let skin_weights = vec![[1.0, 0.0, 0.0, 0.0]; positions.len()];
    SkinnedMesh::new(positions, skin_indices, skin_weights, Vec::new()).unwrap()
}

pub fn humanoid_character() -> Character {
    let skeleton = humanoid_skeleton();
    let mesh = humanoid_mesh(&skeleton);
    Character::new(skeleton, mesh, Mat4::IDENTITY).unwrap()
}

/// World-space points scattered around the capsule-bearing bone segments
pub fn points_on_body(character: &Character, count: usize, seed: u64) -> Vec<Vec3> {
    let skeleton = &character.skeleton;
    let segments: Vec<(usize, usize)> = skeleton
        .bones()
        .iter()
        .enumerate()
        .filter_map(|(bone, def)| {
            let role = def.role?;
            crate::rig::capsule_shape(role)?;
            Some((def.parent?, bone))
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let (parent, bone) = segments[rng.random_range(0..segments.len())];
            let start = character.bone_world_position(parent);
            let end = character.bone_world_position(bone);
            let jitter = Vec3::new(
                rng.random_range(-0.04..0.04),
                rng.random_range(-0.04..0.04),
                rng.random_range(-0.04..0.04),
            );
            start.lerp(end, rng.random_range(0.1..0.9)) + jitter
        })
        .collect()
}

/// Splat buffer with the given centers, small isotropic Gaussians and opaque grey
pub fn splats_at(centers: &[Vec3]) -> SplatBuffer {
    SplatBuffer::new(SplatSnapshot {
        centers: centers.to_vec(),
        colors: vec![Vec4::new(0.5, 0.5, 0.5, 1.0); centers.len()],
        covariances: vec![Covariance::from_scale_rotation(Vec3::splat(0.01), glam::Quat::IDENTITY); centers.len()],
    })
    .unwrap()
}

/// Binary Gaussian-splat PLY with the given centers
pub fn gaussian_ply_bytes(centers: &[Vec3]) -> Vec<u8> {
    let names = [
        "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1",
        "rot_2", "rot_3",
    ];
    let rows: Vec<Vec<f32>> = centers
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let tint = (i % 7) as f32 * 0.1;
            vec![c.x, c.y, c.z, tint, 0.0, -tint, 2.0, -4.6, -4.6, -4.6, 1.0, 0.0, 0.0, 0.0]
        })
        .collect();
    encode_float_columns(&names, &rows)
}

/// Build a binary PLY from float columns; every property is `float`.
pub fn encode_float_columns(names: &[&str], rows: &[Vec<f32>]) -> Vec<u8> {
    let mut text = format!(
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\n",
        rows.len()
    );
    for name in names {
        text.push_str(&format!("property float {}\n", name));
    }
    text.push_str("end_header\n");

    let mut out = text.into_bytes();
    for row in rows {
        for v in row.iter().take(names.len()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}
