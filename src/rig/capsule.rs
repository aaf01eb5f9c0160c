use crate::error::{Result, RigError};
use crate::math::closest_point_on_triangle;
use crate::skeleton::{Character, HumanoidBone};
use glam::{Mat4, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::OnceLock;

/// Ring resolution of the proxy capsule
pub const RADIAL_SEGMENTS: usize = 6;

/// Number of entries in the id colour palette
pub const PALETTE_SIZE: usize = 100;

const PALETTE_SEED: u64 = 0;

/// Radius and cross-section stretch of a capsule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapsuleShape {
    pub radius: f32,
    pub scale_x: f32,
    pub scale_z: f32,
}

impl CapsuleShape {
    const fn new(radius: f32, scale_x: f32, scale_z: f32) -> Self {
        Self {
            radius,
            scale_x,
            scale_z,
        }
    }
}

impl Default for CapsuleShape {
    fn default() -> Self {
        Self::new(0.03, 1.0, 1.0)
    }
}

/// Anatomical capsule table, keyed by the role of the segment's child bone.
/// Roles not listed produce no capsule.
pub fn capsule_shape(child: HumanoidBone) -> Option<CapsuleShape> {
    use HumanoidBone::*;
    match child {
        LeftLowerArm | RightLowerArm | LeftHand | RightHand => Some(CapsuleShape::new(0.06, 1.0, 1.0)),
        LeftLowerLeg | RightLowerLeg | LeftFoot | RightFoot => Some(CapsuleShape::new(0.08, 1.0, 1.0)),
        Neck | Spine | Chest | UpperChest => Some(CapsuleShape::new(0.03, 6.0, 4.0)),
        HeadTopEnd => Some(CapsuleShape::new(0.06, 1.5, 2.0)),
        Head => Some(CapsuleShape::new(0.03, 2.0, 2.0)),
        _ => None,
    }
}

/// Fixed pseudo-random id colours, identical across runs.
pub fn palette() -> &'static [[u8; 3]; PALETTE_SIZE] {
    static PALETTE: OnceLock<[[u8; 3]; PALETTE_SIZE]> = OnceLock::new();
    PALETTE.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PALETTE_SEED);
        std::array::from_fn(|_| [rng.random::<u8>(), rng.random::<u8>(), rng.random::<u8>()])
    })
}

/// Palette entry for a capsule creation index, as 0..1 rgb
pub fn id_color(capsule_index: usize) -> Vec3 {
    let [r, g, b] = palette()[capsule_index % PALETTE_SIZE];
    Vec3::new(r as f32, g as f32, b as f32) / 255.0
}

/// One bone segment's proxy capsule in world space.
#[derive(Debug, Clone)]
pub struct Capsule {
    /// Skeleton index of the child bone; the id splats are assigned to
    pub bone: usize,
    pub parent: usize,
    pub role: HumanoidBone,
    pub shape: CapsuleShape,
    pub midpoint: Vec3,
    pub rotation: Quat,
    /// Straight section length (inter-joint distance minus both caps)
    pub length: f32,
    pub triangles: Vec<[Vec3; 3]>,
}

impl Capsule {
    fn new(parent: usize, bone: usize, role: HumanoidBone, start: Vec3, end: Vec3, shape: CapsuleShape) -> Self {
        let distance = start.distance(end);
        let length = (distance - shape.radius * 2.0).max(0.0);
        let midpoint = (start + end) * 0.5;
        let dir = (end - start).normalize_or_zero();
        let rotation = if dir == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(Vec3::Y, dir)
        };

        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(shape.scale_x, 1.0, shape.scale_z),
            rotation,
            midpoint,
        );
        let triangles = capsule_triangles(shape.radius, length)
            .into_iter()
            .map(|t| t.map(|v| transform.transform_point3(v)))
            .collect();

        Self {
            bone,
            parent,
            role,
            shape,
            midpoint,
            rotation,
            length,
            triangles,
        }
    }

    /// Distance from `p` to the nearest proxy triangle
    pub fn distance(&self, p: Vec3) -> f32 {
        self.triangles
            .iter()
            .map(|[a, b, c]| p.distance(closest_point_on_triangle(p, *a, *b, *c)))
            .fold(f32::INFINITY, f32::min)
    }
}

/// Local-space capsule along +Y: two quarter-circle caps joined by a
/// straight section, lathed around Y.
fn capsule_triangles(radius: f32, length: f32) -> Vec<[Vec3; 3]> {
    let h = length * 0.5;
    let d = std::f32::consts::FRAC_1_SQRT_2 * radius;
    // (distance from axis, height), bottom pole to top pole
    let profile = [
        (0.0, -h - radius),
        (d, -h - d),
        (radius, -h),
        (radius, h),
        (d, h + d),
        (0.0, h + radius),
    ];

    let ring = |i: usize| {
        let phi = i as f32 / RADIAL_SEGMENTS as f32 * std::f32::consts::TAU;
        let (sin, cos) = phi.sin_cos();
        profile.map(|(x, y)| Vec3::new(x * sin, y, x * cos))
    };

    let mut triangles = Vec::with_capacity(RADIAL_SEGMENTS * (profile.len() - 1) * 2);
    for i in 0..RADIAL_SEGMENTS {
        let here = ring(i);
        let next = ring(i + 1);
        for j in 0..profile.len() - 1 {
            let (a, b, c, d) = (here[j], next[j], next[j + 1], here[j + 1]);
            triangles.push([a, b, d]);
            triangles.push([c, d, b]);
        }
    }
    triangles
}

/// Pre-order walk: each child's capsule is emitted just before its own subtree.
fn visit(character: &Character, node: usize, capsules: &mut Vec<Capsule>) {
    let skeleton = &character.skeleton;
    let start = character.bone_world_position(node);
    for &child in &skeleton.bone(node).children {
        let role = skeleton.bone(child).role;
        if let Some((role, shape)) = role.and_then(|r| capsule_shape(r).map(|s| (r, s))) {
            let end = character.bone_world_position(child);
            log::debug!(
                "Capsule {}: {} -> {} (r={})",
                capsules.len(),
                skeleton.bone(node).name,
                skeleton.bone(child).name,
                shape.radius
            );
            capsules.push(Capsule::new(node, child, role, start, end, shape));
        }
        visit(character, child, capsules);
    }
}

/// Proxy capsules for every rig-relevant bone segment.
#[derive(Debug, Clone, Default)]
pub struct CapsuleRig {
    /// In creation order; the index is the id-colour index
    pub capsules: Vec<Capsule>,
}

impl CapsuleRig {
    /// Walk the skeleton depth-first from its root and emit one capsule per
    /// (bone, child) pair whose child role is in the capsule table.
    pub fn build(character: &Character) -> Self {
        let mut capsules = Vec::new();
        visit(character, character.skeleton.root(), &mut capsules);
        log::info!("Built {} capsules", capsules.len());
        Self { capsules }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.capsules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.capsules.is_empty()
    }

    /// Bone id per capsule index
    pub fn bone_ids(&self) -> Vec<usize> {
        self.capsules.iter().map(|c| c.bone).collect()
    }

    pub fn triangle_count(&self) -> usize {
        self.capsules.iter().map(|c| c.triangles.len()).sum()
    }

    /// Fail early when there is nothing to assign against
    pub fn ensure_usable(&self) -> Result<()> {
        if self.triangle_count() == 0 {
            return Err(RigError::EmptyRig);
        }
        Ok(())
    }

    /// Capsule with the nearest proxy surface; ties keep the first capsule.
    pub fn nearest(&self, p: Vec3) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (ci, capsule) in self.capsules.iter().enumerate() {
            let d = capsule.distance(p);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((ci, d));
            }
        }
        best.map(|(ci, _)| ci)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_palette_is_deterministic() {
        let a = *palette();
        let b = {
            let mut rng = StdRng::seed_from_u64(PALETTE_SEED);
            std::array::from_fn::<_, PALETTE_SIZE, _>(|_| [rng.random::<u8>(), rng.random::<u8>(), rng.random::<u8>()])
        };
        assert_eq!(a, b);
        assert_ne!(palette()[0], palette()[1]);
    }

    #[test]
    fn test_capsule_table() {
        assert_eq!(capsule_shape(HumanoidBone::LeftHand).unwrap().radius, 0.06);
        assert_eq!(capsule_shape(HumanoidBone::RightFoot).unwrap().radius, 0.08);
        assert_eq!(capsule_shape(HumanoidBone::Chest).unwrap().scale_x, 6.0);
        assert_eq!(capsule_shape(HumanoidBone::HeadTopEnd).unwrap().scale_z, 2.0);
        assert!(capsule_shape(HumanoidBone::LeftUpperArm).is_none());
        assert!(capsule_shape(HumanoidBone::Hips).is_none());
    }

    #[test]
    fn test_build_from_humanoid() {
        let character = fixtures::humanoid_character();
        let rig = CapsuleRig::build(&character);

        // 6 torso/head segments, 4 arm segments, 4 leg segments
        assert_eq!(rig.len(), 14);
        assert_eq!(rig.triangle_count(), 14 * RADIAL_SEGMENTS * 5 * 2);

        // Depth-first from the hips: the spine comes first
        let spine = character.skeleton.bone_by_role(HumanoidBone::Spine).unwrap();
        assert_eq!(rig.capsules[0].bone, spine);

        for capsule in &rig.capsules {
            assert!(capsule_shape(capsule.role).is_some());
            assert_eq!(character.skeleton.bone(capsule.bone).parent, Some(capsule.parent));
        }
    }

    #[test]
    fn test_capsule_surface_distance() {
        let shape = CapsuleShape::default();
        let capsule = Capsule::new(0, 1, HumanoidBone::Spine, Vec3::ZERO, Vec3::Y, shape);
        assert!((capsule.length - 0.94).abs() < 1e-6);
        assert_eq!(capsule.midpoint, Vec3::new(0.0, 0.5, 0.0));

        // On the axis the nearest surface is at most one radius away
        assert!(capsule.distance(Vec3::new(0.0, 0.5, 0.0)) <= shape.radius + 1e-5);
        // Far along +X the distance approaches the gap to the side wall
        let d = capsule.distance(Vec3::new(1.0, 0.5, 0.0));
        assert!(d > 1.0 - shape.radius - 1e-3 && d < 1.0, "got {}", d);
    }

    #[test]
    fn test_short_segment_clamps_length() {
        let capsule = Capsule::new(0, 1, HumanoidBone::Head, Vec3::ZERO, Vec3::Y * 0.01, CapsuleShape::default());
        assert_eq!(capsule.length, 0.0);
        assert!(!capsule.triangles.is_empty());
    }

    #[test]
    fn test_nearest_prefers_closest_capsule() {
        let character = fixtures::humanoid_character();
        let rig = CapsuleRig::build(&character);
        let hand = character.skeleton.bone_by_role(HumanoidBone::LeftHand).unwrap();
        let lower_arm = character.skeleton.bone_by_role(HumanoidBone::LeftLowerArm).unwrap();

        // Midway between left lower arm joint and hand joint
        let p = (character.bone_world_position(lower_arm) + character.bone_world_position(hand)) * 0.5;
        let ci = rig.nearest(p).unwrap();
        assert_eq!(rig.capsules[ci].bone, hand);
    }
}
