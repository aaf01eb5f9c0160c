use super::role_names::HUMANOID_BONE_NAMES;
use static_assertions::const_assert_eq;

/// Canonical humanoid role a skeleton bone can be bound to.
/// Ordered parents before children, as in a standard humanoid rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum HumanoidBone {
    // Torso
    Hips = 0,
    Spine = 1,
    Chest = 2,
    UpperChest = 3,
    Neck = 4,
    Head = 5,
    HeadTopEnd = 6,

    // Left arm chain
    LeftShoulder = 7,
    LeftUpperArm = 8,
    LeftLowerArm = 9,
    LeftHand = 10,

    // Right arm chain
    RightShoulder = 11,
    RightUpperArm = 12,
    RightLowerArm = 13,
    RightHand = 14,

    // Left leg chain
    LeftUpperLeg = 15,
    LeftLowerLeg = 16,
    LeftFoot = 17,
    LeftToes = 18,

    // Right leg chain
    RightUpperLeg = 19,
    RightLowerLeg = 20,
    RightFoot = 21,
    RightToes = 22,
}

const_assert_eq!(HumanoidBone::COUNT, HUMANOID_BONE_NAMES.len());

impl HumanoidBone {
    /// Number of canonical roles
    pub const COUNT: usize = 23;

    /// Convert to array index
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// All roles in discriminant order
    pub const ALL: [HumanoidBone; Self::COUNT] = [
        HumanoidBone::Hips,
        HumanoidBone::Spine,
        HumanoidBone::Chest,
        HumanoidBone::UpperChest,
        HumanoidBone::Neck,
        HumanoidBone::Head,
        HumanoidBone::HeadTopEnd,
        HumanoidBone::LeftShoulder,
        HumanoidBone::LeftUpperArm,
        HumanoidBone::LeftLowerArm,
        HumanoidBone::LeftHand,
        HumanoidBone::RightShoulder,
        HumanoidBone::RightUpperArm,
        HumanoidBone::RightLowerArm,
        HumanoidBone::RightHand,
        HumanoidBone::LeftUpperLeg,
        HumanoidBone::LeftLowerLeg,
        HumanoidBone::LeftFoot,
        HumanoidBone::LeftToes,
        HumanoidBone::RightUpperLeg,
        HumanoidBone::RightLowerLeg,
        HumanoidBone::RightFoot,
        HumanoidBone::RightToes,
    ];

    /// camelCase role name used in pose files
    #[inline]
    pub fn name(self) -> &'static str {
        HUMANOID_BONE_NAMES[self.index()]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|role| role.name() == name)
    }
}
