//! Canonical humanoid bone role names shared by build.rs and the runtime.
//!
//! This module is included by both the build script (to validate pose
//! assets) and the skeleton module (to name `HumanoidBone` roles).

/// camelCase role names, indexed by `HumanoidBone` discriminant
pub const HUMANOID_BONE_NAMES: [&str; 23] = [
    "hips",
    "spine",
    "chest",
    "upperChest",
    "neck",
    "head",
    "headTopEnd",
    "leftShoulder",
    "leftUpperArm",
    "leftLowerArm",
    "leftHand",
    "rightShoulder",
    "rightUpperArm",
    "rightLowerArm",
    "rightHand",
    "leftUpperLeg",
    "leftLowerLeg",
    "leftFoot",
    "leftToes",
    "rightUpperLeg",
    "rightLowerLeg",
    "rightFoot",
    "rightToes",
];
