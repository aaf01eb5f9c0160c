use super::hierarchy::Skeleton;
use crate::error::{Result, RigError};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Euler angles in degrees for JSON authoring (more intuitive than quaternions)
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct EulerAngles {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl EulerAngles {
    /// Convert to quaternion (XYZ order)
    pub fn to_quat(&self) -> Quat {
        Quat::from_euler(
            glam::EulerRot::XYZ,
            self.x.to_radians(),
            self.y.to_radians(),
            self.z.to_radians(),
        )
    }

    /// Convert from quaternion (XYZ order)
    pub fn from_quat(q: Quat) -> Self {
        let (x, y, z) = q.to_euler(glam::EulerRot::XYZ);
        Self {
            x: x.to_degrees(),
            y: y.to_degrees(),
            z: z.to_degrees(),
        }
    }
}

/// Translation delta in the bone's parent space
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct PositionDelta {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl From<PositionDelta> for Vec3 {
    fn from(d: PositionDelta) -> Self {
        Vec3::new(d.x, d.y, d.z)
    }
}

impl From<Vec3> for PositionDelta {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

/// One pose edit: nudge a bone and/or set its rotation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoneOperation {
    /// Humanoid role name (e.g. "leftUpperArm") or raw bone name
    pub bone_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<EulerAngles>,
}

/// A pose file: `{ "boneOperations": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseAsset {
    #[serde(default)]
    pub bone_operations: Vec<BoneOperation>,
}

/// Relaxed standing pose shipped with the crate (validated by build.rs)
pub const DEFAULT_POSE_JSON: &str = include_str!("../../assets/poses/default_pose.json");

impl PoseAsset {
    pub fn default_pose() -> Result<Self> {
        Self::from_json(DEFAULT_POSE_JSON)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Skeleton {
    /// Apply operations in order. Every name is resolved before anything
    /// changes, so an unknown bone leaves the pose untouched.
    pub fn apply_bone_operations(&mut self, operations: &[BoneOperation]) -> Result<()> {
        let resolved = operations
            .iter()
            .map(|op| {
                self.resolve(&op.bone_name)
                    .ok_or_else(|| RigError::UnknownBone(op.bone_name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        for (op, bone) in operations.iter().zip(resolved) {
            if let Some(delta) = op.position {
                let offset = self.position_offset(bone) + Vec3::from(delta);
                self.set_position_offset(bone, offset);
            }
            if let Some(euler) = op.rotation {
                self.set_local_rotation(bone, euler.to_quat());
            }
        }
        log::debug!("Applied {} bone operations", operations.len());
        Ok(())
    }

    /// Reset to rest, then apply `operations`
    pub fn set_pose(&mut self, operations: &[BoneOperation]) -> Result<()> {
        // Validate first so a bad pose does not wipe the current one
        if let Some(op) = operations.iter().find(|op| self.resolve(&op.bone_name).is_none()) {
            return Err(RigError::UnknownBone(op.bone_name.clone()));
        }
        self.reset_pose();
        self.apply_bone_operations(operations)
    }

    /// Current pose of every role-bound bone that differs from rest,
    /// expressed as operations that `set_pose` reproduces.
    pub fn capture_pose(&self) -> Vec<BoneOperation> {
        self.bones()
            .iter()
            .enumerate()
            .filter_map(|(i, bone)| {
                let role = bone.role?;
                let offset = self.position_offset(i);
                let rotation = self.local_rotation(i);
                let moved = offset != Vec3::ZERO;
                let turned = rotation != bone.rest_rotation;
                if !moved && !turned {
                    return None;
                }
                Some(BoneOperation {
                    bone_name: role.name().to_string(),
                    position: moved.then(|| offset.into()),
                    rotation: turned.then(|| EulerAngles::from_quat(rotation)),
                })
            })
            .collect()
    }
}

/// Copy the pose of every role-bound bone from `source` onto `target`.
///
/// The role-name sets must match exactly; otherwise nothing is copied and
/// the names present only in `source` (extra) or only in `target` (missing)
/// are reported.
pub fn transfer_pose(source: &Skeleton, target: &mut Skeleton) -> Result<()> {
    let source_roles = source.role_names();
    let target_roles = target.role_names();
    if source_roles != target_roles {
        let extra: Vec<String> = source_roles
            .difference(&target_roles)
            .map(|s| s.to_string())
            .collect();
        let missing: Vec<String> = target_roles
            .difference(&source_roles)
            .map(|s| s.to_string())
            .collect();
        log::warn!("Pose transfer aborted: extra {:?}, missing {:?}", extra, missing);
        return Err(RigError::TopologyMismatch { extra, missing });
    }

    for (i, bone) in source.bones().iter().enumerate() {
        let Some(role) = bone.role else { continue };
        if let Some(j) = target.bone_by_role(role) {
            target.set_position_offset(j, source.position_offset(i));
            target.set_local_rotation(j, source.local_rotation(i));
        }
    }
    Ok(())
}
