use super::hierarchy::{BoneDef, Skeleton};
use super::mesh::{BoneMatrices, SkinnedMesh};
use super::pose::BoneOperation;
use super::role::HumanoidBone;
use crate::error::{Result, RigError};
use crate::math::Mat4Extended;
use glam::{Mat4, Quat, Vec3};
use serde::Deserialize;

/// Skeleton plus skinned mesh placed in the world by a root transform.
#[derive(Debug, Clone)]
pub struct Character {
    pub skeleton: Skeleton,
    pub mesh: SkinnedMesh,
    /// Root world transform (scale, rotation, translation)
    pub transform: Mat4,
}

impl Character {
    /// Bind `mesh` to the skeleton's current pose and place the result.
    pub fn new(skeleton: Skeleton, mut mesh: SkinnedMesh, transform: Mat4) -> Result<Self> {
        mesh.bind(&skeleton, Mat4::IDENTITY)?;
        Ok(Self {
            skeleton,
            mesh,
            transform,
        })
    }

    /// Uniform scale of the root transform
    pub fn model_scale(&self) -> f32 {
        self.transform.x_axis.truncate().length()
    }

    pub fn world_rotation(&self) -> Quat {
        self.transform.rotation_quat()
    }

    pub fn bone_world_matrix(&self, bone: usize) -> Mat4 {
        self.transform * self.skeleton.world_matrix(bone)
    }

    pub fn bone_world_position(&self, bone: usize) -> Vec3 {
        self.bone_world_matrix(bone).position()
    }

    pub fn bone_world_rotation(&self, bone: usize) -> Quat {
        self.bone_world_matrix(bone).rotation_quat()
    }

    /// Bone texture for the current pose
    pub fn bone_matrices(&self) -> BoneMatrices {
        self.mesh.bone_matrices(&self.skeleton)
    }

    /// Skinned vertex in world space
    pub fn skinned_vertex_world(&self, vertex: usize, bones: &BoneMatrices) -> Vec3 {
        self.transform
            .transform_point3(self.mesh.skinned_position(vertex, bones))
    }
}

/// One bone as described by the host's model loader.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoneDesc {
    pub name: String,
    /// Humanoid role name from the model's semantic binding
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub translation: Vec3,
    /// `[x, y, z, w]`
    #[serde(default)]
    pub rotation: Quat,
}

/// Plain-data character handed over by the host: rest skeleton, skinned
/// mesh attributes, root transform and the pose to bind in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDesc {
    pub bones: Vec<BoneDesc>,
    pub positions: Vec<Vec3>,
    pub skin_indices: Vec<[u32; 4]>,
    pub skin_weights: Vec<[f32; 4]>,
    #[serde(default)]
    pub indices: Vec<u32>,
    /// Column-major root transform
    #[serde(default)]
    pub transform: Mat4,
    #[serde(default)]
    pub bone_operations: Vec<BoneOperation>,
}

impl CharacterDesc {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Bind the mesh at rest, then apply the pose operations.
    pub fn build(self) -> Result<Character> {
        let defs = self
            .bones
            .into_iter()
            .map(|bone| {
                let role = bone
                    .role
                    .as_deref()
                    .map(|name| {
                        HumanoidBone::from_name(name).ok_or_else(|| {
                            RigError::InvalidSkeleton(format!("unknown role '{}' on bone '{}'", name, bone.name))
                        })
                    })
                    .transpose()?;
                let mut def = BoneDef::new(bone.name, bone.parent, bone.translation).with_rotation(bone.rotation);
                def.role = role;
                Ok(def)
            })
            .collect::<Result<Vec<_>>>()?;

        let skeleton = Skeleton::new(defs)?;
        let mesh = SkinnedMesh::new(self.positions, self.skin_indices, self.skin_weights, self.indices)?;
        let mut character = Character::new(skeleton, mesh, self.transform)?;
        character.skeleton.apply_bone_operations(&self.bone_operations)?;
        log::info!(
            "Built character: {} bones, {} vertices",
            character.skeleton.len(),
            character.mesh.vertex_count()
        );
        Ok(character)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: &str = r#"{
        "bones": [
            { "name": "J_Hips", "role": "hips", "translation": [0, 1, 0] },
            { "name": "J_Spine", "role": "spine", "parent": 0, "translation": [0, 0.2, 0] },
            { "name": "J_Head", "role": "head", "parent": 1, "translation": [0, 0.4, 0] }
        ],
        "positions": [[0, 1, 0], [0, 1.5, 0]],
        "skinIndices": [[0, 0, 0, 0], [1, 0, 0, 0]],
        "skinWeights": [[1, 0, 0, 0], [1, 0, 0, 0]],
        "boneOperations": [{ "boneName": "spine", "rotation": { "x": 20 } }]
    }"#;

    #[test]
    fn test_desc_builds_posed_character() {
        let character = CharacterDesc::from_json(DESC).unwrap().build().unwrap();
        let spine = character.skeleton.bone_by_role(HumanoidBone::Spine).unwrap();
        assert_eq!(spine, 1);
        assert_eq!(character.transform, Mat4::IDENTITY);
        assert!(
            character.skeleton.local_rotation(spine).angle_between(Quat::from_rotation_x(20f32.to_radians())) < 1e-4,
            "Pose operations apply after binding"
        );
        assert!(character.bone_matrices().get(0).abs_diff_eq(Mat4::IDENTITY, 1e-6), "Hips stay at rest");
        assert!(!character.bone_matrices().get(1).abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_desc_rejects_unknown_role() {
        let json = DESC.replace("\"head\"", "\"noggin\"");
        let err = CharacterDesc::from_json(&json).unwrap().build().unwrap_err();
        assert!(matches!(err, RigError::InvalidSkeleton(ref m) if m.contains("noggin")));
    }
}
