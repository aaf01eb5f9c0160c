//! Persisted rig: per-splat binding data plus the raw inputs it was made from.

use crate::error::{Result, RigError};
use crate::rig::{BoneAssignment, Partition, SplatBinding};
use crate::skeleton::BoneOperation;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Bundle entry holding the raw skeleton model bytes
pub const MODEL_ENTRY: &str = "model.vrm";
/// Bundle entry holding the raw point cloud
pub const POINT_CLOUD_ENTRY: &str = "model.ply";
/// Bundle entry holding the JSON metadata record
pub const DATA_ENTRY: &str = "data.json";

/// Metadata record stored as `data.json`.
///
/// All per-splat arrays are parallel and indexed by splat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RigArtifact {
    pub model_scale: f32,
    #[serde(default)]
    pub bone_operations: Vec<BoneOperation>,
    /// Bind-time rotation of the point cloud root, xyzw
    pub gs_quaternion: [f32; 4],
    /// `null` marks a splat whose bone owned no mesh vertices
    pub splat_vertex_indices: Vec<Option<u32>>,
    pub splat_bone_indices: Vec<u32>,
    /// Flat xyz offsets, three floats per splat
    #[serde(alias = "relativePoses")]
    pub splat_relative_poses: Vec<f32>,
}

impl RigArtifact {
    pub fn new(
        model_scale: f32,
        bone_operations: Vec<BoneOperation>,
        rotation0: Quat,
        assignment: &BoneAssignment,
        binding: &SplatBinding,
    ) -> Self {
        Self {
            model_scale,
            bone_operations,
            gs_quaternion: rotation0.to_array(),
            splat_vertex_indices: binding.vertices.iter().map(|v| v.map(|v| v as u32)).collect(),
            splat_bone_indices: assignment.bones.iter().map(|&b| b as u32).collect(),
            splat_relative_poses: binding.offsets.iter().flat_map(|o| o.to_array()).collect(),
        }
    }

    /// Parse and validate a metadata record
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn splat_count(&self) -> usize {
        self.splat_bone_indices.len()
    }

    /// Every per-splat array must describe the same number of splats
    pub fn validate(&self) -> Result<()> {
        let count = self.splat_count();
        if self.splat_vertex_indices.len() != count {
            return Err(RigError::InvalidArtifact(format!(
                "{} vertex indices for {} splats",
                self.splat_vertex_indices.len(),
                count
            )));
        }
        if self.splat_relative_poses.len() != count * 3 {
            return Err(RigError::InvalidArtifact(format!(
                "{} offset floats for {} splats",
                self.splat_relative_poses.len(),
                count
            )));
        }
        Ok(())
    }

    pub fn rotation0(&self) -> Quat {
        Quat::from_array(self.gs_quaternion).normalize()
    }

    pub fn bones(&self) -> Vec<usize> {
        self.splat_bone_indices.iter().map(|&b| b as usize).collect()
    }

    pub fn vertices(&self) -> Vec<Option<usize>> {
        self.splat_vertex_indices
            .iter()
            .map(|v| v.map(|v| v as usize))
            .collect()
    }

    pub fn offsets(&self) -> Vec<Vec3> {
        self.splat_relative_poses
            .chunks_exact(3)
            .map(Vec3::from_slice)
            .collect()
    }

    /// The same record with every per-splat array in partition order
    pub fn reindexed<K: Copy + Eq>(&self, partition: &Partition<K>) -> Self {
        let offsets = partition.permute(&self.offsets());
        Self {
            model_scale: self.model_scale,
            bone_operations: self.bone_operations.clone(),
            gs_quaternion: self.gs_quaternion,
            splat_vertex_indices: partition.permute(&self.splat_vertex_indices),
            splat_bone_indices: partition.permute(&self.splat_bone_indices),
            splat_relative_poses: offsets.iter().flat_map(|o| o.to_array()).collect(),
        }
    }
}

/// A saved rig: skeleton model, point cloud and metadata as named entries.
#[derive(Debug, Clone, PartialEq)]
pub struct RigBundle {
    pub model: Vec<u8>,
    pub point_cloud: Vec<u8>,
    pub artifact: RigArtifact,
}

impl RigBundle {
    pub fn entries(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        Ok(vec![
            (MODEL_ENTRY, self.model.clone()),
            (POINT_CLOUD_ENTRY, self.point_cloud.clone()),
            (DATA_ENTRY, self.artifact.to_json()?.into_bytes()),
        ])
    }

    /// Rebuild from archive entries; unrelated entries are ignored
    pub fn from_entries<N, I>(entries: I) -> Result<Self>
    where
        N: AsRef<str>,
        I: IntoIterator<Item = (N, Vec<u8>)>,
    {
        let mut model = None;
        let mut point_cloud = None;
        let mut data = None;
        for (name, bytes) in entries {
            match name.as_ref() {
                MODEL_ENTRY => model = Some(bytes),
                POINT_CLOUD_ENTRY => point_cloud = Some(bytes),
                DATA_ENTRY => data = Some(bytes),
                other => log::debug!("Ignoring bundle entry {}", other),
            }
        }

        let missing = |name: &str| RigError::InvalidArtifact(format!("bundle has no {} entry", name));
        let data = data.ok_or_else(|| missing(DATA_ENTRY))?;
        let json = std::str::from_utf8(&data)
            .map_err(|e| RigError::InvalidArtifact(format!("{} is not UTF-8: {}", DATA_ENTRY, e)))?;
        Ok(Self {
            model: model.ok_or_else(|| missing(MODEL_ENTRY))?,
            point_cloud: point_cloud.ok_or_else(|| missing(POINT_CLOUD_ENTRY))?,
            artifact: RigArtifact::from_json(json)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::partition_by_key;
    use crate::skeleton::EulerAngles;

    fn sample() -> RigArtifact {
        RigArtifact {
            model_scale: 1.05,
            bone_operations: vec![BoneOperation {
                bone_name: "leftUpperArm".to_string(),
                position: None,
                rotation: Some(EulerAngles { x: 0.0, y: 0.0, z: 60.0 }),
            }],
            gs_quaternion: [0.0, 0.0, 1.0, 0.0],
            splat_vertex_indices: vec![Some(4), None, Some(9)],
            splat_bone_indices: vec![3, 7, 3],
            splat_relative_poses: vec![0.1, 0.2, 0.3, 0.0, 0.0, 0.0, -0.1, 0.5, 0.0],
        }
    }

    #[test]
    fn test_json_uses_persisted_key_names() {
        let json = sample().to_json().unwrap();
        for key in [
            "\"modelScale\"",
            "\"boneOperations\"",
            "\"boneName\"",
            "\"gsQuaternion\"",
            "\"splatVertexIndices\"",
            "\"splatBoneIndices\"",
            "\"splatRelativePoses\"",
        ] {
            assert!(json.contains(key), "Missing key {} in {}", key, json);
        }
        assert!(json.contains("[4,null,9]"), "Unresolved vertex should serialize as null");
        assert_eq!(RigArtifact::from_json(&json).unwrap(), sample());
    }

    #[test]
    fn test_legacy_offset_key_is_accepted() {
        let json = r#"{
            "modelScale": 1.0,
            "gsQuaternion": [0, 0, 0, 1],
            "splatVertexIndices": [2],
            "splatBoneIndices": [5],
            "relativePoses": [1.0, 2.0, 3.0]
        }"#;
        let artifact = RigArtifact::from_json(json).unwrap();
        assert_eq!(artifact.offsets(), vec![Vec3::new(1.0, 2.0, 3.0)]);
        assert!(artifact.bone_operations.is_empty());
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let mut artifact = sample();
        artifact.splat_relative_poses.pop();
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(matches!(RigArtifact::from_json(&json), Err(RigError::InvalidArtifact(_))));

        let mut artifact = sample();
        artifact.splat_vertex_indices.push(Some(1));
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn test_reindex_keeps_rows_together() {
        let artifact = sample();
        let partition = partition_by_key(&artifact.bones());
        let reindexed = artifact.reindexed(&partition);

        assert_eq!(reindexed.splat_bone_indices, vec![3, 3, 7]);
        assert_eq!(reindexed.splat_vertex_indices, vec![Some(4), Some(9), None]);
        assert_eq!(
            reindexed.offsets(),
            vec![Vec3::new(0.1, 0.2, 0.3), Vec3::new(-0.1, 0.5, 0.0), Vec3::ZERO]
        );
        assert!(reindexed.validate().is_ok());
    }

    #[test]
    fn test_bundle_entries() {
        let bundle = RigBundle {
            model: vec![1, 2, 3],
            point_cloud: b"ply\n".to_vec(),
            artifact: sample(),
        };
        let mut entries = bundle.entries().unwrap();
        let names: Vec<_> = entries.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["model.vrm", "model.ply", "data.json"]);

        entries.push(("notes.txt", Vec::new()));
        assert_eq!(RigBundle::from_entries(entries).unwrap(), bundle);

        let partial = vec![("model.vrm", vec![0u8])];
        assert!(matches!(
            RigBundle::from_entries(partial),
            Err(RigError::InvalidArtifact(_))
        ));
    }
}
