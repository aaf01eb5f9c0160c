use super::hierarchy::Skeleton;
use crate::error::{Result, RigError};
use crate::math::EPSILON;
use glam::{Mat4, Vec3};

/// Per-bone skinning matrices (`boneWorld · boneInverse`), the contents of
/// the renderer's bone texture.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneMatrices(pub Vec<Mat4>);

impl BoneMatrices {
    #[inline]
    pub fn get(&self, bone: usize) -> Mat4 {
        self.0[bone]
    }
}

/// Linear-blend skinned mesh bound to a [`Skeleton`].
#[derive(Debug, Clone)]
pub struct SkinnedMesh {
    /// Rest-pose vertex positions
    pub positions: Vec<Vec3>,
    pub skin_indices: Vec<[u32; 4]>,
    pub skin_weights: Vec<[f32; 4]>,
    /// Triangle list, three vertex indices per triangle
    pub indices: Vec<u32>,
    /// Inverse of each bone's model-space matrix at bind time
    pub bone_inverses: Vec<Mat4>,
    pub bind_matrix: Mat4,
    pub bind_matrix_inverse: Mat4,
}

impl SkinnedMesh {
    pub fn new(
        positions: Vec<Vec3>,
        skin_indices: Vec<[u32; 4]>,
        skin_weights: Vec<[f32; 4]>,
        indices: Vec<u32>,
    ) -> Result<Self> {
        if skin_indices.len() != positions.len() || skin_weights.len() != positions.len() {
            return Err(RigError::InvalidSkeleton(format!(
                "skin attributes cover {}/{} vertices, mesh has {}",
                skin_indices.len(),
                skin_weights.len(),
                positions.len()
            )));
        }
        Ok(Self {
            positions,
            skin_indices,
            skin_weights,
            indices,
            bone_inverses: Vec::new(),
            bind_matrix: Mat4::IDENTITY,
            bind_matrix_inverse: Mat4::IDENTITY,
        })
    }

    /// Capture the skeleton's current pose as the bind pose.
    pub fn bind(&mut self, skeleton: &Skeleton, bind_matrix: Mat4) -> Result<()> {
        if let Some(bad) = self
            .skin_indices
            .iter()
            .flatten()
            .find(|&&b| b as usize >= skeleton.len())
        {
            return Err(RigError::InvalidSkeleton(format!(
                "skin index {} out of range for {} bones",
                bad,
                skeleton.len()
            )));
        }
        self.bone_inverses = skeleton.world_matrices().iter().map(Mat4::inverse).collect();
        self.bind_matrix = bind_matrix;
        self.bind_matrix_inverse = bind_matrix.inverse();
        Ok(())
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Bone texture for the skeleton's current pose
    pub fn bone_matrices(&self, skeleton: &Skeleton) -> BoneMatrices {
        BoneMatrices(
            skeleton
                .world_matrices()
                .iter()
                .zip(&self.bone_inverses)
                .map(|(world, inverse)| *world * *inverse)
                .collect(),
        )
    }

    /// Blended transform of one vertex: `bindInverse · Σ wᵢ·boneᵢ · bind`.
    pub fn skin_matrix(&self, vertex: usize, bones: &BoneMatrices) -> Mat4 {
        let indices = self.skin_indices[vertex];
        let weights = self.skin_weights[vertex];

        let mut blend = Mat4::ZERO;
        let mut total = 0.0f32;
        for (&bone, &weight) in indices.iter().zip(&weights) {
            if weight != 0.0 {
                blend += bones.get(bone as usize) * weight;
                total += weight;
            }
        }
        // Unweighted vertices follow the mesh rigidly
        if total.abs() < EPSILON {
            blend = Mat4::IDENTITY;
        }

        self.bind_matrix_inverse * blend * self.bind_matrix
    }

    /// Vertex position in mesh space after skinning.
    pub fn skinned_position(&self, vertex: usize, bones: &BoneMatrices) -> Vec3 {
        self.skin_matrix(vertex, bones)
            .transform_point3(self.positions[vertex])
    }
}
