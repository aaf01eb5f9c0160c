use super::cache::PoseCache;
use super::role::HumanoidBone;
use crate::error::{Result, RigError};
use crate::math::Mat4Extended;
use glam::{Mat4, Quat, Vec3};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};

/// Construction input for one bone.
#[derive(Debug, Clone)]
pub struct BoneDef {
    pub name: String,
    pub role: Option<HumanoidBone>,
    /// Parent index; must be lower than this bone's own index
    pub parent: Option<usize>,
    /// Rest translation relative to the parent
    pub translation: Vec3,
    /// Rest rotation relative to the parent
    pub rotation: Quat,
}

impl BoneDef {
    pub fn new(name: impl Into<String>, parent: Option<usize>, translation: Vec3) -> Self {
        Self {
            name: name.into(),
            role: None,
            parent,
            translation,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn with_role(mut self, role: HumanoidBone) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }
}

/// A bone of a built skeleton.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub role: Option<HumanoidBone>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub rest_translation: Vec3,
    pub rest_rotation: Quat,
}

/// Bone tree in topological order with a mutable pose layer.
///
/// The pose is a per-bone position offset (added to the rest translation)
/// and a local rotation (replacing the rest rotation). Model-space matrices
/// are derived by forward kinematics and cached behind a `RefCell` so reads
/// stay `&self`.
#[derive(Debug, Clone)]
pub struct Skeleton {
    bones: Vec<Bone>,
    /// Bone plus all descendants, per bone
    subtrees: Vec<Vec<usize>>,
    position_offsets: Vec<Vec3>,
    local_rotations: Vec<Quat>,
    cache: RefCell<PoseCache>,
}

impl Skeleton {
    /// Build from definitions. Bone 0 is the single root and every other
    /// bone names an earlier bone as parent.
    pub fn new(defs: Vec<BoneDef>) -> Result<Self> {
        if defs.is_empty() {
            return Err(RigError::InvalidSkeleton("no bones".into()));
        }

        let mut names = HashSet::new();
        let mut roles = HashSet::new();
        for (i, def) in defs.iter().enumerate() {
            match def.parent {
                None if i != 0 => {
                    return Err(RigError::InvalidSkeleton(format!(
                        "bone '{}' has no parent but is not the root",
                        def.name
                    )))
                }
                Some(_) if i == 0 => {
                    return Err(RigError::InvalidSkeleton("root bone has a parent".into()))
                }
                Some(p) if p >= i => {
                    return Err(RigError::InvalidSkeleton(format!(
                        "bone '{}' must come after its parent",
                        def.name
                    )))
                }
                _ => {}
            }
            if !names.insert(def.name.as_str()) {
                return Err(RigError::InvalidSkeleton(format!("duplicate bone name '{}'", def.name)));
            }
            if let Some(role) = def.role {
                if !roles.insert(role) {
                    return Err(RigError::InvalidSkeleton(format!(
                        "role '{}' bound twice",
                        role.name()
                    )));
                }
            }
        }

        let mut bones: Vec<Bone> = defs
            .into_iter()
            .map(|def| Bone {
                name: def.name,
                role: def.role,
                parent: def.parent,
                children: Vec::new(),
                rest_translation: def.translation,
                rest_rotation: def.rotation,
            })
            .collect();
        for i in 1..bones.len() {
            if let Some(p) = bones[i].parent {
                bones[p].children.push(i);
            }
        }

        // Topological order: every descendant of i has a higher index
        let count = bones.len();
        let mut subtrees = Vec::with_capacity(count);
        for i in 0..count {
            let mut in_subtree = vec![false; count];
            in_subtree[i] = true;
            let mut members = vec![i];
            for j in (i + 1)..count {
                if let Some(p) = bones[j].parent {
                    if in_subtree[p] {
                        in_subtree[j] = true;
                        members.push(j);
                    }
                }
            }
            subtrees.push(members);
        }

        let local_rotations = bones.iter().map(|b| b.rest_rotation).collect();
        Ok(Self {
            bones,
            subtrees,
            position_offsets: vec![Vec3::ZERO; count],
            local_rotations,
            cache: RefCell::new(PoseCache::new(count)),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    pub fn bone(&self, index: usize) -> &Bone {
        &self.bones[index]
    }

    /// Index of the root bone
    #[inline]
    pub fn root(&self) -> usize {
        0
    }

    pub fn bone_by_name(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn bone_by_role(&self, role: HumanoidBone) -> Option<usize> {
        self.bones.iter().position(|b| b.role == Some(role))
    }

    /// Resolve a pose-file bone name: humanoid role name first, raw bone name second.
    pub fn resolve(&self, name: &str) -> Option<usize> {
        HumanoidBone::from_name(name)
            .and_then(|role| self.bone_by_role(role))
            .or_else(|| self.bone_by_name(name))
    }

    /// Names of every role this skeleton binds
    pub fn role_names(&self) -> BTreeSet<&'static str> {
        self.bones.iter().filter_map(|b| b.role.map(HumanoidBone::name)).collect()
    }

    pub fn position_offset(&self, bone: usize) -> Vec3 {
        self.position_offsets[bone]
    }

    pub fn local_rotation(&self, bone: usize) -> Quat {
        self.local_rotations[bone]
    }

    pub fn set_position_offset(&mut self, bone: usize, offset: Vec3) {
        if self.position_offsets[bone] != offset {
            self.position_offsets[bone] = offset;
            self.cache.borrow_mut().dirty.mark_subtree(&self.subtrees[bone]);
        }
    }

    pub fn set_local_rotation(&mut self, bone: usize, rotation: Quat) {
        if self.local_rotations[bone] != rotation {
            self.local_rotations[bone] = rotation;
            self.cache.borrow_mut().dirty.mark_subtree(&self.subtrees[bone]);
        }
    }

    /// Return every bone to its rest transform
    pub fn reset_pose(&mut self) {
        self.position_offsets.iter_mut().for_each(|o| *o = Vec3::ZERO);
        for (rotation, bone) in self.local_rotations.iter_mut().zip(&self.bones) {
            *rotation = bone.rest_rotation;
        }
        self.cache.borrow_mut().dirty.mark_all();
    }

    /// Model-space matrix of a bone (computes FK if needed)
    pub fn world_matrix(&self, bone: usize) -> Mat4 {
        self.ensure_computed(bone);
        self.cache.borrow().world_matrices[bone]
    }

    pub fn world_position(&self, bone: usize) -> Vec3 {
        self.world_matrix(bone).position()
    }

    pub fn world_rotation(&self, bone: usize) -> Quat {
        self.world_matrix(bone).rotation_quat()
    }

    /// All model-space matrices in bone order
    pub fn world_matrices(&self) -> Vec<Mat4> {
        self.compute_all();
        self.cache.borrow().world_matrices.clone()
    }

    fn ensure_computed(&self, bone: usize) {
        if !self.cache.borrow().dirty.is_dirty(bone) {
            return;
        }

        // Walk up to the first clean ancestor, then evaluate downwards
        let mut chain = vec![bone];
        let mut current = self.bones[bone].parent;
        while let Some(parent) = current {
            if !self.cache.borrow().dirty.is_dirty(parent) {
                break;
            }
            chain.push(parent);
            current = self.bones[parent].parent;
        }
        for &b in chain.iter().rev() {
            self.compute_bone(b);
        }
    }

    fn compute_bone(&self, bone: usize) {
        let def = &self.bones[bone];
        let local = Mat4::from_rotation_translation(
            self.local_rotations[bone],
            def.rest_translation + self.position_offsets[bone],
        );

        let mut cache = self.cache.borrow_mut();
        let world = match def.parent {
            Some(parent) => cache.world_matrices[parent] * local,
            None => local,
        };
        cache.world_matrices[bone] = world;
        cache.dirty.clear(bone);
    }

    /// Force recomputation of every dirty bone
    pub fn compute_all(&self) {
        if !self.cache.borrow().dirty.is_any_dirty() {
            return;
        }
        for bone in 0..self.bones.len() {
            if self.cache.borrow().dirty.is_dirty(bone) {
                self.compute_bone(bone);
            }
        }
        self.cache.borrow_mut().dirty.clear_all();
    }
}
