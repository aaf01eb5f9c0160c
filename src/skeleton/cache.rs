use glam::Mat4;

/// Dirty flags for lazy forward kinematics evaluation.
/// Entry i corresponds to the bone at skeleton index i.
#[derive(Debug, Clone, Default)]
pub struct DirtyFlags(Vec<bool>);

impl DirtyFlags {
    /// Create with all bones marked dirty
    pub fn all_dirty(count: usize) -> Self {
        Self(vec![true; count])
    }

    /// Check if a bone is dirty (needs recomputation)
    #[inline]
    pub fn is_dirty(&self, bone: usize) -> bool {
        self.0.get(bone).copied().unwrap_or(false)
    }

    /// Check if any bone is dirty
    #[inline]
    pub fn is_any_dirty(&self) -> bool {
        self.0.iter().any(|d| *d)
    }

    /// Mark a whole subtree (bone plus descendants) dirty
    pub fn mark_subtree(&mut self, subtree: &[usize]) {
        for &bone in subtree {
            self.0[bone] = true;
        }
    }

    pub fn mark_all(&mut self) {
        self.0.iter_mut().for_each(|d| *d = true);
    }

    #[inline]
    pub fn clear(&mut self, bone: usize) {
        self.0[bone] = false;
    }

    pub fn clear_all(&mut self) {
        self.0.iter_mut().for_each(|d| *d = false);
    }
}

/// Cache for forward kinematics results
#[derive(Debug, Clone)]
pub struct PoseCache {
    /// Model-space bone matrices, valid where the dirty flag is clear
    pub world_matrices: Vec<Mat4>,

    /// Dirty flags for lazy evaluation
    pub dirty: DirtyFlags,
}

impl PoseCache {
    pub fn new(count: usize) -> Self {
        Self {
            world_matrices: vec![Mat4::IDENTITY; count],
            dirty: DirtyFlags::all_dirty(count),
        }
    }
}
