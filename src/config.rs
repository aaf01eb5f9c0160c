//! Tunable thresholds for binding, cleaning and decoding.
//!
//! Every field has a default so a partial JSON object is a valid config.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RigConfig {
    /// Trade assignment fidelity for speed (sparse sampling)
    pub fast: bool,
    /// Fast mode: one exact nearest-capsule search per this many splats
    pub bone_stride: usize,
    /// Fast mode: only every n-th candidate vertex is tested
    pub vertex_stride: usize,
    /// Iterations between progress reports / host yields
    pub yield_batch: usize,

    /// Codec byte progress is reported at most once per this many bytes
    pub progress_bytes: usize,
    /// Codec record progress is reported at most once per this many records
    pub progress_records: usize,

    /// Stray splat cull: offset length above which a low splat is hidden
    pub cull_offset: f32,
    /// Stray splat cull: offsets with y below this count as near ground
    pub cull_height: f32,
    /// Splats farther than this from the root in the xz plane are hidden
    pub cull_radius: f32,

    /// Cleaning: radius of the subject cylinder
    pub clean_near: f32,
    /// Cleaning: background points beyond this distance are dropped
    pub clean_far: f32,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            fast: false,
            bone_stride: 10,
            vertex_stride: 3,
            yield_batch: 100,
            progress_bytes: 1 << 20,
            progress_records: 10_000,
            cull_offset: 0.4,
            cull_height: 0.05,
            cull_radius: 1.5,
            clean_near: 1.0,
            clean_far: 15.0,
        }
    }
}

impl RigConfig {
    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Effective stride for the nearest-capsule pass
    pub fn bone_step(&self) -> usize {
        if self.fast {
            self.bone_stride.max(1)
        } else {
            1
        }
    }

    /// Effective stride for the nearest-vertex pass
    pub fn vertex_step(&self) -> usize {
        if self.fast {
            self.vertex_stride.max(1)
        } else {
            1
        }
    }
}
