//! Splat Rig - Gaussian splat skinning core
//!
//! Binds a Gaussian-splat capture of a person to a humanoid skeleton and
//! re-skins the splats as the skeleton moves. Compiles natively for tests
//! and to wasm for the browser host.

pub mod artifact;
pub mod clean;
pub mod config;
pub mod deform;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod ply;
pub mod progress;
pub mod rig;
pub mod skeleton;
pub mod splat;
pub mod texture;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

#[cfg(test)]
mod fixtures;

pub use artifact::{RigArtifact, RigBundle};
pub use clean::{clean_point_cloud, CleanResult};
pub use config::RigConfig;
pub use deform::{PartitionPlacement, SkinDeformer};
pub use error::{Result, RigError};
pub use math::{Mat4Extended, Quat, Vec3};
pub use pipeline::{bind_character, load_rig, BindJob, BindResult, BoundCharacter, LoadedRig};
pub use ply::PlyData;
pub use progress::{LogProgress, NoProgress, ProgressSink, ProgressUpdate};
pub use rig::{CapsuleRig, Partition};
pub use skeleton::{BoneOperation, Character, CharacterDesc, HumanoidBone, Skeleton, SkinnedMesh};
pub use splat::{ColorMode, SplatBuffer, SplatScene};
