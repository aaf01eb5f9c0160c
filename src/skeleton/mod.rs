pub mod cache;
pub mod character;
pub mod hierarchy;
pub mod mesh;
pub mod pose;
pub mod role;
mod role_names;

pub use cache::*;
pub use character::*;
pub use hierarchy::*;
pub use mesh::*;
pub use pose::*;
pub use role::*;
pub use role_names::HUMANOID_BONE_NAMES;
