//! Splat-to-skeleton binding: proxy capsules, nearest-capsule assignment,
//! per-vertex binding, bone partitioning and stray splat culling.

pub mod assign;
pub mod binding;
pub mod capsule;
pub mod cull;
pub mod partition;

pub use assign::*;
pub use binding::*;
pub use capsule::*;
pub use cull::*;
pub use partition::*;
