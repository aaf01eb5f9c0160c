//! Error types shared by every stage of the rigging pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PLY parse error: {0}")]
    PlyParse(String),

    #[error("PLY header is missing its end_header line")]
    MissingHeaderEnd,

    #[error("PLY data truncated: expected {expected} bytes of records, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("unsupported PLY content: {0}")]
    Unsupported(String),

    #[error("unknown bone: {0}")]
    UnknownBone(String),

    #[error("bone topology mismatch (extra: {extra:?}, missing: {missing:?})")]
    TopologyMismatch {
        extra: Vec<String>,
        missing: Vec<String>,
    },

    #[error("invalid skeleton: {0}")]
    InvalidSkeleton(String),

    #[error("invalid rig artifact: {0}")]
    InvalidArtifact(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("capsule rig has no proxy triangles to assign against")]
    EmptyRig,
}

pub type Result<T> = std::result::Result<T, RigError>;
