use thiserror::Error;

use crate::skeleton::BoneId;

/// Top-level error type for marionette.
#[derive(Debug, Error)]
pub enum MarionetteError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown bone: {0}")]
    UnknownBone(String),

    #[error("Duplicate chain name: {0}")]
    DuplicateChain(String),
}

/// Kinematic chain construction errors.
///
/// All of these are fatal for the chain being loaded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("Bone index {0} is out of range")]
    UnknownBone(BoneId),

    #[error("End bone {end} is not a descendant of base bone {base} within {max_depth} links")]
    NotDescendant {
        base: BoneId,
        end: BoneId,
        max_depth: usize,
    },

    #[error("Joint limit count mismatch: chain has {expected} joints, got {got} limits")]
    LimitCountMismatch { expected: usize, got: usize },

    #[error("End effector must be a hinge joint")]
    TerminalBallJoint,

    #[error("Invalid {axis} range: [{min}, {max}]")]
    InvalidRange {
        axis: &'static str,
        min: f32,
        max: f32,
    },

    #[error("Hinge axis has zero length")]
    DegenerateAxis,

    #[error("Bone {bone} is already driven by chain {chain}")]
    SharedJoint { bone: BoneId, chain: String },
}

/// Skeleton arena errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkeletonError {
    #[error("Parent index {parent} must refer to an existing bone (arena has {len})")]
    InvalidParent { parent: BoneId, len: usize },
}
