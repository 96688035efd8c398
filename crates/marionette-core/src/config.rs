use std::collections::HashSet;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_damping() -> f32 {
    1.0
}
const fn default_step_gain() -> f32 {
    0.01
}
const fn default_sub_iterations() -> u32 {
    10
}
const fn default_max_chain_depth() -> usize {
    32
}
const fn default_axis() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

// ---------------------------------------------------------------------------
// SolveMethod
// ---------------------------------------------------------------------------

/// Angle-update strategy used by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveMethod {
    /// `Δ = α · Jᵗ · e`
    Transpose,
    /// `Δ = α · Jᵗ · (J·Jᵗ)⁻¹ · e`
    Pseudoinverse,
    /// `Δ = α · Jᵗ · (J·Jᵗ + λI)⁻¹ · e`
    #[default]
    Damped,
}

impl SolveMethod {
    /// All methods, in menu order.
    pub const ALL: [Self; 3] = [Self::Transpose, Self::Pseudoinverse, Self::Damped];

    /// Lowercase name as used in config files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transpose => "transpose",
            Self::Pseudoinverse => "pseudoinverse",
            Self::Damped => "damped",
        }
    }
}

impl std::fmt::Display for SolveMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SolveMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "method".into(),
                message: format!("unknown solve method '{s}'"),
            })
    }
}

// ---------------------------------------------------------------------------
// IkConfig
// ---------------------------------------------------------------------------

/// Solver configuration shared by every chain of a rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Resource)]
pub struct IkConfig {
    /// Angle-update strategy (default: damped least squares).
    #[serde(default)]
    pub method: SolveMethod,

    /// Damping constant λ for [`SolveMethod::Damped`] (default: 1.0).
    #[serde(default = "default_damping")]
    pub damping: f32,

    /// Step gain α applied to every method (default: 0.01).
    /// Too large overshoots, too small converges slowly.
    #[serde(default = "default_step_gain")]
    pub step_gain: f32,

    /// Sub-iterations K per chain per frame (default: 10). Always run in full.
    #[serde(default = "default_sub_iterations")]
    pub sub_iterations: u32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            method: SolveMethod::default(),
            damping: default_damping(),
            step_gain: default_step_gain(),
            sub_iterations: default_sub_iterations(),
        }
    }
}

impl IkConfig {
    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first field that is
    /// non-finite or out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.damping.is_finite() || self.damping < 0.0 {
            return Err(invalid("damping", format!("{} (must be >= 0)", self.damping)));
        }
        if !self.step_gain.is_finite() || self.step_gain <= 0.0 {
            return Err(invalid(
                "step_gain",
                format!("{} (must be > 0)", self.step_gain),
            ));
        }
        if self.sub_iterations == 0 {
            return Err(invalid("sub_iterations", "must be >= 1".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JointLimitConfig
// ---------------------------------------------------------------------------

/// Per-joint type and angle range, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JointLimitConfig {
    /// Single rotational DOF about the chain axis (or `axis` if given).
    Hinge {
        min: f32,
        max: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        axis: Option<[f32; 3]>,
    },
    /// Three Euler ranges, one per local axis.
    Ball {
        x: [f32; 2],
        y: [f32; 2],
        z: [f32; 2],
    },
}

impl JointLimitConfig {
    /// Hinge range using the chain axis.
    pub const fn hinge(min: f32, max: f32) -> Self {
        Self::Hinge {
            min,
            max,
            axis: None,
        }
    }

    /// Ball joint ranges.
    pub const fn ball(x: [f32; 2], y: [f32; 2], z: [f32; 2]) -> Self {
        Self::Ball { x, y, z }
    }

    /// Whether this entry describes a hinge.
    pub const fn is_hinge(&self) -> bool {
        matches!(self, Self::Hinge { .. })
    }
}

// ---------------------------------------------------------------------------
// ChainConfig
// ---------------------------------------------------------------------------

/// One kinematic chain, described by bone names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain name (e.g. "right hand").
    pub name: String,
    /// Base bone: fixed frame, never rotated by this chain.
    pub base: String,
    /// End-effector bone.
    pub end: String,
    /// Local hinge axis shared by the chain's hinge joints.
    #[serde(default = "default_axis")]
    pub axis: [f32; 3],
    /// Initial world-space target. Defaults to the end-effector position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<[f32; 3]>,
    /// One entry per joint, end-effector first, base last.
    pub joints: Vec<JointLimitConfig>,
}

// ---------------------------------------------------------------------------
// RigConfig
// ---------------------------------------------------------------------------

/// Full rig: solver settings plus every chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Maximum parent links walked when building a chain (default: 32).
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    #[serde(default)]
    pub ik: IkConfig,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            ik: IkConfig::default(),
            chains: Vec::new(),
        }
    }
}

impl RigConfig {
    /// Validate configuration. Bone names are checked later, against a skeleton.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidValue`] for a bad solver setting, a zero
    ///   `max_chain_depth` or a chain without joints.
    /// - [`ConfigError::DuplicateChain`] if two chains share a name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ik.validate()?;
        if self.max_chain_depth == 0 {
            return Err(invalid("max_chain_depth", "must be >= 1".into()));
        }
        let mut names = HashSet::new();
        for chain in &self.chains {
            if !names.insert(chain.name.as_str()) {
                return Err(ConfigError::DuplicateChain(chain.name.clone()));
            }
            if chain.joints.is_empty() {
                return Err(invalid(
                    &format!("chains.{}.joints", chain.name),
                    "must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Parse from a TOML string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if parsing fails, or any error from
    /// [`RigConfig::validate`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any error
    /// from [`RigConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
