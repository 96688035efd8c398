//! Kinematic chain over a [`Skeleton`] arena.
//!
//! A [`KinematicChain`] is an ordered list of joints from the end-effector
//! (index 0) to the base (last index). It owns the per-joint constraints and
//! the rest rotations captured at construction, plus the world-space target.
//! Poses are never cached: every query reads the skeleton's current local
//! rotations.

use bevy::log::warn;
use nalgebra::{Isometry3, UnitQuaternion, Vector3};

use marionette_core::config::{ChainConfig, JointLimitConfig};
use marionette_core::error::{ChainError, ConfigError, MarionetteError};
use marionette_core::skeleton::{BoneId, Skeleton};

use crate::constraint::JointConstraint;

/// A single joint in the kinematic chain.
#[derive(Debug, Clone)]
pub struct ChainJoint {
    /// Bone driven by this joint.
    pub bone: BoneId,
    /// Joint type and angle limits (radians).
    pub constraint: JointConstraint,
    /// Local rotation at construction; limits are measured from here.
    pub rest: UnitQuaternion<f32>,
}

/// An ordered kinematic chain from end-effector to base.
///
/// The base joint is a fixed frame: the solver never rotates it. The
/// end-effector is always a hinge.
#[derive(Debug, Clone)]
pub struct KinematicChain {
    name: String,
    /// End-effector first, base last.
    joints: Vec<ChainJoint>,
    target: Vector3<f32>,
}

impl KinematicChain {
    /// Build a chain by walking parent links from `end` to `base`.
    ///
    /// `limits` gives one degree-valued entry per joint, end-effector first;
    /// its tag decides the joint type. Hinges without their own axis use
    /// `axis`. `target` defaults to the end-effector's current position.
    ///
    /// # Errors
    ///
    /// - [`ChainError::UnknownBone`] if either bone is outside the arena.
    /// - [`ChainError::NotDescendant`] if `end` is not a strict descendant
    ///   of `base` within `max_depth` parent links.
    /// - [`ChainError::LimitCountMismatch`] if `limits` does not match the
    ///   joint count.
    /// - [`ChainError::TerminalBallJoint`] if the end-effector is a ball.
    /// - [`ChainError::InvalidRange`] / [`ChainError::DegenerateAxis`] for bad
    ///   limit entries.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        skeleton: &Skeleton,
        base: BoneId,
        end: BoneId,
        axis: Vector3<f32>,
        limits: &[JointLimitConfig],
        target: Option<Vector3<f32>>,
        max_depth: usize,
    ) -> Result<Self, ChainError> {
        for bone in [base, end] {
            if bone >= skeleton.len() {
                return Err(ChainError::UnknownBone(bone));
            }
        }

        let path = skeleton
            .path_to_ancestor(end, base, max_depth)
            .ok_or(ChainError::NotDescendant {
                base,
                end,
                max_depth,
            })?;

        if limits.len() != path.len() {
            return Err(ChainError::LimitCountMismatch {
                expected: path.len(),
                got: limits.len(),
            });
        }
        if !limits[0].is_hinge() {
            return Err(ChainError::TerminalBallJoint);
        }

        let joints = path
            .iter()
            .zip(limits)
            .map(|(&bone, limit)| {
                Ok(ChainJoint {
                    bone,
                    constraint: JointConstraint::from_config(limit, axis)?,
                    rest: skeleton.local_rotation(bone),
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;

        let target = target
            .filter(|t| t.iter().all(|c| c.is_finite()))
            .unwrap_or_else(|| skeleton.world_position(end));

        Ok(Self {
            name: name.into(),
            joints,
            target,
        })
    }

    /// Build a chain from a [`ChainConfig`], resolving bone names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBone`] if `base` or `end` is not in the
    /// skeleton, or any [`ChainError`] from [`KinematicChain::new`].
    pub fn from_config(
        skeleton: &Skeleton,
        config: &ChainConfig,
        max_depth: usize,
    ) -> Result<Self, MarionetteError> {
        let resolve = |name: &str| {
            skeleton
                .find(name)
                .ok_or_else(|| ConfigError::UnknownBone(name.to_owned()))
        };
        let base = resolve(&config.base)?;
        let end = resolve(&config.end)?;
        let axis = Vector3::from(config.axis);
        let target = config.target.map(Vector3::from);

        Ok(Self::new(
            config.name.clone(),
            skeleton,
            base,
            end,
            axis,
            &config.joints,
            target,
            max_depth,
        )?)
    }

    /// Chain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of joints, base included.
    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    /// Joints, end-effector first.
    pub fn joints(&self) -> &[ChainJoint] {
        &self.joints
    }

    /// End-effector bone.
    pub fn end_effector(&self) -> BoneId {
        self.joints[0].bone
    }

    /// Base bone (fixed frame).
    pub fn base(&self) -> BoneId {
        self.joints[self.joints.len() - 1].bone
    }

    /// Bones this chain writes: every joint except the base.
    pub fn driven_bones(&self) -> impl Iterator<Item = BoneId> + '_ {
        self.joints[..self.joints.len() - 1].iter().map(|j| j.bone)
    }

    /// Current end-effector world position.
    pub fn end_effector_position(&self, skeleton: &Skeleton) -> Vector3<f32> {
        skeleton.world_position(self.end_effector())
    }

    /// `target − end_effector_position`, recomputed from the live pose.
    pub fn error(&self, skeleton: &Skeleton) -> Vector3<f32> {
        self.target - self.end_effector_position(skeleton)
    }

    /// World-space target.
    pub fn target_position(&self) -> Vector3<f32> {
        self.target
    }

    /// Replace the target. Non-finite targets are rejected and the previous
    /// target is kept. Returns whether the new target was accepted.
    pub fn set_target_position(&mut self, target: Vector3<f32>) -> bool {
        if target.iter().all(|c| c.is_finite()) {
            self.target = target;
            true
        } else {
            warn!(
                "marionette-ik: chain '{}' rejected non-finite target {:?}, keeping {:?}",
                self.name, target, self.target
            );
            false
        }
    }

    /// World transform of every joint, end-effector first.
    ///
    /// The base frame is read from the skeleton; each inner joint is the
    /// previous frame composed with its local transform.
    pub fn joint_frames(&self, skeleton: &Skeleton) -> Vec<Isometry3<f32>> {
        let n = self.joints.len();
        let mut frames = vec![Isometry3::identity(); n];
        frames[n - 1] = skeleton.world_transform(self.base());
        for i in (0..n - 1).rev() {
            frames[i] = frames[i + 1] * skeleton.local_transform(self.joints[i].bone);
        }
        frames
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
