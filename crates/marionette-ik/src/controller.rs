//! Per-frame relaxation of a single chain.
//!
//! [`relax_chain`] runs exactly `sub_iterations` rounds of
//! Jacobian → solve → sanitize → apply+clamp, each on the pose left by the
//! previous round. There is no early exit on convergence.

use bevy::log::{debug, warn};
use nalgebra::{DVector, Vector3};

use marionette_core::config::IkConfig;
use marionette_core::skeleton::Skeleton;

use crate::chain::KinematicChain;
use crate::constraint::{JointConstraint, clamp_ball, clamp_hinge};
use crate::jacobian::Jacobian;
use crate::solver::{IkStep, sanitize_deltas, solve};

/// Outcome of relaxing one chain for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainReport {
    /// `target − end_effector` after the last sub-iteration.
    pub residual: Vector3<f32>,
    /// Non-finite deltas zeroed across all sub-iterations this frame.
    pub rejected_deltas: usize,
    /// The end-effector position was non-finite, so nothing was applied.
    pub skipped: bool,
}

impl Default for ChainReport {
    fn default() -> Self {
        Self {
            residual: Vector3::zeros(),
            rejected_deltas: 0,
            skipped: false,
        }
    }
}

impl ChainReport {
    /// Euclidean length of the residual.
    pub fn residual_norm(&self) -> f32 {
        self.residual.norm()
    }
}

/// Relax `chain` toward its target, writing local rotations into `skeleton`.
///
/// The base joint is never written. Joints whose axis is degenerate this
/// round are left untouched. The skeleton's cached world matrices are not
/// refreshed here.
pub fn relax_chain(
    chain: &KinematicChain,
    skeleton: &mut Skeleton,
    config: &IkConfig,
) -> ChainReport {
    let end = chain.end_effector_position(skeleton);
    if !end.iter().all(|c| c.is_finite()) {
        warn!(
            "marionette-ik: chain '{}' has a non-finite end effector, skipping frame",
            chain.name()
        );
        return ChainReport {
            residual: chain.error(skeleton),
            rejected_deltas: 0,
            skipped: true,
        };
    }

    let mut rejected_deltas = 0;
    for _ in 0..config.sub_iterations {
        let IkStep {
            jacobian,
            mut deltas,
            ..
        } = solve(chain, skeleton, config);

        let rejected = sanitize_deltas(&mut deltas);
        if rejected > 0 {
            debug!(
                "marionette-ik: chain '{}' zeroed {} non-finite deltas ({})",
                chain.name(),
                rejected,
                config.method
            );
        }
        rejected_deltas += rejected;

        apply_deltas(chain, skeleton, &jacobian, &deltas);
    }

    ChainReport {
        residual: chain.error(skeleton),
        rejected_deltas,
        skipped: false,
    }
}

/// Apply one round of deltas, end-effector first.
///
/// Going from the end toward the base keeps every joint's pre-round frame
/// valid at the moment it is written, since only descendants have changed.
fn apply_deltas(
    chain: &KinematicChain,
    skeleton: &mut Skeleton,
    jacobian: &Jacobian,
    deltas: &DVector<f32>,
) {
    let frames = chain.joint_frames(skeleton);
    let driven = chain.dof() - 1;

    for (i, joint) in chain.joints()[..driven].iter().enumerate() {
        let Some(world_axis) = jacobian.axes[i] else {
            continue;
        };
        let local = skeleton.local_rotation(joint.bone);

        let rotation = match &joint.constraint {
            JointConstraint::Hinge { axis, range } => {
                clamp_hinge(&joint.rest, &local, axis, range, deltas[i]).0
            }
            JointConstraint::Ball { x, y, z } => {
                let axis = frames[i].rotation.inverse() * world_axis;
                clamp_ball(&joint.rest, &local, &axis, [x, y, z], deltas[i]).0
            }
        };
        skeleton.set_local_rotation(joint.bone, rotation);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
