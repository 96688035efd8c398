//! Positional Jacobian of a chain at its current pose.

use nalgebra::{DMatrix, UnitVector3, Vector3};

use marionette_core::skeleton::Skeleton;

use crate::chain::KinematicChain;
use crate::constraint::JointConstraint;

/// Cross products shorter than this are treated as degenerate axes.
const AXIS_EPSILON: f32 = 1e-6;

/// A 3×N Jacobian plus the world axis each column was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    /// Rows x, y, z; one column per joint, end-effector first.
    pub matrix: DMatrix<f32>,
    /// World-space rotation axis per joint. `None` for the base and for
    /// joints whose axis is degenerate this build; their columns are zero.
    pub axes: Vec<Option<UnitVector3<f32>>>,
}

/// Compute the Jacobian for the chain's current pose.
///
/// Column `i` is `axis_i × (end_effector − joint_i)`. Hinge axes are the
/// joint's local axis carried into world space. A ball joint's axis is
/// `normalize((child − joint) × (target − joint))`, derived fresh on every
/// call and never stored.
pub fn compute_jacobian(chain: &KinematicChain, skeleton: &Skeleton) -> Jacobian {
    let n = chain.dof();
    let frames = chain.joint_frames(skeleton);
    let ee_pos = frames[0].translation.vector;
    let target = chain.target_position();

    let mut matrix = DMatrix::zeros(3, n);
    let mut axes = vec![None; n];

    // Base (last joint) is a fixed frame: zero column.
    for i in 0..n - 1 {
        let joint_pos = frames[i].translation.vector;
        let axis = match &chain.joints()[i].constraint {
            JointConstraint::Hinge { axis, .. } => {
                UnitVector3::try_new(frames[i].rotation * axis.into_inner(), AXIS_EPSILON)
            }
            JointConstraint::Ball { .. } => {
                // Never the end-effector, so a child joint exists.
                let to_child = frames[i - 1].translation.vector - joint_pos;
                let to_target = target - joint_pos;
                UnitVector3::try_new(to_child.cross(&to_target), AXIS_EPSILON)
            }
        };
        let Some(axis) = axis else {
            continue;
        };

        let to_end: Vector3<f32> = ee_pos - joint_pos;
        let column = axis.cross(&to_end);
        matrix[(0, i)] = column.x;
        matrix[(1, i)] = column.y;
        matrix[(2, i)] = column.z;
        axes[i] = Some(axis);
    }

    Jacobian { matrix, axes }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
