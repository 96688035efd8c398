//! Angle-update strategies: Jacobian transpose, pseudoinverse and damped
//! least squares.
//!
//! [`solve`] is a pure function of the chain and skeleton state. It keeps no
//! memory between calls, so calling it twice on an unchanged pose returns
//! identical output.

use nalgebra::{DMatrix, DVector, Vector3};

use marionette_core::config::{IkConfig, SolveMethod};
use marionette_core::skeleton::Skeleton;

use crate::chain::KinematicChain;
use crate::jacobian::{Jacobian, compute_jacobian};

/// Output of one solver step.
#[derive(Debug, Clone, PartialEq)]
pub struct IkStep {
    /// Jacobian the deltas were computed from.
    pub jacobian: Jacobian,
    /// Positional error `target − end_effector` at the time of the step.
    pub error: Vector3<f32>,
    /// Angle delta per joint (radians), end-effector first. May contain
    /// non-finite values under [`SolveMethod::Pseudoinverse`]; see
    /// [`sanitize_deltas`].
    pub deltas: DVector<f32>,
}

/// Build the Jacobian and compute angle deltas for the chain's current pose.
pub fn solve(chain: &KinematicChain, skeleton: &Skeleton, config: &IkConfig) -> IkStep {
    let jacobian = compute_jacobian(chain, skeleton);
    let error = chain.error(skeleton);
    let deltas = angle_update(&jacobian.matrix, &error, config);
    IkStep {
        jacobian,
        error,
        deltas,
    }
}

/// Compute angle deltas from a Jacobian and error vector.
///
/// - transpose: `α · Jᵗ · e`
/// - pseudoinverse: `α · Jᵗ · (J·Jᵗ)⁻¹ · e`; a singular `J·Jᵗ` produces NaN
/// - damped: `α · Jᵗ · (J·Jᵗ + λI)⁻¹ · e`
pub fn angle_update(
    jacobian: &DMatrix<f32>,
    error: &Vector3<f32>,
    config: &IkConfig,
) -> DVector<f32> {
    let e = DVector::from_column_slice(error.as_slice());
    let jt = jacobian.transpose();
    let m = jacobian.nrows();

    let deltas = match config.method {
        SolveMethod::Transpose => &jt * e,
        SolveMethod::Pseudoinverse => {
            let jjt = jacobian * &jt;
            &jt * invert_or_nan(jjt) * e
        }
        SolveMethod::Damped => {
            let damped = jacobian * &jt + DMatrix::identity(m, m) * config.damping;
            &jt * invert_or_nan(damped) * e
        }
    };

    deltas * config.step_gain
}

/// Zero every non-finite delta in place. Returns how many were zeroed.
pub fn sanitize_deltas(deltas: &mut DVector<f32>) -> usize {
    let mut rejected = 0;
    for d in deltas.iter_mut() {
        if !d.is_finite() {
            *d = 0.0;
            rejected += 1;
        }
    }
    rejected
}

/// Singular matrices invert to all-NaN rather than failing, so the caller's
/// per-joint sanitation decides what to do with them.
fn invert_or_nan(matrix: DMatrix<f32>) -> DMatrix<f32> {
    let (rows, cols) = matrix.shape();
    matrix
        .try_inverse()
        .unwrap_or_else(|| DMatrix::from_element(rows, cols, f32::NAN))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{JointConstraint, clamp_hinge};
    use approx::assert_relative_eq;
    use marionette_core::config::JointLimitConfig;
    use nalgebra::UnitQuaternion;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// root -> shoulder (0,1,0) -> elbow (1,0,0) -> wrist (1,0,0) -> hand (1,0,0)
    /// All hinges about Z; fully extended along +X at rest.
    fn straight_arm() -> Skeleton {
        let mut s = Skeleton::new();
        let root = s
            .add_bone("root", None, Vector3::zeros(), UnitQuaternion::identity())
            .unwrap();
        let shoulder = s
            .add_bone("shoulder", Some(root), Vector3::y(), UnitQuaternion::identity())
            .unwrap();
        let elbow = s
            .add_bone("elbow", Some(shoulder), Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        let wrist = s
            .add_bone("wrist", Some(elbow), Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        s.add_bone("hand", Some(wrist), Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        s
    }

    fn straight_chain(s: &Skeleton, target: Vector3<f32>) -> KinematicChain {
        let limits = vec![JointLimitConfig::hinge(-180.0, 180.0); 5];
        KinematicChain::new("arm", s, 0, 4, Vector3::z(), &limits, Some(target), 8).unwrap()
    }

    fn config(method: SolveMethod) -> IkConfig {
        IkConfig {
            method,
            ..IkConfig::default()
        }
    }

    /// Rotate every driven hinge by its delta, unclamped in practice.
    fn apply(chain: &KinematicChain, s: &mut Skeleton, deltas: &DVector<f32>) {
        for (i, joint) in chain.joints()[..chain.dof() - 1].iter().enumerate() {
            let JointConstraint::Hinge { axis, range } = &joint.constraint else {
                unreachable!();
            };
            let local = s.local_rotation(joint.bone);
            let (rotation, _) = clamp_hinge(&joint.rest, &local, axis, range, deltas[i]);
            s.set_local_rotation(joint.bone, rotation);
        }
    }

    #[test]
    fn transpose_is_scaled_jt_e() {
        let s = straight_arm();
        let chain = straight_chain(&s, Vector3::new(2.0, 2.0, 0.0));
        let step = solve(&chain, &s, &config(SolveMethod::Transpose));

        let e = DVector::from_column_slice(step.error.as_slice());
        let expected = step.jacobian.matrix.transpose() * e * 0.01;
        assert_relative_eq!(step.deltas, expected, epsilon = 1e-7);
        // target above the arm: every driven hinge turns counter-clockwise
        assert!(step.deltas[1] > 0.0 && step.deltas[2] > 0.0 && step.deltas[3] > 0.0);
    }

    #[test]
    fn transpose_descends() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let cfg = config(SolveMethod::Transpose);

        for _ in 0..50 {
            let mut s = straight_arm();
            for bone in 1..=3 {
                s.set_local_rotation(
                    bone,
                    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rng.gen_range(-1.2..1.2)),
                );
            }
            let target = Vector3::new(rng.gen_range(-2.0..3.0), rng.gen_range(-1.0..3.0), 0.0);
            let chain = straight_chain(&s, target);

            let step = solve(&chain, &s, &cfg);
            if step.deltas.norm() < 1e-6 {
                continue;
            }
            let before = step.error.norm();
            apply(&chain, &mut s, &step.deltas);
            let after = chain.error(&s).norm();
            assert!(after <= before + 1e-5, "error grew: {before} -> {after}");
        }
    }

    #[test]
    fn damped_finite_where_pseudoinverse_is_not() {
        let s = straight_arm();
        // Fully extended along X, target further out along X: J has rank 1.
        let chain = straight_chain(&s, Vector3::new(5.0, 1.0, 0.0));

        let pinv = solve(&chain, &s, &config(SolveMethod::Pseudoinverse));
        assert!(pinv.deltas.iter().any(|d| !d.is_finite()));

        let damped = solve(&chain, &s, &config(SolveMethod::Damped));
        assert!(damped.deltas.iter().all(|d| d.is_finite()));
    }

    /// Same arm, but the middle hinge turns about Y so the chain spans 3D.
    fn spatial_chain(s: &Skeleton, target: Vector3<f32>) -> KinematicChain {
        let wide = JointLimitConfig::hinge(-180.0, 180.0);
        let limits = vec![
            wide.clone(),
            wide.clone(),
            JointLimitConfig::Hinge {
                min: -180.0,
                max: 180.0,
                axis: Some([0.0, 1.0, 0.0]),
            },
            wide.clone(),
            wide,
        ];
        KinematicChain::new("arm", s, 0, 4, Vector3::z(), &limits, Some(target), 8).unwrap()
    }

    #[test]
    fn pseudoinverse_reproduces_scaled_error() {
        let mut s = straight_arm();
        s.set_local_rotation(1, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5));
        s.set_local_rotation(3, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7));
        let chain = spatial_chain(&s, Vector3::new(1.0, 2.0, 0.5));

        let step = solve(&chain, &s, &config(SolveMethod::Pseudoinverse));
        assert!(step.deltas.iter().all(|d| d.is_finite()));

        // J · J⁺ = I for a full-row-rank J.
        let moved = &step.jacobian.matrix * &step.deltas;
        let expected = DVector::from_column_slice(step.error.as_slice()) * 0.01;
        assert_relative_eq!(moved, expected, epsilon = 1e-5);
    }

    #[test]
    fn damped_approaches_pseudoinverse_without_damping() {
        let mut s = straight_arm();
        s.set_local_rotation(1, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5));
        s.set_local_rotation(3, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7));
        let chain = spatial_chain(&s, Vector3::new(1.0, 2.0, 0.5));

        let undamped = IkConfig {
            damping: 0.0,
            ..IkConfig::default()
        };
        let a = solve(&chain, &s, &config(SolveMethod::Pseudoinverse));
        let b = solve(&chain, &s, &undamped);
        assert_relative_eq!(a.deltas, b.deltas, epsilon = 1e-5);

        // Damping shrinks the step.
        let damped = solve(&chain, &s, &config(SolveMethod::Damped));
        assert!(damped.deltas.norm() < a.deltas.norm());
    }

    #[test]
    fn sanitize_zeroes_non_finite() {
        let mut d = DVector::from_vec(vec![0.1, f32::NAN, f32::INFINITY, -0.2]);
        assert_eq!(sanitize_deltas(&mut d), 2);
        assert_eq!(d.as_slice(), &[0.1, 0.0, 0.0, -0.2]);
    }

    #[test]
    fn solve_is_idempotent() {
        let mut s = straight_arm();
        s.set_local_rotation(2, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.6));
        let chain = straight_chain(&s, Vector3::new(1.0, 2.5, 0.3));

        for method in SolveMethod::ALL {
            let cfg = config(method);
            let a = solve(&chain, &s, &cfg);
            let b = solve(&chain, &s, &cfg);
            assert_eq!(a.jacobian, b.jacobian);
            assert_eq!(a.error, b.error);
            for (x, y) in a.deltas.iter().zip(b.deltas.iter()) {
                assert!(x.to_bits() == y.to_bits(), "{x} != {y}");
            }
        }
    }

    #[test]
    fn step_gain_scales_linearly() {
        let s = straight_arm();
        let chain = straight_chain(&s, Vector3::new(2.0, 2.0, 0.0));
        let small = solve(&chain, &s, &config(SolveMethod::Damped));
        let large = solve(
            &chain,
            &s,
            &IkConfig {
                step_gain: 0.02,
                ..IkConfig::default()
            },
        );
        assert_relative_eq!(large.deltas, small.deltas * 2.0, epsilon = 1e-6);
    }
}
