//! Joint constraints and the apply-and-clamp step.
//!
//! Ranges are stored in radians. Angles are measured relative to the rest
//! rotation captured when the chain was built.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::{UnitQuaternion, UnitVector3, Vector3};

use marionette_core::config::JointLimitConfig;
use marionette_core::error::ChainError;

/// Ball pitch never gets closer than this to ±90°, where the Euler
/// decomposition loses a degree of freedom.
const GIMBAL_MARGIN: f32 = 0.01;

/// Closed angle interval `[min, max]` in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleRange {
    pub min: f32,
    pub max: f32,
}

impl AngleRange {
    /// Build from a degree pair, validating `min <= max` and finiteness.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::InvalidRange`] if either bound is non-finite or
    /// `min > max`.
    pub fn from_degrees(axis: &'static str, min: f32, max: f32) -> Result<Self, ChainError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ChainError::InvalidRange { axis, min, max });
        }
        Ok(Self {
            min: min.to_radians(),
            max: max.to_radians(),
        })
    }

    /// Clamp an angle into the range. Out-of-range angles land exactly on the
    /// violated bound.
    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.min, self.max)
    }

    /// Whether `angle` lies inside the range (inclusive).
    pub fn contains(&self, angle: f32) -> bool {
        (self.min..=self.max).contains(&angle)
    }
}

/// Joint type with its type-specific constraint payload.
#[derive(Debug, Clone, PartialEq)]
pub enum JointConstraint {
    /// One rotational DOF about a fixed local axis.
    Hinge {
        axis: UnitVector3<f32>,
        range: AngleRange,
    },
    /// Three Euler ranges. The rotation axis is derived per Jacobian build.
    Ball {
        x: AngleRange,
        y: AngleRange,
        z: AngleRange,
    },
}

impl JointConstraint {
    /// Convert a degree-valued config entry. Hinges without their own axis
    /// use `chain_axis`.
    ///
    /// # Errors
    ///
    /// - [`ChainError::InvalidRange`] for a bad degree pair.
    /// - [`ChainError::DegenerateAxis`] if the hinge axis has zero length.
    pub fn from_config(
        config: &JointLimitConfig,
        chain_axis: Vector3<f32>,
    ) -> Result<Self, ChainError> {
        match config {
            JointLimitConfig::Hinge { min, max, axis } => {
                let axis = axis.map_or(chain_axis, |a| Vector3::new(a[0], a[1], a[2]));
                let axis = UnitVector3::try_new(axis, f32::EPSILON)
                    .ok_or(ChainError::DegenerateAxis)?;
                Ok(Self::Hinge {
                    axis,
                    range: AngleRange::from_degrees("hinge", *min, *max)?,
                })
            }
            JointLimitConfig::Ball { x, y, z } => Ok(Self::Ball {
                x: AngleRange::from_degrees("x", x[0], x[1])?,
                y: AngleRange::from_degrees("y", y[0], y[1])?,
                z: AngleRange::from_degrees("z", z[0], z[1])?,
            }),
        }
    }

    /// Whether this is a hinge.
    pub const fn is_hinge(&self) -> bool {
        matches!(self, Self::Hinge { .. })
    }
}

/// Signed angle of `relative` about `axis` (swing-twist decomposition),
/// wrapped into `(-π, π]`.
pub fn twist_angle(relative: &UnitQuaternion<f32>, axis: &UnitVector3<f32>) -> f32 {
    let q = relative.quaternion();
    let angle = 2.0 * q.imag().dot(&axis.into_inner()).atan2(q.w);
    if angle > PI {
        angle - TAU
    } else if angle <= -PI {
        angle + TAU
    } else {
        angle
    }
}

/// Rotate a hinge by `delta` about its axis and clamp to `range`.
///
/// Returns the new local rotation and the applied angle (relative to rest).
/// An out-of-range result is hard-set to the violated bound.
pub fn clamp_hinge(
    rest: &UnitQuaternion<f32>,
    local: &UnitQuaternion<f32>,
    axis: &UnitVector3<f32>,
    range: &AngleRange,
    delta: f32,
) -> (UnitQuaternion<f32>, f32) {
    let current = twist_angle(&(rest.inverse() * local), axis);
    let applied = range.clamp(current + delta);
    (rest * UnitQuaternion::from_axis_angle(axis, applied), applied)
}

/// Rotate a ball joint by `delta` about `axis` (in the joint's own frame),
/// then clamp each rest-relative Euler component independently.
///
/// Returns the new local rotation and the applied `(x, y, z)` Euler angles.
/// Per-axis clamping of a combined rotation keeps each component in range
/// but does not trace the true anatomical envelope. The pitch (`y`) is
/// additionally held slightly inside ±90°.
pub fn clamp_ball(
    rest: &UnitQuaternion<f32>,
    local: &UnitQuaternion<f32>,
    axis: &UnitVector3<f32>,
    limits: [&AngleRange; 3],
    delta: f32,
) -> (UnitQuaternion<f32>, Vector3<f32>) {
    let rotated = local * UnitQuaternion::from_axis_angle(axis, delta);
    let (rx, ry, rz) = (rest.inverse() * rotated).euler_angles();
    let pitch = limits[1]
        .clamp(ry)
        .clamp(-FRAC_PI_2 + GIMBAL_MARGIN, FRAC_PI_2 - GIMBAL_MARGIN);
    let applied = Vector3::new(limits[0].clamp(rx), pitch, limits[2].clamp(rz));
    (
        rest * UnitQuaternion::from_euler_angles(applied.x, applied.y, applied.z),
        applied,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn range_converts_degrees() {
        let r = AngleRange::from_degrees("hinge", -90.0, 90.0).unwrap();
        assert_relative_eq!(r.min, -FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(r.max, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn range_rejects_inverted_or_nan() {
        assert!(matches!(
            AngleRange::from_degrees("x", 10.0, -10.0),
            Err(ChainError::InvalidRange { axis: "x", .. })
        ));
        assert!(AngleRange::from_degrees("y", f32::NAN, 0.0).is_err());
        assert!(AngleRange::from_degrees("z", 0.0, 0.0).is_ok());
    }

    #[test]
    fn config_hinge_uses_chain_axis() {
        let c = JointConstraint::from_config(
            &JointLimitConfig::hinge(-45.0, 45.0),
            Vector3::new(0.0, 2.0, 0.0),
        )
        .unwrap();
        let JointConstraint::Hinge { axis, .. } = c else {
            panic!("expected hinge");
        };
        assert_relative_eq!(axis.into_inner(), Vector3::y(), epsilon = 1e-6);
    }

    #[test]
    fn config_hinge_axis_override() {
        let c = JointConstraint::from_config(
            &JointLimitConfig::Hinge {
                min: 0.0,
                max: 10.0,
                axis: Some([0.0, 0.0, 1.0]),
            },
            Vector3::x(),
        )
        .unwrap();
        let JointConstraint::Hinge { axis, .. } = c else {
            panic!("expected hinge");
        };
        assert_relative_eq!(axis.into_inner(), Vector3::z(), epsilon = 1e-6);
    }

    #[test]
    fn config_rejects_zero_axis() {
        assert_eq!(
            JointConstraint::from_config(&JointLimitConfig::hinge(0.0, 1.0), Vector3::zeros()),
            Err(ChainError::DegenerateAxis)
        );
    }

    #[test]
    fn twist_angle_recovers_axis_angle() {
        let axis = Vector3::z_axis();
        for angle in [-3.0_f32, -1.2, 0.0, 0.4, 2.9] {
            let q = UnitQuaternion::from_axis_angle(&axis, angle);
            assert_relative_eq!(twist_angle(&q, &axis), angle, epsilon = 1e-5);
        }
    }

    #[test]
    fn hinge_clamps_to_exact_bound() {
        let range = AngleRange::from_degrees("hinge", -90.0, 90.0).unwrap();
        let rest = UnitQuaternion::identity();
        let axis = Vector3::y_axis();

        let (rotation, applied) =
            clamp_hinge(&rest, &rest, &axis, &range, 120.0_f32.to_radians());

        assert_eq!(applied, range.max);
        assert_relative_eq!(applied, FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(twist_angle(&rotation, &axis), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn hinge_clamps_lower_bound_relative_to_rest() {
        let range = AngleRange::from_degrees("hinge", 0.0, 140.0).unwrap();
        let axis = Vector3::x_axis();
        let rest = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7);
        let local = rest * UnitQuaternion::from_axis_angle(&axis, 0.2);

        let (rotation, applied) = clamp_hinge(&rest, &local, &axis, &range, -0.5);
        assert_eq!(applied, 0.0);
        assert_relative_eq!(rotation, rest, epsilon = 1e-5);
    }

    #[test]
    fn hinge_inside_range_accumulates() {
        let range = AngleRange::from_degrees("hinge", -90.0, 90.0).unwrap();
        let axis = Vector3::z_axis();
        let rest = UnitQuaternion::identity();
        let (q1, a1) = clamp_hinge(&rest, &rest, &axis, &range, 0.3);
        let (_, a2) = clamp_hinge(&rest, &q1, &axis, &range, 0.2);
        assert_relative_eq!(a1, 0.3, epsilon = 1e-6);
        assert_relative_eq!(a2, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn ball_components_stay_in_range() {
        let x = AngleRange::from_degrees("x", -30.0, 30.0).unwrap();
        let y = AngleRange::from_degrees("y", -60.0, 60.0).unwrap();
        let z = AngleRange::from_degrees("z", -50.0, 60.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let rest = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3);
        let mut local = rest;
        for _ in 0..200 {
            let axis = UnitVector3::new_normalize(Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ));
            let delta = rng.gen_range(-2.0..2.0);
            let (next, applied) = clamp_ball(&rest, &local, &axis, [&x, &y, &z], delta);

            assert!(x.contains(applied.x));
            assert!(y.contains(applied.y));
            assert!(z.contains(applied.z));

            let (rx, ry, rz) = (rest.inverse() * next).euler_angles();
            assert!(rx >= x.min - 1e-4 && rx <= x.max + 1e-4, "x={rx}");
            assert!(ry >= y.min - 1e-4 && ry <= y.max + 1e-4, "y={ry}");
            assert!(rz >= z.min - 1e-4 && rz <= z.max + 1e-4, "z={rz}");
            local = next;
        }
    }

    #[test]
    fn ball_pitch_stays_off_gimbal_lock() {
        let x = AngleRange::from_degrees("x", -30.0, 30.0).unwrap();
        let y = AngleRange::from_degrees("y", -60.0, 110.0).unwrap();
        let z = AngleRange::from_degrees("z", -50.0, 60.0).unwrap();
        let rest = UnitQuaternion::identity();

        let (rotation, applied) =
            clamp_ball(&rest, &rest, &Vector3::y_axis(), [&x, &y, &z], 1.65);
        assert!(applied.y < FRAC_PI_2);

        let (rx, ry, rz) = rotation.euler_angles();
        assert_relative_eq!(Vector3::new(rx, ry, rz), applied, epsilon = 1e-4);
    }

    #[test]
    fn ball_small_rotation_unclamped() {
        let wide = AngleRange::from_degrees("x", -90.0, 90.0).unwrap();
        let rest = UnitQuaternion::identity();
        let (rotation, applied) =
            clamp_ball(&rest, &rest, &Vector3::z_axis(), [&wide, &wide, &wide], 0.25);
        assert_relative_eq!(applied, Vector3::new(0.0, 0.0, 0.25), epsilon = 1e-5);
        assert_relative_eq!(
            rotation,
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.25),
            epsilon = 1e-5
        );
    }
}
