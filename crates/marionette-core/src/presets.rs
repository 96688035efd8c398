//! Stock humanoid rig: a T-pose skeleton and four limb chains.
//!
//! Y is up, the figure faces +Z, its right side is -X. Limb ranges are in
//! degrees; each chain runs end-effector, hinge, ball, base.

use nalgebra::{UnitQuaternion, Vector3};

use crate::config::{ChainConfig, IkConfig, JointLimitConfig, RigConfig};
use crate::error::SkeletonError;
use crate::skeleton::Skeleton;

/// Hinge axis for arm chains (elbow flexion about local Y).
pub const ARM_AXIS: [f32; 3] = [0.0, 1.0, 0.0];
/// Hinge axis for leg chains (knee flexion about local X).
pub const LEG_AXIS: [f32; 3] = [1.0, 0.0, 0.0];

/// Build the T-pose skeleton the humanoid chains refer to.
///
/// # Errors
///
/// Returns [`SkeletonError`] only if the bone table is edited into an
/// invalid parent order.
pub fn humanoid_skeleton() -> Result<Skeleton, SkeletonError> {
    let id = UnitQuaternion::<f32>::identity;
    let mut s = Skeleton::new();

    let hips = s.add_bone("hips", None, Vector3::new(0.0, 1.0, 0.0), id())?;
    let spine = s.add_bone("spine", Some(hips), Vector3::new(0.0, 0.2, 0.0), id())?;
    let chest = s.add_bone("chest", Some(spine), Vector3::new(0.0, 0.2, 0.0), id())?;
    s.add_bone("neck", Some(chest), Vector3::new(0.0, 0.2, 0.0), id())?;

    for (side, sign) in [("r", -1.0_f32), ("l", 1.0)] {
        let clavicle = s.add_bone(
            format!("clavicle_{side}"),
            Some(chest),
            Vector3::new(sign * 0.05, 0.15, 0.0),
            id(),
        )?;
        let upper = s.add_bone(
            format!("upper_arm_{side}"),
            Some(clavicle),
            Vector3::new(sign * 0.15, 0.0, 0.0),
            id(),
        )?;
        let forearm = s.add_bone(
            format!("forearm_{side}"),
            Some(upper),
            Vector3::new(sign * 0.3, 0.0, 0.0),
            id(),
        )?;
        s.add_bone(
            format!("hand_{side}"),
            Some(forearm),
            Vector3::new(sign * 0.25, 0.0, 0.0),
            id(),
        )?;
    }

    for (side, sign) in [("r", -1.0_f32), ("l", 1.0)] {
        let hip = s.add_bone(
            format!("hip_{side}"),
            Some(hips),
            Vector3::new(sign * 0.1, 0.0, 0.0),
            id(),
        )?;
        let thigh = s.add_bone(
            format!("thigh_{side}"),
            Some(hip),
            Vector3::new(0.0, -0.05, 0.0),
            id(),
        )?;
        let shin = s.add_bone(
            format!("shin_{side}"),
            Some(thigh),
            Vector3::new(0.0, -0.45, 0.0),
            id(),
        )?;
        s.add_bone(
            format!("foot_{side}"),
            Some(shin),
            Vector3::new(0.0, -0.45, 0.0),
            id(),
        )?;
    }

    Ok(s)
}

/// Four limb chains over [`humanoid_skeleton`], damped solver defaults.
pub fn humanoid_rig() -> RigConfig {
    RigConfig {
        ik: IkConfig::default(),
        chains: vec![
            limb(
                "right hand",
                "clavicle_r",
                "hand_r",
                ARM_AXIS,
                [[-90.0, 90.0], [0.0, 140.0]],
                [[-30.0, 30.0], [-60.0, 110.0], [-50.0, 60.0]],
            ),
            limb(
                "left hand",
                "clavicle_l",
                "hand_l",
                ARM_AXIS,
                [[-90.0, 90.0], [-140.0, 0.0]],
                [[-30.0, 30.0], [-110.0, 60.0], [-50.0, 60.0]],
            ),
            limb(
                "right foot",
                "hip_r",
                "foot_r",
                LEG_AXIS,
                [[-30.0, 90.0], [0.0, 140.0]],
                [[-120.0, 60.0], [-50.0, 50.0], [-70.0, 10.0]],
            ),
            limb(
                "left foot",
                "hip_l",
                "foot_l",
                LEG_AXIS,
                [[-30.0, 90.0], [0.0, 140.0]],
                [[-120.0, 60.0], [-50.0, 50.0], [-10.0, 70.0]],
            ),
        ],
        ..RigConfig::default()
    }
}

fn limb(
    name: &str,
    base: &str,
    end: &str,
    axis: [f32; 3],
    hinges: [[f32; 2]; 2],
    ball: [[f32; 2]; 3],
) -> ChainConfig {
    ChainConfig {
        name: name.into(),
        base: base.into(),
        end: end.into(),
        axis,
        target: None,
        joints: vec![
            JointLimitConfig::hinge(hinges[0][0], hinges[0][1]),
            JointLimitConfig::hinge(hinges[1][0], hinges[1][1]),
            JointLimitConfig::ball(ball[0], ball[1], ball[2]),
            // base: fixed frame, range unused
            JointLimitConfig::hinge(0.0, 0.0),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn skeleton_has_every_chain_bone() {
        let skeleton = humanoid_skeleton().unwrap();
        let rig = humanoid_rig();
        for chain in &rig.chains {
            assert!(skeleton.find(&chain.base).is_some(), "{}", chain.base);
            assert!(skeleton.find(&chain.end).is_some(), "{}", chain.end);
        }
    }

    #[test]
    fn right_hand_rest_position() {
        let skeleton = humanoid_skeleton().unwrap();
        let hand = skeleton.find("hand_r").unwrap();
        // hips 1.0 + spine 0.2 + chest 0.2 + clavicle 0.15
        assert_relative_eq!(
            skeleton.world_position(hand),
            Vector3::new(-0.75, 1.55, 0.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn rig_validates() {
        assert!(humanoid_rig().validate().is_ok());
    }
}
