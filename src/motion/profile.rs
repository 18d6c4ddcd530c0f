// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Converts relative motion-profile scale factors into absolute limits for the trajectory
//! generator.
use serde::{Deserialize, Serialize};

use crate::exception::{create_invalid_argument, PandaResult};
use crate::robot::limits::{
    DEGREES_OF_FREEDOM, MAX_JOINT_ACCELERATION, MAX_JOINT_JERK, MAX_JOINT_VELOCITY,
    MAX_ROTATIONAL_ACCELERATION, MAX_ROTATIONAL_JERK, MAX_ROTATIONAL_VELOCITY,
    MAX_TRANSLATIONAL_ACCELERATION, MAX_TRANSLATIONAL_JERK, MAX_TRANSLATIONAL_VELOCITY,
};

/// Share of the joint acceleration and jerk limits a generated trajectory may use.
const JOINT_DERIVATIVE_FACTOR: f64 = 0.3;
/// Share of the translational limits a generated trajectory may use.
const TRANSLATION_FACTOR: f64 = 0.4;
/// Additional share of the translational acceleration and jerk limits.
const TRANSLATION_DERIVATIVE_FACTOR: f64 = 0.4;
/// Share of the translational velocity limit on top of [`TRANSLATION_FACTOR`].
const TRANSLATION_VELOCITY_FACTOR: f64 = 0.8;
/// dq/dt = 0.5 * w * q, with w the angular velocity and q the orientation quaternion.
const QUATERNION_FACTOR: f64 = 0.5;

fn check_scale(value: f64) -> bool {
    value.is_finite() && value > 0.
}

/// Process-wide scale factors of the velocity, acceleration and jerk limits.
///
/// Owned by the [`Panda`](`crate::Panda`) session and combined multiplicatively with the
/// [`MotionProfile`] of each waypoint when the waypoint is loaded.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct MotionLimits {
    pub velocity_rel: f64,
    pub acceleration_rel: f64,
    pub jerk_rel: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        MotionLimits {
            velocity_rel: 1.,
            acceleration_rel: 1.,
            jerk_rel: 1.,
        }
    }
}

impl MotionLimits {
    /// Creates new scale factors.
    /// # Errors
    /// * InvalidArgument if one of the factors is not finite or not positive.
    pub fn new(velocity_rel: f64, acceleration_rel: f64, jerk_rel: f64) -> PandaResult<Self> {
        let limits = MotionLimits {
            velocity_rel,
            acceleration_rel,
            jerk_rel,
        };
        limits.validate()?;
        Ok(limits)
    }
    /// Checks that all scale factors are finite and positive.
    pub fn validate(&self) -> PandaResult<()> {
        if check_scale(self.velocity_rel)
            && check_scale(self.acceleration_rel)
            && check_scale(self.jerk_rel)
        {
            Ok(())
        } else {
            Err(create_invalid_argument(
                "motion limit scale factors have to be finite and positive",
            ))
        }
    }
}

/// Per-waypoint scale factors of the velocity, acceleration and jerk limits.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct MotionProfile {
    pub velocity_rel: f64,
    pub acceleration_rel: f64,
    pub jerk_rel: f64,
}

impl Default for MotionProfile {
    fn default() -> Self {
        MotionProfile::unit()
    }
}

impl MotionProfile {
    /// Profile which applies the global limits unchanged.
    pub const fn unit() -> Self {
        MotionProfile {
            velocity_rel: 1.,
            acceleration_rel: 1.,
            jerk_rel: 1.,
        }
    }
    /// Creates a new profile.
    pub fn new(velocity_rel: f64, acceleration_rel: f64, jerk_rel: f64) -> Self {
        MotionProfile {
            velocity_rel,
            acceleration_rel,
            jerk_rel,
        }
    }
    fn combined(&self, limits: &MotionLimits) -> (f64, f64, f64) {
        (
            self.velocity_rel * limits.velocity_rel,
            self.acceleration_rel * limits.acceleration_rel,
            self.jerk_rel * limits.jerk_rel,
        )
    }
}

/// Absolute limits for each of the seven entries of a kinematic vector.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct KinematicLimits {
    pub max_velocity: [f64; DEGREES_OF_FREEDOM],
    pub max_acceleration: [f64; DEGREES_OF_FREEDOM],
    pub max_jerk: [f64; DEGREES_OF_FREEDOM],
}

/// Resolves the limits of a joint space motion.
pub fn joint_limits(limits: &MotionLimits, profile: &MotionProfile) -> KinematicLimits {
    let (velocity_rel, acceleration_rel, jerk_rel) = profile.combined(limits);
    let mut out = KinematicLimits {
        max_velocity: [0.; 7],
        max_acceleration: [0.; 7],
        max_jerk: [0.; 7],
    };
    for dof in 0..DEGREES_OF_FREEDOM {
        out.max_velocity[dof] = MAX_JOINT_VELOCITY[dof] * velocity_rel;
        out.max_acceleration[dof] =
            JOINT_DERIVATIVE_FACTOR * MAX_JOINT_ACCELERATION[dof] * acceleration_rel;
        out.max_jerk[dof] = JOINT_DERIVATIVE_FACTOR * MAX_JOINT_JERK[dof] * jerk_rel;
    }
    out
}

/// Resolves the limits of a Cartesian motion.
///
/// The first three entries are the translation, the last four the orientation quaternion.
pub fn cartesian_limits(limits: &MotionLimits, profile: &MotionProfile) -> KinematicLimits {
    let (velocity_rel, acceleration_rel, jerk_rel) = profile.combined(limits);
    let mut out = KinematicLimits {
        max_velocity: [0.; 7],
        max_acceleration: [0.; 7],
        max_jerk: [0.; 7],
    };
    for dof in 0..3 {
        out.max_velocity[dof] = TRANSLATION_VELOCITY_FACTOR
            * TRANSLATION_FACTOR
            * MAX_TRANSLATIONAL_VELOCITY
            * velocity_rel;
        out.max_acceleration[dof] = JOINT_DERIVATIVE_FACTOR
            * TRANSLATION_FACTOR
            * TRANSLATION_DERIVATIVE_FACTOR
            * MAX_TRANSLATIONAL_ACCELERATION
            * acceleration_rel;
        out.max_jerk[dof] = JOINT_DERIVATIVE_FACTOR
            * TRANSLATION_FACTOR
            * TRANSLATION_DERIVATIVE_FACTOR
            * MAX_TRANSLATIONAL_JERK
            * jerk_rel;
    }
    for dof in 3..DEGREES_OF_FREEDOM {
        out.max_velocity[dof] = QUATERNION_FACTOR * MAX_ROTATIONAL_VELOCITY * velocity_rel;
        out.max_acceleration[dof] = QUATERNION_FACTOR
            * JOINT_DERIVATIVE_FACTOR
            * MAX_ROTATIONAL_ACCELERATION
            * acceleration_rel;
        out.max_jerk[dof] =
            QUATERNION_FACTOR * JOINT_DERIVATIVE_FACTOR * MAX_ROTATIONAL_JERK * jerk_rel;
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::motion::profile::{cartesian_limits, joint_limits, MotionLimits, MotionProfile};
    use crate::robot::limits::{MAX_JOINT_ACCELERATION, MAX_JOINT_JERK, MAX_JOINT_VELOCITY};

    #[test]
    fn unit_profile_uses_panda_limits() {
        let limits = joint_limits(&MotionLimits::default(), &MotionProfile::unit());
        for dof in 0..7 {
            assert_eq!(limits.max_velocity[dof], MAX_JOINT_VELOCITY[dof]);
            assert!((limits.max_acceleration[dof] - 0.3 * MAX_JOINT_ACCELERATION[dof]).abs() < 1e-12);
            assert!((limits.max_jerk[dof] - 0.3 * MAX_JOINT_JERK[dof]).abs() < 1e-9);
        }
    }

    #[test]
    fn global_and_waypoint_factors_multiply() {
        let global = MotionLimits::new(0.5, 0.2, 0.1).unwrap();
        let profile = MotionProfile::new(0.5, 0.5, 2.0);
        let scaled = joint_limits(&global, &profile);
        let unit = joint_limits(&MotionLimits::default(), &MotionProfile::unit());
        for dof in 0..7 {
            assert!((scaled.max_velocity[dof] - 0.25 * unit.max_velocity[dof]).abs() < 1e-12);
            assert!((scaled.max_acceleration[dof] - 0.1 * unit.max_acceleration[dof]).abs() < 1e-12);
            assert!((scaled.max_jerk[dof] - 0.2 * unit.max_jerk[dof]).abs() < 1e-9);
        }
    }

    #[test]
    fn cartesian_limits_split_translation_and_rotation() {
        let limits = cartesian_limits(&MotionLimits::default(), &MotionProfile::unit());
        assert!((limits.max_velocity[0] - 0.8 * 0.4 * 1.7).abs() < 1e-12);
        assert_eq!(limits.max_velocity[0], limits.max_velocity[2]);
        assert!((limits.max_velocity[3] - 0.5 * 2.5).abs() < 1e-12);
        assert!((limits.max_acceleration[6] - 0.5 * 0.3 * 25.0).abs() < 1e-12);
        assert!((limits.max_jerk[1] - 0.3 * 0.4 * 0.4 * 6500.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_scale_factors_are_rejected() {
        assert!(MotionLimits::new(0., 1., 1.).is_err());
        assert!(MotionLimits::new(1., -1., 1.).is_err());
        assert!(MotionLimits::new(1., 1., f64::INFINITY).is_err());
        assert!(MotionLimits::new(0.3, 0.3, 0.3).is_ok());
    }

    #[test]
    fn motion_limits_from_json() {
        let limits: MotionLimits = serde_json::from_str(r#"{"velocity_rel": 0.2}"#).unwrap();
        assert_eq!(limits.velocity_rel, 0.2);
        assert_eq!(limits.acceleration_rel, 1.);
        assert_eq!(limits.jerk_rel, 1.);
    }
}
