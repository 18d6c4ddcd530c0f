// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the waypoint types which are queued into motion generators.
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::exception::{create_invalid_argument, PandaResult};
use crate::motion::profile::MotionProfile;
use crate::robot::control_tools::is_homogeneous_transformation;
use crate::utils::array_to_isometry;

/// Frame in which a [`CartesianTarget`] is expressed.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReferenceFrame {
    /// The pose is given in the base frame of the robot.
    Absolute,
    /// The pose is given relative to the end effector pose at the time the target is loaded.
    Relative,
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        ReferenceFrame::Absolute
    }
}

/// A desired joint configuration together with its motion profile.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct JointTarget {
    target: [f64; 7],
    profile: MotionProfile,
}

impl JointTarget {
    /// Creates a new joint target with unit motion profile.
    /// # Arguments
    /// * `target` - Desired joint angles in \[rad\].
    pub fn new(target: [f64; 7]) -> Self {
        JointTarget {
            target,
            profile: MotionProfile::unit(),
        }
    }
    /// Creates a new joint target with the given scale factors.
    pub fn with_profile(
        target: [f64; 7],
        velocity_rel: f64,
        acceleration_rel: f64,
        jerk_rel: f64,
    ) -> Self {
        JointTarget {
            target,
            profile: MotionProfile::new(velocity_rel, acceleration_rel, jerk_rel),
        }
    }
    /// Desired joint angles in \[rad\].
    pub fn target(&self) -> &[f64; 7] {
        &self.target
    }
    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }
    pub fn velocity_rel(&self) -> f64 {
        self.profile.velocity_rel
    }
    pub fn acceleration_rel(&self) -> f64 {
        self.profile.acceleration_rel
    }
    pub fn jerk_rel(&self) -> f64 {
        self.profile.jerk_rel
    }
}

impl From<[f64; 7]> for JointTarget {
    fn from(target: [f64; 7]) -> Self {
        JointTarget::new(target)
    }
}

/// A desired end effector pose together with its motion profile and reference frame.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct CartesianTarget {
    position: Vector3<f64>,
    orientation: UnitQuaternion<f64>,
    reference_frame: ReferenceFrame,
    profile: MotionProfile,
}

impl CartesianTarget {
    /// Creates a new absolute Cartesian target with unit motion profile.
    /// # Arguments
    /// * `position` - Desired end effector position in \[m\].
    /// * `orientation` - Desired end effector orientation as quaternion `[x, y, z, w]`.
    /// It does not have to be normalized.
    /// # Errors
    /// * InvalidArgument if the orientation has (close to) zero norm or values are not finite.
    pub fn new(position: [f64; 3], orientation: [f64; 4]) -> PandaResult<Self> {
        if position.iter().chain(orientation.iter()).any(|x| !x.is_finite()) {
            return Err(create_invalid_argument(
                "Cartesian target contains infinite or NaN values",
            ));
        }
        let quaternion = Quaternion::new(orientation[3], orientation[0], orientation[1], orientation[2]);
        let orientation = UnitQuaternion::try_new(quaternion, 1e-9).ok_or_else(|| {
            create_invalid_argument("orientation quaternion of Cartesian target has zero norm")
        })?;
        Ok(CartesianTarget {
            position: Vector3::from_column_slice(&position),
            orientation,
            reference_frame: ReferenceFrame::Absolute,
            profile: MotionProfile::unit(),
        })
    }
    /// Creates a new absolute Cartesian target from a homogeneous transformation.
    /// # Arguments
    /// * `pose` - 4x4 matrix in column-major format.
    /// # Errors
    /// * InvalidArgument if `pose` is not a valid homogeneous transformation.
    pub fn from_matrix(pose: &[f64; 16]) -> PandaResult<Self> {
        if pose.iter().any(|x| !x.is_finite()) || !is_homogeneous_transformation(pose) {
            return Err(create_invalid_argument(
                "Cartesian target is not a homogeneous transformation",
            ));
        }
        Ok(CartesianTarget::from(array_to_isometry(pose)))
    }
    /// Sets the reference frame.
    pub fn with_reference_frame(mut self, reference_frame: ReferenceFrame) -> Self {
        self.reference_frame = reference_frame;
        self
    }
    /// Sets the scale factors of the motion profile.
    pub fn with_profile(mut self, velocity_rel: f64, acceleration_rel: f64, jerk_rel: f64) -> Self {
        self.profile = MotionProfile::new(velocity_rel, acceleration_rel, jerk_rel);
        self
    }
    /// Desired end effector position in \[m\].
    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }
    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.orientation
    }
    pub fn reference_frame(&self) -> ReferenceFrame {
        self.reference_frame
    }
    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }
    pub fn velocity_rel(&self) -> f64 {
        self.profile.velocity_rel
    }
    pub fn acceleration_rel(&self) -> f64 {
        self.profile.acceleration_rel
    }
    pub fn jerk_rel(&self) -> f64 {
        self.profile.jerk_rel
    }
    /// The target as Isometry in its own reference frame.
    pub fn pose(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }
    /// Resolves the target against the end effector pose `current`.
    ///
    /// Absolute targets are returned unchanged, relative targets are composed as
    /// `current * target`. The orientation of the result is re-normalized.
    pub fn resolve(&self, current: &Isometry3<f64>) -> Isometry3<f64> {
        let mut pose = match self.reference_frame {
            ReferenceFrame::Absolute => self.pose(),
            ReferenceFrame::Relative => current * self.pose(),
        };
        pose.rotation.renormalize();
        pose
    }
}

impl From<Isometry3<f64>> for CartesianTarget {
    fn from(pose: Isometry3<f64>) -> Self {
        let mut orientation = pose.rotation;
        orientation.renormalize();
        CartesianTarget {
            position: pose.translation.vector,
            orientation,
            reference_frame: ReferenceFrame::Absolute,
            profile: MotionProfile::unit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::motion::targets::{CartesianTarget, JointTarget, ReferenceFrame};
    use crate::utils::isometry_to_array;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

    #[test]
    fn joint_target_defaults_to_unit_profile() {
        let target = JointTarget::new([0.1; 7]);
        assert_eq!(target.velocity_rel(), 1.);
        assert_eq!(target.acceleration_rel(), 1.);
        assert_eq!(target.jerk_rel(), 1.);
        let slow = JointTarget::with_profile([0.1; 7], 0.2, 0.3, 0.4);
        assert_eq!(slow.velocity_rel(), 0.2);
        assert_eq!(slow.jerk_rel(), 0.4);
    }

    #[test]
    fn orientation_is_normalized() {
        let target = CartesianTarget::new([0.3, 0., 0.5], [0., 0., 0., 4.]).unwrap();
        assert!((target.orientation().quaternion().norm() - 1.).abs() < 1e-12);
        assert!(CartesianTarget::new([0.3, 0., 0.5], [0.; 4]).is_err());
        assert!(CartesianTarget::new([f64::NAN, 0., 0.5], [0., 0., 0., 1.]).is_err());
    }

    #[test]
    fn from_matrix_validates_transform() {
        let pose = Isometry3::from_parts(
            Translation3::new(0.4, 0.1, 0.3),
            UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0., 0.3),
        );
        let target = CartesianTarget::from_matrix(&isometry_to_array(&pose)).unwrap();
        assert!((target.position() - Vector3::new(0.4, 0.1, 0.3)).norm() < 1e-12);
        assert!(target.orientation().angle_to(&pose.rotation) < 1e-9);
        let mut broken = isometry_to_array(&pose);
        broken[0] = 3.;
        assert!(CartesianTarget::from_matrix(&broken).is_err());
    }

    #[test]
    fn relative_target_resolves_against_current_pose() {
        let current = Isometry3::from_parts(
            Translation3::new(0.3, 0.0, 0.5),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        );
        let relative = CartesianTarget::new([0.1, 0., 0.], [0., 0., 0., 1.])
            .unwrap()
            .with_reference_frame(ReferenceFrame::Relative);
        let resolved = relative.resolve(&current);
        // x axis of the end effector points along y of the base
        assert!((resolved.translation.vector - Vector3::new(0.3, 0.1, 0.5)).norm() < 1e-12);
        assert!((resolved.rotation.quaternion().norm() - 1.).abs() < 1e-12);

        let absolute = CartesianTarget::new([0.1, 0., 0.], [0., 0., 0., 1.]).unwrap();
        assert!((absolute.resolve(&current).translation.vector - Vector3::new(0.1, 0., 0.)).norm() < 1e-12);
    }
}
