// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Cartesian motion generator.
//!
//! Poses are handed to the trajectory generator as `[x, y, z, qx, qy, qz, qw]`. Each loaded
//! orientation is flipped onto the hemisphere of the currently commanded one, so the
//! interpolation always takes the short way around.
use std::sync::Arc;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector4};

use crate::motion::generator::{impl_generator_handle, GeneratorShared, Waypoint};
use crate::motion::profile::{cartesian_limits, KinematicLimits, MotionLimits, MotionProfile};
use crate::motion::targets::CartesianTarget;
use crate::robot::control_types::{CartesianPose, RobotCommand};
use crate::robot::robot_state::RobotState;

fn pose_to_vector(pose: &Isometry3<f64>) -> [f64; 7] {
    let translation = pose.translation.vector;
    let orientation = pose.rotation.coords;
    [
        translation.x,
        translation.y,
        translation.z,
        orientation[0],
        orientation[1],
        orientation[2],
        orientation[3],
    ]
}

fn vector_to_pose(vector: &[f64; 7]) -> Isometry3<f64> {
    let orientation = UnitQuaternion::from_quaternion(Quaternion::new(
        vector[6], vector[3], vector[4], vector[5],
    ));
    Isometry3::from_parts(Translation3::new(vector[0], vector[1], vector[2]), orientation)
}

impl Waypoint for CartesianTarget {
    fn hold(state: &RobotState) -> Self {
        CartesianTarget::from(state.commanded_pose())
    }
    fn measured_position(state: &RobotState) -> [f64; 7] {
        pose_to_vector(&state.pose())
    }
    fn target_position(&self, state: &RobotState, current: &[f64; 7]) -> [f64; 7] {
        let mut target = pose_to_vector(&self.resolve(&state.pose()));
        let current_orientation = Vector4::new(current[3], current[4], current[5], current[6]);
        let target_orientation = Vector4::new(target[3], target[4], target[5], target[6]);
        if current_orientation.dot(&target_orientation) < 0. {
            target[3..].iter_mut().for_each(|x| *x = -*x);
        }
        target
    }
    fn profile(&self) -> &MotionProfile {
        CartesianTarget::profile(self)
    }
    fn kinematic_limits(limits: &MotionLimits, profile: &MotionProfile) -> KinematicLimits {
        cartesian_limits(limits, profile)
    }
    fn command(position: &[f64; 7]) -> RobotCommand {
        CartesianPose::from(vector_to_pose(position)).into()
    }
}

/// Moves the end effector through a queue of [`CartesianTarget`]s.
///
/// Clones share the same waypoint queue. Relative targets are resolved against the measured
/// end effector pose at the moment they are loaded, i.e. after all previous targets finished.
#[derive(Clone)]
pub struct CartesianMotionGenerator {
    pub(crate) shared: Arc<GeneratorShared<CartesianTarget>>,
}

impl_generator_handle!(CartesianMotionGenerator, CartesianTarget, "Cartesian Motion Generator");
