// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains helper types for returning motion generation and joint-level torque commands.

use serde::Deserialize;
use serde::Serialize;

use crate::robot::control_tools::is_homogeneous_transformation;
use crate::utils::{isometry_to_array, Vector7};
use nalgebra::Isometry3;

/// Used to decide whether to enforce realtime mode for a control loop thread.
/// see [`Panda`](`crate::Panda`)
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RealtimeConfig {
    Enforce,
    Ignore,
}

/// The kind of command the real-time link has to expect once a control law is attached.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlMode {
    JointPosition,
    CartesianPose,
    Torque,
}

/// Helper trait for motion generation and torque commands.
///
/// Used to determine whether to terminate a loop after the control law has returned.
pub trait Finishable {
    /// Determines whether to finish a currently running motion.
    fn is_finished(&self) -> bool;
    /// Sets the attribute which decide if the currently running motion should be finished
    fn set_motion_finished(&mut self, finished: bool);
    /// Helper method to indicate that a motion should stop after processing the given command.
    fn motion_finished(self) -> Self;
}

/// Stores joint-level torque commands without gravity and friction.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct Torques {
    motion_finished: bool,
    /// Desired torques in \[Nm\].
    pub tau_J: [f64; 7],
}

impl From<Vector7> for Torques {
    fn from(vector: Vector7) -> Self {
        Torques::new(vector.into())
    }
}

impl Torques {
    /// Creates a new Torques instance
    /// # Arguments
    /// * `torques` - Desired joint-level torques without gravity and friction in \[Nm\].
    pub fn new(torques: [f64; 7]) -> Self {
        Torques {
            tau_J: torques,
            motion_finished: false,
        }
    }
}

impl Finishable for Torques {
    fn is_finished(&self) -> bool {
        self.motion_finished
    }
    fn set_motion_finished(&mut self, finished: bool) {
        self.motion_finished = finished;
    }
    fn motion_finished(mut self) -> Self {
        self.set_motion_finished(true);
        self
    }
}

/// Stores values for joint position motion generation.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct JointPositions {
    motion_finished: bool,
    /// Desired joint angles in \[rad\].
    pub q: [f64; 7],
}

impl From<Vector7> for JointPositions {
    fn from(vector: Vector7) -> Self {
        JointPositions::new(vector.into())
    }
}

impl JointPositions {
    /// Creates a new JointPositions instance.
    /// # Arguments
    /// * `joint_positions` - Desired joint angles in \[rad\].
    pub fn new(joint_positions: [f64; 7]) -> Self {
        JointPositions {
            q: joint_positions,
            motion_finished: false,
        }
    }
}

impl Finishable for JointPositions {
    fn is_finished(&self) -> bool {
        self.motion_finished
    }
    fn set_motion_finished(&mut self, finished: bool) {
        self.motion_finished = finished;
    }
    fn motion_finished(mut self) -> Self {
        self.set_motion_finished(true);
        self
    }
}

/// Stores values for Cartesian pose motion generation.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct CartesianPose {
    motion_finished: bool,
    /// Homogeneous transformation ![^O{\mathbf{T}_{EE}}_{d}](https://latex.codecogs.com/png.latex?^O{\mathbf{T}_{EE}}_{d}), column major, that transforms from
    /// the end effector frame `EE` to base frame `O`.
    /// Equivalently, it is the desired end effector pose in base frame.
    pub O_T_EE: [f64; 16],
}

impl From<Isometry3<f64>> for CartesianPose {
    fn from(isometry: Isometry3<f64>) -> Self {
        CartesianPose::new(isometry_to_array(&isometry))
    }
}

impl From<[f64; 16]> for CartesianPose {
    fn from(array: [f64; 16]) -> Self {
        CartesianPose::new(array)
    }
}

impl CartesianPose {
    /// Creates a new CartesianPose instance.
    /// # Arguments
    /// * `cartesian_pose` - Desired vectorized homogeneous transformation matrix
    /// ![^O{\mathbf{T}_{EE}}_{d}](https://latex.codecogs.com/png.latex?^O{\mathbf{T}_{EE}}_{d})
    /// , column major, that transforms from the end effector frame `EE` to
    /// base frame `O`. Equivalently, it is the desired end effector pose in base frame.
    pub fn new(cartesian_pose: [f64; 16]) -> Self {
        CartesianPose {
            O_T_EE: cartesian_pose,
            motion_finished: false,
        }
    }
    /// Determines whether the stored pose is a finite homogeneous transformation.
    pub fn is_valid(&self) -> bool {
        self.O_T_EE.iter().all(|x| x.is_finite()) && is_homogeneous_transformation(&self.O_T_EE)
    }
}

impl Finishable for CartesianPose {
    fn is_finished(&self) -> bool {
        self.motion_finished
    }
    fn set_motion_finished(&mut self, finished: bool) {
        self.motion_finished = finished;
    }
    fn motion_finished(mut self) -> Self {
        self.set_motion_finished(true);
        self
    }
}

/// One command handed to the real-time link per tick.
///
/// The variant always matches the [`ControlMode`] the link was started with.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub enum RobotCommand {
    JointPositions(JointPositions),
    CartesianPose(CartesianPose),
    Torques(Torques),
}

impl RobotCommand {
    /// The control mode this command belongs to.
    pub fn control_mode(&self) -> ControlMode {
        match self {
            RobotCommand::JointPositions(_) => ControlMode::JointPosition,
            RobotCommand::CartesianPose(_) => ControlMode::CartesianPose,
            RobotCommand::Torques(_) => ControlMode::Torque,
        }
    }
}

impl Finishable for RobotCommand {
    fn is_finished(&self) -> bool {
        match self {
            RobotCommand::JointPositions(command) => command.is_finished(),
            RobotCommand::CartesianPose(command) => command.is_finished(),
            RobotCommand::Torques(command) => command.is_finished(),
        }
    }
    fn set_motion_finished(&mut self, finished: bool) {
        match self {
            RobotCommand::JointPositions(command) => command.set_motion_finished(finished),
            RobotCommand::CartesianPose(command) => command.set_motion_finished(finished),
            RobotCommand::Torques(command) => command.set_motion_finished(finished),
        }
    }
    fn motion_finished(mut self) -> Self {
        self.set_motion_finished(true);
        self
    }
}

impl From<JointPositions> for RobotCommand {
    fn from(command: JointPositions) -> Self {
        RobotCommand::JointPositions(command)
    }
}

impl From<CartesianPose> for RobotCommand {
    fn from(command: CartesianPose) -> Self {
        RobotCommand::CartesianPose(command)
    }
}

impl From<Torques> for RobotCommand {
    fn from(command: Torques) -> Self {
        RobotCommand::Torques(command)
    }
}
