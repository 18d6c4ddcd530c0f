// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the dynamics model interface used by the torque controllers.
use crate::robot::robot_state::RobotState;
use crate::utils::{Matrix6x7, Vector7};

/// Provides the robot dynamics which the torque controllers need on every tick.
///
/// Forward kinematics and dynamics are computed elsewhere, e.g. by the libfranka model
/// library. Implementations are called from the real-time thread and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait RobotModel: Send + Sync {
    /// Calculates the Coriolis force vector (state-space equation):
    /// ![c= C \times dq](https://latex.codecogs.com/png.latex?c=&space;C&space;\times&space;dq),
    /// in \[Nm\].
    fn coriolis(&self, robot_state: &RobotState) -> [f64; 7];
    /// Gets the 6x7 Jacobian of the end effector relative to the base frame.
    ///
    /// The returned array is a 6x7 matrix in column-major format.
    fn zero_jacobian(&self, robot_state: &RobotState) -> [f64; 42];
}

/// Convenience accessors which convert the model outputs into nalgebra types.
pub(crate) trait RobotModelExt {
    fn coriolis_vector(&self, robot_state: &RobotState) -> Vector7;
    fn jacobian_matrix(&self, robot_state: &RobotState) -> Matrix6x7;
}

impl<M: RobotModel + ?Sized> RobotModelExt for M {
    fn coriolis_vector(&self, robot_state: &RobotState) -> Vector7 {
        Vector7::from_column_slice(&self.coriolis(robot_state))
    }
    fn jacobian_matrix(&self, robot_state: &RobotState) -> Matrix6x7 {
        Matrix6x7::from_column_slice(&self.zero_jacobian(robot_state))
    }
}
