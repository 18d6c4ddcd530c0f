// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the RobotState type which is handed to generators and controllers every tick.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::array_to_isometry;
use nalgebra::Isometry3;

/// Describes the current mode of the robot as reported by the real-time link.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RobotMode {
    Other,
    Idle,
    Move,
    Guiding,
    Reflex,
    UserStopped,
    AutomaticErrorRecovery,
}

impl Default for RobotMode {
    fn default() -> Self {
        RobotMode::Other
    }
}

/// Describes the robot state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct RobotState {
    /// ![^{O}T_{EE}](https://latex.codecogs.com/png.latex?^{O}T_{EE})
    ///
    /// Measured end effector pose in base frame.
    /// Pose is represented as a 4x4 matrix in column-major format.
    pub O_T_EE: [f64; 16],
    /// ![{^OT_{EE}}_{d}](http://latex.codecogs.com/png.latex?{^OT_{EE}}_{d})
    ///
    /// Last desired end effector pose of motion generation in base frame.
    /// Pose is represented as a 4x4 matrix in column-major format.
    pub O_T_EE_d: [f64; 16],
    /// ![{^OT_{EE}}_{c}](http://latex.codecogs.com/png.latex?{^OT_{EE}}_{c})
    ///
    /// Last commanded end effector pose of motion generation in base frame.
    /// Pose is represented as a 4x4 matrix in column-major format.
    pub O_T_EE_c: [f64; 16],
    /// ![\tau_{J}](https://latex.codecogs.com/png.latex?\tau_{J})
    ///
    /// Measured link-side joint torque sensor signals. Unit: \[Nm\]
    pub tau_J: [f64; 7],
    /// ![{\tau_J}_d](https://latex.codecogs.com/png.latex?{\tau_J}_d)
    ///
    /// Desired link-side joint torque sensor signals without gravity. Unit: \[Nm\]
    pub tau_J_d: [f64; 7],
    /// ![q](https://latex.codecogs.com/png.latex?q)
    ///
    /// Measured joint position. Unit: \[rad\]
    pub q: [f64; 7],
    /// ![q_d](https://latex.codecogs.com/png.latex?q_d)
    ///
    /// Desired joint position. Unit: \[rad\]
    pub q_d: [f64; 7],
    /// ![\dot{q}](https://latex.codecogs.com/png.latex?\dot{q})
    ///
    /// Measured joint velocity. Unit: \[rad/s\]
    pub dq: [f64; 7],
    /// ![\dot{q}_d](https://latex.codecogs.com/png.latex?\dot{q}_d)
    ///
    /// Desired joint velocity. Unit: \[rad/s\]
    pub dq_d: [f64; 7],
    /// ![\ddot{q}_d](https://latex.codecogs.com/png.latex?\ddot{q}_d)
    ///
    /// Desired joint acceleration. Unit: \[rad/s^2\]
    pub ddq_d: [f64; 7],
    /// True if the robot currently reports an error.
    pub has_errors: bool,
    /// Current robot mode.
    pub robot_mode: RobotMode,
    /// Strictly monotonically increasing timestamp since robot start.
    ///
    /// Inside of the control loop the difference of two consecutive timestamps is the
    /// tick duration handed to generators and controllers.
    pub time: Duration,
}

const IDENTITY_POSE: [f64; 16] = [
    1., 0., 0., 0., 0., 1., 0., 0., 0., 0., 1., 0., 0., 0., 0., 1.,
];

impl Default for RobotState {
    fn default() -> Self {
        RobotState {
            O_T_EE: IDENTITY_POSE,
            O_T_EE_d: IDENTITY_POSE,
            O_T_EE_c: IDENTITY_POSE,
            tau_J: [0.; 7],
            tau_J_d: [0.; 7],
            q: [0.; 7],
            q_d: [0.; 7],
            dq: [0.; 7],
            dq_d: [0.; 7],
            ddq_d: [0.; 7],
            has_errors: false,
            robot_mode: RobotMode::default(),
            time: Duration::from_secs(0),
        }
    }
}

impl RobotState {
    /// Measured end effector pose as Isometry.
    pub fn pose(&self) -> Isometry3<f64> {
        array_to_isometry(&self.O_T_EE)
    }
    /// Last commanded end effector pose as Isometry.
    pub fn commanded_pose(&self) -> Isometry3<f64> {
        array_to_isometry(&self.O_T_EE_c)
    }
    /// Determines whether the link reports a fault, i.e. an error or a reflex.
    pub fn is_faulted(&self) -> bool {
        self.has_errors
            || self.robot_mode == RobotMode::Reflex
            || self.robot_mode == RobotMode::UserStopped
    }
}

#[cfg(test)]
mod tests {
    use crate::robot::robot_state::{RobotMode, RobotState};

    #[test]
    fn default_state_is_identity_pose() {
        let state = RobotState::default();
        assert_eq!(state.pose().translation.vector.norm(), 0.);
        assert_eq!(state.commanded_pose().rotation.angle(), 0.);
        assert!(!state.is_faulted());
    }

    #[test]
    fn fault_detection() {
        let mut state = RobotState::default();
        state.robot_mode = RobotMode::Reflex;
        assert!(state.is_faulted());
        state.robot_mode = RobotMode::Move;
        assert!(!state.is_faulted());
        state.has_errors = true;
        assert!(state.is_faulted());
    }
}
