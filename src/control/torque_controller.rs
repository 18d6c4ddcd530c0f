// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the closed set of torque controllers a [`Panda`](`crate::Panda`) can run.
use std::time::Duration;

use crate::control::applied_torque::{
    AppliedForce, AppliedForceSession, AppliedTorque, AppliedTorqueSession,
};
use crate::control::cartesian_impedance::{CartesianImpedance, CartesianImpedanceSession};
use crate::control::integrated_velocity::{IntegratedVelocity, IntegratedVelocitySession};
use crate::control::joint_position::{JointPosition, JointPositionSession};
use crate::exception::PandaResult;
use crate::model::RobotModel;
use crate::robot::control_types::Torques;
use crate::robot::robot_state::RobotState;

#[derive(Clone)]
pub enum TorqueController {
    JointPosition(JointPosition),
    CartesianImpedance(CartesianImpedance),
    AppliedForce(AppliedForce),
    AppliedTorque(AppliedTorque),
    IntegratedVelocity(IntegratedVelocity),
}

impl From<JointPosition> for TorqueController {
    fn from(controller: JointPosition) -> Self {
        TorqueController::JointPosition(controller)
    }
}

impl From<CartesianImpedance> for TorqueController {
    fn from(controller: CartesianImpedance) -> Self {
        TorqueController::CartesianImpedance(controller)
    }
}

impl From<AppliedForce> for TorqueController {
    fn from(controller: AppliedForce) -> Self {
        TorqueController::AppliedForce(controller)
    }
}

impl From<AppliedTorque> for TorqueController {
    fn from(controller: AppliedTorque) -> Self {
        TorqueController::AppliedTorque(controller)
    }
}

impl From<IntegratedVelocity> for TorqueController {
    fn from(controller: IntegratedVelocity) -> Self {
        TorqueController::IntegratedVelocity(controller)
    }
}

impl TorqueController {
    pub fn name(&self) -> &'static str {
        match self {
            TorqueController::JointPosition(controller) => controller.name(),
            TorqueController::CartesianImpedance(controller) => controller.name(),
            TorqueController::AppliedForce(controller) => controller.name(),
            TorqueController::AppliedTorque(controller) => controller.name(),
            TorqueController::IntegratedVelocity(controller) => controller.name(),
        }
    }
    /// Elapsed time since the controller was started in \[s\].
    pub fn get_time(&self) -> f64 {
        match self {
            TorqueController::JointPosition(controller) => controller.get_time(),
            TorqueController::CartesianImpedance(controller) => controller.get_time(),
            TorqueController::AppliedForce(controller) => controller.get_time(),
            TorqueController::AppliedTorque(controller) => controller.get_time(),
            TorqueController::IntegratedVelocity(controller) => controller.get_time(),
        }
    }
    /// Sets the coefficient of the setpoint filter.
    /// # Errors
    /// * InvalidArgument if the coefficient is not inside (0, 1].
    pub fn set_filter(&self, coefficient: f64) -> PandaResult<()> {
        match self {
            TorqueController::JointPosition(controller) => controller.set_filter(coefficient),
            TorqueController::CartesianImpedance(controller) => controller.set_filter(coefficient),
            TorqueController::AppliedForce(controller) => controller.set_filter(coefficient),
            TorqueController::AppliedTorque(controller) => controller.set_filter(coefficient),
            TorqueController::IntegratedVelocity(controller) => controller.set_filter(coefficient),
        }
    }
    pub(crate) fn start(&self, state: &RobotState) -> ActiveController {
        match self {
            TorqueController::JointPosition(controller) => {
                ActiveController::JointPosition(controller.start(state))
            }
            TorqueController::CartesianImpedance(controller) => {
                ActiveController::CartesianImpedance(controller.start(state))
            }
            TorqueController::AppliedForce(controller) => {
                ActiveController::AppliedForce(controller.start(state))
            }
            TorqueController::AppliedTorque(controller) => {
                ActiveController::AppliedTorque(controller.start(state))
            }
            TorqueController::IntegratedVelocity(controller) => {
                ActiveController::IntegratedVelocity(controller.start(state))
            }
        }
    }
}

/// Session of the controller which is currently attached to the robot.
pub(crate) enum ActiveController {
    JointPosition(JointPositionSession),
    CartesianImpedance(CartesianImpedanceSession),
    AppliedForce(AppliedForceSession),
    AppliedTorque(AppliedTorqueSession),
    IntegratedVelocity(IntegratedVelocitySession),
}

impl ActiveController {
    pub fn step(&mut self, state: &RobotState, period: &Duration, model: &dyn RobotModel) -> Torques {
        match self {
            ActiveController::JointPosition(session) => session.step(state, period, model),
            ActiveController::CartesianImpedance(session) => session.step(state, period, model),
            ActiveController::AppliedForce(session) => session.step(state, period, model),
            ActiveController::AppliedTorque(session) => session.step(state, period, model),
            ActiveController::IntegratedVelocity(session) => session.step(state, period, model),
        }
    }
}
