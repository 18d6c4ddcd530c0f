// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the joint position controller.
use std::sync::Arc;
use std::time::Duration;

use crate::control::controller::{check_finite, check_gains, ControllerShared, Setpoint, SetpointFilter};
use crate::exception::PandaResult;
use crate::model::{RobotModel, RobotModelExt};
use crate::robot::control_types::Torques;
use crate::robot::low_pass_filter::vector_low_pass_filter;
use crate::robot::robot_state::RobotState;
use crate::utils::Vector7;

/// Default joint stiffness in \[Nm/rad\].
pub static DEFAULT_JOINT_STIFFNESS: [f64; 7] = [600., 600., 600., 600., 250., 150., 50.];
/// Default joint damping in \[Nms/rad\].
pub static DEFAULT_JOINT_DAMPING: [f64; 7] = [50., 50., 50., 20., 20., 20., 10.];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JointSetpoint {
    pub position: Vector7,
    pub velocity: Vector7,
}

impl JointSetpoint {
    pub fn hold(state: &RobotState) -> Self {
        JointSetpoint {
            position: Vector7::from_column_slice(&state.q),
            velocity: Vector7::zeros(),
        }
    }
}

impl Setpoint for JointSetpoint {
    fn filtered(&self, previous: &Self, coefficient: f64) -> Self {
        JointSetpoint {
            position: vector_low_pass_filter(coefficient, &self.position, &previous.position),
            velocity: vector_low_pass_filter(coefficient, &self.velocity, &previous.velocity),
        }
    }
}

/// Stiffness and damping of a joint space spring damper.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JointGains {
    pub stiffness: Vector7,
    pub damping: Vector7,
}

impl JointGains {
    pub fn new(stiffness: Option<[f64; 7]>, damping: Option<[f64; 7]>) -> PandaResult<Self> {
        let stiffness = stiffness.unwrap_or(DEFAULT_JOINT_STIFFNESS);
        let damping = damping.unwrap_or(DEFAULT_JOINT_DAMPING);
        check_gains(&stiffness, "joint stiffness has to be finite and not negative")?;
        check_gains(&damping, "joint damping has to be finite and not negative")?;
        Ok(JointGains {
            stiffness: Vector7::from_column_slice(&stiffness),
            damping: Vector7::from_column_slice(&damping),
        })
    }
    /// `K (q_d - q) + D (dq_d - dq)`
    pub fn torque(&self, setpoint: &JointSetpoint, state: &RobotState) -> Vector7 {
        let q = Vector7::from_column_slice(&state.q);
        let dq = Vector7::from_column_slice(&state.dq);
        self.stiffness.component_mul(&(setpoint.position - q))
            + self.damping.component_mul(&(setpoint.velocity - dq))
    }
}

/// Tracks a joint position and velocity with a joint space spring damper plus Coriolis
/// compensation.
///
/// The setpoint is reset to the measured joint positions whenever the controller is started.
#[derive(Clone)]
pub struct JointPosition {
    shared: Arc<ControllerShared<JointSetpoint, JointGains>>,
}

impl JointPosition {
    /// Creates a new joint position controller.
    /// # Arguments
    /// * `stiffness` - joint stiffness in \[Nm/rad\], defaults to [`DEFAULT_JOINT_STIFFNESS`]
    /// * `damping` - joint damping in \[Nms/rad\], defaults to [`DEFAULT_JOINT_DAMPING`]
    /// * `filter_coefficient` - coefficient of the setpoint filter in (0, 1], defaults to
    /// no filtering.
    /// # Errors
    /// * InvalidArgument if a gain is negative or not finite or the coefficient is out of range.
    pub fn new(
        stiffness: Option<[f64; 7]>,
        damping: Option<[f64; 7]>,
        filter_coefficient: Option<f64>,
    ) -> PandaResult<Self> {
        let setpoint = JointSetpoint {
            position: Vector7::zeros(),
            velocity: Vector7::zeros(),
        };
        Ok(JointPosition {
            shared: Arc::new(ControllerShared::new(
                setpoint,
                JointGains::new(stiffness, damping)?,
                filter_coefficient,
            )?),
        })
    }
    /// Sets the desired joint positions and optionally velocities.
    pub fn set_control(&self, position: [f64; 7], velocity: Option<[f64; 7]>) -> PandaResult<()> {
        let velocity = velocity.unwrap_or([0.; 7]);
        check_finite(&position, "joint position setpoint is not finite")?;
        check_finite(&velocity, "joint velocity setpoint is not finite")?;
        self.shared.set_setpoint(JointSetpoint {
            position: Vector7::from_column_slice(&position),
            velocity: Vector7::from_column_slice(&velocity),
        });
        Ok(())
    }
    pub fn set_stiffness(&self, stiffness: [f64; 7]) -> PandaResult<()> {
        check_gains(&stiffness, "joint stiffness has to be finite and not negative")?;
        self.shared
            .update_gains(|gains| gains.stiffness = Vector7::from_column_slice(&stiffness));
        Ok(())
    }
    pub fn set_damping(&self, damping: [f64; 7]) -> PandaResult<()> {
        check_gains(&damping, "joint damping has to be finite and not negative")?;
        self.shared
            .update_gains(|gains| gains.damping = Vector7::from_column_slice(&damping));
        Ok(())
    }
    pub fn set_filter(&self, coefficient: f64) -> PandaResult<()> {
        self.shared.set_filter(coefficient)
    }
    pub fn stiffness(&self) -> [f64; 7] {
        self.shared.gains().stiffness.into()
    }
    pub fn damping(&self) -> [f64; 7] {
        self.shared.gains().damping.into()
    }
    /// Elapsed time since the controller was started in \[s\].
    pub fn get_time(&self) -> f64 {
        self.shared.time()
    }
    pub fn name(&self) -> &'static str {
        "Joint Position Controller"
    }
    pub(crate) fn start(&self, state: &RobotState) -> JointPositionSession {
        JointPositionSession {
            filter: self.shared.activate(JointSetpoint::hold(state)),
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct JointPositionSession {
    shared: Arc<ControllerShared<JointSetpoint, JointGains>>,
    filter: SetpointFilter<JointSetpoint>,
}

impl JointPositionSession {
    pub fn step(&mut self, state: &RobotState, period: &Duration, model: &dyn RobotModel) -> Torques {
        self.shared.advance(period);
        let setpoint = self.filter.update(&self.shared);
        let torque = self.shared.with_gains(|gains| gains.torque(setpoint, state));
        (torque + model.coriolis_vector(state)).into()
    }
}
