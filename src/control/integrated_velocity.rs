// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the integrated velocity controller.
use std::sync::Arc;
use std::time::Duration;

use crate::control::controller::{check_finite, check_gains, ControllerShared, Setpoint, SetpointFilter};
use crate::control::joint_position::{JointGains, JointSetpoint};
use crate::exception::PandaResult;
use crate::model::{RobotModel, RobotModelExt};
use crate::robot::control_types::Torques;
use crate::robot::low_pass_filter::vector_low_pass_filter;
use crate::robot::robot_state::RobotState;
use crate::utils::Vector7;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VelocitySetpoint(Vector7);

impl Setpoint for VelocitySetpoint {
    fn filtered(&self, previous: &Self, coefficient: f64) -> Self {
        VelocitySetpoint(vector_low_pass_filter(coefficient, &self.0, &previous.0))
    }
}

/// Integrates a commanded joint velocity into a joint position target, which is tracked like
/// in [`JointPosition`](`crate::JointPosition`).
#[derive(Clone)]
pub struct IntegratedVelocity {
    shared: Arc<ControllerShared<VelocitySetpoint, JointGains>>,
}

impl IntegratedVelocity {
    /// Creates a new controller.
    /// # Arguments
    /// * `stiffness` - joint stiffness in \[Nm/rad\], defaults to
    /// [`DEFAULT_JOINT_STIFFNESS`](`crate::control::joint_position::DEFAULT_JOINT_STIFFNESS`)
    /// * `damping` - joint damping in \[Nms/rad\], defaults to
    /// [`DEFAULT_JOINT_DAMPING`](`crate::control::joint_position::DEFAULT_JOINT_DAMPING`)
    /// * `filter_coefficient` - coefficient of the velocity filter in (0, 1], defaults to
    /// no filtering.
    pub fn new(
        stiffness: Option<[f64; 7]>,
        damping: Option<[f64; 7]>,
        filter_coefficient: Option<f64>,
    ) -> PandaResult<Self> {
        Ok(IntegratedVelocity {
            shared: Arc::new(ControllerShared::new(
                VelocitySetpoint(Vector7::zeros()),
                JointGains::new(stiffness, damping)?,
                filter_coefficient,
            )?),
        })
    }
    /// Sets the desired joint velocities in \[rad/s\].
    pub fn set_control(&self, velocity: [f64; 7]) -> PandaResult<()> {
        check_finite(&velocity, "joint velocity setpoint is not finite")?;
        self.shared
            .set_setpoint(VelocitySetpoint(Vector7::from_column_slice(&velocity)));
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
    /// Elapsed time since the controller was started in \[s\].
    pub fn get_time(&self) -> f64 {
        self.shared.time()
    }
    pub fn name(&self) -> &'static str {
        "Integrated Velocity Controller"
    }
    pub(crate) fn start(&self, state: &RobotState) -> IntegratedVelocitySession {
        IntegratedVelocitySession {
            filter: self.shared.activate(VelocitySetpoint(Vector7::zeros())),
            target: JointSetpoint::hold(state),
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct IntegratedVelocitySession {
    shared: Arc<ControllerShared<VelocitySetpoint, JointGains>>,
    filter: SetpointFilter<VelocitySetpoint>,
    target: JointSetpoint,
}

impl IntegratedVelocitySession {
    pub fn step(&mut self, state: &RobotState, period: &Duration, model: &dyn RobotModel) -> Torques {
        self.shared.advance(period);
        let velocity = self.filter.update(&self.shared).0;
        self.target.velocity = velocity;
        self.target.position += velocity * period.as_secs_f64();
        let target = &self.target;
        let torque = self.shared.with_gains(|gains| gains.torque(target, state));
        (torque + model.coriolis_vector(state)).into()
    }
}

#[cfg(test)]
mod tests {
    use crate::control::controller::tests::{simple_model, TICK};
    use crate::control::integrated_velocity::IntegratedVelocity;
    use crate::robot::robot_state::RobotState;

    #[test]
    fn integrates_velocity_into_position_target() {
        let controller = IntegratedVelocity::new(Some([100.; 7]), Some([10.; 7]), None).unwrap();
        let model = simple_model();
        let state = RobotState {
            q: [0.3; 7],
            ..Default::default()
        };
        let mut session = controller.start(&state);
        controller.set_control([0.1; 7]).unwrap();
        let mut torques = [0.; 7];
        for _ in 0..10 {
            torques = session.step(&state, &TICK, &model).tau_J;
        }
        // 1 mrad offset after 10 ms plus damping of the commanded velocity
        for torque in torques.iter() {
            assert!((torque - (100. * 1e-3 + 10. * 0.1)).abs() < 1e-9);
        }
        assert!((controller.get_time() - 1e-2).abs() < 1e-12);
    }

    #[test]
    fn zero_velocity_holds_start_position() {
        let controller = IntegratedVelocity::new(None, None, Some(0.5)).unwrap();
        let model = simple_model();
        let state = RobotState {
            q: [0.1, 0.2, 0.3, -1.0, 0., 1.0, 0.5],
            ..Default::default()
        };
        let mut session = controller.start(&state);
        for _ in 0..5 {
            assert_eq!(session.step(&state, &TICK, &model).tau_J, [0.; 7]);
        }
        assert_eq!(controller.name(), "Integrated Velocity Controller");
    }
}
