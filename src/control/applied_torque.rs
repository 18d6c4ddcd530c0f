// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the controllers which apply externally computed joint torques or wrenches.
use std::sync::Arc;
use std::time::Duration;

use nalgebra::Vector6;

use crate::control::controller::{check_finite, check_gains, ControllerShared, Setpoint, SetpointFilter};
use crate::exception::PandaResult;
use crate::model::{RobotModel, RobotModelExt};
use crate::robot::control_types::Torques;
use crate::robot::low_pass_filter::vector_low_pass_filter;
use crate::robot::robot_state::RobotState;
use crate::utils::Vector7;

/// Default joint damping of [`AppliedTorque`] and [`AppliedForce`] in \[Nms/rad\].
pub static DEFAULT_DAMPING: [f64; 7] = [10., 10., 10., 10., 5., 5., 5.];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TorqueSetpoint(Vector7);

impl Setpoint for TorqueSetpoint {
    fn filtered(&self, previous: &Self, coefficient: f64) -> Self {
        TorqueSetpoint(vector_low_pass_filter(coefficient, &self.0, &previous.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WrenchSetpoint(Vector6<f64>);

impl Setpoint for WrenchSetpoint {
    fn filtered(&self, previous: &Self, coefficient: f64) -> Self {
        WrenchSetpoint(vector_low_pass_filter(coefficient, &self.0, &previous.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Damping(Vector7);

impl Damping {
    fn new(damping: Option<[f64; 7]>) -> PandaResult<Self> {
        let damping = damping.unwrap_or(DEFAULT_DAMPING);
        check_gains(&damping, "joint damping has to be finite and not negative")?;
        Ok(Damping(Vector7::from_column_slice(&damping)))
    }
    /// `-D dq`
    fn torque(&self, state: &RobotState) -> Vector7 {
        -self.0.component_mul(&Vector7::from_column_slice(&state.dq))
    }
}

/// Applies the commanded joint torques with additional joint damping and Coriolis compensation.
#[derive(Clone)]
pub struct AppliedTorque {
    shared: Arc<ControllerShared<TorqueSetpoint, Damping>>,
}

impl AppliedTorque {
    /// Creates a new controller.
    /// # Arguments
    /// * `damping` - joint damping in \[Nms/rad\], defaults to [`DEFAULT_DAMPING`]
    /// * `filter_coefficient` - coefficient of the setpoint filter in (0, 1], defaults to
    /// no filtering.
    pub fn new(damping: Option<[f64; 7]>, filter_coefficient: Option<f64>) -> PandaResult<Self> {
        Ok(AppliedTorque {
            shared: Arc::new(ControllerShared::new(
                TorqueSetpoint(Vector7::zeros()),
                Damping::new(damping)?,
                filter_coefficient,
            )?),
        })
    }
    /// Sets the desired joint torques in \[Nm\].
    pub fn set_control(&self, torque: [f64; 7]) -> PandaResult<()> {
        check_finite(&torque, "torque setpoint is not finite")?;
        self.shared
            .set_setpoint(TorqueSetpoint(Vector7::from_column_slice(&torque)));
        Ok(())
    }
    pub fn set_damping(&self, damping: [f64; 7]) -> PandaResult<()> {
        let damping = Damping::new(Some(damping))?;
        self.shared.update_gains(|gains| *gains = damping.clone());
        Ok(())
    }
    pub fn set_filter(&self, coefficient: f64) -> PandaResult<()> {
        self.shared.set_filter(coefficient)
    }
    pub fn damping(&self) -> [f64; 7] {
        self.shared.gains().0.into()
    }
    /// Elapsed time since the controller was started in \[s\].
    pub fn get_time(&self) -> f64 {
        self.shared.time()
    }
    pub fn name(&self) -> &'static str {
        "Applied Torque Controller"
    }
    pub(crate) fn start(&self, _state: &RobotState) -> AppliedTorqueSession {
        AppliedTorqueSession {
            filter: self.shared.activate(TorqueSetpoint(Vector7::zeros())),
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct AppliedTorqueSession {
    shared: Arc<ControllerShared<TorqueSetpoint, Damping>>,
    filter: SetpointFilter<TorqueSetpoint>,
}

impl AppliedTorqueSession {
    pub fn step(&mut self, state: &RobotState, period: &Duration, model: &dyn RobotModel) -> Torques {
        self.shared.advance(period);
        let torque = self.filter.update(&self.shared).0;
        let damping = self.shared.with_gains(|gains| gains.torque(state));
        (torque + damping + model.coriolis_vector(state)).into()
    }
}

/// Applies a wrench at the end effector, mapped into joint torques with the transposed zero
/// Jacobian, plus joint damping and Coriolis compensation.
#[derive(Clone)]
pub struct AppliedForce {
    shared: Arc<ControllerShared<WrenchSetpoint, Damping>>,
}

impl AppliedForce {
    /// Creates a new controller.
    /// # Arguments
    /// * `damping` - joint damping in \[Nms/rad\], defaults to [`DEFAULT_DAMPING`]
    /// * `filter_coefficient` - coefficient of the setpoint filter in (0, 1], defaults to
    /// no filtering.
    pub fn new(damping: Option<[f64; 7]>, filter_coefficient: Option<f64>) -> PandaResult<Self> {
        Ok(AppliedForce {
            shared: Arc::new(ControllerShared::new(
                WrenchSetpoint(Vector6::zeros()),
                Damping::new(damping)?,
                filter_coefficient,
            )?),
        })
    }
    /// Sets the desired wrench `[fx, fy, fz, tx, ty, tz]` in base frame in \[N\] and \[Nm\].
    pub fn set_control(&self, wrench: [f64; 6]) -> PandaResult<()> {
        check_finite(&wrench, "wrench setpoint is not finite")?;
        self.shared
            .set_setpoint(WrenchSetpoint(Vector6::from_column_slice(&wrench)));
        Ok(())
    }
    pub fn set_damping(&self, damping: [f64; 7]) -> PandaResult<()> {
        let damping = Damping::new(Some(damping))?;
        self.shared.update_gains(|gains| *gains = damping.clone());
        Ok(())
    }
    pub fn set_filter(&self, coefficient: f64) -> PandaResult<()> {
        self.shared.set_filter(coefficient)
    }
    pub fn damping(&self) -> [f64; 7] {
        self.shared.gains().0.into()
    }
    /// Elapsed time since the controller was started in \[s\].
    pub fn get_time(&self) -> f64 {
        self.shared.time()
    }
    pub fn name(&self) -> &'static str {
        "Applied Force Controller"
    }
    pub(crate) fn start(&self, _state: &RobotState) -> AppliedForceSession {
        AppliedForceSession {
            filter: self.shared.activate(WrenchSetpoint(Vector6::zeros())),
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct AppliedForceSession {
    shared: Arc<ControllerShared<WrenchSetpoint, Damping>>,
    filter: SetpointFilter<WrenchSetpoint>,
}

impl AppliedForceSession {
    pub fn step(&mut self, state: &RobotState, period: &Duration, model: &dyn RobotModel) -> Torques {
        self.shared.advance(period);
        let wrench = self.filter.update(&self.shared).0;
        let jacobian = model.jacobian_matrix(state);
        let damping = self.shared.with_gains(|gains| gains.torque(state));
        (jacobian.transpose() * wrench + damping + model.coriolis_vector(state)).into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use crate::control::applied_torque::{AppliedForce, AppliedTorque, DEFAULT_DAMPING};
    use crate::control::controller::tests::{simple_model, TICK};
    use crate::robot::robot_state::RobotState;

    #[test]
    fn filtered_torque_decays_exponentially() {
        let controller = AppliedTorque::new(Some([0.; 7]), Some(0.1)).unwrap();
        let model = simple_model();
        let state = RobotState::default();
        let mut session = controller.start(&state);
        controller.set_control([2.; 7]).unwrap();
        for n in 1..=50 {
            let torques = session.step(&state, &TICK, &model).tau_J;
            let expected = 2. + (0. - 2.) * 0.9_f64.powi(n);
            for torque in torques.iter() {
                assert!((torque - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn setpoint_updates_from_other_thread_are_never_torn() {
        let controller = AppliedTorque::new(Some([0.; 7]), Some(0.1)).unwrap();
        let model = simple_model();
        let state = RobotState::default();
        let mut session = controller.start(&state);
        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let controller = controller.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut value = 0.;
                while !stop.load(Ordering::Relaxed) {
                    value += 1.;
                    controller.set_control([value; 7]).unwrap();
                }
            })
        };
        for _ in 0..2000 {
            let torques = session.step(&state, &TICK, &model).tau_J;
            assert!(torques.iter().all(|torque| *torque == torques[0]));
        }
        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }

    #[test]
    fn joint_velocity_is_damped() {
        let controller = AppliedTorque::new(None, None).unwrap();
        let model = simple_model();
        let state = RobotState {
            dq: [0.5; 7],
            ..Default::default()
        };
        let mut session = controller.start(&state);
        controller.set_control([1.; 7]).unwrap();
        let torques = session.step(&state, &TICK, &model).tau_J;
        for i in 0..7 {
            assert!((torques[i] - (1. - 0.5 * DEFAULT_DAMPING[i])).abs() < 1e-12);
        }
        assert_eq!(controller.name(), "Applied Torque Controller");
    }

    #[test]
    fn wrench_is_mapped_through_jacobian() {
        let controller = AppliedForce::new(Some([0.; 7]), None).unwrap();
        let model = simple_model();
        let state = RobotState::default();
        let mut session = controller.start(&state);
        assert_eq!(session.step(&state, &TICK, &model).tau_J, [0.; 7]);
        controller.set_control([1., 2., 3., 4., 5., 6.]).unwrap();
        let torques = session.step(&state, &TICK, &model).tau_J;
        assert_eq!(torques, [1., 2., 3., 4., 5., 6., 0.]);
        assert!(controller.set_control([f64::NAN; 6]).is_err());
        assert!(controller.set_damping([1.; 7]).is_ok());
        assert_eq!(controller.damping(), [1.; 7]);
    }
}
