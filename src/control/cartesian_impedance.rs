// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Cartesian impedance controller.
use std::sync::Arc;
use std::time::Duration;

use nalgebra::{Matrix6, Quaternion, UnitQuaternion, Vector3, Vector6};

use crate::control::controller::{check_finite, check_gains, ControllerShared, Setpoint, SetpointFilter};
use crate::exception::{create_invalid_argument, PandaResult};
use crate::model::{RobotModel, RobotModelExt};
use crate::robot::control_types::Torques;
use crate::robot::low_pass_filter::{orientation_low_pass_filter, vector_low_pass_filter};
use crate::robot::robot_state::RobotState;
use crate::utils::{Matrix7, Vector7};

/// Default translational stiffness in \[N/m\].
pub static DEFAULT_TRANSLATIONAL_STIFFNESS: f64 = 600.;
/// Default rotational stiffness in \[Nm/rad\].
pub static DEFAULT_ROTATIONAL_STIFFNESS: f64 = 30.;
pub static DEFAULT_DAMPING_RATIO: f64 = 1.;
/// Default stiffness of the nullspace posture task in \[Nm/rad\].
pub static DEFAULT_NULLSPACE_STIFFNESS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PoseSetpoint {
    position: Vector3<f64>,
    orientation: UnitQuaternion<f64>,
    q_nullspace: Vector7,
}

impl Setpoint for PoseSetpoint {
    fn filtered(&self, previous: &Self, coefficient: f64) -> Self {
        PoseSetpoint {
            position: vector_low_pass_filter(coefficient, &self.position, &previous.position),
            orientation: orientation_low_pass_filter(
                coefficient,
                &self.orientation,
                &previous.orientation,
            ),
            q_nullspace: vector_low_pass_filter(
                coefficient,
                &self.q_nullspace,
                &previous.q_nullspace,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImpedanceGains {
    impedance: Matrix6<f64>,
    damping_ratio: f64,
    nullspace_stiffness: f64,
}

impl ImpedanceGains {
    fn damping(&self) -> Matrix6<f64> {
        self.impedance.map(f64::sqrt) * (2. * self.damping_ratio)
    }
}

fn default_impedance() -> Matrix6<f64> {
    let mut impedance = Matrix6::zeros();
    for i in 0..3 {
        impedance[(i, i)] = DEFAULT_TRANSLATIONAL_STIFFNESS;
        impedance[(i + 3, i + 3)] = DEFAULT_ROTATIONAL_STIFFNESS;
    }
    impedance
}

fn check_impedance(impedance: &[f64; 36]) -> PandaResult<Matrix6<f64>> {
    check_gains(impedance, "impedance has to be finite and not negative")?;
    Ok(Matrix6::from_column_slice(impedance))
}

fn check_scalar_gain(value: f64, message: &'static str) -> PandaResult<f64> {
    check_gains(&[value], message)?;
    Ok(value)
}

/// Renders a spring damper system in task space around the desired end effector pose. The
/// remaining redundancy is used to pull the joints towards a nullspace posture.
///
/// The pose and nullspace setpoints are reset to the measured state whenever the controller is
/// started.
#[derive(Clone)]
pub struct CartesianImpedance {
    shared: Arc<ControllerShared<PoseSetpoint, ImpedanceGains>>,
}

impl CartesianImpedance {
    /// Creates a new controller.
    /// # Arguments
    /// * `impedance` - 6x6 Cartesian stiffness matrix in column-major format. Defaults to
    /// [`DEFAULT_TRANSLATIONAL_STIFFNESS`] and [`DEFAULT_ROTATIONAL_STIFFNESS`] on the diagonal.
    /// * `damping_ratio` - defaults to [`DEFAULT_DAMPING_RATIO`]
    /// * `nullspace_stiffness` - defaults to [`DEFAULT_NULLSPACE_STIFFNESS`]
    /// * `filter_coefficient` - coefficient of the setpoint filter in (0, 1], defaults to
    /// no filtering.
    /// # Errors
    /// * InvalidArgument if a gain is negative or not finite or the coefficient is out of range.
    pub fn new(
        impedance: Option<[f64; 36]>,
        damping_ratio: Option<f64>,
        nullspace_stiffness: Option<f64>,
        filter_coefficient: Option<f64>,
    ) -> PandaResult<Self> {
        let gains = ImpedanceGains {
            impedance: match impedance {
                Some(impedance) => check_impedance(&impedance)?,
                None => default_impedance(),
            },
            damping_ratio: check_scalar_gain(
                damping_ratio.unwrap_or(DEFAULT_DAMPING_RATIO),
                "damping ratio has to be finite and not negative",
            )?,
            nullspace_stiffness: check_scalar_gain(
                nullspace_stiffness.unwrap_or(DEFAULT_NULLSPACE_STIFFNESS),
                "nullspace stiffness has to be finite and not negative",
            )?,
        };
        let setpoint = PoseSetpoint {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            q_nullspace: Vector7::zeros(),
        };
        Ok(CartesianImpedance {
            shared: Arc::new(ControllerShared::new(setpoint, gains, filter_coefficient)?),
        })
    }
    /// Sets the desired end effector pose and optionally the nullspace posture.
    /// # Arguments
    /// * `position` - desired position in base frame in \[m\]
    /// * `orientation` - desired orientation as quaternion `[x, y, z, w]`, does not have to be
    /// normalized.
    /// * `q_nullspace` - desired joint posture in \[rad\], keeps the current one if `None`.
    pub fn set_control(
        &self,
        position: [f64; 3],
        orientation: [f64; 4],
        q_nullspace: Option<[f64; 7]>,
    ) -> PandaResult<()> {
        check_finite(&position, "position setpoint is not finite")?;
        check_finite(&orientation, "orientation setpoint is not finite")?;
        let orientation = UnitQuaternion::try_new(
            Quaternion::new(orientation[3], orientation[0], orientation[1], orientation[2]),
            1e-9,
        )
        .ok_or_else(|| create_invalid_argument("orientation setpoint has zero norm"))?;
        let q_nullspace = match q_nullspace {
            Some(q_nullspace) => {
                check_finite(&q_nullspace, "nullspace setpoint is not finite")?;
                Vector7::from_column_slice(&q_nullspace)
            }
            None => self.shared.setpoint().q_nullspace,
        };
        self.shared.set_setpoint(PoseSetpoint {
            position: Vector3::from_column_slice(&position),
            orientation,
            q_nullspace,
        });
        Ok(())
    }
    /// Sets the 6x6 Cartesian stiffness matrix in column-major format.
    pub fn set_impedance(&self, impedance: [f64; 36]) -> PandaResult<()> {
        let impedance = check_impedance(&impedance)?;
        self.shared.update_gains(|gains| gains.impedance = impedance);
        Ok(())
    }
    pub fn set_damping_ratio(&self, damping_ratio: f64) -> PandaResult<()> {
        let damping_ratio =
            check_scalar_gain(damping_ratio, "damping ratio has to be finite and not negative")?;
        self.shared
            .update_gains(|gains| gains.damping_ratio = damping_ratio);
        Ok(())
    }
    pub fn set_nullspace_stiffness(&self, nullspace_stiffness: f64) -> PandaResult<()> {
        let nullspace_stiffness = check_scalar_gain(
            nullspace_stiffness,
            "nullspace stiffness has to be finite and not negative",
        )?;
        self.shared
            .update_gains(|gains| gains.nullspace_stiffness = nullspace_stiffness);
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
        "Cartesian Impedance Controller"
    }
    pub(crate) fn start(&self, state: &RobotState) -> CartesianImpedanceSession {
        let pose = state.pose();
        let hold = PoseSetpoint {
            position: pose.translation.vector,
            orientation: pose.rotation,
            q_nullspace: Vector7::from_column_slice(&state.q),
        };
        CartesianImpedanceSession {
            filter: self.shared.activate(hold),
            shared: self.shared.clone(),
        }
    }
}

pub(crate) struct CartesianImpedanceSession {
    shared: Arc<ControllerShared<PoseSetpoint, ImpedanceGains>>,
    filter: SetpointFilter<PoseSetpoint>,
}

impl CartesianImpedanceSession {
    pub fn step(&mut self, state: &RobotState, period: &Duration, model: &dyn RobotModel) -> Torques {
        self.shared.advance(period);
        let setpoint = self.filter.update(&self.shared);
        let coriolis = model.coriolis_vector(state);
        let jacobian = model.jacobian_matrix(state);
        let q = Vector7::from_column_slice(&state.q);
        let dq = Vector7::from_column_slice(&state.dq);
        let transform = state.pose();
        let position = transform.translation.vector;
        let mut orientation = *transform.rotation.quaternion();

        let mut error = Vector6::<f64>::zeros();
        error
            .fixed_rows_mut::<3>(0)
            .copy_from(&(position - setpoint.position));
        if setpoint.orientation.coords.dot(&orientation.coords) < 0. {
            orientation.coords = -orientation.coords;
        }
        let orientation = UnitQuaternion::new_normalize(orientation);
        let error_quaternion: UnitQuaternion<f64> = orientation.inverse() * setpoint.orientation;
        error.fixed_rows_mut::<3>(3).copy_from(
            &-(transform.rotation.to_rotation_matrix()
                * Vector3::new(error_quaternion.i, error_quaternion.j, error_quaternion.k)),
        );

        self.shared.with_gains(|gains| {
            let tau_task: Vector7 = jacobian.transpose()
                * (-gains.impedance * error - gains.damping() * (jacobian * dq));
            // the pseudo inverse only fails for non-finite Jacobians
            let projector = match jacobian.transpose().pseudo_inverse(1e-6) {
                Ok(pseudo_inverse) => Matrix7::identity() - jacobian.transpose() * pseudo_inverse,
                Err(_) => Matrix7::zeros(),
            };
            let tau_nullspace: Vector7 = projector
                * ((setpoint.q_nullspace - q) * gains.nullspace_stiffness
                    - dq * (2. * gains.nullspace_stiffness.sqrt()));
            (tau_task + tau_nullspace + coriolis).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{Translation3, UnitQuaternion};

    use crate::control::cartesian_impedance::CartesianImpedance;
    use crate::control::controller::tests::{simple_model, TICK};
    use crate::robot::robot_state::RobotState;
    use crate::utils::isometry_to_array;

    fn state() -> RobotState {
        let pose = nalgebra::Isometry3::from_parts(
            Translation3::new(0.3, 0., 0.5),
            UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0., 0.),
        );
        RobotState {
            O_T_EE: isometry_to_array(&pose),
            q: [0., -0.785, 0., -2.356, 0., 1.571, 0.785],
            ..Default::default()
        }
    }

    #[test]
    fn holds_pose_after_start() {
        let controller = CartesianImpedance::new(None, None, None, None).unwrap();
        let model = simple_model();
        let state = state();
        let mut session = controller.start(&state);
        let torques = session.step(&state, &TICK, &model).tau_J;
        assert!(torques.iter().all(|torque| torque.abs() < 1e-9));
    }

    #[test]
    fn position_error_pulls_towards_setpoint() {
        let controller = CartesianImpedance::new(None, None, Some(0.), None).unwrap();
        let model = simple_model();
        let state = state();
        let mut session = controller.start(&state);
        let orientation = state.pose().rotation.coords;
        controller
            .set_control(
                [0.31, 0., 0.5],
                [orientation[0], orientation[1], orientation[2], orientation[3]],
                None,
            )
            .unwrap();
        let torques = session.step(&state, &TICK, &model).tau_J;
        assert!((torques[0] - 600. * 0.01).abs() < 1e-6);
        assert!(torques[1..].iter().all(|torque| torque.abs() < 1e-6));
    }

    #[test]
    fn rejects_invalid_gains() {
        assert!(CartesianImpedance::new(Some([-1.; 36]), None, None, None).is_err());
        assert!(CartesianImpedance::new(None, Some(f64::NAN), None, None).is_err());
        let controller = CartesianImpedance::new(None, None, None, None).unwrap();
        assert!(controller.set_nullspace_stiffness(-0.1).is_err());
        assert!(controller.set_control([0.; 3], [0.; 4], None).is_err());
        assert!(controller.set_impedance([1.; 36]).is_ok());
        assert!(controller.set_filter(0.).is_err());
    }
}
