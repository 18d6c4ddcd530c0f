// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::control::torque_controller::ActiveController;
use crate::exception::{PandaException, PandaResult};
use crate::model::RobotModel;
use crate::motion::generator::ActiveGenerator;
use crate::robot::control_tools::prepare_control_thread;
use crate::robot::control_types::{ControlMode, Finishable, RealtimeConfig, RobotCommand, Torques};
use crate::robot::panda::SessionShared;
use crate::robot::robot_control::RobotControl;
use crate::robot::robot_state::RobotState;

/// The command source driven by a [`ControlLoop`].
pub(crate) enum ControlSource {
    Generator(ActiveGenerator),
    Controller(ActiveController),
}

impl ControlSource {
    fn control_mode(&self) -> ControlMode {
        match self {
            ControlSource::Generator(ActiveGenerator::Joint(_)) => ControlMode::JointPosition,
            ControlSource::Generator(ActiveGenerator::Cartesian(_)) => ControlMode::CartesianPose,
            ControlSource::Controller(_) => ControlMode::Torque,
        }
    }
}

/// Runs one generator or controller on the real-time link until it finishes, is stopped or
/// the robot reports a fault.
pub(crate) struct ControlLoop<L: RobotControl> {
    link: Arc<Mutex<L>>,
    model: Arc<dyn RobotModel>,
    source: ControlSource,
    shared: Arc<SessionShared>,
    initial_state: RobotState,
}

impl<L: RobotControl> ControlLoop<L> {
    pub fn new(
        link: Arc<Mutex<L>>,
        model: Arc<dyn RobotModel>,
        source: ControlSource,
        shared: Arc<SessionShared>,
        initial_state: RobotState,
    ) -> Self {
        ControlLoop {
            link,
            model,
            source,
            shared,
            initial_state,
        }
    }

    /// Runs the loop on the calling thread. Errors are recorded in the session, never returned.
    pub fn run(mut self) {
        let result = self.do_loop();
        if let Err(exception) = result {
            error!("control loop stopped: {}", exception);
            self.link.lock().cancel_motion();
            self.shared.record_error(exception);
        }
        self.shared.detach();
    }

    fn do_loop(&mut self) -> PandaResult<()> {
        let link = self.link.clone();
        let mut link = link.lock();
        prepare_control_thread(link.realtime_config() == RealtimeConfig::Enforce)?;
        link.start_motion(self.source.control_mode())?;
        let mut robot_state = self.initial_state.clone();
        let mut previous_time = robot_state.time;
        loop {
            let period = robot_state
                .time
                .checked_sub(previous_time)
                .unwrap_or_default();
            let command = self.spin(&robot_state, &period);
            if command.is_finished() {
                link.finish_motion(&command)?;
                info!("motion finished after {} ticks", self.shared.tick_count());
                return Ok(());
            }
            previous_time = robot_state.time;
            robot_state = link.update(&command)?;
            self.shared.publish(&robot_state);
            if robot_state.is_faulted() {
                return Err(PandaException::ControlException {
                    message: format!(
                        "robot reported a fault in mode {:?}",
                        robot_state.robot_mode
                    ),
                });
            }
        }
    }

    fn spin(&mut self, robot_state: &RobotState, period: &Duration) -> RobotCommand {
        match &mut self.source {
            ControlSource::Generator(generator) => generator.step(robot_state, period),
            ControlSource::Controller(controller) => {
                if self.shared.controller_stop_requested() {
                    return Torques::new([0.; 7]).motion_finished().into();
                }
                let torques = controller.step(robot_state, period, self.model.as_ref());
                if torques.tau_J.iter().all(|x| x.is_finite()) {
                    torques.into()
                } else {
                    error!("controller produced non-finite torques, stopping");
                    Torques::new([0.; 7]).motion_finished().into()
                }
            }
        }
    }
}
