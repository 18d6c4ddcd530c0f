// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the interface of the real-time link to the robot.
use crate::exception::PandaResult;
use crate::robot::control_types::{ControlMode, RealtimeConfig, RobotCommand};
use crate::robot::robot_state::RobotState;

/// The real-time communication link to the robot.
///
/// A link is driven by exactly one thread at a time. While a generator or controller is
/// attached, the control loop calls [`update`](`Self::update`) once per tick and expects it
/// to return the state measured after the command was applied. The duration of a tick is
/// the difference between the `time` stamps of two consecutive states.
pub trait RobotControl: Send + 'static {
    /// Reads the current robot state without any motion running.
    fn read_once(&mut self) -> PandaResult<RobotState>;
    /// Prepares the robot for receiving commands of the given mode.
    fn start_motion(&mut self, mode: ControlMode) -> PandaResult<()>;
    /// Sends one command and waits for the next robot state.
    fn update(&mut self, command: &RobotCommand) -> PandaResult<RobotState>;
    /// Sends the final command of a motion, the one wrapped by the motion finished sentinel.
    fn finish_motion(&mut self, command: &RobotCommand) -> PandaResult<()>;
    /// Aborts the running motion, e.g. after a fault was detected.
    fn cancel_motion(&mut self);
    /// Whether the control thread has to run with realtime priority.
    fn realtime_config(&self) -> RealtimeConfig;
}
