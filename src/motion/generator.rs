// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the state machine shared by the joint and Cartesian motion generators.
//!
//! A generator is split in two halves. [`GeneratorShared`] is reachable from every clone of the
//! user-facing generator handle and only contains the waypoint queue, flags and the completion
//! notification. [`GeneratorSession`] is created when the generator is attached to the robot and
//! is exclusively owned by the real-time thread, together with its trajectory generator.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::motion::cartesian_motion_generator::CartesianMotionGenerator;
use crate::motion::joint_motion_generator::JointMotionGenerator;
use crate::motion::otg::{
    InputParameter, OtgResult, OutputParameter, SCurveGenerator, TrajectoryGenerator,
};
use crate::motion::profile::{KinematicLimits, MotionLimits, MotionProfile};
use crate::motion::targets::{CartesianTarget, JointTarget};
use crate::motion::waypoint_queue::WaypointQueue;
use crate::robot::control_types::{ControlMode, Finishable, RobotCommand};
use crate::robot::limits::CONTROL_RATE;
use crate::robot::robot_state::RobotState;
use crate::utils::AtomicF64;

/// Number of ticks the last command is repeated before the motion finished sentinel is sent.
pub(crate) const COOLDOWN_TICKS: u32 = 5;

/// Creates the trajectory generator of a new generator session.
pub type TrajectoryGeneratorFactory = dyn Fn() -> Box<dyn TrajectoryGenerator + Send> + Send + Sync;

type DoneCallback = Box<dyn FnMut() + Send>;

/// Options of a motion generator.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorOptions {
    /// If true (the default), the generator keeps holding its last target once the queue runs
    /// empty instead of finishing the motion.
    pub keep_running: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions { keep_running: true }
    }
}

/// A waypoint type the generator state machine can move to.
///
/// Every waypoint is mapped onto a 7 dimensional kinematic vector for the trajectory generator.
pub(crate) trait Waypoint: Copy + Send + 'static {
    /// Target which holds the last commanded state.
    fn hold(state: &RobotState) -> Self;
    /// Kinematic vector of the measured state.
    fn measured_position(state: &RobotState) -> [f64; 7];
    /// Kinematic vector of this waypoint resolved against the measured state.
    ///
    /// `current` is the kinematic vector the trajectory generator currently commands.
    fn target_position(&self, state: &RobotState, current: &[f64; 7]) -> [f64; 7];
    fn profile(&self) -> &MotionProfile;
    fn kinematic_limits(limits: &MotionLimits, profile: &MotionProfile) -> KinematicLimits;
    /// Robot command for a kinematic vector.
    fn command(position: &[f64; 7]) -> RobotCommand;
}

/// Implements the user-facing handle API of a generator type wrapping `shared`.
macro_rules! impl_generator_handle {
    ($handle:ident, $waypoint:ty, $name:literal) => {
        impl $handle {
            /// Creates a new generator.
            /// # Arguments
            /// * `options` - [`GeneratorOptions`](`crate::GeneratorOptions`), defaults to keeping
            /// the generator running once the queue is empty.
            pub fn new(options: Option<$crate::motion::generator::GeneratorOptions>) -> Self {
                $handle {
                    shared: std::sync::Arc::new($crate::motion::generator::GeneratorShared::new(
                        options.unwrap_or_default(),
                    )),
                }
            }
            /// Sets a callback which runs once on the real-time thread when the motion finished.
            ///
            /// The callback must not block and must not start or stop motions.
            pub fn with_done_callback<F: FnMut() + Send + 'static>(self, callback: F) -> Self {
                self.shared.set_done_callback(Box::new(callback));
                self
            }
            /// Replaces the built-in trajectory generator for all following activations.
            pub fn with_trajectory_generator<F>(self, factory: F) -> Self
            where
                F: Fn() -> Box<dyn $crate::motion::otg::TrajectoryGenerator + Send>
                    + Send
                    + Sync
                    + 'static,
            {
                let factory: std::sync::Arc<$crate::motion::generator::TrajectoryGeneratorFactory> =
                    std::sync::Arc::new(factory);
                self.shared.set_trajectory_generator(factory);
                self
            }
            /// Appends a waypoint to the queue.
            pub fn add_waypoint(&self, waypoint: $waypoint) {
                self.shared.waypoints.push(waypoint);
            }
            /// Appends all waypoints in order.
            pub fn add_waypoints<I: IntoIterator<Item = $waypoint>>(&self, waypoints: I) {
                self.shared.waypoints.extend(waypoints);
            }
            /// Drops all waypoints which have not been loaded yet. The current segment is not
            /// interrupted.
            pub fn clear_waypoints(&self) {
                self.shared.waypoints.clear();
            }
            /// True from the moment the generator is attached until its motion finished.
            pub fn is_running(&self) -> bool {
                self.shared.is_running()
            }
            /// Blocks until the motion finished. Returns false if `timeout` expired before.
            pub fn wait_until_finished(&self, timeout: Option<std::time::Duration>) -> bool {
                self.shared.wait_until_finished(timeout)
            }
            /// Elapsed time since the generator was attached in \[s\].
            pub fn get_time(&self) -> f64 {
                self.shared.time()
            }
            pub fn options(&self) -> &$crate::motion::generator::GeneratorOptions {
                &self.shared.options
            }
            pub fn name(&self) -> &'static str {
                $name
            }
        }
    };
}
pub(crate) use impl_generator_handle;

/// The part of a generator shared between all handles and the real-time thread.
pub(crate) struct GeneratorShared<W> {
    pub waypoints: WaypointQueue<W>,
    pub options: GeneratorOptions,
    stop_requested: AtomicBool,
    running: AtomicBool,
    time: AtomicF64,
    done_sender: Sender<()>,
    done_receiver: Receiver<()>,
    done_callback: Mutex<Option<DoneCallback>>,
    trajectory_generator: Mutex<Option<Arc<TrajectoryGeneratorFactory>>>,
}

impl<W: Waypoint> GeneratorShared<W> {
    pub fn new(options: GeneratorOptions) -> Self {
        let (done_sender, done_receiver) = bounded(1);
        GeneratorShared {
            waypoints: WaypointQueue::default(),
            options,
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            time: AtomicF64::new(0.),
            done_sender,
            done_receiver,
            done_callback: Mutex::new(None),
            trajectory_generator: Mutex::new(None),
        }
    }
    pub fn set_done_callback(&self, callback: DoneCallback) {
        *self.done_callback.lock() = Some(callback);
    }
    pub fn set_trajectory_generator(&self, factory: Arc<TrajectoryGeneratorFactory>) {
        *self.trajectory_generator.lock() = Some(factory);
    }
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
    pub fn time(&self) -> f64 {
        self.time.load()
    }
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }
    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
    /// Blocks until the running motion finished or `timeout` expired.
    ///
    /// Returns true if the generator is not running anymore.
    pub fn wait_until_finished(&self, timeout: Option<Duration>) -> bool {
        if !self.is_running() {
            return true;
        }
        let received = match timeout {
            Some(timeout) => self.done_receiver.recv_timeout(timeout).is_ok(),
            None => self.done_receiver.recv().is_ok(),
        };
        if received {
            // leave the notification for other waiters
            let _ = self.done_sender.try_send(());
        }
        !self.is_running()
    }
    fn activate(&self) {
        while self.done_receiver.try_recv().is_ok() {}
        self.stop_requested.store(false, Ordering::Release);
        self.time.store(0.);
        self.running.store(true, Ordering::Release);
    }
    fn notify_finished(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.done_sender.try_send(());
        if let Some(callback) = self.done_callback.lock().as_mut() {
            callback();
        }
    }
    /// Marks the generator as not running without reaching FINISHED, e.g. after a robot fault.
    pub fn release(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let _ = self.done_sender.try_send(());
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Starting,
    Running,
    Finishing { cooldown: u32 },
    Finished,
}

/// Per-activation state of a generator, owned by the real-time thread.
pub(crate) struct GeneratorSession<W: Waypoint> {
    shared: Arc<GeneratorShared<W>>,
    limits: Arc<ArcSwap<MotionLimits>>,
    otg: Box<dyn TrajectoryGenerator + Send>,
    input: InputParameter,
    output: OutputParameter,
    phase: Phase,
    reload: bool,
    segment_finished: bool,
    last_command: RobotCommand,
}

impl<W: Waypoint> GeneratorSession<W> {
    /// Attaches the generator to the robot in the given state.
    ///
    /// The first segment moves from the measured to the last commanded state with unit profile,
    /// so the first tick is always well defined.
    pub fn start(
        shared: Arc<GeneratorShared<W>>,
        limits: Arc<ArcSwap<MotionLimits>>,
        state: &RobotState,
    ) -> Self {
        let otg: Box<dyn TrajectoryGenerator + Send> = match shared.trajectory_generator.lock().as_ref() {
            Some(factory) => factory(),
            None => Box::new(SCurveGenerator::new(CONTROL_RATE)),
        };
        shared.activate();
        let mut input = InputParameter {
            current_position: W::measured_position(state),
            ..Default::default()
        };
        let hold = W::hold(state);
        input.target_position = hold.target_position(state, &input.current_position);
        let kinematic_limits = W::kinematic_limits(&limits.load(), &MotionProfile::unit());
        set_limits(&mut input, &kinematic_limits);
        let last_command = W::command(&input.target_position);
        GeneratorSession {
            shared,
            limits,
            otg,
            input,
            output: OutputParameter::default(),
            phase: Phase::Starting,
            reload: true,
            segment_finished: false,
            last_command,
        }
    }

    /// Calculates the command for one tick of duration `period`.
    pub fn step(&mut self, state: &RobotState, period: &Duration) -> RobotCommand {
        self.shared
            .time
            .store(self.shared.time() + period.as_secs_f64());
        if self.phase == Phase::Starting {
            self.phase = Phase::Running;
        }
        if self.phase == Phase::Running && self.shared.stop_requested() {
            self.phase = Phase::Finishing { cooldown: 0 };
        }
        if self.phase != Phase::Running {
            return self.cool_down();
        }
        let sub_steps = ((period.as_secs_f64() * 1000.).round() as usize).max(1);
        for _ in 0..sub_steps {
            if self.reload || (self.segment_finished && !self.shared.waypoints.is_empty()) {
                self.load_next(state);
            }
            match self.otg.update(&self.input, &mut self.output) {
                OtgResult::Working => {}
                OtgResult::Finished => {
                    self.segment_finished = true;
                    if !self.shared.waypoints.is_empty() {
                        self.reload = true;
                    } else if !self.shared.options.keep_running {
                        self.last_command = W::command(&self.output.new_position);
                        self.phase = Phase::Finishing { cooldown: 0 };
                        return self.cool_down();
                    }
                }
                OtgResult::ErrorInvalidInput => {
                    warn!(
                        "trajectory generator rejected input, finishing motion after {} s",
                        self.shared.time()
                    );
                    self.phase = Phase::Finishing { cooldown: 0 };
                    return self.cool_down();
                }
            }
            self.output.pass_to_input(&mut self.input);
        }
        self.last_command = W::command(&self.output.new_position);
        self.last_command
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    fn load_next(&mut self, state: &RobotState) {
        let waypoint = self.shared.waypoints.pop().unwrap_or_else(|| W::hold(state));
        self.input.target_position = waypoint.target_position(state, &self.input.current_position);
        self.input.target_velocity = [0.; 7];
        self.input.target_acceleration = [0.; 7];
        let kinematic_limits = W::kinematic_limits(&self.limits.load(), waypoint.profile());
        set_limits(&mut self.input, &kinematic_limits);
        self.reload = false;
        self.segment_finished = false;
    }

    fn cool_down(&mut self) -> RobotCommand {
        match self.phase {
            Phase::Finishing { cooldown } if cooldown < COOLDOWN_TICKS => {
                self.phase = Phase::Finishing {
                    cooldown: cooldown + 1,
                };
                self.last_command
            }
            Phase::Finished => self.last_command.motion_finished(),
            _ => {
                self.phase = Phase::Finished;
                info!("motion finished after {:.3} s", self.shared.time());
                self.shared.notify_finished();
                self.last_command.motion_finished()
            }
        }
    }
}

/// The closed set of motion generators a [`Panda`](`crate::Panda`) can drive.
#[derive(Clone)]
pub enum MotionGenerator {
    Joint(JointMotionGenerator),
    Cartesian(CartesianMotionGenerator),
}

impl From<JointMotionGenerator> for MotionGenerator {
    fn from(generator: JointMotionGenerator) -> Self {
        MotionGenerator::Joint(generator)
    }
}

impl From<CartesianMotionGenerator> for MotionGenerator {
    fn from(generator: CartesianMotionGenerator) -> Self {
        MotionGenerator::Cartesian(generator)
    }
}

impl MotionGenerator {
    pub fn name(&self) -> &'static str {
        match self {
            MotionGenerator::Joint(generator) => generator.name(),
            MotionGenerator::Cartesian(generator) => generator.name(),
        }
    }
    /// The kind of command this generator produces.
    pub fn control_mode(&self) -> ControlMode {
        match self {
            MotionGenerator::Joint(_) => ControlMode::JointPosition,
            MotionGenerator::Cartesian(_) => ControlMode::CartesianPose,
        }
    }
    pub fn is_running(&self) -> bool {
        match self {
            MotionGenerator::Joint(generator) => generator.is_running(),
            MotionGenerator::Cartesian(generator) => generator.is_running(),
        }
    }
    pub fn wait_until_finished(&self, timeout: Option<Duration>) -> bool {
        match self {
            MotionGenerator::Joint(generator) => generator.wait_until_finished(timeout),
            MotionGenerator::Cartesian(generator) => generator.wait_until_finished(timeout),
        }
    }
    pub fn get_time(&self) -> f64 {
        match self {
            MotionGenerator::Joint(generator) => generator.get_time(),
            MotionGenerator::Cartesian(generator) => generator.get_time(),
        }
    }
    pub(crate) fn request_stop(&self) {
        match self {
            MotionGenerator::Joint(generator) => generator.shared.request_stop(),
            MotionGenerator::Cartesian(generator) => generator.shared.request_stop(),
        }
    }
    pub(crate) fn release(&self) {
        match self {
            MotionGenerator::Joint(generator) => generator.shared.release(),
            MotionGenerator::Cartesian(generator) => generator.shared.release(),
        }
    }
    pub(crate) fn start(
        &self,
        limits: Arc<ArcSwap<MotionLimits>>,
        state: &RobotState,
    ) -> ActiveGenerator {
        match self {
            MotionGenerator::Joint(generator) => ActiveGenerator::Joint(GeneratorSession::start(
                generator.shared.clone(),
                limits,
                state,
            )),
            MotionGenerator::Cartesian(generator) => ActiveGenerator::Cartesian(
                GeneratorSession::start(generator.shared.clone(), limits, state),
            ),
        }
    }
}

/// Session of the generator which is currently attached to the robot.
pub(crate) enum ActiveGenerator {
    Joint(GeneratorSession<JointTarget>),
    Cartesian(GeneratorSession<CartesianTarget>),
}

impl ActiveGenerator {
    pub fn step(&mut self, state: &RobotState, period: &Duration) -> RobotCommand {
        match self {
            ActiveGenerator::Joint(session) => session.step(state, period),
            ActiveGenerator::Cartesian(session) => session.step(state, period),
        }
    }
    pub fn is_finished(&self) -> bool {
        match self {
            ActiveGenerator::Joint(session) => session.is_finished(),
            ActiveGenerator::Cartesian(session) => session.is_finished(),
        }
    }
}

fn set_limits(input: &mut InputParameter, limits: &KinematicLimits) {
    input.max_velocity = limits.max_velocity;
    input.max_acceleration = limits.max_acceleration;
    input.max_jerk = limits.max_jerk;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use crate::robot::control_types::{Finishable, RobotCommand};

    pub const TICK: Duration = Duration::from_millis(1);

    /// Steps `step` until the finished sentinel shows up and returns all commands.
    pub fn run_until_finished<F: FnMut() -> RobotCommand>(mut step: F, max_ticks: usize) -> Vec<RobotCommand> {
        let mut commands = Vec::new();
        for _ in 0..max_ticks {
            let command = step();
            commands.push(command);
            if command.is_finished() {
                break;
            }
        }
        commands
    }

    #[test]
    fn generator_options_default_to_keep_running() {
        assert!(super::GeneratorOptions::default().keep_running);
        let options: super::GeneratorOptions = serde_json::from_str("{}").unwrap();
        assert!(options.keep_running);
        let options: super::GeneratorOptions =
            serde_json::from_str(r#"{"keep_running": false}"#).unwrap();
        assert!(!options.keep_running);
    }
}
