// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`Panda`] session which attaches motion generators and torque controllers to
//! the real-time link.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::control::torque_controller::TorqueController;
use crate::exception::{PandaException, PandaResult};
use crate::model::RobotModel;
use crate::motion::cartesian_motion_generator::CartesianMotionGenerator;
use crate::motion::generator::{GeneratorOptions, MotionGenerator};
use crate::motion::joint_motion_generator::JointMotionGenerator;
use crate::motion::profile::MotionLimits;
use crate::motion::targets::{CartesianTarget, JointTarget};
use crate::robot::control_loop::{ControlLoop, ControlSource};
use crate::robot::panda_context::PandaContext;
use crate::robot::robot_control::RobotControl;
use crate::robot::robot_state::RobotState;
use crate::utils::isometry_to_array;

/// What is currently attached to the real-time link.
#[derive(Clone)]
enum ActiveSource {
    None,
    Generator(MotionGenerator),
    Controller(TorqueController),
}

/// Bookkeeping shared between the [`Panda`] and its control thread.
pub(crate) struct SessionShared {
    active: Mutex<ActiveSource>,
    state: ArcSwap<RobotState>,
    tick_count: AtomicU64,
    last_error: Mutex<Option<PandaException>>,
    stop_controller: AtomicBool,
}

impl SessionShared {
    fn new(state: RobotState) -> Self {
        SessionShared {
            active: Mutex::new(ActiveSource::None),
            state: ArcSwap::from_pointee(state),
            tick_count: AtomicU64::new(0),
            last_error: Mutex::new(None),
            stop_controller: AtomicBool::new(false),
        }
    }
    pub fn publish(&self, state: &RobotState) {
        self.state.store(Arc::new(state.clone()));
        self.tick_count.fetch_add(1, Ordering::AcqRel);
    }
    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Acquire)
    }
    pub fn record_error(&self, exception: PandaException) {
        *self.last_error.lock() = Some(exception);
    }
    pub fn last_error(&self) -> Option<PandaException> {
        self.last_error.lock().clone()
    }
    pub fn controller_stop_requested(&self) -> bool {
        self.stop_controller.load(Ordering::Acquire)
    }
    /// Marks the link as free again. Called by the control thread as its last action.
    pub fn detach(&self) {
        let mut active = self.active.lock();
        if let ActiveSource::Generator(generator) = &*active {
            generator.release();
        }
        *active = ActiveSource::None;
    }
    /// True if the last control loop failed or the robot reports a fault.
    pub fn is_faulted(&self) -> bool {
        self.last_error.lock().is_some() || self.state.load().is_faulted()
    }
}

/// A session with one robot.
///
/// The session owns the real-time link and attaches exactly one motion generator or torque
/// controller at a time. Each attached generator or controller runs on its own control thread,
/// so all methods return immediately unless documented otherwise. Faults which occur on the
/// control thread are recorded and can be queried with [`last_error`](`Self::last_error`) or
/// through a [`PandaContext`].
///
/// # Example
/// ```no_run
/// use panda_motion::{
///     GeneratorOptions, JointMotionGenerator, JointTarget, Panda, PandaResult, RobotControl, RobotModel,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
/// fn run<L: RobotControl>(link: L, model: Arc<dyn RobotModel>) -> PandaResult<()> {
///     let panda = Panda::new(link, model, None)?;
///     let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
///     generator.add_waypoint(JointTarget::new([0., -0.785, 0., -2.356, 0., 1.571, 0.785]));
///     panda.start_generator(generator.clone())?;
///     let mut context = panda.create_context(100., Duration::from_secs(10), None)?;
///     while context.ok() && generator.is_running() {}
///     Ok(())
/// }
/// ```
pub struct Panda<L: RobotControl> {
    link: Arc<Mutex<L>>,
    model: Arc<dyn RobotModel>,
    motion_limits: Arc<ArcSwap<MotionLimits>>,
    shared: Arc<SessionShared>,
    control_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<L: RobotControl> Panda<L> {
    /// Creates a new session.
    /// # Arguments
    /// * `link` - the real-time link to the robot.
    /// * `model` - dynamics model used by the torque controllers.
    /// * `motion_limits` - global scale factors of all generated motions, defaults to 1.
    /// # Errors
    /// * InvalidArgument if the motion limits are invalid.
    /// * Any error of the link while reading the initial state.
    pub fn new<Limits: Into<Option<MotionLimits>>>(
        mut link: L,
        model: Arc<dyn RobotModel>,
        motion_limits: Limits,
    ) -> PandaResult<Self> {
        let motion_limits = motion_limits.into().unwrap_or_default();
        motion_limits.validate()?;
        let state = link.read_once()?;
        Ok(Panda {
            link: Arc::new(Mutex::new(link)),
            model,
            motion_limits: Arc::new(ArcSwap::from_pointee(motion_limits)),
            shared: Arc::new(SessionShared::new(state)),
            control_thread: Mutex::new(None),
        })
    }

    /// Attaches a motion generator and starts moving.
    /// # Errors
    /// * GeneratorAlreadyRunning or ControllerAlreadyRunning if the link is in use. The running
    /// generator or controller is not affected.
    /// * Any error of the link while reading the current state.
    pub fn start_generator<G: Into<MotionGenerator>>(&self, generator: G) -> PandaResult<()> {
        let generator = generator.into();
        let mut active = self.shared.active.lock();
        check_idle(&active)?;
        self.join_control_thread();
        let state = self.link.lock().read_once()?;
        self.shared.publish(&state);
        *self.shared.last_error.lock() = None;
        let session = generator.start(self.motion_limits.clone(), &state);
        info!("starting {}", generator.name());
        if let Err(exception) = self.spawn(ControlSource::Generator(session), state, generator.name()) {
            generator.release();
            return Err(exception);
        }
        *active = ActiveSource::Generator(generator);
        Ok(())
    }

    /// Requests the running motion generator to wind down and waits until it finished.
    /// # Errors
    /// * NoGeneratorRunning if no generator is attached.
    pub fn stop_generator(&self) -> PandaResult<()> {
        {
            let active = self.shared.active.lock();
            match &*active {
                ActiveSource::Generator(generator) => {
                    info!("stopping {}", generator.name());
                    generator.request_stop()
                }
                _ => return Err(PandaException::NoGeneratorRunning),
            }
        }
        self.join_control_thread();
        Ok(())
    }

    /// Attaches a torque controller.
    /// # Errors
    /// * GeneratorAlreadyRunning or ControllerAlreadyRunning if the link is in use.
    /// * Any error of the link while reading the current state.
    pub fn start_controller<C: Into<TorqueController>>(&self, controller: C) -> PandaResult<()> {
        let controller = controller.into();
        let mut active = self.shared.active.lock();
        check_idle(&active)?;
        self.join_control_thread();
        let state = self.link.lock().read_once()?;
        self.shared.publish(&state);
        *self.shared.last_error.lock() = None;
        self.shared.stop_controller.store(false, Ordering::Release);
        let session = controller.start(&state);
        info!("starting {}", controller.name());
        self.spawn(ControlSource::Controller(session), state, controller.name())?;
        *active = ActiveSource::Controller(controller);
        Ok(())
    }

    /// Detaches the running torque controller.
    /// # Errors
    /// * NoControllerRunning if no controller is attached.
    pub fn stop_controller(&self) -> PandaResult<()> {
        {
            let active = self.shared.active.lock();
            match &*active {
                ActiveSource::Controller(controller) => {
                    info!("stopping {}", controller.name());
                    self.shared.stop_controller.store(true, Ordering::Release);
                }
                _ => return Err(PandaException::NoControllerRunning),
            }
        }
        self.join_control_thread();
        Ok(())
    }

    /// Moves through the given joint targets and blocks until the motion finished.
    /// # Errors
    /// * GeneratorAlreadyRunning or ControllerAlreadyRunning if the link is in use.
    /// * ControlException if the robot reported a fault during the motion.
    pub fn move_to_joint_position<I: IntoIterator<Item = JointTarget>>(
        &self,
        targets: I,
    ) -> PandaResult<()> {
        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
        generator.add_waypoints(targets);
        self.run_to_completion(generator.into())
    }

    /// Moves the end effector through the given poses and blocks until the motion finished.
    /// # Errors
    /// * GeneratorAlreadyRunning or ControllerAlreadyRunning if the link is in use.
    /// * ControlException if the robot reported a fault during the motion.
    pub fn move_to_pose<I: IntoIterator<Item = CartesianTarget>>(&self, targets: I) -> PandaResult<()> {
        let generator = CartesianMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
        generator.add_waypoints(targets);
        self.run_to_completion(generator.into())
    }

    fn run_to_completion(&self, generator: MotionGenerator) -> PandaResult<()> {
        self.start_generator(generator.clone())?;
        generator.wait_until_finished(None);
        self.join_control_thread();
        match self.shared.last_error() {
            Some(exception) => Err(exception),
            None => Ok(()),
        }
    }

    /// Stops whatever is attached to the link, if anything.
    pub fn stop(&self) -> PandaResult<()> {
        let active = self.shared.active.lock().clone();
        match active {
            ActiveSource::None => Ok(()),
            ActiveSource::Generator(_) => self.stop_generator(),
            ActiveSource::Controller(_) => self.stop_controller(),
        }
    }

    /// True while a motion generator is attached.
    pub fn is_generator_running(&self) -> bool {
        matches!(*self.shared.active.lock(), ActiveSource::Generator(_))
    }

    /// True while a torque controller is attached.
    pub fn is_controller_running(&self) -> bool {
        matches!(*self.shared.active.lock(), ActiveSource::Controller(_))
    }

    /// Reads the robot state from the link if nothing is attached, otherwise returns the state
    /// of the last tick.
    pub fn read_once(&self) -> PandaResult<RobotState> {
        let active = self.shared.active.lock();
        if let ActiveSource::None = *active {
            self.join_control_thread();
            let state = self.link.lock().read_once()?;
            self.shared.state.store(Arc::new(state.clone()));
            return Ok(state);
        }
        Ok(self.get_state())
    }

    /// The robot state of the last tick.
    pub fn get_state(&self) -> RobotState {
        RobotState::clone(&self.shared.state.load())
    }

    /// Measured end effector position in base frame in \[m\].
    pub fn get_position(&self) -> [f64; 3] {
        self.shared.state.load().pose().translation.vector.into()
    }

    /// Measured end effector orientation as quaternion `[x, y, z, w]`.
    pub fn get_orientation(&self) -> [f64; 4] {
        self.shared.state.load().pose().rotation.coords.into()
    }

    /// Measured end effector pose as 4x4 matrix in column-major format.
    pub fn get_pose(&self) -> [f64; 16] {
        isometry_to_array(&self.shared.state.load().pose())
    }

    /// Number of ticks the control threads of this session ran so far.
    pub fn tick_count(&self) -> u64 {
        self.shared.tick_count()
    }

    /// The error which stopped the last control loop, if any.
    pub fn last_error(&self) -> Option<PandaException> {
        self.shared.last_error()
    }

    pub fn motion_limits(&self) -> MotionLimits {
        **self.motion_limits.load()
    }

    /// Sets the global scale factors. They apply to every waypoint loaded afterwards.
    /// # Errors
    /// * InvalidArgument if a factor is not finite or not positive.
    pub fn set_motion_limits(&self, motion_limits: MotionLimits) -> PandaResult<()> {
        motion_limits.validate()?;
        self.motion_limits.store(Arc::new(motion_limits));
        Ok(())
    }

    /// Creates a context which paces a caller loop and stops everything attached to the link
    /// when it goes out of scope.
    /// # Arguments
    /// * `frequency` - rate of the caller loop in \[Hz\].
    /// * `max_runtime` - [`ok`](`PandaContext::ok`) returns false once it expired.
    /// * `max_iter` - [`ok`](`PandaContext::ok`) returns false after this many iterations.
    /// # Errors
    /// * InvalidArgument if `frequency` is not finite and positive.
    pub fn create_context<Runtime: Into<Option<Duration>>, Iterations: Into<Option<u64>>>(
        &self,
        frequency: f64,
        max_runtime: Runtime,
        max_iter: Iterations,
    ) -> PandaResult<PandaContext<'_, L>> {
        PandaContext::new(self, frequency, max_runtime.into(), max_iter.into())
    }

    pub(crate) fn is_faulted(&self) -> bool {
        self.shared.is_faulted()
    }

    fn spawn(&self, source: ControlSource, state: RobotState, name: &str) -> PandaResult<()> {
        let control_loop = ControlLoop::new(
            self.link.clone(),
            self.model.clone(),
            source,
            self.shared.clone(),
            state,
        );
        let handle = thread::Builder::new()
            .name(format!("{} control", name))
            .spawn(move || control_loop.run())
            .map_err(|error| PandaException::RealTimeException {
                message: format!("control thread could not be spawned: {}", error),
            })?;
        *self.control_thread.lock() = Some(handle);
        Ok(())
    }

    fn join_control_thread(&self) {
        let handle = self.control_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("control thread panicked");
                self.shared.record_error(PandaException::ControlException {
                    message: "control thread panicked".to_string(),
                });
                self.shared.detach();
            }
        }
    }
}

fn check_idle(active: &ActiveSource) -> PandaResult<()> {
    let rejection = match active {
        ActiveSource::None => return Ok(()),
        ActiveSource::Generator(_) => PandaException::GeneratorAlreadyRunning,
        ActiveSource::Controller(_) => PandaException::ControllerAlreadyRunning,
    };
    warn!("rejected start: {}", rejection);
    Err(rejection)
}

impl<L: RobotControl> Drop for Panda<L> {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!("could not stop control loop: {}", error);
        }
        self.join_control_thread();
    }
}
