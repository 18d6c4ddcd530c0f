// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # panda-motion
//! panda-motion drives [Franka Emika](https://franka.de) Panda robots with waypoint based
//! motion generators and a family of torque controllers.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE CONTROLLING THE ROBOT!**
//!
//!
//! ## Design
//! The library does not speak the robot protocol itself. It is handed a real-time link which
//! implements [`RobotControl`] and a dynamics model which implements [`RobotModel`].
//! A [`Panda`] session then attaches exactly one command source at a time to the link:
//! * [motion generators](`crate::motion`) - follow a queue of joint or Cartesian waypoints with
//! jerk limited trajectories.
//! * [torque controllers](`crate::control`) - compute joint torques from a setpoint which can be
//! updated from any thread while the robot is running.
//!
//! Every attached source runs on its own control thread. Faults of the robot never cross that
//! thread boundary as errors. They are recorded and observed with a [`PandaContext`] or
//! [`Panda::last_error`].
//!
//! # Example:
//!```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use panda_motion::{
//!     CartesianTarget, JointTarget, Panda, PandaResult, ReferenceFrame, RobotControl, RobotModel,
//!     JointPosition,
//! };
//! fn run<L: RobotControl>(link: L, model: Arc<dyn RobotModel>) -> PandaResult<()> {
//!     let panda = Panda::new(link, model, None)?;
//!     panda.move_to_joint_position(vec![JointTarget::new([0., -0.785, 0., -2.356, 0., 1.571, 0.785])])?;
//!     panda.move_to_pose(vec![CartesianTarget::new([0., 0., 0.1], [0., 0., 0., 1.])?
//!         .with_reference_frame(ReferenceFrame::Relative)])?;
//!
//!     let controller = JointPosition::new(None, None, Some(0.1))?;
//!     panda.start_controller(controller.clone())?;
//!     let start = panda.get_state().q;
//!     let mut context = panda.create_context(100., Duration::from_secs(5), None)?;
//!     while context.ok() {
//!         let mut target = start;
//!         target[6] += 0.2 * context.time().sin();
//!         controller.set_control(target, None)?;
//!     }
//!     Ok(())
//! }
//! ```
//! The context stops the controller when it goes out of scope.
pub mod control;
pub mod exception;
pub mod model;
pub mod motion;
pub mod robot;
pub mod utils;

pub use control::applied_torque::{AppliedForce, AppliedTorque};
pub use control::cartesian_impedance::CartesianImpedance;
pub use control::integrated_velocity::IntegratedVelocity;
pub use control::joint_position::JointPosition;
pub use control::torque_controller::TorqueController;
pub use exception::{PandaException, PandaResult};
pub use model::RobotModel;
pub use motion::cartesian_motion_generator::CartesianMotionGenerator;
pub use motion::generator::{GeneratorOptions, MotionGenerator, TrajectoryGeneratorFactory};
pub use motion::joint_motion_generator::JointMotionGenerator;
pub use motion::otg::{InputParameter, OtgResult, OutputParameter, SCurveGenerator, TrajectoryGenerator};
pub use motion::profile::{MotionLimits, MotionProfile};
pub use motion::targets::{CartesianTarget, JointTarget, ReferenceFrame};
pub use robot::control_types::*;
pub use robot::panda::Panda;
pub use robot::panda_context::PandaContext;
pub use robot::robot_control::RobotControl;
pub use robot::robot_state::{RobotMode, RobotState};
pub use utils::*;
