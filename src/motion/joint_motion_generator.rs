// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the joint space motion generator.
use std::sync::Arc;

use crate::motion::generator::{impl_generator_handle, GeneratorShared, Waypoint};
use crate::motion::profile::{joint_limits, KinematicLimits, MotionLimits, MotionProfile};
use crate::motion::targets::JointTarget;
use crate::robot::control_types::{JointPositions, RobotCommand};
use crate::robot::robot_state::RobotState;

impl Waypoint for JointTarget {
    fn hold(state: &RobotState) -> Self {
        JointTarget::new(state.q_d)
    }
    fn measured_position(state: &RobotState) -> [f64; 7] {
        state.q
    }
    fn target_position(&self, _state: &RobotState, _current: &[f64; 7]) -> [f64; 7] {
        *self.target()
    }
    fn profile(&self) -> &MotionProfile {
        JointTarget::profile(self)
    }
    fn kinematic_limits(limits: &MotionLimits, profile: &MotionProfile) -> KinematicLimits {
        joint_limits(limits, profile)
    }
    fn command(position: &[f64; 7]) -> RobotCommand {
        JointPositions::new(*position).into()
    }
}

/// Moves the robot through a queue of [`JointTarget`]s with jerk-limited joint trajectories.
///
/// The generator is a cheap handle: clones share the same waypoint queue, so waypoints can be
/// added from any thread while the robot is moving.
/// # Example
/// ```no_run
/// use panda_motion::{JointMotionGenerator, JointTarget, MotionGenerator};
/// let generator = JointMotionGenerator::new(None);
/// generator.add_waypoint(JointTarget::new([0., -0.785, 0., -2.356, 0., 1.571, 0.785]));
/// let generator: MotionGenerator = generator.into();
/// ```
#[derive(Clone)]
pub struct JointMotionGenerator {
    pub(crate) shared: Arc<GeneratorShared<JointTarget>>,
}

impl_generator_handle!(JointMotionGenerator, JointTarget, "Joint Motion Generator");

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use arc_swap::ArcSwap;

    use crate::motion::generator::tests::{run_until_finished, TICK};
    use crate::motion::generator::{GeneratorOptions, GeneratorSession, COOLDOWN_TICKS};
    use crate::motion::joint_motion_generator::JointMotionGenerator;
    use crate::motion::otg::{MockTrajectoryGenerator, OtgResult, TrajectoryGenerator};
    use crate::motion::profile::MotionLimits;
    use crate::motion::targets::JointTarget;
    use crate::robot::control_types::{Finishable, RobotCommand};
    use crate::robot::limits::{MAX_JOINT_ACCELERATION, MAX_JOINT_JERK, MAX_JOINT_VELOCITY};
    use crate::robot::robot_state::RobotState;

    const START: [f64; 7] = [0., -0.785, 0., -2.356, 0., 1.571, 0.785];

    fn state_at(q: [f64; 7]) -> RobotState {
        RobotState {
            q,
            q_d: q,
            ..Default::default()
        }
    }

    fn limits() -> Arc<ArcSwap<MotionLimits>> {
        Arc::new(ArcSwap::from_pointee(MotionLimits::default()))
    }

    fn positions(command: &RobotCommand) -> [f64; 7] {
        match command {
            RobotCommand::JointPositions(positions) => positions.q,
            _ => panic!("expected joint positions"),
        }
    }

    /// Steps the session with a perfectly tracking robot.
    fn stepper(
        mut session: GeneratorSession<JointTarget>,
        mut state: RobotState,
    ) -> impl FnMut() -> RobotCommand {
        move || {
            let command = session.step(&state, &TICK);
            state.q = positions(&command);
            state.q_d = state.q;
            command
        }
    }

    #[test]
    fn moves_to_target_within_limits() {
        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
        let mut target = START;
        target.iter_mut().for_each(|q| *q += 1.0);
        generator.add_waypoint(JointTarget::new(target));
        let state = state_at(START);
        let session = GeneratorSession::start(generator.shared.clone(), limits(), &state);
        assert!(generator.is_running());
        let commands = run_until_finished(stepper(session, state), 20_000);
        let last = commands.last().unwrap();
        assert!(last.is_finished());
        assert!(!generator.is_running());
        assert!(generator.wait_until_finished(Some(Duration::from_millis(1))));

        let trajectory: Vec<[f64; 7]> = commands.iter().map(positions).collect();
        assert_eq!(trajectory[trajectory.len() - 1], target);
        // the final target is repeated during cooldown
        for q in trajectory.iter().rev().take(COOLDOWN_TICKS as usize + 1) {
            assert_eq!(*q, target);
        }
        let mut previous = START;
        let mut previous_velocity = [0.; 7];
        let mut previous_acceleration = [0.; 7];
        for q in trajectory.iter() {
            for dof in 0..7 {
                let velocity = (q[dof] - previous[dof]) / 1e-3;
                let acceleration = (velocity - previous_velocity[dof]) / 1e-3;
                let jerk = (acceleration - previous_acceleration[dof]) / 1e-3;
                assert!(velocity >= -1e-9);
                assert!(velocity <= MAX_JOINT_VELOCITY[dof] + 1e-6);
                assert!(acceleration.abs() <= 0.3 * MAX_JOINT_ACCELERATION[dof] + 1e-3);
                // third differences of a jerk limited curve stay within the limit up to rounding
                assert!(jerk.abs() <= 0.3 * MAX_JOINT_JERK[dof] * (1. + 1e-6) + 1e-2);
                previous_velocity[dof] = velocity;
                previous_acceleration[dof] = acceleration;
            }
            previous = *q;
        }
        assert!((generator.get_time() - commands.len() as f64 * 1e-3).abs() < 1e-9);
    }

    #[test]
    fn empty_queue_holds_and_finishes() {
        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
        let state = state_at(START);
        let session = GeneratorSession::start(generator.shared.clone(), limits(), &state);
        let commands = run_until_finished(stepper(session, state), 100);
        assert_eq!(commands.len(), COOLDOWN_TICKS as usize + 1);
        assert!(commands.iter().all(|command| positions(command) == START));
    }

    #[test]
    fn keep_running_never_finishes() {
        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: true }));
        let mut target = START;
        target[0] += 0.2;
        generator.add_waypoint(JointTarget::new(target));
        let state = state_at(START);
        let session = GeneratorSession::start(generator.shared.clone(), limits(), &state);
        let mut step = stepper(session, state);
        for _ in 0..3000 {
            assert!(!step().is_finished());
        }
        assert_eq!(positions(&step()), target);
        assert!(generator.is_running());

        // a waypoint added while idling is picked up
        let mut next = target;
        next[1] += 0.1;
        generator.add_waypoint(JointTarget::new(next));
        for _ in 0..3000 {
            assert!(!step().is_finished());
        }
        assert_eq!(positions(&step()), next);

        generator.shared.request_stop();
        let commands = run_until_finished(step, 100);
        assert_eq!(commands.len(), COOLDOWN_TICKS as usize + 1);
        assert!(!generator.is_running());
    }

    #[test]
    fn clearing_keeps_current_segment() {
        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
        let mut first = START;
        first[2] += 0.5;
        let mut second = first;
        second[2] += 0.5;
        generator.add_waypoints(vec![JointTarget::new(first), JointTarget::new(second)]);
        let state = state_at(START);
        let session = GeneratorSession::start(generator.shared.clone(), limits(), &state);
        let mut step = stepper(session, state);
        for _ in 0..10 {
            step();
        }
        assert_eq!(generator.shared.waypoints.len(), 1);
        generator.clear_waypoints();
        let commands = run_until_finished(step, 20_000);
        assert!(commands.last().unwrap().is_finished());
        assert_eq!(positions(commands.last().unwrap()), first);
    }

    #[test]
    fn long_tick_runs_several_sub_steps() {
        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
        let mut target = START;
        target[0] += 0.3;
        generator.add_waypoint(JointTarget::new(target));
        let state = state_at(START);
        let mut single = GeneratorSession::start(generator.shared.clone(), limits(), &state);
        for _ in 0..3 {
            single.step(&state, &TICK);
        }
        let expected = positions(&single.step(&state, &TICK));

        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
        generator.add_waypoint(JointTarget::new(target));
        let mut catching_up = GeneratorSession::start(generator.shared.clone(), limits(), &state);
        let actual = positions(&catching_up.step(&state, &Duration::from_millis(4)));
        for dof in 0..7 {
            assert!((expected[dof] - actual[dof]).abs() < 1e-12);
        }
        assert!((generator.get_time() - 4e-3).abs() < 1e-12);
    }

    #[test]
    fn otg_error_finishes_with_last_valid_command() {
        let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: true }))
            .with_trajectory_generator(|| {
                let mut otg = MockTrajectoryGenerator::new();
                otg.expect_update()
                    .returning(|_, _| OtgResult::ErrorInvalidInput);
                Box::new(otg) as Box<dyn TrajectoryGenerator + Send>
            });
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = generator.with_done_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        generator.add_waypoint(JointTarget::new([0.; 7]));
        let state = state_at(START);
        let session = GeneratorSession::start(generator.shared.clone(), limits(), &state);
        let mut step = stepper(session, state);
        let commands = run_until_finished(&mut step, 100);
        assert_eq!(commands.len(), COOLDOWN_TICKS as usize + 1);
        assert!(commands.iter().all(|command| positions(command) == START));
        assert!(step().is_finished());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn global_limits_slow_down_motion() {
        let mut target = START;
        target[3] += 0.5;
        let duration = |limits: MotionLimits| {
            let generator = JointMotionGenerator::new(Some(GeneratorOptions { keep_running: false }));
            generator.add_waypoint(JointTarget::new(target));
            let state = state_at(START);
            let session = GeneratorSession::start(
                generator.shared.clone(),
                Arc::new(ArcSwap::from_pointee(limits)),
                &state,
            );
            run_until_finished(stepper(session, state), 100_000).len()
        };
        let fast = duration(MotionLimits::default());
        let slow = duration(MotionLimits::new(0.2, 0.2, 0.2).unwrap());
        assert!(slow > 2 * fast);
    }
}
