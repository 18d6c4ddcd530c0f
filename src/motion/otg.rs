// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the online trajectory generation interface used by the motion generators and a
//! jerk-limited, time-synchronized implementation of it.
//!
//! The motion generators only talk to the [`TrajectoryGenerator`] trait. It follows the usual
//! online trajectory generation contract: the caller hands in an [`InputParameter`] each cycle,
//! receives the next kinematic state in an [`OutputParameter`] and copies it back with
//! [`OutputParameter::pass_to_input`]. A new trajectory is only calculated if the input differs
//! from the one the generator currently follows.
use crate::robot::limits::DEGREES_OF_FREEDOM;

const DOFS: usize = DEGREES_OF_FREEDOM;
const REST_TOLERANCE: f64 = 1e-6;

/// Kinematic state and limits handed to a [`TrajectoryGenerator`].
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct InputParameter {
    pub current_position: [f64; DOFS],
    pub current_velocity: [f64; DOFS],
    pub current_acceleration: [f64; DOFS],
    pub target_position: [f64; DOFS],
    pub target_velocity: [f64; DOFS],
    pub target_acceleration: [f64; DOFS],
    pub max_velocity: [f64; DOFS],
    pub max_acceleration: [f64; DOFS],
    pub max_jerk: [f64; DOFS],
}

/// Kinematic state calculated by a [`TrajectoryGenerator`] for the next cycle.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct OutputParameter {
    pub new_position: [f64; DOFS],
    pub new_velocity: [f64; DOFS],
    pub new_acceleration: [f64; DOFS],
    /// Time since the start of the current trajectory in \[s\].
    pub time: f64,
    /// Duration of the current trajectory in \[s\].
    pub trajectory_duration: f64,
    /// True if the last update calculated a new trajectory.
    pub new_calculation: bool,
}

impl OutputParameter {
    /// Makes the calculated state the current state of the next cycle.
    pub fn pass_to_input(&self, input: &mut InputParameter) {
        input.current_position = self.new_position;
        input.current_velocity = self.new_velocity;
        input.current_acceleration = self.new_acceleration;
    }
}

/// Result of a single [`TrajectoryGenerator::update`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OtgResult {
    /// The trajectory is still being followed.
    Working,
    /// The target state has been reached.
    Finished,
    /// No trajectory could be calculated for the given input.
    ErrorInvalidInput,
}

/// Calculates one cycle of a trajectory towards the target of an [`InputParameter`].
#[cfg_attr(test, mockall::automock)]
pub trait TrajectoryGenerator {
    fn update(&mut self, input: &InputParameter, output: &mut OutputParameter) -> OtgResult;
}

#[derive(Debug, Copy, Clone, Default)]
struct Profile {
    start: f64,
    target: f64,
    distance: f64,
    jerk: f64,
    durations: [f64; 7],
    scale: f64,
}

impl Profile {
    /// Minimum-time rest-to-rest profile with seven phases of constant jerk.
    fn calculate(start: f64, target: f64, max_velocity: f64, max_acceleration: f64, max_jerk: f64) -> Self {
        let distance = target - start;
        let d = distance.abs();
        if d == 0. {
            return Profile {
                start,
                target,
                distance,
                jerk: max_jerk,
                durations: [0.; 7],
                scale: 1.,
            };
        }
        let (v, a, j) = (max_velocity, max_acceleration, max_jerk);
        let reaches_max_acceleration = v * j >= a * a;
        let (mut tj, mut ta) = if reaches_max_acceleration {
            let tj = a / j;
            (tj, tj + v / a)
        } else {
            let tj = (v / j).sqrt();
            (tj, 2. * tj)
        };
        let mut tv = 0.;
        if d >= v * ta {
            tv = (d - v * ta) / v;
        } else if reaches_max_acceleration && d >= 2. * a.powi(3) / (j * j) {
            tj = a / j;
            ta = (tj + (tj * tj + 4. * d / a).sqrt()) / 2.;
        } else {
            tj = (d / (2. * j)).cbrt();
            ta = 2. * tj;
        }
        let tc = (ta - 2. * tj).max(0.);
        Profile {
            start,
            target,
            distance,
            jerk: j,
            durations: [tj, tc, tj, tv, tj, tc, tj],
            scale: 1.,
        }
    }

    fn duration(&self) -> f64 {
        self.durations.iter().sum()
    }

    /// Position, velocity and acceleration at `time` of the time-scaled profile.
    fn evaluate(&self, time: f64) -> (f64, f64, f64) {
        let unscaled = time / self.scale;
        if unscaled >= self.duration() {
            return (self.target, 0., 0.);
        }
        const JERK_SIGNS: [f64; 7] = [1., 0., -1., 0., -1., 0., 1.];
        let (mut p, mut v, mut a) = (0., 0., 0.);
        let mut remaining = unscaled;
        for (duration, sign) in self.durations.iter().zip(JERK_SIGNS.iter()) {
            let dt = duration.min(remaining);
            let jerk = sign * self.jerk;
            p += v * dt + a * dt * dt / 2. + jerk * dt.powi(3) / 6.;
            v += a * dt + jerk * dt * dt / 2.;
            a += jerk * dt;
            remaining -= dt;
            if remaining <= 0. {
                break;
            }
        }
        let direction = self.distance.signum();
        (
            self.start + direction * p,
            direction * v / self.scale,
            direction * a / (self.scale * self.scale),
        )
    }
}

#[derive(Debug, Copy, Clone)]
struct Trajectory {
    profiles: [Profile; DOFS],
    duration: f64,
}

impl Trajectory {
    fn calculate(input: &InputParameter) -> Self {
        let mut profiles = [Profile::default(); DOFS];
        for (dof, profile) in profiles.iter_mut().enumerate() {
            *profile = Profile::calculate(
                input.current_position[dof],
                input.target_position[dof],
                input.max_velocity[dof],
                input.max_acceleration[dof],
                input.max_jerk[dof],
            );
        }
        let duration = profiles
            .iter()
            .map(|profile| profile.duration())
            .fold(0., f64::max);
        for profile in profiles.iter_mut() {
            let own = profile.duration();
            if own > 0. {
                profile.scale = duration / own;
            }
        }
        Trajectory { profiles, duration }
    }
}

fn is_valid_input(input: &InputParameter) -> bool {
    let finite = |values: &[f64; DOFS]| values.iter().all(|x| x.is_finite());
    let at_rest = |values: &[f64; DOFS]| values.iter().all(|x| x.abs() <= REST_TOLERANCE);
    let positive = |values: &[f64; DOFS]| values.iter().all(|x| x.is_finite() && *x > 0.);
    finite(&input.current_position)
        && finite(&input.target_position)
        && at_rest(&input.current_velocity)
        && at_rest(&input.current_acceleration)
        && at_rest(&input.target_velocity)
        && at_rest(&input.target_acceleration)
        && positive(&input.max_velocity)
        && positive(&input.max_acceleration)
        && positive(&input.max_jerk)
}

/// Time-synchronized trajectory generator with jerk-limited S-curve profiles.
///
/// Every degree of freedom moves on a minimum-time profile which respects its velocity,
/// acceleration and jerk limit. Faster degrees of freedom are slowed down so that all of them
/// arrive at the same time. Only trajectories which start and end at rest are supported; other
/// inputs result in [`OtgResult::ErrorInvalidInput`].
#[derive(Debug)]
pub struct SCurveGenerator {
    delta_time: f64,
    current_input: Option<InputParameter>,
    trajectory: Option<Trajectory>,
    time: f64,
}

impl SCurveGenerator {
    /// Creates a new generator.
    /// # Arguments
    /// * `delta_time` - cycle time of [`update`](`TrajectoryGenerator::update`) in \[s\].
    pub fn new(delta_time: f64) -> Self {
        SCurveGenerator {
            delta_time,
            current_input: None,
            trajectory: None,
            time: 0.,
        }
    }
}

impl TrajectoryGenerator for SCurveGenerator {
    fn update(&mut self, input: &InputParameter, output: &mut OutputParameter) -> OtgResult {
        output.new_calculation = false;
        if self.trajectory.is_none() || self.current_input.as_ref() != Some(input) {
            if !is_valid_input(input) {
                self.trajectory = None;
                self.current_input = None;
                return OtgResult::ErrorInvalidInput;
            }
            self.trajectory = Some(Trajectory::calculate(input));
            self.current_input = Some(*input);
            self.time = 0.;
            output.new_calculation = true;
        }
        let trajectory = match self.trajectory.as_ref() {
            Some(trajectory) => trajectory,
            None => return OtgResult::ErrorInvalidInput,
        };
        self.time += self.delta_time;
        let finished = self.time >= trajectory.duration;
        for (dof, profile) in trajectory.profiles.iter().enumerate() {
            let (p, v, a) = if finished {
                (profile.target, 0., 0.)
            } else {
                profile.evaluate(self.time)
            };
            output.new_position[dof] = p;
            output.new_velocity[dof] = v;
            output.new_acceleration[dof] = a;
        }
        output.time = self.time;
        output.trajectory_duration = trajectory.duration;
        // the caller passes the output back, which continues this trajectory
        if let Some(current) = self.current_input.as_mut() {
            output.pass_to_input(current);
        }
        if finished {
            OtgResult::Finished
        } else {
            OtgResult::Working
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::motion::otg::{
        InputParameter, OtgResult, OutputParameter, SCurveGenerator, TrajectoryGenerator,
    };

    fn input(start: [f64; 7], target: [f64; 7]) -> InputParameter {
        InputParameter {
            current_position: start,
            target_position: target,
            max_velocity: [1.0, 2.0, 0.5, 1.0, 1.0, 1.0, 1.0],
            max_acceleration: [2.0, 4.0, 1.0, 3.0, 3.0, 3.0, 3.0],
            max_jerk: [100.0, 500.0, 50.0, 300.0, 300.0, 300.0, 300.0],
            ..Default::default()
        }
    }

    fn run(generator: &mut SCurveGenerator, mut input: InputParameter) -> (Vec<OutputParameter>, OtgResult) {
        let mut output = OutputParameter::default();
        let mut outputs = Vec::new();
        for _ in 0..100_000 {
            let result = generator.update(&input, &mut output);
            outputs.push(output);
            if result != OtgResult::Working {
                return (outputs, result);
            }
            output.pass_to_input(&mut input);
        }
        (outputs, OtgResult::Working)
    }

    #[test]
    fn reaches_target_within_limits() {
        let mut generator = SCurveGenerator::new(1e-3);
        let start = [0., 0.2, -0.3, -1.5, 0., 1.5, 0.6];
        let target = [0.8, -0.4, 0.1, -2.0, 0.3, 1.2, 0.6];
        let input = input(start, target);
        let (outputs, result) = run(&mut generator, input);
        assert_eq!(result, OtgResult::Finished);
        let last = outputs.last().unwrap();
        assert_eq!(last.new_position, target);
        assert_eq!(last.new_velocity, [0.; 7]);
        assert!(outputs[0].new_calculation);
        assert!(outputs.iter().skip(1).all(|output| !output.new_calculation));
        for output in outputs.iter() {
            for dof in 0..7 {
                assert!(output.new_velocity[dof].abs() <= input.max_velocity[dof] + 1e-9);
                assert!(output.new_acceleration[dof].abs() <= input.max_acceleration[dof] + 1e-9);
            }
        }
        let steps = outputs.len() as f64;
        assert!((steps * 1e-3 - last.trajectory_duration).abs() < 1e-3 + 1e-9);
    }

    #[test]
    fn finished_output_is_exactly_the_target() {
        let mut generator = SCurveGenerator::new(1e-3);
        let target = [-0.4, 0.1, 0.3, 0.7, 1.1, -0.3, 0.9];
        let (outputs, result) = run(&mut generator, input([0.2; 7], target));
        assert_eq!(result, OtgResult::Finished);
        let last = outputs.last().unwrap();
        assert_eq!(last.new_position, target);
        assert_eq!(last.new_velocity, [0.; 7]);
        assert_eq!(last.new_acceleration, [0.; 7]);
    }

    #[test]
    fn degrees_of_freedom_arrive_together() {
        let mut generator = SCurveGenerator::new(1e-3);
        let start = [0.; 7];
        let target = [1.0, 0.01, 0., 0., 0., 0., 0.];
        let (outputs, _) = run(&mut generator, input(start, target));
        let duration = outputs[0].trajectory_duration;
        // halfway through, the short motion is not finished yet
        let half = &outputs[outputs.len() / 2];
        assert!(half.new_position[1] > 0. && half.new_position[1] < 0.01);
        assert!(half.new_position[0] > 0. && half.new_position[0] < 1.0);
        assert!(duration > 0.);
    }

    #[test]
    fn zero_displacement_finishes_immediately() {
        let mut generator = SCurveGenerator::new(1e-3);
        let position = [0.1, 0.2, 0.3, -1.0, 0., 1.0, 0.];
        let mut output = OutputParameter::default();
        let result = generator.update(&input(position, position), &mut output);
        assert_eq!(result, OtgResult::Finished);
        assert_eq!(output.new_position, position);
        assert_eq!(output.trajectory_duration, 0.);
    }

    #[test]
    fn invalid_input_is_rejected() {
        let mut generator = SCurveGenerator::new(1e-3);
        let mut output = OutputParameter::default();
        let mut bad = input([0.; 7], [0.5; 7]);
        bad.max_velocity[3] = 0.;
        assert_eq!(generator.update(&bad, &mut output), OtgResult::ErrorInvalidInput);
        let mut bad = input([0.; 7], [0.5; 7]);
        bad.target_position[0] = f64::NAN;
        assert_eq!(generator.update(&bad, &mut output), OtgResult::ErrorInvalidInput);
        let mut bad = input([0.; 7], [0.5; 7]);
        bad.current_velocity[2] = 0.3;
        assert_eq!(generator.update(&bad, &mut output), OtgResult::ErrorInvalidInput);
        assert_eq!(
            generator.update(&input([0.; 7], [0.5; 7]), &mut output),
            OtgResult::Working
        );
    }

    #[test]
    fn new_target_starts_new_trajectory() {
        let mut generator = SCurveGenerator::new(1e-3);
        let (first, _) = run(&mut generator, input([0.; 7], [0.1; 7]));
        let mut next = input([0.1; 7], [-0.1; 7]);
        first.last().unwrap().pass_to_input(&mut next);
        let mut output = OutputParameter::default();
        assert_eq!(generator.update(&next, &mut output), OtgResult::Working);
        assert!(output.new_calculation);
        assert!(output.new_position[0] < 0.1);
    }
}
