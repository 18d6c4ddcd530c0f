// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the kinematic limits of the Panda which bound every generated trajectory.

/// Control rate of the real-time link: one tick every millisecond.
pub static CONTROL_RATE: f64 = 1e-3;
/// Number of degrees of freedom of the arm.
pub const DEGREES_OF_FREEDOM: usize = 7;
/// Maximum joint velocity in \[rad/s\]
pub static MAX_JOINT_VELOCITY: [f64; 7] = [2.1750, 2.1750, 2.1750, 2.1750, 2.6100, 2.6100, 2.6100];
/// Maximum joint acceleration in \[rad/s^2\]
pub static MAX_JOINT_ACCELERATION: [f64; 7] = [15.0, 7.5, 10.0, 12.5, 15.0, 20.0, 20.0];
/// Maximum joint jerk in \[rad/s^3\]
pub static MAX_JOINT_JERK: [f64; 7] = [7500.0, 3750.0, 5000.0, 6250.0, 7500.0, 10000.0, 10000.0];
/// Maximum translational velocity in \[m/s\]
pub static MAX_TRANSLATIONAL_VELOCITY: f64 = 1.7;
/// Maximum translational acceleration in \[m/s^2\]
pub static MAX_TRANSLATIONAL_ACCELERATION: f64 = 13.0;
/// Maximum translational jerk in \[m/s^3\]
pub static MAX_TRANSLATIONAL_JERK: f64 = 6500.0;
/// Maximum rotational velocity in \[rad/s\]
pub static MAX_ROTATIONAL_VELOCITY: f64 = 2.5;
/// Maximum rotational acceleration in \[rad/s^2\]
pub static MAX_ROTATIONAL_ACCELERATION: f64 = 25.0;
/// Maximum rotational jerk in \[rad/s^3\]
pub static MAX_ROTATIONAL_JERK: f64 = 12500.0;
