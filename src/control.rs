// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the torque controllers.
//!
//! Every controller is a cheap handle which can be cloned into other threads to update its
//! setpoint while the robot is running it. Setpoints are low-pass filtered once per tick on the
//! real-time thread with `filtered = coefficient * raw + (1 - coefficient) * filtered_last`.

pub mod applied_torque;
pub mod cartesian_impedance;
mod controller;
pub mod integrated_velocity;
pub mod joint_position;
pub mod torque_controller;
