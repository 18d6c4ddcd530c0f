// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the waypoint based motion generators.

pub mod cartesian_motion_generator;
pub mod generator;
pub mod joint_motion_generator;
pub mod otg;
pub mod profile;
pub mod targets;
mod waypoint_queue;
