// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`Panda`](`crate::Panda`) session and everything it needs to talk to the
//! real-time link.

mod control_loop;
pub mod control_tools;
pub mod control_types;
pub mod limits;
pub mod low_pass_filter;
pub mod panda;
pub mod panda_context;
pub mod robot_control;
pub mod robot_state;
