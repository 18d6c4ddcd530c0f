// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the state every torque controller shares between its handles and the real-time
//! thread.
//!
//! Setpoints and gains are swapped in as a whole, so the real-time thread never observes a
//! partially written vector. Filter state only lives in the session of the real-time thread.
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::exception::{create_invalid_argument, PandaResult};
use crate::robot::low_pass_filter::{is_valid_coefficient, NO_FILTERING};
use crate::utils::AtomicF64;

/// A setpoint which can be low-pass filtered.
pub(crate) trait Setpoint: Clone + Send + Sync + 'static {
    /// `coefficient * self + (1 - coefficient) * previous`
    fn filtered(&self, previous: &Self, coefficient: f64) -> Self;
}

pub(crate) struct ControllerShared<S, G> {
    setpoint: ArcSwap<S>,
    gains: ArcSwap<G>,
    filter_coefficient: AtomicF64,
    time: AtomicF64,
}

impl<S: Setpoint, G> ControllerShared<S, G> {
    pub fn new(setpoint: S, gains: G, filter_coefficient: Option<f64>) -> PandaResult<Self> {
        let filter_coefficient = filter_coefficient.unwrap_or(NO_FILTERING);
        check_filter_coefficient(filter_coefficient)?;
        Ok(ControllerShared {
            setpoint: ArcSwap::from_pointee(setpoint),
            gains: ArcSwap::from_pointee(gains),
            filter_coefficient: AtomicF64::new(filter_coefficient),
            time: AtomicF64::new(0.),
        })
    }
    pub fn set_setpoint(&self, setpoint: S) {
        self.setpoint.store(Arc::new(setpoint));
    }
    pub fn setpoint(&self) -> Arc<S> {
        self.setpoint.load_full()
    }
    pub fn gains(&self) -> Arc<G> {
        self.gains.load_full()
    }
    /// Replaces the gains with a modified copy of the current ones.
    pub fn update_gains<F: Fn(&mut G)>(&self, update: F)
    where
        G: Clone,
    {
        self.gains.rcu(|gains| {
            let mut gains = G::clone(gains);
            update(&mut gains);
            gains
        });
    }
    pub fn set_filter(&self, coefficient: f64) -> PandaResult<()> {
        check_filter_coefficient(coefficient)?;
        self.filter_coefficient.store(coefficient);
        Ok(())
    }
    pub fn filter_coefficient(&self) -> f64 {
        self.filter_coefficient.load()
    }
    pub fn time(&self) -> f64 {
        self.time.load()
    }
    /// Resets time and setpoint for a new activation and returns the filter starting at `hold`.
    pub fn activate(&self, hold: S) -> SetpointFilter<S> {
        self.time.store(0.);
        self.set_setpoint(hold.clone());
        SetpointFilter { filtered: hold }
    }
    pub fn advance(&self, period: &Duration) {
        self.time.store(self.time() + period.as_secs_f64());
    }
    /// Runs `f` with the current gains without cloning them.
    pub fn with_gains<R, F: FnOnce(&G) -> R>(&self, f: F) -> R {
        f(&self.gains.load())
    }
}

/// Filter state of a setpoint, owned by the real-time thread.
pub(crate) struct SetpointFilter<S> {
    filtered: S,
}

impl<S: Setpoint> SetpointFilter<S> {
    /// Filters the latest raw setpoint once. Called exactly once per tick.
    pub fn update<G>(&mut self, shared: &ControllerShared<S, G>) -> &S {
        let raw = shared.setpoint.load();
        self.filtered = raw.filtered(&self.filtered, shared.filter_coefficient());
        &self.filtered
    }
}

fn check_filter_coefficient(coefficient: f64) -> PandaResult<()> {
    if is_valid_coefficient(coefficient) {
        Ok(())
    } else {
        Err(create_invalid_argument(
            "filter coefficient has to be inside (0, 1]",
        ))
    }
}

pub(crate) fn check_finite(values: &[f64], message: &'static str) -> PandaResult<()> {
    if values.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(create_invalid_argument(message))
    }
}

pub(crate) fn check_gains(values: &[f64], message: &'static str) -> PandaResult<()> {
    if values.iter().all(|x| x.is_finite() && *x >= 0.) {
        Ok(())
    } else {
        Err(create_invalid_argument(message))
    }
}
