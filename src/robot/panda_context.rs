// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the scoped [`PandaContext`].
use std::time::{Duration, Instant};

use spin_sleep::SpinSleeper;
use tracing::{debug, warn};

use crate::exception::{create_invalid_argument, PandaResult};
use crate::robot::panda::Panda;
use crate::robot::robot_control::RobotControl;

/// Paces a caller loop and watches the session for faults.
///
/// Whatever generator or controller is attached to the [`Panda`] when the context goes out of
/// scope is stopped.
///
/// # Example
/// ```no_run
/// # use panda_motion::{Panda, PandaResult, RobotControl};
/// # fn run<L: RobotControl>(panda: &Panda<L>) -> PandaResult<()> {
/// let mut context = panda.create_context(10., std::time::Duration::from_secs(5), None)?;
/// while context.ok() {
///     println!("{:?}", panda.get_position());
/// }
/// # Ok(())
/// # }
/// ```
pub struct PandaContext<'a, L: RobotControl> {
    panda: &'a Panda<L>,
    sleeper: SpinSleeper,
    period: Duration,
    start: Instant,
    start_ticks: u64,
    iterations: u64,
    max_runtime: Option<Duration>,
    max_iter: Option<u64>,
}

impl<'a, L: RobotControl> PandaContext<'a, L> {
    pub(crate) fn new(
        panda: &'a Panda<L>,
        frequency: f64,
        max_runtime: Option<Duration>,
        max_iter: Option<u64>,
    ) -> PandaResult<Self> {
        if !(frequency.is_finite() && frequency > 0.) {
            return Err(create_invalid_argument(
                "context frequency has to be finite and positive",
            ));
        }
        Ok(PandaContext {
            panda,
            sleeper: SpinSleeper::default(),
            period: Duration::from_secs_f64(1. / frequency),
            start: Instant::now(),
            start_ticks: panda.tick_count(),
            iterations: 0,
            max_runtime,
            max_iter,
        })
    }

    /// Waits for the next iteration and returns false if the loop should end.
    ///
    /// The loop should end when the robot reported a fault, `max_runtime` expired or
    /// `max_iter` iterations were done. The first call returns without waiting.
    pub fn ok(&mut self) -> bool {
        if self.iterations > 0 {
            let deadline = self.start + self.period.mul_f64(self.iterations as f64);
            let now = Instant::now();
            if deadline > now {
                self.sleeper.sleep(deadline - now);
            }
        }
        if self.panda.is_faulted() {
            warn!("robot fault detected after {} iterations", self.iterations);
            return false;
        }
        if let Some(max_runtime) = self.max_runtime {
            if self.start.elapsed() >= max_runtime {
                debug!("context runtime expired");
                return false;
            }
        }
        if let Some(max_iter) = self.max_iter {
            if self.iterations >= max_iter {
                return false;
            }
        }
        self.iterations += 1;
        true
    }

    /// Real-time ticks since the context was created.
    pub fn num_ticks(&self) -> u64 {
        self.panda.tick_count().saturating_sub(self.start_ticks)
    }

    /// Elapsed time since the context was created in \[s\].
    pub fn time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl<'a, L: RobotControl> Drop for PandaContext<'a, L> {
    fn drop(&mut self) {
        if let Err(error) = self.panda.stop() {
            warn!("could not stop control loop: {}", error);
        }
    }
}
