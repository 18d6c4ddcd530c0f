// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
#![allow(non_upper_case_globals)]

use crate::exception::PandaException;
use crate::PandaResult;
use std::path::Path;

/// Determines whether the current OS kernel is a realtime kernel.
///
/// On Linux, this checks for the existence of `/sys/kernel/realtime`.
pub fn has_realtime_kernel() -> bool {
    Path::new("/sys/kernel/realtime").exists()
}

/// Sets the current thread to the highest possible scheduler priority.
///
/// # Errors
/// * RealTimeException if realtime priority cannot be set for the current thread.
///
/// If the method returns an Error please check your /etc/security/limits.conf file
/// There should be a line like this:
/// ```text
///marco            -       rtprio          99
/// ```
pub fn set_current_thread_to_highest_scheduler_priority() -> PandaResult<()> {
    unsafe {
        let max_priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max_priority == -1 {
            return Err(PandaException::RealTimeException {
                message: "panda-motion: unable to get maximum possible thread priority"
                    .to_string(),
            });
        }
        let thread_param = libc::sched_param {
            // one below the maximum, as recommended by
            // https://rt.wiki.kernel.org/index.php/HOWTO:_Build_an_RT-application
            sched_priority: max_priority - 1,
        };
        if libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &thread_param) != 0 {
            return Err(PandaException::RealTimeException {
                message: "panda-motion: unable to set realtime scheduling".to_string(),
            });
        }
        // keeps the waypoint queue and solver state from being swapped out mid-motion
        if libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) != 0 {
            return Err(PandaException::RealTimeException {
                message: "panda-motion: unable to lock memory".to_string(),
            });
        }
    }
    Ok(())
}

/// Prepares the calling thread for running the control loop.
///
/// With [`RealtimeConfig::Enforce`](`crate::RealtimeConfig::Enforce`) the kernel must be a
/// realtime kernel and the thread gets the highest scheduler priority.
pub(crate) fn prepare_control_thread(enforce_real_time: bool) -> PandaResult<()> {
    if !enforce_real_time {
        return Ok(());
    }
    if !has_realtime_kernel() {
        return Err(PandaException::RealTimeException {
            message: "panda-motion: Running kernel does not have realtime capabilities."
                .to_string(),
        });
    }
    set_current_thread_to_highest_scheduler_priority()
}

/// Determines whether the given array represents a valid homogeneous transformation matrix.
/// transform is represented as a 4x4 matrix in column-major format
#[allow(clippy::float_cmp)]
pub fn is_homogeneous_transformation(transform: &[f64; 16]) -> bool {
    const kOrthonormalThreshold: f64 = 1e-5;
    if transform[3] != 0.0 || transform[7] != 0.0 || transform[11] != 0.0 || transform[15] != 1.0 {
        return false;
    }
    for j in 0..3 {
        let column_norm = (transform[j * 4].powi(2)
            + transform[j * 4 + 1].powi(2)
            + transform[j * 4 + 2].powi(2))
        .sqrt();
        if (column_norm - 1.).abs() > kOrthonormalThreshold {
            return false;
        }
    }
    for i in 0..3 {
        let row_norm =
            (transform[i].powi(2) + transform[4 + i].powi(2) + transform[2 * 4 + i].powi(2)).sqrt();
        if (row_norm - 1.).abs() > kOrthonormalThreshold {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use crate::robot::control_tools::{is_homogeneous_transformation, prepare_control_thread};

    #[test]
    fn homogeneous_transformation() {
        let identity = [
            1., 0., 0., 0., 0., 1., 0., 0., 0., 0., 1., 0., 0.4, 0.1, 0.2, 1.,
        ];
        assert!(is_homogeneous_transformation(&identity));
        let mut scaled = identity;
        scaled[5] = 2.;
        assert!(!is_homogeneous_transformation(&scaled));
        let mut projective = identity;
        projective[3] = 0.1;
        assert!(!is_homogeneous_transformation(&projective));
    }

    #[test]
    fn ignoring_realtime_always_succeeds() {
        assert!(prepare_control_thread(false).is_ok());
    }
}
