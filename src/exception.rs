// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Represents all kind of errors which can occur while starting, stopping or running
/// motion generators and torque controllers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PandaException {
    /// ControlException is reported if the real-time link signals a fault during motion
    /// generation or torque control, e.g. a reflex or a lost connection.
    #[error("{message}")]
    ControlException {
        /// Explanatory string.
        message: String,
    },

    /// GeneratorAlreadyRunning is returned when trying to start a motion generator or a
    /// controller while a motion generator is active.
    #[error("A motion generator is already running!")]
    GeneratorAlreadyRunning,

    /// ControllerAlreadyRunning is returned when trying to start a motion generator or a
    /// controller while a torque controller is active.
    #[error("A torque controller is already running!")]
    ControllerAlreadyRunning,

    /// NoGeneratorRunning is returned when trying to stop a motion generator without one running.
    #[error("Trying to stop a motion generator, but no motion generator is running!")]
    NoGeneratorRunning,

    /// NoControllerRunning is returned when trying to stop a controller without one running.
    #[error("Trying to stop a torque controller, but no controller is running!")]
    NoControllerRunning,

    /// InvalidArgument is returned for rejected parameters like non-positive scale factors.
    #[error("{message:?}")]
    InvalidArgument { message: String },

    /// RealTimeException is returned if the real-time priority cannot be set
    #[error("{message:?}")]
    RealTimeException { message: String },
}

/// creates an InvalidArgument error from a static string slice
pub(crate) fn create_invalid_argument(message: &'static str) -> PandaException {
    PandaException::InvalidArgument {
        message: message.to_string(),
    }
}

/// Result type which can have PandaException as Error
pub type PandaResult<T> = Result<T, PandaException>;
