//! Audio output errors

use thiserror::Error;

use crate::host::HostError;

/// Reasons [`crate::AudioOutput::initialize`] can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Audio subsystem could not be initialized: {0}")]
    SubsystemUnavailable(#[source] HostError),

    #[error("Could not open audio device (f32: {float}; s16: {fallback})")]
    DeviceOpenFailed { float: HostError, fallback: HostError },

    #[error("Could not query the granted stream format: {0}")]
    FormatQueryFailed(#[source] HostError),
}

pub type Result<T> = std::result::Result<T, InitError>;
