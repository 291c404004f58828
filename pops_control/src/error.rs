//! Error types of the acquisition loop.

use crate::persist::PersistError;
use pops_common::config::ConfigError;
use pops_common::hal::driver::HalError;
use thiserror::Error;

/// Fatal errors that stop the control program.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// A required hardware resource failed.
    #[error("hardware: {0}")]
    Hal(#[from] HalError),

    /// The output file set could not be created.
    #[error("persistence: {0}")]
    Persist(#[from] PersistError),

    /// Real-time scheduling setup failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// The program was started without root privileges.
    #[error("must be run as root")]
    NotRoot,
}
