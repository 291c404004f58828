//! Operating-system power actions issued after the loop stops.

use pops_common::hal::driver::HalError;
use std::process::Command;
use tracing::info;

/// What the host should do once the acquisition loop has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Halt the board.
    Halt,
    /// Reboot the board.
    Reboot,
}

impl PowerAction {
    fn shutdown_flag(self) -> &'static str {
        match self {
            Self::Halt => "-h",
            Self::Reboot => "-r",
        }
    }
}

/// Ask the OS to halt or reboot.
///
/// # Errors
/// `HalError::CommunicationError` if `shutdown` cannot be run or fails.
pub fn execute(action: PowerAction) -> Result<(), HalError> {
    info!("Requesting OS {:?}", action);
    let status = Command::new("shutdown")
        .arg(action.shutdown_flag())
        .arg("now")
        .status()
        .map_err(|e| HalError::io("shutdown", e))?;
    if !status.success() {
        return Err(HalError::CommunicationError(format!(
            "shutdown exited with {status}"
        )));
    }
    Ok(())
}
