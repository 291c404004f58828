//! Prelude module for common re-exports.
//!
//! ```rust
//! use pops_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LinkRole, PopsConfig, SharedConfig};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hal::driver::{DriverFactory, HalError, HardwareDriver};
pub use crate::hal::pru::{ControlRegion, CoprocessorMemory, RingBufferSource};
pub use crate::hal::transport::Transport;

// ─── Data types ─────────────────────────────────────────────────────
pub use crate::types::{InstrumentStatus, ParticleEvent, StatusType};

/// Default macro-cycle period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);
