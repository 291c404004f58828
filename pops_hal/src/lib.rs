//! # POPS HAL Library
//!
//! Hardware layer of the POPS host program.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - `HardwareDriver` implementations
//! - [`pru`] - Coprocessor memory (mapped, in-memory, synthetic producer)
//! - [`transport`] - Serial, UDP and in-memory links
//! - [`power`] - OS halt/reboot
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            pops_hal                              │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │  PRU memory │    │  Transports  │    │  Driver Registry    │  │
//! │  │ ring+control│    │ serial / UDP │    │ beaglebone / sim    │  │
//! │  └──────┬──────┘    └──────┬───────┘    └──────────┬──────────┘  │
//! │         └──────────────────┼───────────────────────┘             │
//! │                            ▼                                     │
//! │                 pops_control acquisition loop                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod driver_registry;
pub mod drivers;
pub mod power;
pub mod pru;
pub mod transport;
