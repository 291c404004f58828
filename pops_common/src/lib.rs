//! POPS Common Library
//!
//! Shared constants, configuration loading and the hardware seams used by the
//! POPS acquisition workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Coprocessor memory layout and loop limits
//! - [`config`] - Configuration loading traits and the instrument configuration
//! - [`types`] - Particle events, status types and analog conversions
//! - [`hal`] - Hardware driver, coprocessor memory and transport traits
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use pops_common::prelude::*;
//! use pops_common::consts::RING_CAPACITY_WORDS;
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
pub mod types;
