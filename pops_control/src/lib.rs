//! # POPS Control Library
//!
//! Host-side acquisition loop of the POPS optical particle counter. A
//! coprocessor detects particles and writes them into a shared ring; this
//! crate drains the ring, feeds a baseline and threshold back to the
//! coprocessor, bins one second of events, renders telemetry, applies remote
//! commands and persists the data, all inside a one-second loop guarded by
//! the hardware watchdog.
//!
//! ## Data Flow
//!
//! ```text
//! coprocessor ─► ring ─► RingBufferConsumer ─► EventSet ─► Histogram/WidthStats
//!      ▲                                                        │
//!      └── BaselineEstimator ◄── control region                 ▼
//!                                                telemetry ─► links + OutputFileSet
//! ```
//!
//! Every micro-step of the loop is followed by a drain, a baseline
//! recomputation and a stop-flag check.

pub mod analog;
pub mod baseline;
pub mod binning;
pub mod command;
pub mod cycle;
pub mod error;
pub mod persist;
pub mod raw;
pub mod ring;
pub mod state;
pub mod telemetry;
