//! Telemetry transports.
//!
//! - [`serial`] - UART links configured raw 8N1 through termios
//! - [`udp`] - UDP links (broadcast or unicast send, bound receive)
//! - [`memory`] - In-process links for tests and simulation

pub mod memory;
pub mod serial;
pub mod udp;

pub use memory::{MemoryLink, MemoryLinkHandle};
pub use serial::SerialLink;
pub use udp::UdpLink;
