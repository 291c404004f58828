//! Coprocessor memory implementations.
//!
//! - [`mapped`] - Physical PRU memory mapped from `/dev/mem`, firmware via remoteproc
//! - [`memory`] - In-process memory with the same layout, for tests and simulation
//! - [`synthetic`] - Background producer writing synthetic particles into [`memory::MemoryPru`]

pub mod mapped;
pub mod memory;
pub mod synthetic;

pub use mapped::MappedPru;
pub use memory::MemoryPru;
pub use synthetic::{SyntheticProducer, SyntheticProfile};
