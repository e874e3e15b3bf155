//! Transport implementations
//!
//! Two transports available:
//! - **Mmap**: memory-mapped PCIe BAR (`resourceN`) or any file
//! - **Simulated**: in-memory register file with traffic log and fault
//!   injection, no hardware required

pub mod mmap;
pub mod software;

pub use mmap::MmapTransport;
pub use software::{BusAccess, Fault, SimulatedBus};
