//! Typed register access for FOFB (Fast Orbit Feedback) gateware peripherals.
//!
//! This crate binds the layouts of [`fofb_regmap`] to a live bus and turns
//! logical paths like `ch[3].acc.gain` into checked word accesses.
//!
//! # Stack
//!
//! ```text
//! PeripheralBinding ── transaction() ──> AccessorEngine
//!        │                                    │
//!  VersionResolver                     Transport (read32 / write32)
//!        │                               ├── MmapTransport  (PCIe BAR, file)
//!  LayoutRegistry ── fofb_regmap         └── SimulatedBus   (tests, no hardware)
//! ```
//!
//! # Quick start
//!
//! ```
//! use fofb_driver::prelude::*;
//! use fofb_regmap::peripherals::{processing, REV_B};
//!
//! # fn main() -> fofb_driver::Result<()> {
//! let bus = SimulatedBus::new().with_window(0x0, 0xD000);
//! let resolver = VersionResolver::builtin()?;
//! let config = BindConfig::new().with_version(REV_B);
//! let binding = resolver.bind(processing::KIND, 0x0, bus, &config)?;
//!
//! binding.write_flag("loop_intlk.ctl.src_en_orb_distort", true)?;
//! assert!(binding.read_flag("loop_intlk.ctl.src_en_orb_distort")?);
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees
//!
//! | Failure | Bus traffic before the error |
//! |---------|------------------------------|
//! | Path, access mode, range, semantic | none |
//! | Window size differs from the layout (explicit revision) | none |
//! | Transport fault during read-modify-write | the read only |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod accessor;
pub mod backends;
mod binding;
mod config;
mod error;
pub mod peripherals;
mod registry;
mod transport;

pub use accessor::AccessorEngine;
pub use backends::{BusAccess, Fault, MmapTransport, SimulatedBus};
pub use binding::{PeripheralBinding, VersionResolver};
pub use config::BindConfig;
pub use error::{AccessError, FofbError, Result, TransportError, VersionError};
pub use registry::LayoutRegistry;
pub use transport::{Transport, TransportType};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AccessorEngine, BindConfig, FofbError, LayoutRegistry, MmapTransport, PeripheralBinding,
        Result, SimulatedBus, Transport, VersionResolver,
    };
    pub use fofb_regmap::{AbiVersion, FixedPointFormat, LayoutDescriptor};
}
