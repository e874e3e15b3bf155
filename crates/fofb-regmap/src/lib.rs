//! Register-map model for the FOFB (Fast Orbit Feedback) gateware peripherals.
//!
//! This crate has **no hardware access**. It is a pure model of the CSR maps
//! the gateware exposes: nested address layouts, bit-fields, repeated blocks,
//! RAM windows and the signed fixed-point encodings used by coefficient and
//! gain registers.
//!
//! Every layout is checked once, when it is built, and is immutable
//! afterwards. Two ABI revisions of the same peripheral are two independent
//! [`LayoutDescriptor`] values tagged with different [`AbiVersion`]s.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`field`] | Access modes, register widths, bit-field descriptors |
//! | [`node`] | Register, block, repeat and memory-region nodes |
//! | [`layout`] | [`LayoutDescriptor`] construction and validation |
//! | [`path`] | Logical path parsing and address resolution |
//! | [`fixed_point`] | Signed fixed-point codec |
//! | [`peripherals`] | Built-in FOFB peripheral layouts (revisions A and B) |
//!
//! # Example
//!
//! ```
//! use fofb_regmap::peripherals::processing;
//!
//! let layout = processing::rev_b().unwrap();
//! let gain = layout.resolve("ch[11].acc.gain").unwrap();
//! assert_eq!(gain.address, 0x1000 + 11 * 0x1000 + 0x804);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod error;
pub mod field;
pub mod fixed_point;
pub mod layout;
pub mod node;
pub mod path;
pub mod peripherals;

pub use error::{FixedPointError, LayoutError, PathError};
pub use field::{Access, EnumVariant, FieldDescriptor, FieldSemantic, FormatRef, RegisterWidth};
pub use fixed_point::{FixedPointCodec, FixedPointFormat};
pub use layout::{AbiVersion, FormatEncoding, FormatSource, LayoutBuilder, LayoutDescriptor, MapEntry};
pub use node::{BlockNode, MemoryRegion, Node, RegisterNode, RepeatNode};
pub use path::{PathSegment, ResolvedField, ResolvedRegion};

/// Bus word size in bytes. Layout extents are rounded up to this alignment.
pub const WORD_BYTES: u64 = 4;
