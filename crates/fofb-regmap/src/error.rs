//! Error types for layout construction, path resolution and fixed-point coding

use thiserror::Error;

/// Errors raised while building a [`LayoutDescriptor`](crate::LayoutDescriptor).
///
/// These are fatal to the descriptor being built and never occur afterwards:
/// a descriptor that was built successfully is valid for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Two sibling nodes, or two fields of one register, share addresses or bits
    #[error("`{second}` at {offset:#x} overlaps `{first}`")]
    Overlap {
        /// Node or field declared at the lower offset
        first: String,
        /// Node or field that starts inside `first`
        second: String,
        /// Start of `second` (bytes for nodes, bit index for fields)
        offset: u64,
    },

    /// A node or field extends past the extent of its parent
    #[error("`{path}` ends at {end:#x}, beyond the enclosing extent {extent:#x}")]
    OutOfBounds {
        /// Offending node or field
        path: String,
        /// End of the node (bytes) or field (bits)
        end: u64,
        /// Extent it must fit in
        extent: u64,
    },

    /// Computed root extent disagrees with the declared total size
    #[error("layout `{layout}` declares {declared:#x} bytes but its nodes span {computed:#x}")]
    SizeMismatch {
        /// Layout name (`kind@version`)
        layout: String,
        /// Declared `total_size_bytes`
        declared: u64,
        /// Extent computed from the nodes, rounded to the word size
        computed: u64,
    },

    /// A register or array is not naturally aligned
    #[error("`{path}` at {offset:#x} is not aligned to {alignment} bytes")]
    Misaligned {
        /// Offending node
        path: String,
        /// Offset (or stride) that broke alignment
        offset: u64,
        /// Required alignment
        alignment: u64,
    },

    /// Structurally invalid description
    #[error("`{path}`: {reason}")]
    Malformed {
        /// Offending node or field
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// A declared header constant disagrees with the computed layout offset
    #[error("`{path}` is declared at {declared:#x} but the layout places it at {computed:#x}")]
    OffsetMismatch {
        /// Path of the checked node
        path: String,
        /// Offset from the header constant
        declared: u64,
        /// Offset computed from the layout
        computed: u64,
    },
}

impl LayoutError {
    /// Create a malformed-description error
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while resolving a logical path. No hardware is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A segment names nothing at that level
    #[error("`{path}`: no member named `{segment}`")]
    NotFound {
        /// Full path being resolved
        path: String,
        /// Segment that did not match
        segment: String,
    },

    /// Array index past the element count
    #[error("`{path}`: index {index} out of range for `{segment}` ({count} elements)")]
    IndexOutOfRange {
        /// Full path being resolved
        path: String,
        /// Indexed segment
        segment: String,
        /// Requested index
        index: usize,
        /// Number of elements
        count: usize,
    },

    /// Segment shape does not match the node (index on a scalar, missing index, ...)
    #[error("`{path}`: `{segment}` {reason}")]
    TypeMismatch {
        /// Full path being resolved
        path: String,
        /// Segment that did not fit
        segment: String,
        /// Description of the mismatch
        reason: &'static str,
    },

    /// Path text could not be parsed
    #[error("invalid path `{path}`: {reason}")]
    Syntax {
        /// Path text
        path: String,
        /// Parse failure
        reason: &'static str,
    },
}

/// Errors raised by the fixed-point codec
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FixedPointError {
    /// Value does not fit the format
    #[error("{value} is outside the representable range [{min}, {max}]")]
    OutOfRange {
        /// Requested value
        value: f64,
        /// Most negative representable value
        min: f64,
        /// Most positive representable value
        max: f64,
    },

    /// NaN or infinity
    #[error("cannot encode a non-finite value")]
    NotFinite,

    /// Format widths do not fit the field
    #[error("invalid fixed-point format: int_width={int_width} frac_width={frac_width} in a {field_bits}-bit field")]
    InvalidFormat {
        /// Integer bits (sign included)
        int_width: u32,
        /// Fractional bits
        frac_width: u32,
        /// Width of the field holding the value
        field_bits: u32,
    },
}
