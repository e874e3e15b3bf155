//! Error types for FOFB driver operations

use fofb_regmap::{AbiVersion, FixedPointError, LayoutError, PathError};
use thiserror::Error;

/// Result type alias for FOFB driver operations
pub type Result<T> = std::result::Result<T, FofbError>;

/// Errors that can occur while binding to or accessing a peripheral
#[derive(Debug, Error)]
pub enum FofbError {
    /// Layout description is inconsistent
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Path does not name anything usable
    #[error(transparent)]
    Path(#[from] PathError),

    /// Value cannot be represented in the fixed-point format
    #[error(transparent)]
    FixedPoint(#[from] FixedPointError),

    /// Access rejected before touching the bus
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Peripheral revision could not be bound
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Bus transaction failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Accesses rejected by validation. No bus traffic has happened when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Field is write-only, or a read-modify-write needs a read it cannot do
    #[error("`{path}` is not readable")]
    NotReadable {
        /// Resolved path
        path: String,
    },

    /// Field is read-only
    #[error("`{path}` is not writable")]
    NotWritable {
        /// Resolved path
        path: String,
    },

    /// Value does not fit the field
    #[error("value {value:#x} does not fit `{path}` (max {max:#x})")]
    ValueOutOfRange {
        /// Resolved path
        path: String,
        /// Requested value
        value: u32,
        /// Largest value the field holds
        max: u32,
    },

    /// Region transfer longer than the region
    #[error("`{path}` holds {count} elements, {len} requested")]
    LengthMismatch {
        /// Region path
        path: String,
        /// Requested length
        len: usize,
        /// Region element count
        count: usize,
    },

    /// Typed access on a field with another interpretation
    #[error("`{path}` is a {actual} field, not {expected}")]
    SemanticMismatch {
        /// Resolved path
        path: String,
        /// Semantic the operation needs
        expected: &'static str,
        /// Semantic the field has
        actual: &'static str,
    },

    /// Enum name or raw value with no matching variant
    #[error("`{path}` has no variant `{variant}`")]
    UnknownVariant {
        /// Resolved path
        path: String,
        /// Requested name, or the raw value read
        variant: String,
    },

    /// Fixed-point format neither discovered nor configured
    #[error("fixed-point format `{format}` used by `{path}` is not available")]
    FormatUnavailable {
        /// Resolved path
        path: String,
        /// Format name
        format: String,
    },
}

/// Bind-time version resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// No layout for the kind, or for the kind at that revision
    #[error("no layout registered for `{kind}`{}", .version.as_ref().map(|v| format!(" {v}")).unwrap_or_default())]
    Unknown {
        /// Peripheral kind
        kind: String,
        /// Requested revision, if one was resolved
        version: Option<AbiVersion>,
    },

    /// Mapped window does not match the layout size
    #[error("`{kind}` {version} spans {expected:#x} bytes but the window is {actual:#x}")]
    SizeMismatch {
        /// Peripheral kind
        kind: String,
        /// Requested revision
        version: AbiVersion,
        /// Layout total size
        expected: u64,
        /// Window size reported by the transport or configuration
        actual: u64,
    },

    /// Neither the configuration nor a version tag gave a revision
    #[error("cannot determine the ABI revision of `{kind}`: no version configured and no version tag")]
    Unresolved {
        /// Peripheral kind
        kind: String,
    },
}

/// Errors produced by a bus transport. Passed through unchanged.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Bus did not answer in time
    #[error("bus timeout at {address:#x}")]
    Timeout {
        /// Word address
        address: u64,
    },

    /// Bus rejected the access
    #[error("bus error (NACK) at {address:#x}")]
    Nack {
        /// Word address
        address: u64,
    },

    /// Address outside the mapped window
    #[error("address {address:#x} is outside the mapped window ({size:#x} bytes)")]
    OutOfWindow {
        /// Requested address
        address: u64,
        /// Window size
        size: u64,
    },

    /// I/O error from the underlying device
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Create an I/O error for an access the transport cannot perform
    pub fn invalid_access(reason: impl Into<String>) -> Self {
        Self::Io {
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason.into()),
        }
    }
}
