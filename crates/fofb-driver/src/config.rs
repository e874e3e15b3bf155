//! Bind configuration

use fofb_regmap::{AbiVersion, FixedPointFormat};
use std::collections::BTreeMap;

/// Options for [`VersionResolver::bind`](crate::VersionResolver::bind)
///
/// Everything is optional: without a version the resolver reads the kind's
/// version tag, without a window size it trusts the transport, and formats
/// not listed here are read from the peripheral.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindConfig {
    /// Explicit ABI revision
    pub version: Option<AbiVersion>,

    /// Window size, used when the transport cannot report one
    pub window_size: Option<u64>,

    /// Fixed-point formats that override (or stand in for) discovery
    pub formats: BTreeMap<String, FixedPointFormat>,
}

impl BindConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to an explicit revision
    #[must_use]
    pub fn with_version(mut self, version: AbiVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Declare the window size
    #[must_use]
    pub fn with_window_size(mut self, size: u64) -> Self {
        self.window_size = Some(size);
        self
    }

    /// Use `format` for the format named `name` instead of reading it
    #[must_use]
    pub fn with_format(mut self, name: impl Into<String>, format: FixedPointFormat) -> Self {
        self.formats.insert(name.into(), format);
        self
    }
}
