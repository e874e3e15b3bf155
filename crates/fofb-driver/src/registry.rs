//! Layout registry
//!
//! Maps `(kind, version)` to a shared, immutable [`LayoutDescriptor`], plus
//! the optional version-tag register of each kind.

use fofb_regmap::{peripherals, AbiVersion, LayoutDescriptor, LayoutError};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Known layouts, keyed by kind and revision
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: BTreeMap<(String, AbiVersion), Arc<LayoutDescriptor>>,
    version_tags: BTreeMap<String, u64>,
}

impl LayoutRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in FOFB layout
    ///
    /// # Errors
    ///
    /// Returns the [`LayoutError`] of an inconsistent built-in description.
    pub fn with_builtin() -> Result<Self, LayoutError> {
        let mut registry = Self::new();
        for layout in peripherals::all()? {
            registry.register(layout);
        }
        info!("Layout registry: {} built-in layouts", registry.len());
        Ok(registry)
    }

    /// Process-wide built-in registry, built on first use
    ///
    /// # Errors
    ///
    /// Returns the [`LayoutError`] of an inconsistent built-in description.
    pub fn builtin() -> Result<&'static Self, LayoutError> {
        static BUILTIN: OnceLock<Result<LayoutRegistry, LayoutError>> = OnceLock::new();
        BUILTIN.get_or_init(Self::with_builtin).as_ref().map_err(Clone::clone)
    }

    /// Add a layout, replacing any previous one with the same kind and revision
    pub fn register(&mut self, layout: LayoutDescriptor) -> Option<Arc<LayoutDescriptor>> {
        let key = (layout.kind().to_string(), layout.version());
        self.layouts.insert(key, Arc::new(layout))
    }

    /// Declare the register (offset from the peripheral base) holding the
    /// ABI revision number of `kind`
    pub fn set_version_tag(&mut self, kind: impl Into<String>, offset: u64) {
        self.version_tags.insert(kind.into(), offset);
    }

    /// Version-tag offset of `kind`, if declared
    pub fn version_tag(&self, kind: &str) -> Option<u64> {
        self.version_tags.get(kind).copied()
    }

    /// Layout of `kind` at `version`
    pub fn get(&self, kind: &str, version: AbiVersion) -> Option<Arc<LayoutDescriptor>> {
        self.layouts.get(&(kind.to_string(), version)).cloned()
    }

    /// Whether any revision of `kind` is known
    pub fn has_kind(&self, kind: &str) -> bool {
        self.layouts.keys().any(|(k, _)| k == kind)
    }

    /// Known revisions of `kind`, oldest first
    pub fn versions(&self, kind: &str) -> Vec<AbiVersion> {
        self.layouts
            .keys()
            .filter(|(k, _)| k == kind)
            .map(|&(_, v)| v)
            .collect()
    }

    /// All layouts, ordered by kind then revision
    pub fn iter(&self) -> impl Iterator<Item = &Arc<LayoutDescriptor>> {
        self.layouts.values()
    }

    /// Number of layouts
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fofb_regmap::peripherals::{processing, REV_A, REV_B};

    #[test]
    fn builtin_has_both_revisions() {
        let registry = LayoutRegistry::builtin().unwrap();
        assert_eq!(registry.versions(processing::KIND), vec![REV_A, REV_B]);
        assert!(registry.get(processing::KIND, AbiVersion::new(3)).is_none());
        assert!(!registry.has_kind("fofb_unknown"));
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn register_replaces() {
        let mut registry = LayoutRegistry::new();
        assert!(registry.register(processing::rev_a().unwrap()).is_none());
        assert!(registry.register(processing::rev_a().unwrap()).is_some());
        assert_eq!(registry.len(), 1);
        registry.set_version_tag(processing::KIND, 0x0);
        assert_eq!(registry.version_tag(processing::KIND), Some(0));
    }
}
