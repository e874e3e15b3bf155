//! Version resolution and peripheral bindings
//!
//! Binding picks the layout for a peripheral instance and checks it against
//! the hardware before anything else happens:
//!
//! ```text
//! kind known? ── no ──> VersionError::Unknown
//!    │
//! version: config ─> version tag register ─> VersionError::Unresolved
//!    │
//! layout (kind, version)? ── no ──> VersionError::Unknown
//!    │
//! window size (transport, else config) == total size? ── no ──> SizeMismatch
//!    │                                                         (no bus traffic)
//! fixed-point formats: config overrides, else read from the peripheral
//!    │
//! PeripheralBinding
//! ```
//!
//! There is no unbound binding: a [`PeripheralBinding`] exists only once all
//! of the above succeeded. Rebinding to another revision means building a
//! new one.

use crate::accessor::AccessorEngine;
use crate::config::BindConfig;
use crate::error::{Result, VersionError};
use crate::registry::LayoutRegistry;
use crate::transport::Transport;
use fofb_regmap::{
    AbiVersion, FixedPointError, FixedPointFormat, FormatEncoding, FormatSource, LayoutDescriptor,
    ResolvedField, ResolvedRegion,
};
use fofb_regmap::fixed_point::MAX_FIELD_BITS;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Binds peripheral instances to layouts from a registry
#[derive(Debug, Clone)]
pub struct VersionResolver {
    registry: Arc<LayoutRegistry>,
}

impl VersionResolver {
    /// Resolver over a custom registry
    pub fn new(registry: LayoutRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Resolver over the built-in FOFB layouts
    ///
    /// # Errors
    ///
    /// Returns [`FofbError::Layout`](crate::FofbError::Layout) if a built-in layout is inconsistent.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(LayoutRegistry::builtin()?.clone()))
    }

    /// Registry in use
    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    /// Bind the peripheral of `kind` whose window starts at `base`
    ///
    /// # Errors
    ///
    /// - [`VersionError::Unknown`]: unknown kind, or no layout for the revision
    /// - [`VersionError::Unresolved`]: no revision configured and no version tag
    /// - [`VersionError::SizeMismatch`]: window size differs from the layout
    /// - [`FixedPointError::InvalidFormat`]: a configured or discovered format
    ///   is unusable
    /// - [`FofbError::Transport`](crate::FofbError::Transport): reading the version tag or a format failed
    pub fn bind(
        &self,
        kind: &str,
        base: u64,
        transport: impl Transport + 'static,
        config: &BindConfig,
    ) -> Result<PeripheralBinding> {
        let mut transport: Box<dyn Transport> = Box::new(transport);

        if !self.registry.has_kind(kind) {
            return Err(VersionError::Unknown {
                kind: kind.to_string(),
                version: None,
            }
            .into());
        }

        let version = match (config.version, self.registry.version_tag(kind)) {
            (Some(version), _) => version,
            (None, Some(tag)) => {
                let raw = transport.read32(base + tag)?;
                debug!("{kind} @ {base:#x}: version tag {raw} at +{tag:#x}");
                AbiVersion::new(raw)
            }
            (None, None) => {
                return Err(VersionError::Unresolved {
                    kind: kind.to_string(),
                }
                .into());
            }
        };

        let layout = self
            .registry
            .get(kind, version)
            .ok_or_else(|| VersionError::Unknown {
                kind: kind.to_string(),
                version: Some(version),
            })?;

        match transport.window_size(base).or(config.window_size) {
            Some(size) if size != layout.total_size() => {
                return Err(VersionError::SizeMismatch {
                    kind: kind.to_string(),
                    version,
                    expected: layout.total_size(),
                    actual: size,
                }
                .into());
            }
            Some(_) => {}
            None => warn!(
                "{kind} {version} @ {base:#x}: window size unknown, assuming {:#x}",
                layout.total_size()
            ),
        }

        let mut formats = BTreeMap::new();
        for (name, &format) in &config.formats {
            format.validate(MAX_FIELD_BITS)?;
            if !layout.declares_format(name) {
                warn!("{kind} {version}: configured format `{name}` is not used by this layout");
            }
            formats.insert(name.clone(), format);
        }
        for source in layout.formats() {
            if formats.contains_key(source.name()) {
                debug!("{kind} {version}: format `{}` from configuration", source.name());
                continue;
            }
            let mut engine = AccessorEngine::new(&layout, base, &formats, &mut *transport);
            let format = discover(&mut engine, source)?;
            debug!("{kind} {version}: discovered format `{}` = {format}", source.name());
            formats.insert(source.name().to_string(), format);
        }

        info!(
            "Bound {kind} {version} at {base:#x} ({:#x} bytes) via {}",
            layout.total_size(),
            transport.transport_type()
        );

        Ok(PeripheralBinding {
            layout,
            base,
            formats,
            transport: Mutex::new(transport),
        })
    }
}

/// Read one format description from the peripheral
fn discover(engine: &mut AccessorEngine<'_>, source: &FormatSource) -> Result<FixedPointFormat> {
    let format = match source.encoding() {
        FormatEncoding::IntFrac {
            int_width,
            frac_width,
        } => FixedPointFormat::checked(engine.read(int_width)?, engine.read(frac_width)?)?,
        FormatEncoding::FracPosition { path, word_bits } => {
            let position = engine.read(path)?;
            let int_width = word_bits
                .checked_sub(position)
                .ok_or(FixedPointError::InvalidFormat {
                    int_width: 0,
                    frac_width: position,
                    field_bits: *word_bits,
                })?;
            FixedPointFormat::checked(int_width, position)?
        }
    };
    Ok(format)
}

/// A peripheral instance bound to one layout revision
///
/// All bus accesses go through one lock around the transport, so a binding
/// can be shared between threads; operations on it never interleave.
#[derive(Debug)]
pub struct PeripheralBinding {
    layout: Arc<LayoutDescriptor>,
    base: u64,
    formats: BTreeMap<String, FixedPointFormat>,
    transport: Mutex<Box<dyn Transport>>,
}

impl PeripheralBinding {
    /// Bound layout
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    /// Peripheral kind
    pub fn kind(&self) -> &str {
        self.layout.kind()
    }

    /// Bound revision
    pub fn version(&self) -> AbiVersion {
        self.layout.version()
    }

    /// Base address of the peripheral window
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Fixed-point format cached under `name`
    pub fn format(&self, name: &str) -> Option<FixedPointFormat> {
        self.formats.get(name).copied()
    }

    /// All cached fixed-point formats
    pub const fn formats(&self) -> &BTreeMap<String, FixedPointFormat> {
        &self.formats
    }

    /// Resolve a path to an absolute field location, without bus access
    ///
    /// # Errors
    ///
    /// Returns [`FofbError::Path`](crate::FofbError::Path) if the path does not resolve.
    pub fn resolve(&self, path: &str) -> Result<ResolvedField> {
        Ok(self.layout.resolve(path)?.with_base(self.base))
    }

    /// Resolve a path to an absolute register array, without bus access
    ///
    /// # Errors
    ///
    /// Returns [`FofbError::Path`](crate::FofbError::Path) if the path does not name a register array.
    pub fn resolve_region(&self, path: &str) -> Result<ResolvedRegion> {
        Ok(self.layout.resolve_region(path)?.with_base(self.base))
    }

    /// Run several operations under one acquisition of the binding's lock
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut AccessorEngine<'_>) -> Result<R>) -> Result<R> {
        // The transport carries no invariant a panicking holder could break
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        let mut engine = AccessorEngine::new(&self.layout, self.base, &self.formats, &mut **transport);
        f(&mut engine)
    }

    /// See [`AccessorEngine::read`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::read`].
    pub fn read(&self, path: &str) -> Result<u32> {
        self.transaction(|tx| tx.read(path))
    }

    /// See [`AccessorEngine::write`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::write`].
    pub fn write(&self, path: &str, value: u32) -> Result<()> {
        self.transaction(|tx| tx.write(path, value))
    }

    /// See [`AccessorEngine::read_flag`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::read_flag`].
    pub fn read_flag(&self, path: &str) -> Result<bool> {
        self.transaction(|tx| tx.read_flag(path))
    }

    /// See [`AccessorEngine::write_flag`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::write_flag`].
    pub fn write_flag(&self, path: &str, value: bool) -> Result<()> {
        self.transaction(|tx| tx.write_flag(path, value))
    }

    /// See [`AccessorEngine::read_fixed`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::read_fixed`].
    pub fn read_fixed(&self, path: &str) -> Result<f64> {
        self.transaction(|tx| tx.read_fixed(path))
    }

    /// See [`AccessorEngine::write_fixed`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::write_fixed`].
    pub fn write_fixed(&self, path: &str, value: f64) -> Result<()> {
        self.transaction(|tx| tx.write_fixed(path, value))
    }

    /// See [`AccessorEngine::read_enum`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::read_enum`].
    pub fn read_enum(&self, path: &str) -> Result<String> {
        self.transaction(|tx| tx.read_enum(path))
    }

    /// See [`AccessorEngine::write_enum`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::write_enum`].
    pub fn write_enum(&self, path: &str, name: &str) -> Result<()> {
        self.transaction(|tx| tx.write_enum(path, name))
    }

    /// See [`AccessorEngine::read_region`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::read_region`].
    pub fn read_region(&self, path: &str, count: usize) -> Result<Vec<u32>> {
        self.transaction(|tx| tx.read_region(path, count))
    }

    /// See [`AccessorEngine::write_region`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::write_region`].
    pub fn write_region(&self, path: &str, values: &[u32]) -> Result<()> {
        self.transaction(|tx| tx.write_region(path, values))
    }

    /// See [`AccessorEngine::read_region_fixed`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::read_region_fixed`].
    pub fn read_region_fixed(&self, path: &str, count: usize) -> Result<Vec<f64>> {
        self.transaction(|tx| tx.read_region_fixed(path, count))
    }

    /// See [`AccessorEngine::write_region_fixed`]
    ///
    /// # Errors
    ///
    /// See [`AccessorEngine::write_region_fixed`].
    pub fn write_region_fixed(&self, path: &str, values: &[f64]) -> Result<()> {
        self.transaction(|tx| tx.write_region_fixed(path, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimulatedBus;
    use crate::error::{AccessError, FofbError};
    use fofb_regmap::peripherals::{processing, shaper_filt, REV_A, REV_B};

    #[test]
    fn unknown_kind_and_revision() {
        let resolver = VersionResolver::builtin().unwrap();
        let cfg = BindConfig::new().with_version(REV_A);
        assert!(matches!(
            resolver.bind("fofb_nope", 0, SimulatedBus::new(), &cfg),
            Err(FofbError::Version(VersionError::Unknown { version: None, .. }))
        ));
        let cfg = BindConfig::new().with_version(AbiVersion::new(9));
        assert!(matches!(
            resolver.bind(processing::KIND, 0, SimulatedBus::new(), &cfg),
            Err(FofbError::Version(VersionError::Unknown { version: Some(_), .. }))
        ));
    }

    #[test]
    fn unresolved_without_version_or_tag() {
        let resolver = VersionResolver::builtin().unwrap();
        assert!(matches!(
            resolver.bind(processing::KIND, 0, SimulatedBus::new(), &BindConfig::new()),
            Err(FofbError::Version(VersionError::Unresolved { .. }))
        ));
    }

    #[test]
    fn version_tag_selects_revision() {
        let mut registry = LayoutRegistry::with_builtin().unwrap();
        registry.set_version_tag(processing::KIND, 0x80);
        let resolver = VersionResolver::new(registry);
        let bus = SimulatedBus::new();
        bus.poke(0x1_0080, 2);
        bus.poke(0x1_0000, 17);
        bus.poke(0x1_0004, 20);
        let binding = resolver
            .bind(processing::KIND, 0x1_0000, bus, &BindConfig::new())
            .unwrap();
        assert_eq!(binding.version(), REV_B);
        assert_eq!(binding.format(processing::COEFF_FORMAT), Some(FixedPointFormat::new(15, 17)));
        assert_eq!(binding.format(processing::GAIN_FORMAT), Some(FixedPointFormat::new(12, 20)));
    }

    #[test]
    fn config_formats_skip_discovery() {
        let resolver = VersionResolver::builtin().unwrap();
        let bus = SimulatedBus::new();
        let cfg = BindConfig::new()
            .with_version(REV_A)
            .with_window_size(0x100C)
            .with_format(shaper_filt::COEFF_FORMAT, FixedPointFormat::new(2, 30));
        let binding = resolver.bind(shaper_filt::KIND, 0, bus.clone(), &cfg).unwrap();
        assert!(bus.traffic().is_empty());
        assert_eq!(binding.format("coeffs"), Some(FixedPointFormat::new(2, 30)));
    }

    #[test]
    fn invalid_config_format_fails_bind() {
        let resolver = VersionResolver::builtin().unwrap();
        let bus = SimulatedBus::new();
        let cfg = BindConfig::new()
            .with_version(REV_A)
            .with_format(shaper_filt::COEFF_FORMAT, FixedPointFormat::new(30, 30));
        assert!(matches!(
            resolver.bind(shaper_filt::KIND, 0, bus.clone(), &cfg),
            Err(FofbError::FixedPoint(FixedPointError::InvalidFormat {
                int_width: 30,
                frac_width: 30,
                ..
            }))
        ));
        assert!(bus.traffic().is_empty());
    }

    #[test]
    fn unknown_config_format_does_not_replace_discovery() {
        let resolver = VersionResolver::builtin().unwrap();
        let bus = SimulatedBus::new();
        bus.poke(0x1004, 2 | (30 << 5));
        let cfg = BindConfig::new()
            .with_version(REV_A)
            .with_format("coeff", FixedPointFormat::new(16, 16));
        let binding = resolver.bind(shaper_filt::KIND, 0, bus, &cfg).unwrap();
        assert_eq!(binding.format(shaper_filt::COEFF_FORMAT), Some(FixedPointFormat::new(2, 30)));
        assert_eq!(binding.format("coeff"), Some(FixedPointFormat::new(16, 16)));
    }

    #[test]
    fn external_format_taken_from_config() {
        let resolver = VersionResolver::builtin().unwrap();
        let cfg = BindConfig::new()
            .with_version(REV_A)
            .with_format(processing::COEFF_FORMAT, FixedPointFormat::new(15, 17));
        let binding = resolver.bind(processing::KIND, 0, SimulatedBus::new(), &cfg).unwrap();
        assert!(binding.layout().declares_format(processing::COEFF_FORMAT));
        assert_eq!(binding.format(processing::COEFF_FORMAT), Some(FixedPointFormat::new(15, 17)));
    }

    #[test]
    fn invalid_discovered_format() {
        let resolver = VersionResolver::builtin().unwrap();
        let bus = SimulatedBus::new();
        // int_width = 0, frac_width = 0
        bus.poke(0x1004, 0);
        let cfg = BindConfig::new().with_version(REV_A);
        assert!(matches!(
            resolver.bind(shaper_filt::KIND, 0, bus, &cfg),
            Err(FofbError::FixedPoint(FixedPointError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn missing_format_reported_on_use() {
        let resolver = VersionResolver::builtin().unwrap();
        let cfg = BindConfig::new().with_version(REV_A);
        let binding = resolver.bind(processing::KIND, 0, SimulatedBus::new(), &cfg).unwrap();
        assert!(binding.format(processing::COEFF_FORMAT).is_none());
        assert!(matches!(
            binding.read_fixed("ram_data_out"),
            Err(FofbError::Access(AccessError::SemanticMismatch { .. }))
        ));
    }
}
