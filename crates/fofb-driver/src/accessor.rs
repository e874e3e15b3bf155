//! Accessor engine
//!
//! Turns logical paths into bus traffic. Every operation resolves the path
//! and validates access mode, value range and semantic first; only then does
//! it touch the transport. Narrow registers and sub-fields are written with
//! a read-modify-write of their containing word:
//!
//! ```text
//! word  = read32(addr & !3)
//! lane  = (addr & 3) * 8
//! mask' = mask << lane
//! word  = (word & !mask') | ((value << shift << lane) & mask')
//! write32(addr & !3, word)
//! ```
//!
//! A failed read aborts the operation before the write.

use crate::error::{AccessError, Result};
use crate::transport::Transport;
use fofb_regmap::{
    EnumVariant, FieldSemantic, FixedPointCodec, FixedPointFormat, FormatRef, LayoutDescriptor,
    RegisterWidth, ResolvedField, ResolvedRegion,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Typed access to one bound peripheral
///
/// Obtained from [`PeripheralBinding::transaction`](crate::PeripheralBinding::transaction),
/// which holds the binding's lock for the lifetime of the engine, so a
/// sequence of operations on one engine is never interleaved with other
/// users of the binding.
#[derive(Debug)]
pub struct AccessorEngine<'a> {
    layout: &'a LayoutDescriptor,
    base: u64,
    formats: &'a BTreeMap<String, FixedPointFormat>,
    transport: &'a mut dyn Transport,
}

impl<'a> AccessorEngine<'a> {
    pub(crate) fn new(
        layout: &'a LayoutDescriptor,
        base: u64,
        formats: &'a BTreeMap<String, FixedPointFormat>,
        transport: &'a mut dyn Transport,
    ) -> Self {
        Self {
            layout,
            base,
            formats,
            transport,
        }
    }

    /// Fixed-point format cached under `name` by the binding
    pub fn format(&self, name: &str) -> Option<FixedPointFormat> {
        self.formats.get(name).copied()
    }

    /// Bound layout
    pub const fn layout(&self) -> &LayoutDescriptor {
        self.layout
    }

    /// Resolve a path to an absolute field location
    ///
    /// # Errors
    ///
    /// Returns [`FofbError::Path`](crate::FofbError::Path) if the path does not resolve.
    pub fn resolve(&self, path: &str) -> Result<ResolvedField> {
        Ok(self.layout.resolve(path)?.with_base(self.base))
    }

    /// Resolve a path to an absolute register array
    ///
    /// # Errors
    ///
    /// Returns [`FofbError::Path`](crate::FofbError::Path) if the path does
    /// not name a register array.
    pub fn resolve_region(&self, path: &str) -> Result<ResolvedRegion> {
        Ok(self.layout.resolve_region(path)?.with_base(self.base))
    }

    /// Read a field as an unsigned integer
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotReadable`] for write-only fields, or the
    /// transport error.
    pub fn read(&mut self, path: &str) -> Result<u32> {
        let field = self.resolve(path)?;
        check_readable(&field)?;
        self.read_field(&field)
    }

    /// Write a field from an unsigned integer
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotWritable`], [`AccessError::ValueOutOfRange`],
    /// [`AccessError::NotReadable`] (read-modify-write on a write-only
    /// register), or the transport error.
    pub fn write(&mut self, path: &str, value: u32) -> Result<()> {
        let field = self.resolve(path)?;
        check_writable(&field)?;
        let max = field.max_value();
        if value > max {
            return Err(AccessError::ValueOutOfRange {
                path: field.path,
                value,
                max,
            }
            .into());
        }
        self.write_field(&field, value)
    }

    /// Read a single-bit flag
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::SemanticMismatch`] unless the field is a flag,
    /// plus the errors of [`read`](Self::read).
    pub fn read_flag(&mut self, path: &str) -> Result<bool> {
        let field = self.resolve(path)?;
        expect_flag(&field)?;
        check_readable(&field)?;
        Ok(self.read_field(&field)? != 0)
    }

    /// Set or clear a single-bit flag
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::SemanticMismatch`] unless the field is a flag,
    /// plus the errors of [`write`](Self::write).
    pub fn write_flag(&mut self, path: &str, value: bool) -> Result<()> {
        let field = self.resolve(path)?;
        expect_flag(&field)?;
        check_writable(&field)?;
        self.write_field(&field, u32::from(value))
    }

    /// Read a signed fixed-point field
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::SemanticMismatch`] unless the field is
    /// fixed-point, [`AccessError::FormatUnavailable`] if its format was not
    /// discovered, plus the errors of [`read`](Self::read).
    pub fn read_fixed(&mut self, path: &str) -> Result<f64> {
        let field = self.resolve(path)?;
        let codec = self.codec(&field.path, &field.semantic, field.field_bits())?;
        check_readable(&field)?;
        Ok(codec.decode(self.read_field(&field)?))
    }

    /// Write a signed fixed-point field, rejecting values out of range
    ///
    /// # Errors
    ///
    /// Returns [`FixedPointError::OutOfRange`](fofb_regmap::FixedPointError::OutOfRange)
    /// for unrepresentable values, plus the errors of
    /// [`read_fixed`](Self::read_fixed) and [`write`](Self::write).
    pub fn write_fixed(&mut self, path: &str, value: f64) -> Result<()> {
        self.write_fixed_with(path, value, FixedPointCodec::encode)
    }

    /// Write a signed fixed-point field, clamping to the representable range
    ///
    /// # Errors
    ///
    /// As [`write_fixed`](Self::write_fixed), except that finite values never
    /// fail the range check.
    pub fn write_fixed_saturating(&mut self, path: &str, value: f64) -> Result<()> {
        self.write_fixed_with(path, value, FixedPointCodec::encode_saturating)
    }

    fn write_fixed_with(
        &mut self,
        path: &str,
        value: f64,
        encode: impl Fn(&FixedPointCodec, f64) -> std::result::Result<u32, fofb_regmap::FixedPointError>,
    ) -> Result<()> {
        let field = self.resolve(path)?;
        let codec = self.codec(&field.path, &field.semantic, field.field_bits())?;
        check_writable(&field)?;
        let raw = encode(&codec, value)?;
        self.write_field(&field, raw)
    }

    /// Read an enumerated field as its variant name
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::SemanticMismatch`] unless the field is an
    /// enum, [`AccessError::UnknownVariant`] if the hardware value has no
    /// name, plus the errors of [`read`](Self::read).
    pub fn read_enum(&mut self, path: &str) -> Result<String> {
        let field = self.resolve(path)?;
        let variants = expect_enum(&field)?;
        check_readable(&field)?;
        let raw = self.read_field(&field)?;
        variants
            .iter()
            .find(|v| v.value == raw)
            .map(|v| v.name.clone())
            .ok_or_else(|| {
                AccessError::UnknownVariant {
                    path: field.path.clone(),
                    variant: format!("{raw:#x}"),
                }
                .into()
            })
    }

    /// Write an enumerated field by variant name
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::UnknownVariant`] for an unknown name, plus the
    /// errors of [`write`](Self::write).
    pub fn write_enum(&mut self, path: &str, name: &str) -> Result<()> {
        let field = self.resolve(path)?;
        let value = expect_enum(&field)?
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value)
            .ok_or_else(|| AccessError::UnknownVariant {
                path: field.path.clone(),
                variant: name.to_string(),
            })?;
        check_writable(&field)?;
        self.write_field(&field, value)
    }

    /// Read the first `count` elements of a register array
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::LengthMismatch`] if `count` exceeds the array,
    /// [`AccessError::NotReadable`], or the first transport error.
    pub fn read_region(&mut self, path: &str, count: usize) -> Result<Vec<u32>> {
        let region = self.resolve_region(path)?;
        check_region(&region, count)?;
        if !region.access.is_readable() {
            return Err(AccessError::NotReadable { path: region.path }.into());
        }
        debug!("Reading {count} words from {} @ {:#x}", region.path, region.address);
        (0..count)
            .map(|i| self.read_lane(region.element_address(i), region.width))
            .collect()
    }

    /// Write `values` to the first elements of a register array
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::LengthMismatch`] if there are more values than
    /// elements, [`AccessError::NotWritable`], [`AccessError::ValueOutOfRange`]
    /// for a value wider than the elements, or the first transport error.
    pub fn write_region(&mut self, path: &str, values: &[u32]) -> Result<()> {
        let region = self.resolve_region(path)?;
        check_region(&region, values.len())?;
        if !region.access.is_writable() {
            return Err(AccessError::NotWritable { path: region.path }.into());
        }
        let max = region.width.mask();
        if let Some(&value) = values.iter().find(|&&v| v > max) {
            return Err(AccessError::ValueOutOfRange {
                path: region.path,
                value,
                max,
            }
            .into());
        }
        if region.width != RegisterWidth::Word && !region.access.is_readable() {
            return Err(AccessError::NotReadable { path: region.path }.into());
        }
        debug!(
            "Writing {} words to {} @ {:#x}",
            values.len(),
            region.path,
            region.address
        );
        for (i, &value) in values.iter().enumerate() {
            self.write_lane(region.element_address(i), region.width, region.width.mask(), value)?;
        }
        Ok(())
    }

    /// Read the first `count` elements of a fixed-point register array
    ///
    /// # Errors
    ///
    /// As [`read_region`](Self::read_region), plus the semantic and format
    /// errors of [`read_fixed`](Self::read_fixed).
    pub fn read_region_fixed(&mut self, path: &str, count: usize) -> Result<Vec<f64>> {
        let region = self.resolve_region(path)?;
        let codec = self.codec(&region.path, &region.semantic, region.width.bits())?;
        Ok(self
            .read_region(path, count)?
            .into_iter()
            .map(|raw| codec.decode(raw))
            .collect())
    }

    /// Encode and write `values` to the first elements of a fixed-point
    /// register array. Every value is encoded before the first write.
    ///
    /// # Errors
    ///
    /// As [`write_region`](Self::write_region), plus the semantic, format and
    /// range errors of [`write_fixed`](Self::write_fixed).
    pub fn write_region_fixed(&mut self, path: &str, values: &[f64]) -> Result<()> {
        let region = self.resolve_region(path)?;
        let codec = self.codec(&region.path, &region.semantic, region.width.bits())?;
        check_region(&region, values.len())?;
        let raw = values
            .iter()
            .map(|&v| codec.encode(v))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.write_region(path, &raw)
    }

    /// Fixed-point codec for a field semantic
    fn codec(&self, path: &str, semantic: &FieldSemantic, field_bits: u32) -> Result<FixedPointCodec> {
        let FieldSemantic::SignedFixedPoint(format) = semantic else {
            return Err(mismatch(path, "fixed-point", semantic));
        };
        let format = match format {
            FormatRef::Static(format) => *format,
            FormatRef::Discovered(name) => {
                *self
                    .formats
                    .get(name)
                    .ok_or_else(|| AccessError::FormatUnavailable {
                        path: path.to_string(),
                        format: name.clone(),
                    })?
            }
        };
        Ok(FixedPointCodec::for_field(format, field_bits)?)
    }

    /// Raw field value; access already checked
    fn read_field(&mut self, field: &ResolvedField) -> Result<u32> {
        let raw = self.read_lane(field.address, field.width)?;
        Ok((raw & field.mask) >> field.shift)
    }

    /// Store a field value; access and range already checked
    fn write_field(&mut self, field: &ResolvedField, value: u32) -> Result<()> {
        let needs_rmw = !(field.is_whole_register() && field.width == RegisterWidth::Word);
        if needs_rmw && !field.access.is_readable() {
            return Err(AccessError::NotReadable {
                path: field.path.clone(),
            }
            .into());
        }
        self.write_lane(field.address, field.width, field.mask, value << field.shift)
    }

    /// Register value at `address`, extracted from its containing word
    fn read_lane(&mut self, address: u64, width: RegisterWidth) -> Result<u32> {
        let (word_address, lane) = split(address);
        let word = self.transport.read32(word_address)?;
        trace!("read  {word_address:#010x} -> {word:#010x}");
        Ok((word >> lane) & width.mask())
    }

    /// Merge `bits` (already shifted into register position) under `mask`
    /// into the register at `address`. Full words are written blind.
    fn write_lane(&mut self, address: u64, width: RegisterWidth, mask: u32, bits: u32) -> Result<()> {
        let (word_address, lane) = split(address);
        let word = if width == RegisterWidth::Word && mask == u32::MAX {
            bits
        } else {
            let word_mask = mask << lane;
            let current = self.transport.read32(word_address)?;
            (current & !word_mask) | ((bits << lane) & word_mask)
        };
        trace!("write {word_address:#010x} <- {word:#010x}");
        self.transport.write32(word_address, word)?;
        Ok(())
    }
}

/// Containing word address and bit offset of the register lane
#[allow(clippy::cast_possible_truncation)]
const fn split(address: u64) -> (u64, u32) {
    (address & !3, ((address & 3) * 8) as u32)
}

fn check_readable(field: &ResolvedField) -> Result<()> {
    if field.access.is_readable() {
        Ok(())
    } else {
        Err(AccessError::NotReadable {
            path: field.path.clone(),
        }
        .into())
    }
}

fn check_writable(field: &ResolvedField) -> Result<()> {
    if field.access.is_writable() {
        Ok(())
    } else {
        Err(AccessError::NotWritable {
            path: field.path.clone(),
        }
        .into())
    }
}

fn check_region(region: &ResolvedRegion, len: usize) -> Result<()> {
    if len > region.count {
        return Err(AccessError::LengthMismatch {
            path: region.path.clone(),
            len,
            count: region.count,
        }
        .into());
    }
    Ok(())
}

fn mismatch(path: &str, expected: &'static str, actual: &FieldSemantic) -> crate::FofbError {
    AccessError::SemanticMismatch {
        path: path.to_string(),
        expected,
        actual: actual.kind(),
    }
    .into()
}

fn expect_flag(field: &ResolvedField) -> Result<()> {
    match field.semantic {
        FieldSemantic::Flag => Ok(()),
        ref other => Err(mismatch(&field.path, "flag", other)),
    }
}

fn expect_enum(field: &ResolvedField) -> Result<&[EnumVariant]> {
    match &field.semantic {
        FieldSemantic::Enum(variants) => Ok(variants),
        other => Err(mismatch(&field.path, "enum", other)),
    }
}
