//! Bit-field descriptors and register word properties.

use crate::fixed_point::FixedPointFormat;

/// Register access mode, as annotated in the gateware CSR tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Readable only (`ro`)
    ReadOnly,
    /// Writable only (`wo`)
    WriteOnly,
    /// Readable and writable (`rw`)
    ReadWrite,
}

impl Access {
    /// Whether a bus read is allowed
    pub const fn is_readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Whether a bus write is allowed
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    /// Whether every operation `self` allows is also allowed by `outer`
    pub const fn within(self, outer: Self) -> bool {
        (!self.is_readable() || outer.is_readable()) && (!self.is_writable() || outer.is_writable())
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "ro"),
            Self::WriteOnly => write!(f, "wo"),
            Self::ReadWrite => write!(f, "rw"),
        }
    }
}

/// Width of one addressable register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterWidth {
    /// 8-bit register (`uint8_t`)
    Byte,
    /// 16-bit register (`uint16_t`)
    Half,
    /// 32-bit register (`uint32_t`)
    Word,
}

impl RegisterWidth {
    /// Size in bytes
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
        }
    }

    /// Size in bits
    pub const fn bits(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::Half => 16,
            Self::Word => 32,
        }
    }

    /// Mask covering the whole register
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Half => 0xFFFF,
            Self::Word => 0xFFFF_FFFF,
        }
    }
}

/// Where a fixed-point field gets its format from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatRef {
    /// Format fixed by the ABI
    Static(FixedPointFormat),
    /// Format read from the peripheral at bind time; names a
    /// [`FormatSource`](crate::FormatSource) of the layout
    Discovered(String),
}

impl FormatRef {
    /// Plain signed integer spanning `bits` bits
    pub const fn integer(bits: u32) -> Self {
        Self::Static(FixedPointFormat::integer(bits))
    }

    /// Format discovered at bind time under `name`
    pub fn discovered(name: impl Into<String>) -> Self {
        Self::Discovered(name.into())
    }
}

/// One named value of an enumerated field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    /// Symbolic name
    pub name: String,
    /// Raw field value
    pub value: u32,
}

impl EnumVariant {
    /// Create a variant
    pub fn new(name: impl Into<String>, value: u32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// How the bits of a field are interpreted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSemantic {
    /// Unsigned integer
    #[default]
    RawUint,
    /// Two's-complement fixed-point value
    SignedFixedPoint(FormatRef),
    /// Single-bit boolean
    Flag,
    /// Enumerated value with a variant table
    Enum(Vec<EnumVariant>),
}

impl FieldSemantic {
    /// Short name used in error messages and map dumps
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RawUint => "uint",
            Self::SignedFixedPoint(_) => "fixed-point",
            Self::Flag => "flag",
            Self::Enum(_) => "enum",
        }
    }
}

/// One bit-field within a register word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    mask: u32,
    shift: u32,
    access: Option<Access>,
    semantic: FieldSemantic,
}

impl FieldDescriptor {
    /// Field covering the bits set in `mask`
    pub fn new(name: impl Into<String>, mask: u32) -> Self {
        Self {
            name: name.into(),
            mask,
            shift: if mask == 0 { 0 } else { mask.trailing_zeros() },
            access: None,
            semantic: FieldSemantic::RawUint,
        }
    }

    /// Field covering bits `lsb..=msb`
    ///
    /// An inverted range yields an empty mask, which layout validation rejects.
    pub fn bits(name: impl Into<String>, lsb: u32, msb: u32) -> Self {
        let mask = if msb < lsb || msb > 31 {
            0
        } else {
            let width = msb - lsb + 1;
            let ones = u32::MAX >> (32 - width);
            ones << lsb
        };
        Self::new(name, mask)
    }

    /// Single-bit flag at `bit`
    pub fn bit(name: impl Into<String>, bit: u32) -> Self {
        Self::new(name, 1u32.checked_shl(bit).unwrap_or(0)).with_semantic(FieldSemantic::Flag)
    }

    /// Interpret the field as signed fixed-point
    #[must_use]
    pub fn fixed_point(self, format: FormatRef) -> Self {
        self.with_semantic(FieldSemantic::SignedFixedPoint(format))
    }

    /// Interpret the field as an enumeration
    #[must_use]
    pub fn enumerated(self, variants: impl IntoIterator<Item = EnumVariant>) -> Self {
        self.with_semantic(FieldSemantic::Enum(variants.into_iter().collect()))
    }

    /// Narrow the access mode inherited from the register
    #[must_use]
    pub fn access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    /// Replace the semantic
    #[must_use]
    pub fn with_semantic(mut self, semantic: FieldSemantic) -> Self {
        self.semantic = semantic;
        self
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mask of the field within the register word
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    /// Position of the least significant field bit
    pub const fn shift(&self) -> u32 {
        self.shift
    }

    /// Number of bits in the field
    pub const fn width_bits(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Largest raw value the field holds
    pub const fn max_value(&self) -> u32 {
        self.mask >> self.shift
    }

    /// Explicit access override, if any
    pub const fn access_override(&self) -> Option<Access> {
        self.access
    }

    /// Effective access given the enclosing register's access
    pub fn effective_access(&self, register: Access) -> Access {
        self.access.unwrap_or(register)
    }

    /// Value interpretation
    pub const fn semantic(&self) -> &FieldSemantic {
        &self.semantic
    }

    /// Whether the set mask bits form a single run starting at `shift`
    pub const fn is_contiguous(&self) -> bool {
        let run = self.mask >> self.shift;
        self.mask != 0 && (run & run.wrapping_add(1)) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_ranges() {
        let step = FieldDescriptor::bits("step_duration", 1, 10);
        assert_eq!(step.mask(), 0x7FE);
        assert_eq!(step.shift(), 1);
        assert_eq!(step.width_bits(), 10);
        assert_eq!(step.max_value(), 0x3FF);

        let full = FieldDescriptor::bits("all", 0, 31);
        assert_eq!(full.mask(), u32::MAX);
        assert!(full.is_contiguous());

        assert_eq!(FieldDescriptor::bits("bad", 5, 4).mask(), 0);
    }

    #[test]
    fn flags() {
        let f = FieldDescriptor::bit("src_en_orb_distort", 1);
        assert_eq!(f.mask(), 0x2);
        assert_eq!(f.semantic(), &FieldSemantic::Flag);
        assert_eq!(FieldDescriptor::bit("oob", 32).mask(), 0);
    }

    #[test]
    fn contiguity() {
        assert!(!FieldDescriptor::new("split", 0b1010).is_contiguous());
        assert!(FieldDescriptor::new("run", 0b1100).is_contiguous());
        assert!(FieldDescriptor::new("top", 0x8000_0000).is_contiguous());
    }

    #[test]
    fn access_nesting() {
        assert!(Access::ReadOnly.within(Access::ReadWrite));
        assert!(!Access::ReadWrite.within(Access::ReadOnly));
        assert!(!Access::WriteOnly.within(Access::ReadOnly));
        assert_eq!(
            FieldDescriptor::bit("x", 0).effective_access(Access::ReadOnly),
            Access::ReadOnly
        );
    }
}
