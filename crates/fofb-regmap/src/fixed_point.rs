//! Signed fixed-point codec.
//!
//! Coefficients and gains are stored as two's-complement fixed-point words.
//! The number of meaningful bits, `int_width + frac_width`, may be smaller
//! than the field holding them; the value is then aligned to the left of the
//! field (the shaper-filter convention), so the binary point sits
//! `field_bits - int_width` bits above bit 0.
//!
//! ```text
//!  field_bits = 32, int_width = 2, frac_width = 15
//!
//!  31 30 29                    15 14            0
//! ┌─────┬────────────────────────┬───────────────┐
//! │ int │        fraction        │  zero padding │
//! └─────┴────────────────────────┴───────────────┘
//! ```

// Raw values are at most 32 bits wide; every i64 <-> f64 conversion below is exact.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::error::FixedPointError;

/// Widest field the codec handles.
pub const MAX_FIELD_BITS: u32 = 32;

/// Signed fixed-point representation: integer bits (sign included) and
/// fractional bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPointFormat {
    /// Integer bits, sign bit included
    pub int_width: u32,
    /// Fractional bits
    pub frac_width: u32,
}

impl FixedPointFormat {
    /// Create a format without checking it
    pub const fn new(int_width: u32, frac_width: u32) -> Self {
        Self {
            int_width,
            frac_width,
        }
    }

    /// Plain signed integer of `bits` bits
    pub const fn integer(bits: u32) -> Self {
        Self::new(bits, 0)
    }

    /// Create a format, rejecting widths that do not fit a 32-bit word
    ///
    /// # Errors
    ///
    /// Returns [`FixedPointError::InvalidFormat`] unless
    /// `1 <= int_width + frac_width <= 32`.
    pub fn checked(int_width: u32, frac_width: u32) -> Result<Self, FixedPointError> {
        let format = Self::new(int_width, frac_width);
        format.validate(MAX_FIELD_BITS)?;
        Ok(format)
    }

    /// Meaningful bits, `int_width + frac_width`
    pub const fn total_bits(self) -> u32 {
        self.int_width.saturating_add(self.frac_width)
    }

    /// Value of one least-significant bit
    pub fn quantum(self) -> f64 {
        (-f64::from(self.frac_width)).exp2()
    }

    /// Most negative representable value
    pub fn min_value(self) -> f64 {
        -f64::from(self.total_bits().saturating_sub(1)).exp2() * self.quantum()
    }

    /// Most positive representable value
    pub fn max_value(self) -> f64 {
        (f64::from(self.total_bits().saturating_sub(1)).exp2() - 1.0) * self.quantum()
    }

    /// Check that the format fits a field of `field_bits` bits
    ///
    /// # Errors
    ///
    /// Returns [`FixedPointError::InvalidFormat`] if the format is empty or
    /// wider than the field, or the field is wider than 32 bits.
    pub fn validate(self, field_bits: u32) -> Result<(), FixedPointError> {
        let total = self.total_bits();
        if total == 0 || total > field_bits || field_bits > MAX_FIELD_BITS {
            return Err(FixedPointError::InvalidFormat {
                int_width: self.int_width,
                frac_width: self.frac_width,
                field_bits,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for FixedPointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}.{}", self.int_width, self.frac_width)
    }
}

/// Encoder/decoder for one format stored in a field of a given width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPointCodec {
    format: FixedPointFormat,
    field_bits: u32,
}

impl FixedPointCodec {
    /// Codec for a value occupying a full 32-bit word
    ///
    /// # Errors
    ///
    /// Returns [`FixedPointError::InvalidFormat`] for an invalid format.
    pub fn new(format: FixedPointFormat) -> Result<Self, FixedPointError> {
        Self::for_field(format, MAX_FIELD_BITS)
    }

    /// Codec for a value left-aligned in a field of `field_bits` bits
    ///
    /// # Errors
    ///
    /// Returns [`FixedPointError::InvalidFormat`] if the format does not fit
    /// the field.
    pub fn for_field(format: FixedPointFormat, field_bits: u32) -> Result<Self, FixedPointError> {
        format.validate(field_bits)?;
        Ok(Self { format, field_bits })
    }

    /// Format this codec encodes
    pub const fn format(&self) -> FixedPointFormat {
        self.format
    }

    /// Width of the field the value lives in
    pub const fn field_bits(&self) -> u32 {
        self.field_bits
    }

    /// Encode `value` as raw field bits, rounding to the nearest quantum
    /// (halves away from zero).
    ///
    /// # Errors
    ///
    /// Returns [`FixedPointError::NotFinite`] for NaN or infinity and
    /// [`FixedPointError::OutOfRange`] if the rounded value does not fit.
    pub fn encode(&self, value: f64) -> Result<u32, FixedPointError> {
        let scaled = self.scale(value)?;
        let (lo, hi) = self.raw_bounds();
        if scaled < lo || scaled > hi {
            return Err(FixedPointError::OutOfRange {
                value,
                min: self.format.min_value(),
                max: self.format.max_value(),
            });
        }
        Ok(self.pack(scaled as i64))
    }

    /// Encode `value`, clamping it to the representable range
    ///
    /// # Errors
    ///
    /// Returns [`FixedPointError::NotFinite`] for NaN; infinities clamp.
    pub fn encode_saturating(&self, value: f64) -> Result<u32, FixedPointError> {
        if value.is_nan() {
            return Err(FixedPointError::NotFinite);
        }
        let (lo, hi) = self.raw_bounds();
        let scaled = (value * f64::from(self.format.frac_width).exp2()).round();
        Ok(self.pack(scaled.clamp(lo, hi) as i64))
    }

    /// Decode raw field bits. Bits above the field are ignored.
    pub fn decode(&self, raw: u32) -> f64 {
        let unused = 64 - self.field_bits;
        let signed = ((u64::from(raw) << unused) as i64) >> unused;
        signed as f64 / f64::from(self.field_bits - self.format.int_width).exp2()
    }

    fn scale(&self, value: f64) -> Result<f64, FixedPointError> {
        if !value.is_finite() {
            return Err(FixedPointError::NotFinite);
        }
        Ok((value * f64::from(self.format.frac_width).exp2()).round())
    }

    /// Integer range of the meaningful bits
    fn raw_bounds(&self) -> (f64, f64) {
        let half = f64::from(self.format.total_bits().saturating_sub(1)).exp2();
        (-half, half - 1.0)
    }

    fn pack(&self, quantized: i64) -> u32 {
        let padding = self.field_bits - self.format.total_bits();
        let field_mask = u64::MAX >> (64 - self.field_bits);
        (((quantized << padding) as u64) & field_mask) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_half_in_q2_30() {
        let codec = FixedPointCodec::new(FixedPointFormat::new(2, 30)).unwrap();
        assert_eq!(codec.encode(-0.5).unwrap(), 0xE000_0000);
        assert_eq!(codec.decode(0xE000_0000), -0.5);
    }

    #[test]
    fn left_aligned_in_wide_field() {
        // Q2.15 in a 32-bit field: 15 padding bits at the bottom
        let codec = FixedPointCodec::new(FixedPointFormat::new(2, 15)).unwrap();
        assert_eq!(codec.encode(1.0).unwrap(), 1 << 30);
        assert_eq!(codec.encode(-2.0).unwrap(), 0x8000_0000);
        assert_eq!(codec.decode(1 << 30), 1.0);
    }

    #[test]
    fn narrow_field_sign_extension() {
        let codec = FixedPointCodec::for_field(FixedPointFormat::integer(16), 16).unwrap();
        assert_eq!(codec.encode(-1.0).unwrap(), 0xFFFF);
        assert_eq!(codec.decode(0xFFFF), -1.0);
        assert_eq!(codec.decode(0x7FFF), 32767.0);
        // Bits outside the field do not leak into the value
        assert_eq!(codec.decode(0xABCD_0001), 1.0);
    }

    #[test]
    fn out_of_range_rejected() {
        let codec = FixedPointCodec::new(FixedPointFormat::new(2, 30)).unwrap();
        assert!(matches!(
            codec.encode(2.0),
            Err(FixedPointError::OutOfRange { .. })
        ));
        assert!(codec.encode(-2.0).is_ok());
        assert_eq!(codec.encode(f64::NAN), Err(FixedPointError::NotFinite));
    }

    #[test]
    fn saturating_clamps() {
        let codec = FixedPointCodec::for_field(FixedPointFormat::integer(8), 8).unwrap();
        assert_eq!(codec.encode_saturating(1000.0).unwrap(), 0x7F);
        assert_eq!(codec.encode_saturating(f64::NEG_INFINITY).unwrap(), 0x80);
        assert!(codec.encode_saturating(f64::NAN).is_err());
    }

    #[test]
    fn invalid_formats() {
        assert!(FixedPointFormat::checked(0, 0).is_err());
        assert!(FixedPointFormat::checked(20, 13).is_err());
        assert!(FixedPointFormat::checked(1, 31).is_ok());
        assert!(FixedPointCodec::for_field(FixedPointFormat::integer(17), 16).is_err());
    }

    #[test]
    fn rounding_half_away_from_zero() {
        let codec = FixedPointCodec::for_field(FixedPointFormat::new(8, 1), 9).unwrap();
        // 0.25 is half a quantum
        assert_eq!(codec.encode(0.25).unwrap(), 1);
        assert_eq!(codec.decode(codec.encode(-0.25).unwrap()), -0.5);
    }

    #[test]
    fn range_limits() {
        let format = FixedPointFormat::new(2, 2);
        assert_eq!(format.min_value(), -2.0);
        assert_eq!(format.max_value(), 1.75);
        assert_eq!(format.quantum(), 0.25);
        assert_eq!(format.to_string(), "Q2.2");
    }
}
