//! Shaper IIR filters (`fofb_shaper_filt`).
//!
//! Each channel holds the coefficients of a cascade of biquads in a shadow
//! RAM. Coefficients use the `coeffs_fp_repr` fixed-point representation,
//! left-aligned in the 32-bit word.
//!
//! Rev A packs 5 coefficients per biquad (`b0 b1 b2 a1 a2`) and only applies
//! the shadow RAM when `ctl.eff_coeffs` is written. Rev B reserves 8 words
//! per biquad and has no `ctl` register.

use super::{NUM_CHANNELS, REV_A, REV_B};
use crate::error::LayoutError;
use crate::field::{Access, FieldDescriptor, FormatRef};
use crate::layout::{FormatSource, LayoutDescriptor};
use crate::node::{BlockNode, MemoryRegion, RegisterNode, RepeatNode};

/// Peripheral kind
pub const KIND: &str = "fofb_shaper_filt";

/// Format of the coefficient words
pub const COEFF_FORMAT: &str = "coeffs";

/// Biquads per channel the ABI has room for (20th order filters)
pub const MAX_BIQUADS: usize = 10;

/// Coefficient words per biquad in rev A
pub const REV_A_SLOTS_PER_BIQUAD: usize = 5;

/// Coefficient words per biquad in rev B
pub const REV_B_SLOTS_PER_BIQUAD: usize = 8;

/// Header constants of rev A
pub const REV_A_OFFSETS: &[(&str, u64)] = &[
    ("ch", 0x0),
    ("ch[0].coeffs", 0x0),
    ("ch[1]", 0x100),
    ("max_filt_order", 0x1000),
    ("coeffs_fp_repr", 0x1004),
    ("ctl", 0x1008),
];

/// Header constants of rev B
pub const REV_B_OFFSETS: &[(&str, u64)] = &[
    ("ch", 0x0),
    ("ch[1]", 0x200),
    ("max_filt_order", 0x2000),
    ("coeffs_fp_repr", 0x2004),
];

fn channels(slots: usize, stride: u64) -> RepeatNode {
    let element = BlockNode::template().size(stride).child(MemoryRegion::new(
        "coeffs",
        0x0,
        slots * MAX_BIQUADS,
        RegisterNode::new("val", 0, Access::ReadWrite)
            .fixed_point(FormatRef::discovered(COEFF_FORMAT)),
    ));
    RepeatNode::new("ch", 0x0, NUM_CHANNELS, stride, element)
}

fn fp_repr(offset: u64) -> RegisterNode {
    RegisterNode::new("coeffs_fp_repr", offset, Access::ReadOnly)
        .field(FieldDescriptor::bits("int_width", 0, 4))
        .field(FieldDescriptor::bits("frac_width", 5, 9))
}

fn fp_source() -> FormatSource {
    FormatSource::int_frac(
        COEFF_FORMAT,
        "coeffs_fp_repr.int_width",
        "coeffs_fp_repr.frac_width",
    )
}

/// Rev A layout (0x100C bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_a() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_A, 0x100C)
        .child(channels(REV_A_SLOTS_PER_BIQUAD, 0x100))
        .child(RegisterNode::new("max_filt_order", 0x1000, Access::ReadOnly))
        .child(fp_repr(0x1004))
        .child(
            RegisterNode::new("ctl", 0x1008, Access::ReadWrite)
                .field(FieldDescriptor::bit("eff_coeffs", 0)),
        )
        .format(fp_source())
        .build()
}

/// Rev B layout (0x2008 bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_b() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_B, 0x2008)
        .child(channels(REV_B_SLOTS_PER_BIQUAD, 0x200))
        .child(RegisterNode::new("max_filt_order", 0x2000, Access::ReadOnly))
        .child(fp_repr(0x2004))
        .format(fp_source())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_constants_match() {
        rev_a().unwrap().check_offsets(REV_A_OFFSETS).unwrap();
        rev_b().unwrap().check_offsets(REV_B_OFFSETS).unwrap();
    }

    #[test]
    fn coefficient_addresses() {
        let a = rev_a().unwrap();
        assert_eq!(a.resolve("ch[2].coeffs[7].val").unwrap().address, 0x21C);
        assert_eq!(a.resolve_region("ch[11].coeffs").unwrap().count, 50);

        let b = rev_b().unwrap();
        assert_eq!(b.resolve("ch[2].coeffs[7]").unwrap().address, 0x41C);
        assert_eq!(b.resolve_region("ch[0].coeffs").unwrap().count, 80);
    }

    #[test]
    fn fp_repr_fields() {
        let a = rev_a().unwrap();
        let int = a.resolve("coeffs_fp_repr.int_width").unwrap();
        let frac = a.resolve("coeffs_fp_repr.frac_width").unwrap();
        assert_eq!((int.mask, int.shift), (0x1F, 0));
        assert_eq!((frac.mask, frac.shift), (0x3E0, 5));
    }
}
