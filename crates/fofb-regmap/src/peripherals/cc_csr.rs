//! FOFB communication controller CSR (`fofb_cc_csr`).
//!
//! Rev A keeps the configuration registers at the bottom of the window and
//! the 2048-word register-map RAM at 0x2000. Rev B swaps them and drops
//! `cfg_ctl`.

use super::{REV_A, REV_B};
use crate::error::LayoutError;
use crate::field::{Access, FieldDescriptor};
use crate::layout::LayoutDescriptor;
use crate::node::{MemoryRegion, RegisterNode};

/// Peripheral kind
pub const KIND: &str = "fofb_cc_csr";

/// Words in the register-map RAM
pub const RAM_WORDS: usize = 2048;

/// Header constants of rev A
pub const REV_A_OFFSETS: &[(&str, u64)] = &[
    ("cfg_val", 0x0),
    ("cfg_ctl", 0x4),
    ("ram_reg", 0x2000),
    ("ram_reg[0].data", 0x2000),
];

/// Header constants of rev B
pub const REV_B_OFFSETS: &[(&str, u64)] = &[("ram_reg", 0x0), ("cfg_val", 0x2000)];

fn ram_reg(offset: u64) -> MemoryRegion {
    MemoryRegion::new(
        "ram_reg",
        offset,
        RAM_WORDS,
        RegisterNode::new("data", 0, Access::ReadWrite),
    )
}

/// Rev A layout (0x4000 bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_a() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_A, 0x4000)
        .child(RegisterNode::new("cfg_val", 0x0, Access::ReadWrite))
        .child(
            RegisterNode::new("cfg_ctl", 0x4, Access::ReadWrite)
                .field(FieldDescriptor::bit("read_ram", 0)),
        )
        .child(ram_reg(0x2000))
        .build()
}

/// Rev B layout (0x2004 bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_b() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_B, 0x2004)
        .child(ram_reg(0x0))
        .child(RegisterNode::new("cfg_val", 0x2000, Access::ReadWrite))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PathError;

    #[test]
    fn header_constants_match() {
        rev_a().unwrap().check_offsets(REV_A_OFFSETS).unwrap();
        rev_b().unwrap().check_offsets(REV_B_OFFSETS).unwrap();
    }

    #[test]
    fn ram_window() {
        let a = rev_a().unwrap();
        assert_eq!(a.resolve("ram_reg[2047]").unwrap().address, 0x3FFC);
        assert!(matches!(
            a.resolve("ram_reg[2048]"),
            Err(PathError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            rev_b().unwrap().resolve("cfg_ctl.read_ram"),
            Err(PathError::NotFound { .. })
        ));
    }
}
