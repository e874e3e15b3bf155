//! Indirect coefficient RAM ports (`dot_prod_wb`, `matmul_wb`).
//!
//! Both expose the same three-register protocol: load `ram_coeff_addr` and
//! `ram_coeff_dat`, then set `ram_write.enable`.

use super::REV_A;
use crate::error::LayoutError;
use crate::field::{Access, FieldDescriptor};
use crate::layout::LayoutDescriptor;
use crate::node::RegisterNode;

/// Dot-product engine kind
pub const DOT_PROD_KIND: &str = "dot_prod_wb";

/// Matrix-multiply engine kind
pub const MATMUL_KIND: &str = "matmul_wb";

/// Header constants, shared by both kinds
pub const OFFSETS: &[(&str, u64)] = &[
    ("ram_coeff_dat", 0x0),
    ("ram_coeff_addr", 0x4),
    ("ram_write", 0x8),
];

fn layout(kind: &str) -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(kind, REV_A, 0xC)
        .child(RegisterNode::new("ram_coeff_dat", 0x0, Access::ReadWrite))
        .child(RegisterNode::new("ram_coeff_addr", 0x4, Access::ReadWrite))
        .child(
            RegisterNode::new("ram_write", 0x8, Access::ReadWrite)
                .field(FieldDescriptor::bit("enable", 0)),
        )
        .build()
}

/// `dot_prod_wb` layout
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn dot_prod() -> Result<LayoutDescriptor, LayoutError> {
    layout(DOT_PROD_KIND)
}

/// `matmul_wb` layout
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn matmul() -> Result<LayoutDescriptor, LayoutError> {
    layout(MATMUL_KIND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_constants_match() {
        dot_prod().unwrap().check_offsets(OFFSETS).unwrap();
        matmul().unwrap().check_offsets(OFFSETS).unwrap();
        assert_eq!(
            dot_prod().unwrap().resolve("ram_write.enable").unwrap().mask,
            0x1
        );
    }
}
