//! Built-in FOFB peripheral layouts.
//!
//! Each module describes one gateware peripheral family in both ABI
//! revisions it shipped with, plus the generated header constants of each
//! revision so the layouts can be cross-checked with
//! [`LayoutDescriptor::check_offsets`].
//!
//! | Kind | Revisions |
//! |------|-----------|
//! | [`cc_csr::KIND`] | v1, v2 |
//! | [`processing::KIND`] | v1, v2 |
//! | [`shaper_filt::KIND`] | v1, v2 |
//! | [`sys_id::KIND`] | v1, v2 |
//! | [`wb_ram::DOT_PROD_KIND`], [`wb_ram::MATMUL_KIND`] | v1 |

pub mod cc_csr;
pub mod processing;
pub mod shaper_filt;
pub mod sys_id;
pub mod wb_ram;

use crate::error::LayoutError;
use crate::layout::{AbiVersion, LayoutDescriptor};

/// First ABI revision (`v1`)
pub const REV_A: AbiVersion = AbiVersion::new(1);

/// Second ABI revision (`v2`)
pub const REV_B: AbiVersion = AbiVersion::new(2);

/// Number of FOFB channels (corrector pairs) per controller
pub const NUM_CHANNELS: usize = 12;

/// Every built-in layout
///
/// # Errors
///
/// Returns the first [`LayoutError`]; the built-in descriptions are covered
/// by tests, so this only fails if one of them is edited inconsistently.
pub fn all() -> Result<Vec<LayoutDescriptor>, LayoutError> {
    Ok(vec![
        cc_csr::rev_a()?,
        cc_csr::rev_b()?,
        processing::rev_a()?,
        processing::rev_b()?,
        shaper_filt::rev_a()?,
        shaper_filt::rev_b()?,
        sys_id::rev_a()?,
        sys_id::rev_b()?,
        wb_ram::dot_prod()?,
        wb_ram::matmul()?,
    ])
}
