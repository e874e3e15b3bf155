//! Peripheral helpers
//!
//! Multi-register sequences that only make sense for one peripheral kind.
//! Each helper runs inside a single [`PeripheralBinding::transaction`] and
//! picks its register sequence from the bound revision.
//!
//! | Helper | Kind |
//! |--------|------|
//! | [`shaper_filt::load_biquads`] | `fofb_shaper_filt` |
//! | [`processing::write_coefficients`] | `fofb_processing` |
//! | [`sys_id::set_distortion_levels`], [`sys_id::configure_prbs`] | `fofb_sys_id` |

pub mod processing;
pub mod shaper_filt;
pub mod sys_id;

use crate::binding::PeripheralBinding;
use crate::error::{Result, VersionError};

/// Reject a binding of the wrong kind
fn expect_kind(binding: &PeripheralBinding, kind: &str) -> Result<()> {
    if binding.kind() == kind {
        Ok(())
    } else {
        Err(VersionError::Unknown {
            kind: format!("{} (expected {kind})", binding.kind()),
            version: Some(binding.version()),
        }
        .into())
    }
}

/// Error for a revision the helper has no register sequence for
fn unsupported(binding: &PeripheralBinding) -> crate::FofbError {
    VersionError::Unknown {
        kind: binding.kind().to_string(),
        version: Some(binding.version()),
    }
    .into()
}
