//! Processing core coefficient access
//!
//! Rev B maps each channel's coefficient bank directly. Rev A reaches the
//! coefficient RAM through an indirect port, one word at a time:
//!
//! ```text
//! ram_addr         <- ch * 512 + i
//! ram_data_in      <- raw coefficient         (write)
//! ram_write.enable <- 1, then 0               (write strobe)
//! ram_data_out     -> raw coefficient         (read, after ram_addr)
//! ```
//!
//! Rev A has no format register, so its `coeff` format must come from the
//! [`BindConfig`](crate::BindConfig).

use super::{expect_kind, unsupported};
use crate::accessor::AccessorEngine;
use crate::binding::PeripheralBinding;
use crate::error::{AccessError, Result};
use fofb_regmap::peripherals::processing::{COEFFS_PER_CHANNEL, COEFF_FORMAT, KIND};
use fofb_regmap::peripherals::{NUM_CHANNELS, REV_A, REV_B};
use fofb_regmap::{FixedPointCodec, PathError};
use tracing::{debug, info};

/// Write the first `values.len()` coefficients of channel `ch`
///
/// Every value is encoded before the first bus write.
///
/// # Errors
///
/// - [`AccessError::LengthMismatch`] for more than 512 coefficients
/// - [`AccessError::FormatUnavailable`] if the `coeff` format is unknown
/// - [`FixedPointError::OutOfRange`](fofb_regmap::FixedPointError::OutOfRange)
///   for an unrepresentable coefficient
/// - [`PathError::IndexOutOfRange`] for a channel past the last one
/// - the first transport error
pub fn write_coefficients(binding: &PeripheralBinding, ch: usize, values: &[f64]) -> Result<()> {
    expect_kind(binding, KIND)?;
    match binding.version() {
        REV_A => binding.transaction(|tx| {
            let (first, codec) = indirect_port(tx, ch, values.len())?;
            let raw = values
                .iter()
                .map(|&v| codec.encode(v))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (addr, word) in (first..).zip(raw) {
                tx.write("ram_addr", addr)?;
                tx.write("ram_data_in", word)?;
                tx.write_flag("ram_write.enable", true)?;
                tx.write_flag("ram_write.enable", false)?;
            }
            Ok(())
        })?,
        REV_B => binding.write_region_fixed(&format!("ch[{ch}].coeff_ram_bank"), values)?,
        _ => return Err(unsupported(binding)),
    }
    info!("Wrote {} coefficients to processing channel {ch}", values.len());
    Ok(())
}

/// Read the first `count` coefficients of channel `ch`
///
/// # Errors
///
/// As [`write_coefficients`], without the range error.
pub fn read_coefficients(binding: &PeripheralBinding, ch: usize, count: usize) -> Result<Vec<f64>> {
    expect_kind(binding, KIND)?;
    match binding.version() {
        REV_A => binding.transaction(|tx| {
            let (first, codec) = indirect_port(tx, ch, count)?;
            (first..)
                .take(count)
                .map(|addr| -> Result<f64> {
                    tx.write("ram_addr", addr)?;
                    Ok(codec.decode(tx.read("ram_data_out")?))
                })
                .collect()
        }),
        REV_B => binding.read_region_fixed(&format!("ch[{ch}].coeff_ram_bank"), count),
        _ => Err(unsupported(binding)),
    }
}

/// First RAM address of channel `ch` and the coefficient codec, checked
/// before any bus access
fn indirect_port(tx: &AccessorEngine<'_>, ch: usize, len: usize) -> Result<(u32, FixedPointCodec)> {
    if ch >= NUM_CHANNELS {
        return Err(PathError::IndexOutOfRange {
            path: "ram_addr".to_string(),
            segment: "ch".to_string(),
            index: ch,
            count: NUM_CHANNELS,
        }
        .into());
    }
    if len > COEFFS_PER_CHANNEL {
        return Err(AccessError::LengthMismatch {
            path: format!("ch[{ch}]"),
            len,
            count: COEFFS_PER_CHANNEL,
        }
        .into());
    }
    let format = tx
        .format(COEFF_FORMAT)
        .ok_or_else(|| AccessError::FormatUnavailable {
            path: "ram_data_in".to_string(),
            format: COEFF_FORMAT.to_string(),
        })?;
    // At most 12 * 512
    #[allow(clippy::cast_possible_truncation)]
    let first = (ch * COEFFS_PER_CHANNEL) as u32;
    debug!("Indirect coefficient port: channel {ch} at RAM address {first:#x}, {format}");
    Ok((first, FixedPointCodec::new(format)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BusAccess, SimulatedBus};
    use crate::binding::VersionResolver;
    use crate::config::BindConfig;
    use crate::error::FofbError;
    use fofb_regmap::{FixedPointError, FixedPointFormat};

    #[test]
    fn rev_a_indirect_protocol() {
        let bus = SimulatedBus::new();
        let cfg = BindConfig::new()
            .with_version(REV_A)
            .with_format(COEFF_FORMAT, FixedPointFormat::new(15, 17));
        let binding = VersionResolver::builtin()
            .unwrap()
            .bind(KIND, 0x4000, bus.clone(), &cfg)
            .unwrap();

        write_coefficients(&binding, 1, &[1.0]).unwrap();
        let writes: Vec<_> = bus
            .traffic()
            .into_iter()
            .filter_map(|a| match a {
                BusAccess::Write { address, value } => Some((address, value)),
                BusAccess::Read { .. } => None,
            })
            .collect();
        assert_eq!(
            writes,
            vec![(0x400C, 512), (0x4004, 0x2_0000), (0x4000, 1), (0x4000, 0)]
        );
    }

    #[test]
    fn rev_a_needs_configured_format() {
        let bus = SimulatedBus::new();
        let cfg = BindConfig::new().with_version(REV_A);
        let binding = VersionResolver::builtin()
            .unwrap()
            .bind(KIND, 0, bus.clone(), &cfg)
            .unwrap();
        assert!(matches!(
            write_coefficients(&binding, 0, &[0.5]),
            Err(FofbError::Access(AccessError::FormatUnavailable { .. }))
        ));
        assert!(bus.traffic().is_empty());
    }

    #[test]
    fn rev_b_direct_bank() {
        let bus = SimulatedBus::new();
        // coeff binary point at bit 17
        bus.poke(0x0, 17);
        bus.poke(0x4, 20);
        let binding = VersionResolver::builtin()
            .unwrap()
            .bind(KIND, 0, bus.clone(), &BindConfig::new().with_version(REV_B))
            .unwrap();
        write_coefficients(&binding, 2, &[0.25, -1.0]).unwrap();
        assert_eq!(bus.peek(0x3000), 0x8000);
        assert_eq!(bus.peek(0x3004), 0xFFFE_0000);
        assert_eq!(read_coefficients(&binding, 2, 2).unwrap(), vec![0.25, -1.0]);

        bus.clear_traffic();
        assert!(matches!(
            write_coefficients(&binding, 2, &[0.0, 1e9]),
            Err(FofbError::FixedPoint(FixedPointError::OutOfRange { .. }))
        ));
        assert!(bus.traffic().is_empty());
    }
}
