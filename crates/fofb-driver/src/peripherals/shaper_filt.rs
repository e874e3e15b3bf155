//! Shaper filter coefficient loading

use super::{expect_kind, unsupported};
use crate::binding::PeripheralBinding;
use crate::error::{AccessError, Result};
use fofb_regmap::peripherals::shaper_filt::{
    KIND, MAX_BIQUADS, REV_A_SLOTS_PER_BIQUAD, REV_B_SLOTS_PER_BIQUAD,
};
use fofb_regmap::peripherals::{REV_A, REV_B};
use tracing::info;

/// Second-order section, `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Biquad {
    /// Numerator, z^0
    pub b0: f64,
    /// Numerator, z^-1
    pub b1: f64,
    /// Numerator, z^-2
    pub b2: f64,
    /// Denominator, z^-1
    pub a1: f64,
    /// Denominator, z^-2
    pub a2: f64,
}

impl Biquad {
    /// Pass-through section
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Coefficients in RAM order
    pub const fn coefficients(&self) -> [f64; 5] {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
    }
}

/// Load the biquad cascade of channel `ch`
///
/// Unused biquads keep their previous contents. On rev A the shadow RAM is
/// applied by pulsing `ctl.eff_coeffs` once every coefficient is written.
///
/// # Errors
///
/// - [`AccessError::LengthMismatch`] for more than [`MAX_BIQUADS`] biquads
/// - [`FixedPointError::OutOfRange`](fofb_regmap::FixedPointError::OutOfRange)
///   if a coefficient does not fit the discovered format; nothing is written
/// - the path, format and transport errors of the accessor
pub fn load_biquads(binding: &PeripheralBinding, ch: usize, biquads: &[Biquad]) -> Result<()> {
    expect_kind(binding, KIND)?;
    let path = format!("ch[{ch}].coeffs");
    if biquads.len() > MAX_BIQUADS {
        return Err(AccessError::LengthMismatch {
            path,
            len: biquads.len(),
            count: MAX_BIQUADS,
        }
        .into());
    }

    let slots = match binding.version() {
        REV_A => REV_A_SLOTS_PER_BIQUAD,
        REV_B => REV_B_SLOTS_PER_BIQUAD,
        _ => return Err(unsupported(binding)),
    };
    let mut values = Vec::with_capacity(biquads.len() * slots);
    for biquad in biquads {
        values.extend_from_slice(&biquad.coefficients());
        values.resize(values.len() + slots - 5, 0.0);
    }

    binding.transaction(|tx| {
        tx.write_region_fixed(&path, &values)?;
        if binding.version() == REV_A {
            tx.write_flag("ctl.eff_coeffs", true)?;
        }
        Ok(())
    })?;
    info!("Loaded {} biquads into shaper channel {ch}", biquads.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimulatedBus;
    use crate::binding::VersionResolver;
    use crate::config::BindConfig;
    use crate::error::FofbError;
    use fofb_regmap::FixedPointFormat;

    fn bind(version: fofb_regmap::AbiVersion, bus: &SimulatedBus) -> PeripheralBinding {
        let cfg = BindConfig::new()
            .with_version(version)
            .with_format("coeffs", FixedPointFormat::new(2, 30));
        VersionResolver::builtin()
            .unwrap()
            .bind(KIND, 0, bus.clone(), &cfg)
            .unwrap()
    }

    #[test]
    fn rev_b_pads_slots() {
        let bus = SimulatedBus::new();
        let binding = bind(REV_B, &bus);
        for slot in 0..8 {
            bus.poke(0x200 + slot * 4, 0xFFFF_FFFF);
        }
        let half = Biquad {
            b0: 0.5,
            ..Biquad::default()
        };
        load_biquads(&binding, 1, &[half]).unwrap();
        assert_eq!(bus.peek(0x200), 0x2000_0000);
        assert!((1..8).all(|slot| bus.peek(0x200 + slot * 4) == 0));
    }

    #[test]
    fn rev_a_applies_shadow_ram() {
        let bus = SimulatedBus::new();
        let binding = bind(REV_A, &bus);
        load_biquads(&binding, 0, &[Biquad::IDENTITY, Biquad::IDENTITY]).unwrap();
        assert_eq!(bus.peek(0x0), 0x4000_0000);
        assert_eq!(bus.peek(0x14), 0x4000_0000);
        assert_eq!(bus.peek(0x1008), 1);
        let last = bus.traffic().last().copied().unwrap();
        assert!(last.is_write());
    }

    #[test]
    fn too_many_biquads() {
        let bus = SimulatedBus::new();
        let binding = bind(REV_B, &bus);
        let cascade = vec![Biquad::IDENTITY; MAX_BIQUADS + 1];
        assert!(matches!(
            load_biquads(&binding, 0, &cascade),
            Err(FofbError::Access(AccessError::LengthMismatch { len: 11, count: 10, .. }))
        ));
        assert!(bus.traffic().is_empty());
    }
}
