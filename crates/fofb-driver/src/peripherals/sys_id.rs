//! System identification excitation
//!
//! Distortion levels are pairs of signed 16-bit values packed in one word,
//! `level_0` in the low half and `level_1` in the high half. Both exist only
//! in rev B.

use super::{expect_kind, unsupported};
use crate::binding::PeripheralBinding;
use crate::error::{AccessError, Result};
use fofb_regmap::peripherals::sys_id::KIND;
use fofb_regmap::peripherals::REV_B;
use tracing::info;

/// Pack two signed levels into one distortion word
#[allow(clippy::cast_sign_loss, clippy::cast_lossless)]
pub const fn pack_levels(level_0: i16, level_1: i16) -> u32 {
    (level_0 as u16 as u32) | ((level_1 as u16 as u32) << 16)
}

/// Split a distortion word into its two signed levels
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const fn unpack_levels(word: u32) -> (i16, i16) {
    (word as u16 as i16, (word >> 16) as u16 as i16)
}

/// Set the set-point distortion levels of channel `ch` with a single write
///
/// # Errors
///
/// Returns [`VersionError::Unknown`](crate::VersionError::Unknown) on a
/// revision without PRBS, plus the path and transport errors of the
/// accessor.
pub fn set_distortion_levels(
    binding: &PeripheralBinding,
    ch: usize,
    level_0: i16,
    level_1: i16,
) -> Result<()> {
    require_prbs(binding)?;
    binding.write(
        &format!("prbs.sp_distort.ch[{ch}].levels"),
        pack_levels(level_0, level_1),
    )
}

/// Set-point distortion levels of channel `ch`
///
/// # Errors
///
/// As [`set_distortion_levels`].
pub fn distortion_levels(binding: &PeripheralBinding, ch: usize) -> Result<(i16, i16)> {
    require_prbs(binding)?;
    Ok(unpack_levels(
        binding.read(&format!("prbs.sp_distort.ch[{ch}].levels"))?,
    ))
}

/// Load the BPM position distortion RAM from its first entry
///
/// # Errors
///
/// Returns [`AccessError::LengthMismatch`] for more than 512 entries, plus
/// the errors of [`set_distortion_levels`].
pub fn load_position_distortion(binding: &PeripheralBinding, levels: &[(i16, i16)]) -> Result<()> {
    require_prbs(binding)?;
    let words: Vec<u32> = levels.iter().map(|&(l0, l1)| pack_levels(l0, l1)).collect();
    binding.write_region("prbs.bpm_pos_distort.distort_ram", &words)?;
    info!("Loaded {} BPM position distortion entries", words.len());
    Ok(())
}

/// PRBS generator settings, written to `prbs.ctl`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrbsConfig {
    /// Samples per PRBS step, minus one (10 bits)
    pub step_duration: u32,
    /// LFSR length, minus two (5 bits)
    pub lfsr_length: u32,
    /// Distort BPM positions
    pub bpm_pos_distort_en: bool,
    /// Distort set-points
    pub sp_distort_en: bool,
    /// Log2 of the set-point distortion moving-average taps (3 bits)
    pub sp_distort_mov_avg_num_taps: u32,
}

/// Write every PRBS control field with one read-modify-write of `prbs.ctl`
///
/// The reset bit keeps its current value.
///
/// # Errors
///
/// Returns [`AccessError::ValueOutOfRange`] for a setting wider than its
/// field, before any bus access, plus the errors of
/// [`set_distortion_levels`].
pub fn configure_prbs(binding: &PeripheralBinding, config: &PrbsConfig) -> Result<()> {
    require_prbs(binding)?;
    let settings = [
        ("step_duration", config.step_duration),
        ("lfsr_length", config.lfsr_length),
        ("bpm_pos_distort_en", u32::from(config.bpm_pos_distort_en)),
        ("sp_distort_en", u32::from(config.sp_distort_en)),
        ("sp_distort_mov_avg_num_taps", config.sp_distort_mov_avg_num_taps),
    ];
    let mut fields = Vec::with_capacity(settings.len());
    for (name, value) in settings {
        let field = binding.resolve(&format!("prbs.ctl.{name}"))?;
        let max = field.max_value();
        if value > max {
            return Err(AccessError::ValueOutOfRange {
                path: field.path,
                value,
                max,
            }
            .into());
        }
        fields.push((field, value));
    }
    binding.transaction(|tx| {
        let word = fields
            .iter()
            .fold(tx.read("prbs.ctl")?, |word, (field, value)| {
                (word & !field.mask) | (value << field.shift)
            });
        tx.write("prbs.ctl", word)
    })?;
    info!("PRBS configured: {config:?}");
    Ok(())
}

fn require_prbs(binding: &PeripheralBinding) -> Result<()> {
    expect_kind(binding, KIND)?;
    if binding.version() == REV_B {
        Ok(())
    } else {
        Err(unsupported(binding))
    }
}
