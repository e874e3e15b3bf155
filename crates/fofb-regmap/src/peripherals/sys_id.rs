//! System identification (`fofb_sys_id`).
//!
//! Rev A only exposes the BPM position flatenizer, with narrow 16- and 8-bit
//! registers. Rev B widens those to 32-bit words and adds the PRBS
//! excitation generator with per-channel set-point distortion levels and a
//! BPM position distortion RAM.

use super::{NUM_CHANNELS, REV_A, REV_B};
use crate::error::LayoutError;
use crate::field::{Access, FieldDescriptor, FormatRef, RegisterWidth};
use crate::layout::LayoutDescriptor;
use crate::node::{BlockNode, MemoryRegion, RegisterNode, RepeatNode};

/// Peripheral kind
pub const KIND: &str = "fofb_sys_id";

/// Entries in the BPM position distortion RAM
pub const DISTORT_RAM_ENTRIES: usize = 512;

/// Header constants of rev A
pub const REV_A_OFFSETS: &[(&str, u64)] = &[
    ("bpm_pos_flatenizer", 0x0),
    ("bpm_pos_flatenizer.max_num_cte", 0x0),
    ("bpm_pos_flatenizer.base_bpm_id", 0x4),
];

/// Header constants of rev B
pub const REV_B_OFFSETS: &[(&str, u64)] = &[
    ("bpm_pos_flatenizer", 0x0),
    ("bpm_pos_flatenizer.ctl", 0x0),
    ("bpm_pos_flatenizer.max_num_cte", 0x4),
    ("prbs", 0x1000),
    ("prbs.ctl", 0x1000),
    ("prbs.sp_distort", 0x1040),
    ("prbs.sp_distort.ch[1].levels", 0x1044),
    ("prbs.bpm_pos_distort", 0x1800),
    ("prbs.bpm_pos_distort.distort_ram", 0x1800),
];

/// Rev A layout (0x8 bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_a() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_A, 0x8)
        .child(
            BlockNode::new("bpm_pos_flatenizer", 0x0)
                .size(0x8)
                .child(
                    RegisterNode::new("max_num_cte", 0x0, Access::ReadOnly)
                        .width(RegisterWidth::Half),
                )
                .child(
                    RegisterNode::new("base_bpm_id", 0x4, Access::ReadWrite)
                        .width(RegisterWidth::Byte),
                ),
        )
        .build()
}

fn levels() -> RegisterNode {
    RegisterNode::new("levels", 0, Access::ReadWrite)
        .field(FieldDescriptor::bits("level_0", 0, 15).fixed_point(FormatRef::integer(16)))
        .field(FieldDescriptor::bits("level_1", 16, 31).fixed_point(FormatRef::integer(16)))
}

fn prbs() -> BlockNode {
    BlockNode::new("prbs", 0x1000)
        .size(0x1000)
        .child(
            RegisterNode::new("ctl", 0x0, Access::ReadWrite)
                .field(FieldDescriptor::bit("rst", 0))
                .field(FieldDescriptor::bits("step_duration", 1, 10))
                .field(FieldDescriptor::bits("lfsr_length", 11, 15))
                .field(FieldDescriptor::bit("bpm_pos_distort_en", 16))
                .field(FieldDescriptor::bit("sp_distort_en", 17))
                .field(FieldDescriptor::bits("sp_distort_mov_avg_num_taps", 18, 20)),
        )
        .child(
            BlockNode::new("sp_distort", 0x40).size(0x40).child(RepeatNode::new(
                "ch",
                0x0,
                NUM_CHANNELS,
                4,
                BlockNode::template().child(levels()),
            )),
        )
        .child(
            BlockNode::new("bpm_pos_distort", 0x800)
                .size(0x800)
                .child(MemoryRegion::new("distort_ram", 0x0, DISTORT_RAM_ENTRIES, levels())),
        )
}

/// Rev B layout (0x2000 bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_b() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_B, 0x2000)
        .child(
            BlockNode::new("bpm_pos_flatenizer", 0x0)
                .child(
                    RegisterNode::new("ctl", 0x0, Access::ReadWrite)
                        .field(FieldDescriptor::bits("base_bpm_id", 0, 7)),
                )
                .child(RegisterNode::new("max_num_cte", 0x4, Access::ReadOnly)),
        )
        .child(prbs())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSemantic;

    #[test]
    fn header_constants_match() {
        rev_a().unwrap().check_offsets(REV_A_OFFSETS).unwrap();
        rev_b().unwrap().check_offsets(REV_B_OFFSETS).unwrap();
    }

    #[test]
    fn padded_prbs_offset_is_reported() {
        // A generator that pads the PRBS block would move the distortion RAM
        let err = rev_b()
            .unwrap()
            .check_offsets(&[("prbs.bpm_pos_distort", 0x1840)])
            .unwrap_err();
        assert!(matches!(
            err,
            LayoutError::OffsetMismatch { declared: 0x1840, computed: 0x1800, .. }
        ));
    }

    #[test]
    fn narrow_rev_a_registers() {
        let a = rev_a().unwrap();
        let id = a.resolve("bpm_pos_flatenizer.base_bpm_id").unwrap();
        assert_eq!((id.address, id.width, id.mask), (0x4, RegisterWidth::Byte, 0xFF));
        let cte = a.resolve("bpm_pos_flatenizer.max_num_cte").unwrap();
        assert_eq!((cte.width, cte.access), (RegisterWidth::Half, Access::ReadOnly));
    }

    #[test]
    fn prbs_fields() {
        let b = rev_b().unwrap();
        let step = b.resolve("prbs.ctl.step_duration").unwrap();
        assert_eq!((step.address, step.mask, step.shift), (0x1000, 0x7FE, 1));
        let taps = b.resolve("prbs.ctl.sp_distort_mov_avg_num_taps").unwrap();
        assert_eq!(taps.mask, 0x1C_0000);
        let level = b.resolve("prbs.sp_distort.ch[11].levels.level_1").unwrap();
        assert_eq!(level.address, 0x1040 + 11 * 4);
        assert_eq!(
            level.semantic,
            FieldSemantic::SignedFixedPoint(FormatRef::integer(16))
        );
        assert_eq!(
            b.resolve("prbs.bpm_pos_distort.distort_ram[511].levels").unwrap().address,
            0x1FFC
        );
    }
}
