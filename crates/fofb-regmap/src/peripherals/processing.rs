//! FOFB processing core (`fofb_processing`).
//!
//! Rev A only exposes an indirect port into the coefficient RAM. Rev B maps
//! every channel's coefficient bank directly, adds per-channel accumulators,
//! set-point limits and decimation, and the loop interlock.
//!
//! Coefficient and accumulator gain words are full 32-bit two's-complement
//! values whose binary point is read from `fixed_point_pos` at bind time.

use super::{NUM_CHANNELS, REV_A, REV_B};
use crate::error::LayoutError;
use crate::field::{Access, FieldDescriptor, FormatRef};
use crate::layout::{FormatSource, LayoutDescriptor};
use crate::node::{BlockNode, MemoryRegion, RegisterNode, RepeatNode};

/// Peripheral kind
pub const KIND: &str = "fofb_processing";

/// Coefficients per channel
pub const COEFFS_PER_CHANNEL: usize = 512;

/// Format of the coefficient RAM words
pub const COEFF_FORMAT: &str = "coeff";

/// Format of the accumulator gains
pub const GAIN_FORMAT: &str = "accs_gains";

/// Distance between rev B channels
pub const REV_B_CH_STRIDE: u64 = 0x1000;

/// Header constants of rev A
pub const REV_A_OFFSETS: &[(&str, u64)] = &[
    ("ram_write", 0x0),
    ("ram_data_in", 0x4),
    ("ram_data_out", 0x8),
    ("ram_addr", 0xC),
];

/// Header constants of rev B
pub const REV_B_OFFSETS: &[(&str, u64)] = &[
    ("fixed_point_pos", 0x0),
    ("fixed_point_pos.coeff", 0x0),
    ("fixed_point_pos.accs_gains", 0x4),
    ("loop_intlk", 0x40),
    ("loop_intlk.ctl", 0x40),
    ("loop_intlk.sta", 0x44),
    ("loop_intlk.orb_distort_limit", 0x48),
    ("loop_intlk.min_num_pkts", 0x4C),
    ("sp_decim_ratio_max", 0x80),
    ("sps_ram_bank", 0x800),
    ("ch", 0x1000),
    ("ch[0].coeff_ram_bank", 0x1000),
    ("ch[0].acc", 0x1800),
    ("ch[0].acc.ctl", 0x1800),
    ("ch[0].acc.gain", 0x1804),
    ("ch[0].sp_limits", 0x1820),
    ("ch[0].sp_limits.max", 0x1820),
    ("ch[0].sp_limits.min", 0x1824),
    ("ch[0].sp_decim", 0x1828),
    ("ch[0].sp_decim.data", 0x1828),
    ("ch[0].sp_decim.ratio", 0x182C),
    ("ch[1]", 0x2000),
];

/// Rev A layout (0x10 bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_a() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_A, 0x10)
        .child(
            RegisterNode::new("ram_write", 0x0, Access::ReadWrite)
                .field(FieldDescriptor::bit("enable", 0)),
        )
        .child(RegisterNode::new("ram_data_in", 0x4, Access::ReadWrite))
        .child(RegisterNode::new("ram_data_out", 0x8, Access::ReadOnly))
        .child(RegisterNode::new("ram_addr", 0xC, Access::ReadWrite))
        .external_format(COEFF_FORMAT)
        .build()
}

fn loop_intlk() -> BlockNode {
    BlockNode::new("loop_intlk", 0x40)
        .child(
            RegisterNode::new("ctl", 0x0, Access::ReadWrite)
                .field(FieldDescriptor::bit("sta_clr", 0))
                .field(FieldDescriptor::bit("src_en_orb_distort", 1))
                .field(FieldDescriptor::bit("src_en_packet_loss", 2)),
        )
        .child(
            RegisterNode::new("sta", 0x4, Access::ReadOnly)
                .field(FieldDescriptor::bit("orb_distort", 0))
                .field(FieldDescriptor::bit("packet_loss", 1)),
        )
        .child(RegisterNode::new("orb_distort_limit", 0x8, Access::ReadWrite))
        .child(RegisterNode::new("min_num_pkts", 0xC, Access::ReadWrite))
}

fn channel() -> BlockNode {
    BlockNode::template()
        .child(MemoryRegion::new(
            "coeff_ram_bank",
            0x0,
            COEFFS_PER_CHANNEL,
            RegisterNode::new("data", 0, Access::ReadWrite)
                .fixed_point(FormatRef::discovered(COEFF_FORMAT)),
        ))
        .child(
            BlockNode::new("acc", 0x800)
                .child(
                    RegisterNode::new("ctl", 0x0, Access::ReadWrite)
                        .field(FieldDescriptor::bit("clear", 0))
                        .field(FieldDescriptor::bit("freeze", 1)),
                )
                .child(
                    RegisterNode::new("gain", 0x4, Access::ReadWrite)
                        .fixed_point(FormatRef::discovered(GAIN_FORMAT)),
                ),
        )
        .child(
            BlockNode::new("sp_limits", 0x820)
                .child(RegisterNode::new("max", 0x0, Access::ReadWrite).signed())
                .child(RegisterNode::new("min", 0x4, Access::ReadWrite).signed()),
        )
        .child(
            BlockNode::new("sp_decim", 0x828)
                .child(RegisterNode::new("data", 0x0, Access::ReadOnly).signed())
                .child(RegisterNode::new("ratio", 0x4, Access::ReadWrite)),
        )
}

/// Rev B layout (0xD000 bytes)
///
/// # Errors
///
/// Returns a [`LayoutError`] if the description is inconsistent.
pub fn rev_b() -> Result<LayoutDescriptor, LayoutError> {
    LayoutDescriptor::builder(KIND, REV_B, 0xD000)
        .child(
            BlockNode::new("fixed_point_pos", 0x0)
                .child(RegisterNode::new("coeff", 0x0, Access::ReadOnly))
                .child(RegisterNode::new("accs_gains", 0x4, Access::ReadOnly)),
        )
        .child(loop_intlk())
        .child(RegisterNode::new("sp_decim_ratio_max", 0x80, Access::ReadOnly))
        .child(MemoryRegion::new(
            "sps_ram_bank",
            0x800,
            COEFFS_PER_CHANNEL,
            RegisterNode::new("data", 0, Access::ReadWrite),
        ))
        .child(
            RepeatNode::new("ch", 0x1000, NUM_CHANNELS, REV_B_CH_STRIDE, channel().size(REV_B_CH_STRIDE)),
        )
        .format(FormatSource::frac_position(COEFF_FORMAT, "fixed_point_pos.coeff", 32))
        .format(FormatSource::frac_position(GAIN_FORMAT, "fixed_point_pos.accs_gains", 32))
        .build()
}
