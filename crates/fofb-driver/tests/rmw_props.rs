//! Property tests for sub-word writes

use fofb_driver::prelude::*;
use fofb_regmap::peripherals::{sys_id, REV_A, REV_B};
use proptest::prelude::*;

const PRBS_CTL_FIELDS: &[&str] = &[
    "rst",
    "step_duration",
    "lfsr_length",
    "bpm_pos_distort_en",
    "sp_distort_en",
    "sp_distort_mov_avg_num_taps",
];

fn bind(version: AbiVersion) -> (SimulatedBus, PeripheralBinding) {
    let bus = SimulatedBus::new();
    let binding = VersionResolver::builtin()
        .expect("built-in layouts")
        .bind(sys_id::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(version))
        .expect("bind sys_id");
    (bus, binding)
}

proptest! {
    #[test]
    fn field_write_preserves_other_bits(
        before in any::<u32>(),
        field in 0..PRBS_CTL_FIELDS.len(),
        value in any::<u32>(),
    ) {
        let (bus, binding) = bind(REV_B);
        let path = format!("prbs.ctl.{}", PRBS_CTL_FIELDS[field]);
        let resolved = binding.resolve(&path).expect("resolve");
        let value = value & resolved.max_value();
        bus.poke(0x1000, before);

        binding.write(&path, value).expect("write field");

        let after = bus.peek(0x1000);
        prop_assert_eq!(after & !resolved.mask, before & !resolved.mask);
        prop_assert_eq!(binding.read(&path).expect("read field"), value);
    }

    #[test]
    fn byte_register_write_preserves_neighbours(before in any::<u32>(), value in any::<u8>()) {
        let (bus, binding) = bind(REV_A);
        bus.poke(0x4, before);

        binding
            .write("bpm_pos_flatenizer.base_bpm_id", u32::from(value))
            .expect("write byte register");

        prop_assert_eq!(bus.peek(0x4), (before & !0xFF) | u32::from(value));
    }
}
