//! End-to-end scenarios against the simulated bus
//!
//! Each test binds a built-in layout, drives it through the public API and
//! checks both the stored words and the bus traffic.

use fofb_driver::prelude::*;
use fofb_driver::{AccessError, BusAccess, Fault, TransportError, VersionError};
use fofb_regmap::peripherals::{cc_csr, processing, shaper_filt, sys_id, REV_A, REV_B};
use fofb_regmap::PathError;
use std::sync::Arc;
use std::thread;

fn resolver() -> VersionResolver {
    VersionResolver::builtin().expect("built-in layouts")
}

#[test]
fn test_interlock_enable_read_modify_write() {
    let bus = SimulatedBus::new().with_window(0x0, 0xD000);
    let binding = resolver()
        .bind(processing::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(REV_B))
        .expect("bind processing rev B");
    bus.poke(0x40, 0x5);
    bus.clear_traffic();

    binding
        .write_flag("loop_intlk.ctl.src_en_orb_distort", true)
        .expect("set interlock source");

    assert_eq!(bus.peek(0x40), 0x7);
    assert_eq!(
        bus.traffic(),
        vec![
            BusAccess::Read { address: 0x40, value: 0x5 },
            BusAccess::Write { address: 0x40, value: 0x7 },
        ]
    );
}

#[test]
fn test_window_size_mismatch_rejected_without_traffic() {
    let bus = SimulatedBus::new().with_window(0x8000, 0x2004);
    let result = resolver().bind(
        cc_csr::KIND,
        0x8000,
        bus.clone(),
        &BindConfig::new().with_version(REV_A),
    );

    match result {
        Err(FofbError::Version(VersionError::SizeMismatch { expected, actual, .. })) => {
            assert_eq!(expected, 0x4000);
            assert_eq!(actual, 0x2004);
        }
        other => panic!("expected SizeMismatch, got {other:?}"),
    }
    assert!(bus.traffic().is_empty());

    // The same window fits rev B
    resolver()
        .bind(cc_csr::KIND, 0x8000, bus, &BindConfig::new().with_version(REV_B))
        .expect("bind cc_csr rev B");
}

#[test]
fn test_configured_window_size_checked() {
    let cfg = BindConfig::new().with_version(REV_B).with_window_size(0x10);
    assert!(matches!(
        resolver().bind(sys_id::KIND, 0x0, SimulatedBus::new(), &cfg),
        Err(FofbError::Version(VersionError::SizeMismatch { expected: 0x2000, actual: 0x10, .. }))
    ));
}

#[test]
fn test_prbs_step_duration() {
    let bus = SimulatedBus::new();
    let binding = resolver()
        .bind(sys_id::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(REV_B))
        .expect("bind sys_id rev B");

    binding.write("prbs.ctl.step_duration", 500).expect("write step");
    assert_eq!(bus.peek(0x1000), 0x3E8);
    assert_eq!(binding.read("prbs.ctl.step_duration").expect("read step"), 500);

    binding.write("prbs.ctl.step_duration", 0x3E8).expect("write step");
    assert_eq!(bus.peek(0x1000), 0x7D0);
    assert_eq!(binding.read("prbs.ctl.step_duration").expect("read step"), 0x3E8);

    assert!(matches!(
        binding.write("prbs.ctl.step_duration", 1024),
        Err(FofbError::Access(AccessError::ValueOutOfRange { max: 1023, .. }))
    ));
}

#[test]
fn test_shaper_coefficient_fixed_point() {
    let bus = SimulatedBus::new();
    // coeffs_fp_repr: int_width = 2, frac_width = 30
    bus.poke(0x1004, 2 | (30 << 5));
    let binding = resolver()
        .bind(shaper_filt::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(REV_A))
        .expect("bind shaper rev A");
    assert_eq!(
        binding.format(shaper_filt::COEFF_FORMAT),
        Some(FixedPointFormat::new(2, 30))
    );

    binding
        .write_fixed("ch[2].coeffs[7].val", -0.5)
        .expect("write coefficient");
    assert_eq!(bus.peek(0x21C), 0xE000_0000);
    assert_eq!(
        binding.read_fixed("ch[2].coeffs[7].val").expect("read coefficient"),
        -0.5
    );
}

#[test]
fn test_transport_fault_aborts_read_modify_write() {
    let bus = SimulatedBus::new();
    let binding = resolver()
        .bind(processing::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(REV_B))
        .expect("bind processing rev B");
    bus.inject_fault(0x40, Fault::Timeout);
    bus.clear_traffic();

    assert!(matches!(
        binding.write_flag("loop_intlk.ctl.sta_clr", true),
        Err(FofbError::Transport(TransportError::Timeout { address: 0x40 }))
    ));
    assert!(bus.traffic().iter().all(|a| !a.is_write()));
    assert_eq!(bus.peek(0x40), 0);
}

#[test]
fn test_version_tag_and_unresolved() {
    let mut registry = LayoutRegistry::with_builtin().expect("built-in layouts");
    registry.set_version_tag(cc_csr::KIND, 0x0);
    let resolver = VersionResolver::new(registry);

    let bus = SimulatedBus::new();
    bus.poke(0x0, 2);
    let binding = resolver
        .bind(cc_csr::KIND, 0x0, bus, &BindConfig::new())
        .expect("bind through version tag");
    assert_eq!(binding.version(), REV_B);

    assert!(matches!(
        resolver.bind(sys_id::KIND, 0x0, SimulatedBus::new(), &BindConfig::new()),
        Err(FofbError::Version(VersionError::Unresolved { .. }))
    ));
}

#[test]
fn test_region_length_checked() {
    let bus = SimulatedBus::new();
    let binding = resolver()
        .bind(cc_csr::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(REV_B))
        .expect("bind cc_csr rev B");

    binding.write_region("ram_reg", &[1, 2, 3]).expect("write RAM");
    assert_eq!(binding.read_region("ram_reg", 3).expect("read RAM"), vec![1, 2, 3]);
    assert_eq!(bus.peek(0x8), 3);

    bus.clear_traffic();
    let too_long = vec![0; cc_csr::RAM_WORDS + 1];
    assert!(matches!(
        binding.write_region("ram_reg", &too_long),
        Err(FofbError::Access(AccessError::LengthMismatch { count: 2048, .. }))
    ));
    assert!(bus.traffic().is_empty());
}

#[test]
fn test_path_errors_surface() {
    let binding = resolver()
        .bind(processing::KIND, 0x0, SimulatedBus::new(), &BindConfig::new().with_version(REV_B))
        .expect("bind processing rev B");
    assert!(matches!(
        binding.read("ch[12].acc.gain"),
        Err(FofbError::Path(PathError::IndexOutOfRange { index: 12, .. }))
    ));
    assert!(matches!(
        binding.read("ch[0].acc.nope"),
        Err(FofbError::Path(PathError::NotFound { .. }))
    ));
    assert!(matches!(
        binding.write("fixed_point_pos.coeff", 3),
        Err(FofbError::Access(AccessError::NotWritable { .. }))
    ));
}

#[test]
fn test_concurrent_users_do_not_interleave() {
    let bus = SimulatedBus::new();
    let binding = Arc::new(
        resolver()
            .bind(processing::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(REV_B))
            .expect("bind processing rev B"),
    );

    let handles: Vec<_> = (0..3)
        .map(|bit| {
            let binding = Arc::clone(&binding);
            thread::spawn(move || {
                let path = match bit {
                    0 => "loop_intlk.ctl.sta_clr",
                    1 => "loop_intlk.ctl.src_en_orb_distort",
                    _ => "loop_intlk.ctl.src_en_packet_loss",
                };
                for _ in 0..100 {
                    binding.write_flag(path, true).expect("set flag");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker");
    }

    // Lost updates would leave one of the bits clear
    assert_eq!(bus.peek(0x40), 0x7);
}

#[test]
fn test_transaction_groups_operations() {
    let bus = SimulatedBus::new();
    let binding = resolver()
        .bind(processing::KIND, 0x0, bus.clone(), &BindConfig::new().with_version(REV_B))
        .expect("bind processing rev B");

    let limits = binding
        .transaction(|tx| {
            tx.write("ch[4].sp_limits.max", 1000)?;
            tx.write("ch[4].sp_limits.min", 0xFFFF_FC18)?;
            Ok((tx.read_fixed("ch[4].sp_limits.max")?, tx.read_fixed("ch[4].sp_limits.min")?))
        })
        .expect("transaction");
    assert_eq!(limits, (1000.0, -1000.0));
    assert_eq!(bus.peek(0x5820), 1000);
}
