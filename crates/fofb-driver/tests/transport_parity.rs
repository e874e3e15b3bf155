//! Integration tests for the two transports
//!
//! The same operations against a memory-mapped file and the simulated bus
//! must leave identical words behind.

use fofb_driver::prelude::*;
use fofb_driver::TransportType;
use fofb_regmap::peripherals::{processing, sys_id, REV_B};
use std::io::Write;

const SYS_ID_SIZE: u64 = 0x2000;

fn mapped_file(len: u64) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(&vec![0u8; usize::try_from(len).expect("length")])
        .expect("zero fill");
    file.flush().expect("flush");
    file
}

fn exercise(binding: &PeripheralBinding) {
    binding
        .write("bpm_pos_flatenizer.ctl.base_bpm_id", 0x2A)
        .expect("base BPM id");
    binding.write("prbs.ctl.lfsr_length", 20).expect("LFSR length");
    binding.write_flag("prbs.ctl.sp_distort_en", true).expect("enable");
    binding
        .write_fixed("prbs.sp_distort.ch[5].levels.level_1", -300.0)
        .expect("level");
    binding
        .write_region("prbs.bpm_pos_distort.distort_ram", &[7, 8, 9])
        .expect("distortion RAM");
}

#[test]
fn test_mmap_matches_simulated_bus() {
    let file = mapped_file(SYS_ID_SIZE);
    let mmap = MmapTransport::open(file.path())
        .expect("map file")
        .with_window(0x0, SYS_ID_SIZE);
    assert_eq!(mmap.transport_type(), TransportType::Mmap);
    let sim = SimulatedBus::new().with_window(0x0, SYS_ID_SIZE);
    let view = sim.clone();

    let cfg = BindConfig::new().with_version(REV_B);
    let resolver = VersionResolver::builtin().expect("built-in layouts");
    let on_file = resolver.bind(sys_id::KIND, 0x0, mmap, &cfg).expect("bind mmap");
    let on_sim = resolver.bind(sys_id::KIND, 0x0, sim, &cfg).expect("bind simulated");

    exercise(&on_file);
    exercise(&on_sim);

    // MAP_SHARED: the file sees every store while the mapping is alive
    let bytes = std::fs::read(file.path()).expect("read back");
    for (address, word) in (0..SYS_ID_SIZE).step_by(4).zip(bytes.chunks_exact(4)) {
        let word = u32::from_ne_bytes(word.try_into().expect("word"));
        assert_eq!(word, view.peek(address), "word {address:#x}");
    }
    assert_eq!(view.peek(0x1054), 0xFED4_0000);
    drop(on_file);
}

#[test]
fn test_mmap_window_checked_at_bind() {
    let file = mapped_file(0x1000);
    let mmap = MmapTransport::open(file.path())
        .expect("map file")
        .with_window(0x0, 0x1000);
    let result = VersionResolver::builtin().expect("built-in layouts").bind(
        processing::KIND,
        0x0,
        mmap,
        &BindConfig::new().with_version(REV_B),
    );
    assert!(matches!(
        result,
        Err(FofbError::Version(fofb_driver::VersionError::SizeMismatch { actual: 0x1000, .. }))
    ));
}

#[test]
fn test_mmap_persists_to_file() {
    let file = mapped_file(SYS_ID_SIZE);
    {
        let mmap = MmapTransport::open(file.path()).expect("map file");
        let binding = VersionResolver::builtin()
            .expect("built-in layouts")
            .bind(sys_id::KIND, 0x0, mmap, &BindConfig::new().with_version(REV_B))
            .expect("bind mmap");
        binding
            .write("prbs.ctl.step_duration", 3)
            .expect("step duration");
    }
    let bytes = std::fs::read(file.path()).expect("read back");
    assert_eq!(&bytes[0x1000..0x1004], &6u32.to_ne_bytes());
}
