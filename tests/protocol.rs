//! End-to-end command channel scenarios against the simulated peripheral.

use abacus_perfcnt::abacus::UnitSet;
use abacus_perfcnt::protocol::{Ack, MAX_RESPONSE_LEN};
use abacus_perfcnt::sim::SimulatedAbacus;
use abacus_perfcnt::{AbacusConfig, AbacusDevice, AbacusError, Command, CommandProtocol, UnitKind};

const IP_ENABLE: usize = 0x04;
const CP_ENABLE: usize = 0x08;
const SU_ENABLE: usize = 0x0C;

fn enables(sim: &SimulatedAbacus) -> [u32; 3] {
    [sim.peek(IP_ENABLE), sim.peek(CP_ENABLE), sim.peek(SU_ENABLE)]
}

#[test]
fn fresh_session_reads_zeroed_ip_counters() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();

    let ack = chan.submit(b"enable_ip\0").unwrap();
    assert!(ack.verified);
    assert_eq!(sim.peek(IP_ENABLE), 1);

    let snap = chan.query(b"get_ip_stats\0").unwrap();
    assert_eq!(snap.counters().count(), 8);
    assert!(snap.counters().all(|(_, v)| v == 0));

    let mut out = [0u8; MAX_RESPONSE_LEN];
    let n = chan.read_into(b"get_ip_stats", &mut out).unwrap();
    let text = std::str::from_utf8(&out[..n]).unwrap();
    assert_eq!(
        text,
        "Load Word: 0\nStore Word: 0\nAddition: 0\nSubtraction: 0\n\
         Branches: 0\nJumps: 0\nSystem Privilege: 0\nAtomic: 0\n"
    );

    assert!(chan.submit(b"disable_ip\0").unwrap().verified);
    assert_eq!(sim.peek(IP_ENABLE), 0);

    chan.close();
    assert!(!sim.is_mapped());
    assert_eq!(chan.query(b"get_ip_stats"), Err(AbacusError::NotOpen));
    assert_eq!(chan.submit(b"enable_ip"), Err(AbacusError::NotOpen));
}

#[test]
fn dispatch_is_idempotent() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();

    let first = chan.submit(b"enable_su").unwrap();
    let second = chan.submit(b"enable_su").unwrap();
    assert_eq!(first, second);
    assert_eq!(sim.writes(), 2);

    sim.advance(UnitKind::StallUnit, "branch_misprediction", 4);
    let a = chan.query(b"get_su_stats").unwrap();
    let b = chan.query(b"get_su_stats").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.get("branch_misprediction"), Some(4));
    assert_eq!(sim.writes(), 2);
}

#[test]
fn cache_toggle_reports_shared_line() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();

    let ack = chan.submit(b"enable_dcp").unwrap();
    assert_eq!(
        ack,
        Ack {
            command: Command::EnableCp,
            unit: UnitKind::InstructionCache,
            also_gated: Some(UnitKind::DataCache),
            enabled: true,
            verified: true,
        }
    );
    assert_eq!(enables(&sim), [0, 1, 0]);

    assert!(sim.advance(UnitKind::InstructionCache, "request", 10));
    assert!(sim.advance(UnitKind::InstructionCache, "line_fill_latency", 250));
    assert!(sim.advance(UnitKind::DataCache, "hit", 3));

    let icp = chan.query(b"get_icp_stats").unwrap();
    assert_eq!(icp.average_fill_latency(), Some(25));
    let dcp = chan.query(b"get_dcp_stats").unwrap();
    assert_eq!(dcp.get("hit"), Some(3));
    assert_eq!(dcp.average_fill_latency(), None);

    let mut out = [0u8; 512];
    let n = chan.read_into(b"get_dcp_stats", &mut out).unwrap();
    let text = std::str::from_utf8(&out[..n]).unwrap();
    assert!(text.contains("DCache Hits: 3\n"));
    assert!(text.ends_with("Average Line Fill Latency: no data\n"));

    chan.submit(b"disable_icp").unwrap();
    assert_eq!(enables(&sim), [0, 0, 0]);
}

#[test]
fn enable_then_disable_leaves_register_clear() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();
    for (on, off) in [
        ("enable_ip", "disable_ip"),
        ("enable_cp", "disable_cp"),
        ("enable_su", "disable_su"),
    ] {
        assert!(chan.submit(on.as_bytes()).unwrap().verified);
        assert!(chan.submit(off.as_bytes()).unwrap().verified);
    }
    assert_eq!(enables(&sim), [0, 0, 0]);
}

#[test]
fn rejected_input_touches_nothing() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();
    chan.submit(b"enable_ip").unwrap();
    let (reads, writes) = (sim.reads(), sim.writes());

    assert_eq!(chan.submit(b"frobnicate"), Err(AbacusError::UnknownCommand));
    assert_eq!(
        chan.submit(b"enable_ip_please_now"),
        Err(AbacusError::BufferOverflow)
    );
    assert_eq!(chan.submit(b"get_ip_stats"), Err(AbacusError::UnknownCommand));
    assert_eq!(chan.query(b"enable_su"), Err(AbacusError::UnknownCommand));

    let mut out = [0x55u8; 64];
    assert_eq!(
        chan.read_into(b"frobnicate\0", &mut out),
        Err(AbacusError::UnknownCommand)
    );
    assert!(out.iter().all(|&b| b == 0x55));

    assert_eq!((sim.reads(), sim.writes()), (reads, writes));
    assert_eq!(enables(&sim), [1, 0, 0]);
}

#[test]
fn closed_channel_reports_not_open_first() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    assert_eq!(chan.submit(b"frobnicate"), Err(AbacusError::NotOpen));
    assert_eq!(chan.submit(b"get_ip_stats"), Err(AbacusError::NotOpen));
    assert_eq!(chan.query(b"enable_ip"), Err(AbacusError::NotOpen));
    assert_eq!(chan.submit(b"enable_ip_please_now"), Err(AbacusError::NotOpen));
    let mut out = [0u8; 64];
    assert_eq!(chan.read_into(b"frobnicate", &mut out), Err(AbacusError::NotOpen));

    chan.open().unwrap();
    chan.close();
    assert_eq!(chan.submit(b"frobnicate"), Err(AbacusError::NotOpen));
    assert_eq!(sim.reads() + sim.writes(), 0);
}

#[test]
fn small_output_buffer_is_rejected_before_write() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();

    let mut out = [0x55u8; 40];
    assert_eq!(
        chan.read_into(b"get_su_stats", &mut out),
        Err(AbacusError::BufferOverflow)
    );
    assert!(out.iter().all(|&b| b == 0x55));
}

#[test]
fn second_open_is_busy() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut a = CommandProtocol::new(&dev);
    let mut b = CommandProtocol::new(&dev);
    a.open().unwrap();
    assert_eq!(b.open(), Err(AbacusError::Busy));
    assert_eq!(a.open(), Err(AbacusError::Busy));
    a.close();
    assert!(b.open().is_ok());
    assert!(b.is_open());
}

#[test]
fn map_failure_surfaces_at_open() {
    let sim = SimulatedAbacus::new();
    let dev = AbacusDevice::new(sim.failing_mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    assert_eq!(chan.open(), Err(AbacusError::MapFailure));
    assert!(!chan.is_open());
    assert_eq!(chan.submit(b"enable_ip"), Err(AbacusError::NotOpen));
}

#[test]
fn absent_units_are_refused() {
    let sim = SimulatedAbacus::new();
    let cfg = AbacusConfig::DEFAULT.with_units(UnitSet::INSTRUCTION_PROFILE | UnitSet::CACHE);
    let dev = AbacusDevice::new(sim.mapper(), cfg);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();
    assert_eq!(chan.submit(b"enable_su"), Err(AbacusError::UnitAbsent));
    assert_eq!(chan.query(b"get_su_stats"), Err(AbacusError::UnitAbsent));
    assert_eq!(sim.peek(SU_ENABLE), 0);
    assert_eq!(chan.write(b"enable_cp\0"), Ok(10));
}

#[test]
fn jammed_enable_is_not_verified() {
    let sim = SimulatedAbacus::new();
    sim.jam(IP_ENABLE);
    let dev = AbacusDevice::new(sim.mapper(), AbacusConfig::DEFAULT);
    let mut chan = CommandProtocol::new(&dev);
    chan.open().unwrap();
    let ack = chan.submit(b"enable_ip").unwrap();
    assert!(ack.enabled);
    assert!(!ack.verified);
}
