//! Host-side model of the ABACUS register file.
//!
//! Behaves like the hardware as far as software can tell: enable registers
//! hold a single bit, counters ignore software writes and only count while
//! their enable line is set. Every access is counted so callers can check
//! what touched the bus.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use spin::Mutex;

use crate::abacus::device::{Mapper, RegisterWindow};
use crate::abacus::regmap::{self, RegisterMap};
use crate::abacus::UnitKind;
use crate::config::ABACUS_WINDOW_LEN;

const WORDS: usize = ABACUS_WINDOW_LEN / 4;

fn is_enable_register(offset: usize) -> bool {
    matches!(
        offset,
        regmap::INSTRUCTION_PROFILE_UNIT_ENABLE
            | regmap::CACHE_PROFILE_UNIT_ENABLE
            | regmap::STALL_UNIT_ENABLE
    )
}

pub struct SimulatedAbacus {
    regs: Mutex<[u32; WORDS]>,
    /// Bit `offset / 4` set: writes to that enable register are dropped.
    jammed: AtomicU32,
    reads: AtomicUsize,
    writes: AtomicUsize,
    maps: AtomicUsize,
    unmaps: AtomicUsize,
}

impl SimulatedAbacus {
    /// A freshly reset peripheral: everything disabled, every counter zero.
    pub const fn new() -> SimulatedAbacus {
        SimulatedAbacus {
            regs: Mutex::new([0; WORDS]),
            jammed: AtomicU32::new(0),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            maps: AtomicUsize::new(0),
            unmaps: AtomicUsize::new(0),
        }
    }

    pub fn mapper(&self) -> SimMapper<'_> {
        SimMapper { sim: self, fail: false }
    }

    /// A mapper that behaves like an exhausted `ioremap`.
    pub fn failing_mapper(&self) -> SimMapper<'_> {
        SimMapper { sim: self, fail: true }
    }

    /// Count `delta` events on a counter. Returns whether the unit was
    /// enabled and the event was counted.
    pub fn advance(&self, unit: UnitKind, counter: &str, delta: u32) -> bool {
        let map = RegisterMap::new(0);
        let Ok(offset) = map.offset_of(unit, counter) else {
            return false;
        };
        let mut regs = self.regs.lock();
        if regs[map.enable_offset(unit) / 4] & 1 == 0 {
            return false;
        }
        let slot = &mut regs[offset / 4];
        *slot = slot.wrapping_add(delta);
        true
    }

    /// Force a register value from the hardware side.
    pub fn set(&self, offset: usize, value: u32) {
        self.regs.lock()[offset / 4] = value;
    }

    /// Read a register without going through the bus.
    pub fn peek(&self, offset: usize) -> u32 {
        self.regs.lock()[offset / 4]
    }

    /// Make an enable register ignore every further write.
    pub fn jam(&self, offset: usize) {
        self.jammed.fetch_or(1 << (offset / 4), Ordering::Relaxed);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn maps(&self) -> usize {
        self.maps.load(Ordering::Relaxed)
    }

    pub fn unmaps(&self) -> usize {
        self.unmaps.load(Ordering::Relaxed)
    }

    pub fn is_mapped(&self) -> bool {
        self.maps() > self.unmaps()
    }
}

impl Default for SimulatedAbacus {
    fn default() -> Self {
        SimulatedAbacus::new()
    }
}

pub struct SimWindow<'a> {
    sim: &'a SimulatedAbacus,
    len: usize,
}

impl<'a> RegisterWindow for SimWindow<'a> {
    fn len(&self) -> usize {
        self.len
    }

    unsafe fn read32(&self, offset: usize) -> u32 {
        self.sim.reads.fetch_add(1, Ordering::Relaxed);
        self.sim.regs.lock()[offset / 4]
    }

    unsafe fn write32(&self, offset: usize, value: u32) {
        self.sim.writes.fetch_add(1, Ordering::Relaxed);
        if !is_enable_register(offset) {
            return;
        }
        if self.sim.jammed.load(Ordering::Relaxed) & (1 << (offset / 4)) != 0 {
            return;
        }
        self.sim.regs.lock()[offset / 4] = value & 1;
    }
}

pub struct SimMapper<'a> {
    sim: &'a SimulatedAbacus,
    fail: bool,
}

// Windows are backed by the simulated register file, never by raw memory.
unsafe impl<'a> Mapper for SimMapper<'a> {
    type Window = SimWindow<'a>;

    fn map(&mut self, _phys: u64, len: usize) -> Option<SimWindow<'a>> {
        if self.fail {
            return None;
        }
        self.sim.maps.fetch_add(1, Ordering::Relaxed);
        Some(SimWindow { sim: self.sim, len: len.min(ABACUS_WINDOW_LEN) })
    }

    fn unmap(&mut self, _window: SimWindow<'a>) {
        self.sim.unmaps.fetch_add(1, Ordering::Relaxed);
    }
}
