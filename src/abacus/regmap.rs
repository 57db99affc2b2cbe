//! Register layout of the ABACUS peripheral.
//!
//! Offsets are relative to the peripheral base and are the hardware's bus
//! contract. Every register is 32 bits wide and word aligned.
//!
//! ```text
//! 0x004        instruction profile enable
//! 0x008        cache profile enable (icache and dcache share it)
//! 0x00C        stall unit enable
//! 0x100-0x11C  instruction profile counters
//! 0x200-0x20C  icache counters
//! 0x210-0x21C  dcache counters
//! 0x300-0x320  stall unit counters
//! ```

use core::ops::Range;

use super::UnitKind;
use crate::{AbacusError, Result};

pub const INSTRUCTION_PROFILE_UNIT_ENABLE: usize = 0x04;
pub const CACHE_PROFILE_UNIT_ENABLE: usize = 0x08;
pub const STALL_UNIT_ENABLE: usize = 0x0C;

pub const INSTRUCTION_PROFILE_UNIT_BASE: usize = 0x100;
pub const CACHE_PROFILE_UNIT_BASE: usize = 0x200;
pub const STALL_UNIT_BASE: usize = 0x300;

/// Largest counter list of any unit (the stall unit).
pub const MAX_COUNTERS: usize = 9;

/// One past the last register the map describes.
pub const REGISTER_SPAN: usize = STALL_UNIT_BASE + 0x24;

/// A named, read-only event counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDesc {
    /// Stable identifier used for lookups.
    pub name: &'static str,
    /// Human-readable label used in snapshots.
    pub label: &'static str,
    pub offset: usize,
}

const fn counter(name: &'static str, label: &'static str, offset: usize) -> CounterDesc {
    CounterDesc { name, label, offset }
}

const IP: usize = INSTRUCTION_PROFILE_UNIT_BASE;
const IC: usize = CACHE_PROFILE_UNIT_BASE;
const DC: usize = CACHE_PROFILE_UNIT_BASE + 0x10;
const SU: usize = STALL_UNIT_BASE;

static INSTRUCTION_PROFILE_COUNTERS: [CounterDesc; 8] = [
    counter("load_word", "Load Word", IP),
    counter("store_word", "Store Word", IP + 0x04),
    counter("addition", "Addition", IP + 0x08),
    counter("subtraction", "Subtraction", IP + 0x0C),
    counter("branch", "Branches", IP + 0x10),
    counter("jump", "Jumps", IP + 0x14),
    counter("system_privilege", "System Privilege", IP + 0x18),
    counter("atomic", "Atomic", IP + 0x1C),
];

static ICACHE_COUNTERS: [CounterDesc; 4] = [
    counter("request", "ICache Requests", IC),
    counter("hit", "ICache Hits", IC + 0x04),
    counter("miss", "ICache Misses", IC + 0x08),
    counter("line_fill_latency", "ICache Line Fill Latency Count", IC + 0x0C),
];

static DCACHE_COUNTERS: [CounterDesc; 4] = [
    counter("request", "DCache Requests", DC),
    counter("hit", "DCache Hits", DC + 0x04),
    counter("miss", "DCache Misses", DC + 0x08),
    counter("line_fill_latency", "DCache Line Fill Latency Count", DC + 0x0C),
];

static STALL_UNIT_COUNTERS: [CounterDesc; MAX_COUNTERS] = [
    counter("branch_misprediction", "Branch Mispredictions", SU),
    counter("ras_misprediction", "RAS Mispredictions", SU + 0x04),
    counter("issue_no_instruction", "Issue No Instruction", SU + 0x08),
    counter("issue_no_id", "Issue No ID", SU + 0x0C),
    counter("issue_flush", "Issue Flush", SU + 0x10),
    counter("issue_unit_busy", "Issue Unit Busy", SU + 0x14),
    counter("issue_operands_not_ready", "Issue Operands Not Ready", SU + 0x18),
    counter("issue_hold", "Issue Hold", SU + 0x1C),
    counter("issue_multi_source", "Issue Multi Source", SU + 0x20),
];

/// Counters of `unit`, in the order snapshots read them.
pub fn counters_of(unit: UnitKind) -> &'static [CounterDesc] {
    match unit {
        UnitKind::InstructionProfile => &INSTRUCTION_PROFILE_COUNTERS,
        UnitKind::InstructionCache => &ICACHE_COUNTERS,
        UnitKind::DataCache => &DCACHE_COUNTERS,
        UnitKind::StallUnit => &STALL_UNIT_COUNTERS,
    }
}

/// Immutable description of where every register sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    base: u64,
}

impl RegisterMap {
    pub const fn new(base: u64) -> RegisterMap {
        RegisterMap { base }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn enable_offset(&self, unit: UnitKind) -> usize {
        match unit {
            UnitKind::InstructionProfile => INSTRUCTION_PROFILE_UNIT_ENABLE,
            UnitKind::InstructionCache | UnitKind::DataCache => CACHE_PROFILE_UNIT_ENABLE,
            UnitKind::StallUnit => STALL_UNIT_ENABLE,
        }
    }

    pub fn counters(&self, unit: UnitKind) -> &'static [CounterDesc] {
        counters_of(unit)
    }

    /// Address range owned by `unit`'s counters.
    pub fn unit_window(&self, unit: UnitKind) -> Range<usize> {
        match unit {
            UnitKind::InstructionProfile => IP..IP + 0x100,
            UnitKind::InstructionCache => IC..IC + 0x10,
            UnitKind::DataCache => DC..DC + 0x10,
            UnitKind::StallUnit => SU..SU + 0x100,
        }
    }

    pub fn offset_of(&self, unit: UnitKind, counter: &str) -> Result<usize> {
        self.counters(unit)
            .iter()
            .find(|c| c.name == counter)
            .map(|c| c.offset)
            .ok_or(AbacusError::UnknownRegister)
    }

    pub fn physical_address(&self, offset: usize) -> u64 {
        self.base + offset as u64
    }

    /// Checks that every counter offset is word aligned, unique within its
    /// unit, inside the unit's window, and clear of the enable registers.
    pub fn validate(&self) -> Result<()> {
        for unit in UnitKind::ALL {
            let window = self.unit_window(unit);
            let counters = self.counters(unit);
            if counters.len() > MAX_COUNTERS {
                return Err(AbacusError::UnknownRegister);
            }
            for (i, c) in counters.iter().enumerate() {
                if c.offset % 4 != 0 || !window.contains(&c.offset) || c.offset >= REGISTER_SPAN {
                    return Err(AbacusError::UnknownRegister);
                }
                if counters[..i].iter().any(|p| p.offset == c.offset || p.name == c.name) {
                    return Err(AbacusError::UnknownRegister);
                }
            }
            if window.contains(&self.enable_offset(unit)) {
                return Err(AbacusError::UnknownRegister);
            }
        }
        Ok(())
    }
}
