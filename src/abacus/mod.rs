use core::fmt;

use bitflags::bitflags;
use log::{debug, warn};
use spin::Mutex;

use crate::AbstractProfilingUnit;
use crate::Result;

pub mod device;
pub mod regmap;

use device::RegisterWindow;
use regmap::{CounterDesc, RegisterMap, MAX_COUNTERS};

pub const ENABLE: u32 = 0x1;
pub const DISABLE: u32 = 0x0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    InstructionProfile,
    InstructionCache,
    DataCache,
    StallUnit,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::InstructionProfile,
        UnitKind::InstructionCache,
        UnitKind::DataCache,
        UnitKind::StallUnit,
    ];

    /// Short name used in command tokens (`ip`, `icp`, `dcp`, `su`).
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::InstructionProfile => "ip",
            UnitKind::InstructionCache => "icp",
            UnitKind::DataCache => "dcp",
            UnitKind::StallUnit => "su",
        }
    }

    /// The instruction and data caches are gated by a single enable line in
    /// hardware. Toggling one toggles the other.
    pub fn shares_enable_with(&self) -> Option<UnitKind> {
        match self {
            UnitKind::InstructionCache => Some(UnitKind::DataCache),
            UnitKind::DataCache => Some(UnitKind::InstructionCache),
            _ => None,
        }
    }

    /// The synthesis flag this unit depends on.
    pub fn required(&self) -> UnitSet {
        match self {
            UnitKind::InstructionProfile => UnitSet::INSTRUCTION_PROFILE,
            UnitKind::InstructionCache | UnitKind::DataCache => UnitSet::CACHE,
            UnitKind::StallUnit => UnitSet::STALL_UNIT,
        }
    }
}

bitflags! {
    /// Profilers present in the bitstream, or enable lines currently set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UnitSet: u8 {
        const INSTRUCTION_PROFILE = 1 << 0;
        /// Both caches; they cannot be synthesized or enabled separately.
        const CACHE = 1 << 1;
        const STALL_UNIT = 1 << 2;
    }
}

/// A value computed from counters rather than read from a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    pub label: &'static str,
    /// `None` when the inputs hold no data yet.
    pub value: Option<u32>,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{}: {}", self.label, v),
            None => write!(f, "{}: no data", self.label),
        }
    }
}

/// Average clock cycles spent refilling a line; `None` before any request.
pub fn average_fill_latency(line_fill_latency: u32, requests: u32) -> Option<u32> {
    line_fill_latency.checked_div(requests)
}

/// Point-in-time read of every counter in one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    unit: UnitKind,
    values: [u32; MAX_COUNTERS],
}

impl Snapshot {
    /// Builds a snapshot from counter values in register-map order.
    /// Missing trailing values read as zero and extra values are dropped.
    pub fn from_values(unit: UnitKind, values: &[u32]) -> Snapshot {
        let mut v = [0; MAX_COUNTERS];
        let n = values.len().min(regmap::counters_of(unit).len());
        v[..n].copy_from_slice(&values[..n]);
        Snapshot { unit, values: v }
    }

    pub fn unit(&self) -> UnitKind {
        self.unit
    }

    pub fn counters(&self) -> impl Iterator<Item = (&'static CounterDesc, u32)> + '_ {
        regmap::counters_of(self.unit)
            .iter()
            .zip(self.values.iter().copied())
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.counters().find(|(c, _)| c.name == name).map(|(_, v)| v)
    }

    pub fn average_fill_latency(&self) -> Option<u32> {
        let requests = self.get("request")?;
        let latency = self.get("line_fill_latency")?;
        average_fill_latency(latency, requests)
    }

    pub fn metrics(&self) -> impl Iterator<Item = Metric> {
        let fill = match self.unit {
            UnitKind::InstructionCache | UnitKind::DataCache => Some(Metric {
                label: "Average Line Fill Latency",
                value: self.average_fill_latency(),
            }),
            _ => None,
        };
        fill.into_iter()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (c, v) in self.counters() {
            writeln!(f, "{}: {}", c.label, v)?;
        }
        for m in self.metrics() {
            writeln!(f, "{}", m)?;
        }
        Ok(())
    }
}

/// One profiling unit, reachable only through an open session.
pub struct ProfilingUnit<'s, W: RegisterWindow> {
    kind: UnitKind,
    map: RegisterMap,
    regs: &'s W,
    lock: &'s Mutex<()>,
}

impl<'s, W: RegisterWindow> ProfilingUnit<'s, W> {
    pub(crate) fn new(kind: UnitKind, map: RegisterMap, regs: &'s W, lock: &'s Mutex<()>) -> Self {
        ProfilingUnit { kind, map, regs, lock }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Units whose counters this unit's enable line gates.
    pub fn gated_units(&self) -> (UnitKind, Option<UnitKind>) {
        (self.kind, self.kind.shares_enable_with())
    }

    pub fn read_counter(&self, name: &str) -> Result<u32> {
        let offset = self.map.offset_of(self.kind, name)?;
        self.regs.read(offset)
    }

    fn set_enable(&self, value: u32) -> Result<bool> {
        let offset = self.map.enable_offset(self.kind);
        let _guard = self.lock.lock();
        self.regs.write(offset, value)?;
        let readback = self.regs.read(offset)?;
        let ok = readback == value;
        if ok {
            debug!("abacus: {} enable <- {:#x}", self.kind.name(), value);
        } else {
            warn!(
                "abacus: {} enable readback {:#x}, wrote {:#x}",
                self.kind.name(),
                readback,
                value
            );
        }
        Ok(ok)
    }
}

impl<'s, W: RegisterWindow> AbstractProfilingUnit for ProfilingUnit<'s, W> {
    fn enable(&self) -> Result<bool> {
        self.set_enable(ENABLE)
    }

    fn disable(&self) -> Result<bool> {
        self.set_enable(DISABLE)
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(self.regs.read(self.map.enable_offset(self.kind))? == ENABLE)
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let mut values = [0; MAX_COUNTERS];
        for (slot, c) in values.iter_mut().zip(self.map.counters(self.kind)) {
            *slot = self.regs.read(c.offset)?;
        }
        debug!("abacus: read the {} unit", self.kind.name());
        Ok(Snapshot { unit: self.kind, values })
    }
}
