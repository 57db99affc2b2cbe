//! Half-duplex command channel.
//!
//! A caller writes a short command token to toggle a unit, or sends a
//! `get_*` token and reads back a text snapshot. Each call is one register
//! operation or one snapshot read; nothing is pipelined.
//!
//! Input is validated before it is copied: tokens must be shorter than
//! `MAX_COMMAND_LEN` bytes and end at the first NUL. Responses are measured
//! before anything is written to the caller's buffer.

use core::fmt::{self, Write};

use log::warn;

use crate::abacus::device::{AbacusDevice, Mapper, Session};
use crate::abacus::{Snapshot, UnitKind};
use crate::{AbacusError, AbstractProfilingUnit, Result};

/// Command buffer size, terminator included.
pub const MAX_COMMAND_LEN: usize = 16;
/// Largest response the channel will produce.
pub const MAX_RESPONSE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    EnableIp,
    DisableIp,
    EnableCp,
    DisableCp,
    EnableSu,
    DisableSu,
    GetIpStats,
    GetIcpStats,
    GetDcpStats,
    GetSuStats,
}

/// What a command asks of the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Toggle { unit: UnitKind, enable: bool },
    Query(UnitKind),
}

struct Entry {
    token: &'static str,
    command: Command,
    help: &'static str,
}

const fn entry(token: &'static str, command: Command, help: &'static str) -> Entry {
    Entry { token, command, help }
}

static COMMAND_TABLE: [Entry; 14] = [
    entry("enable_ip", Command::EnableIp, "Enable instruction profiling"),
    entry("disable_ip", Command::DisableIp, "Disable instruction profiling"),
    entry("get_ip_stats", Command::GetIpStats, "Show instruction profiling stats"),
    entry("enable_cp", Command::EnableCp, "Enable cache profiling (both caches)"),
    entry("disable_cp", Command::DisableCp, "Disable cache profiling (both caches)"),
    entry("enable_icp", Command::EnableCp, "Same as enable_cp"),
    entry("disable_icp", Command::DisableCp, "Same as disable_cp"),
    entry("get_icp_stats", Command::GetIcpStats, "Show instruction cache profiling stats"),
    entry("enable_dcp", Command::EnableCp, "Same as enable_cp"),
    entry("disable_dcp", Command::DisableCp, "Same as disable_cp"),
    entry("get_dcp_stats", Command::GetDcpStats, "Show data cache profiling stats"),
    entry("enable_su", Command::EnableSu, "Enable the stall unit profiler"),
    entry("disable_su", Command::DisableSu, "Disable the stall unit profiler"),
    entry("get_su_stats", Command::GetSuStats, "Show stall unit stats"),
];

impl Command {
    /// Parse a raw command token.
    ///
    /// Input of `MAX_COMMAND_LEN` bytes or more is rejected before it is
    /// copied. The token ends at the first NUL; a single trailing newline is
    /// dropped so `echo` works.
    pub fn parse(raw: &[u8]) -> Result<Command> {
        if raw.len() >= MAX_COMMAND_LEN {
            return Err(AbacusError::BufferOverflow);
        }
        let mut buf = [0u8; MAX_COMMAND_LEN];
        buf[..raw.len()].copy_from_slice(raw);
        buf[raw.len()] = 0;

        let end = buf.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let mut token = &buf[..end];
        if let [rest @ .., b'\n'] = token {
            token = rest;
        }
        COMMAND_TABLE
            .iter()
            .find(|e| e.token.as_bytes() == token)
            .map(|e| e.command)
            .ok_or(AbacusError::UnknownCommand)
    }

    pub fn intent(&self) -> Intent {
        use Command::*;
        match self {
            EnableIp => Intent::Toggle { unit: UnitKind::InstructionProfile, enable: true },
            DisableIp => Intent::Toggle { unit: UnitKind::InstructionProfile, enable: false },
            EnableCp => Intent::Toggle { unit: UnitKind::InstructionCache, enable: true },
            DisableCp => Intent::Toggle { unit: UnitKind::InstructionCache, enable: false },
            EnableSu => Intent::Toggle { unit: UnitKind::StallUnit, enable: true },
            DisableSu => Intent::Toggle { unit: UnitKind::StallUnit, enable: false },
            GetIpStats => Intent::Query(UnitKind::InstructionProfile),
            GetIcpStats => Intent::Query(UnitKind::InstructionCache),
            GetDcpStats => Intent::Query(UnitKind::DataCache),
            GetSuStats => Intent::Query(UnitKind::StallUnit),
        }
    }

    /// Canonical token, the first table entry for the command.
    pub fn token(&self) -> &'static str {
        COMMAND_TABLE
            .iter()
            .find(|e| e.command == *self)
            .map_or("", |e| e.token)
    }
}

/// Every accepted token with a one-line description.
pub fn help() -> impl Iterator<Item = (&'static str, &'static str)> {
    COMMAND_TABLE.iter().map(|e| (e.token, e.help))
}

/// Result of a toggle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub command: Command,
    pub unit: UnitKind,
    /// Set when the same enable line also gates another unit.
    pub also_gated: Option<UnitKind>,
    pub enabled: bool,
    /// Whether the enable register read back as written.
    pub verified: bool,
}

struct LenCounter(usize);

impl Write for LenCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Write for SliceWriter<'a> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.pos + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.pos..end].copy_from_slice(s.as_bytes());
        self.pos = end;
        Ok(())
    }
}

/// Format `snapshot` into `out` followed by a NUL.
///
/// Returns the text length, terminator excluded. If the text and its
/// terminator do not fit in `min(out.len(), MAX_RESPONSE_LEN)` bytes the call
/// fails with `BufferOverflow` and `out` is left untouched.
pub fn render(snapshot: &Snapshot, out: &mut [u8]) -> Result<usize> {
    let mut len = LenCounter(0);
    write!(len, "{}", snapshot).map_err(|_| AbacusError::BufferOverflow)?;

    let cap = out.len().min(MAX_RESPONSE_LEN);
    if len.0 + 1 > cap {
        return Err(AbacusError::BufferOverflow);
    }
    let mut w = SliceWriter { buf: &mut out[..cap], pos: 0 };
    write!(w, "{}", snapshot).map_err(|_| AbacusError::BufferOverflow)?;
    let n = w.pos;
    out[n] = 0;
    Ok(n)
}

/// The byte-stream face of one ABACUS device.
pub struct CommandProtocol<'d, M: Mapper> {
    device: &'d AbacusDevice<M>,
    session: Option<Session<'d, M>>,
}

impl<'d, M: Mapper> CommandProtocol<'d, M> {
    pub fn new(device: &'d AbacusDevice<M>) -> CommandProtocol<'d, M> {
        CommandProtocol { device, session: None }
    }

    pub fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(AbacusError::Busy);
        }
        self.session = Some(self.device.open()?);
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.is_open())
    }

    fn session(&self) -> Result<&Session<'d, M>> {
        self.session
            .as_ref()
            .filter(|s| s.is_open())
            .ok_or(AbacusError::NotOpen)
    }

    fn parse(raw: &[u8]) -> Result<Command> {
        Command::parse(raw).map_err(|e| {
            warn!("abacus: rejected command ({})", e);
            e
        })
    }

    /// Run a toggle command.
    pub fn submit(&mut self, raw: &[u8]) -> Result<Ack> {
        let session = self.session()?;
        let command = Self::parse(raw)?;
        let (kind, enable) = match command.intent() {
            Intent::Toggle { unit, enable } => (unit, enable),
            Intent::Query(_) => {
                warn!("abacus: {} is not a write command", command.token());
                return Err(AbacusError::UnknownCommand);
            }
        };
        let unit = session.unit(kind)?;
        let verified = if enable { unit.enable()? } else { unit.disable()? };
        let (unit, also_gated) = unit.gated_units();
        Ok(Ack { command, unit, also_gated, enabled: enable, verified })
    }

    /// Run a `get_*` command and return the snapshot.
    pub fn query(&mut self, raw: &[u8]) -> Result<Snapshot> {
        let session = self.session()?;
        let command = Self::parse(raw)?;
        let kind = match command.intent() {
            Intent::Query(unit) => unit,
            Intent::Toggle { .. } => {
                warn!("abacus: {} is not a read command", command.token());
                return Err(AbacusError::UnknownCommand);
            }
        };
        session.unit(kind)?.snapshot()
    }

    /// Character-device write: run a toggle command, report bytes consumed.
    pub fn write(&mut self, raw: &[u8]) -> Result<usize> {
        self.submit(raw)?;
        Ok(raw.len())
    }

    /// Character-device read: run a `get_*` command and render the snapshot
    /// into `out`.
    pub fn read_into(&mut self, raw: &[u8], out: &mut [u8]) -> Result<usize> {
        let snapshot = self.query(raw)?;
        render(&snapshot, out)
    }
}
