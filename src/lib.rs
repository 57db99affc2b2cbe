#![cfg_attr(not(test), no_std)]

pub mod abacus;
pub mod config;
pub mod protocol;
pub mod sim;

pub use crate::abacus::{ProfilingUnit, Snapshot, UnitKind, UnitSet};
pub use crate::abacus::device::{abacus_device, AbacusDevice, Session};
pub use crate::config::AbacusConfig;
pub use crate::protocol::{Command, CommandProtocol};

use core::fmt;

/// Abstract trait to control a profiling unit.
pub trait AbstractProfilingUnit {
    /// Start counting. Returns whether the enable register reads back as set.
    fn enable(&self) -> Result<bool>;

    /// Stop counting. Returns whether the enable register reads back as clear.
    fn disable(&self) -> Result<bool>;

    /// Read the unit's enable line.
    fn is_enabled(&self) -> Result<bool>;

    /// Read every counter of the unit. Never writes a register.
    fn snapshot(&self) -> Result<Snapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbacusError {
    UnknownRegister,
    UnknownCommand,
    MapFailure,
    NotOpen,
    BufferOverflow,
    Busy,
    /// The unit was not synthesized into this bitstream.
    UnitAbsent,
}

const EINVAL: i32 = 22;
const ENOMEM: i32 = 12;
const EBADF: i32 = 9;
const EBUSY: i32 = 16;

impl AbacusError {
    /// Negative errno for character-device glue.
    pub fn errno(&self) -> i32 {
        match self {
            AbacusError::UnknownRegister
            | AbacusError::UnknownCommand
            | AbacusError::BufferOverflow
            | AbacusError::UnitAbsent => -EINVAL,
            AbacusError::MapFailure => -ENOMEM,
            AbacusError::NotOpen => -EBADF,
            AbacusError::Busy => -EBUSY,
        }
    }
}

impl fmt::Display for AbacusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AbacusError::UnknownRegister => "unknown register",
            AbacusError::UnknownCommand => "unknown command",
            AbacusError::MapFailure => "could not map the abacus register region",
            AbacusError::NotOpen => "device is not open",
            AbacusError::BufferOverflow => "buffer too small",
            AbacusError::Busy => "device already open",
            AbacusError::UnitAbsent => "profiling unit not present",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, AbacusError>;
