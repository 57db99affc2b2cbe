//! Where the peripheral lives and what was synthesized into it.
//!
//! The defaults match the CVA5 SoC: ABACUS sits on the wishbone bus at
//! `0xF003_0000` with a `0x1000` byte window and all three profilers included.

use crate::abacus::regmap::REGISTER_SPAN;
use crate::abacus::UnitSet;
use crate::{AbacusError, Result};

pub const ABACUS_BASE_ADDR: u64 = 0xF003_0000;
pub const ABACUS_WINDOW_LEN: usize = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbacusConfig {
    pub base: u64,
    pub window_len: usize,
    pub units: UnitSet,
}

impl AbacusConfig {
    pub const DEFAULT: AbacusConfig = AbacusConfig {
        base: ABACUS_BASE_ADDR,
        window_len: ABACUS_WINDOW_LEN,
        units: UnitSet::all(),
    };

    pub const fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub const fn with_window_len(mut self, window_len: usize) -> Self {
        self.window_len = window_len;
        self
    }

    /// Mirrors the `INCLUDE_*` parameters of the HDL top level.
    pub const fn with_units(mut self, units: UnitSet) -> Self {
        self.units = units;
        self
    }

    /// A window that cannot hold every register, or a base that is not
    /// word aligned, can never be mapped.
    pub fn validate(&self) -> Result<()> {
        if self.window_len < REGISTER_SPAN || self.base % 4 != 0 {
            return Err(AbacusError::MapFailure);
        }
        Ok(())
    }
}

impl Default for AbacusConfig {
    fn default() -> Self {
        AbacusConfig::DEFAULT
    }
}
