//! The ABACUS device and its open sessions.
//!
//! A device owns the mapper for the physical register region. Opening it maps
//! the region and hands out a `Session`; closing or dropping the session
//! unmaps it again. Only one session may be open per device at a time.
//!
//! Bare-metal firmware can use the global device returned by
//! `abacus_device()`, which maps the region one to one.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use spin::Mutex;

use super::regmap::{RegisterMap, REGISTER_SPAN};
use super::{ProfilingUnit, UnitKind, UnitSet};
use crate::config::AbacusConfig;
use crate::{AbacusError, AbstractProfilingUnit, Result};

/// A mapped view of the register region.
pub trait RegisterWindow {
    /// Length of the mapping in bytes.
    fn len(&self) -> usize;

    /// # Safety
    ///
    /// `offset` must be word aligned and `offset + 4 <= self.len()`.
    unsafe fn read32(&self, offset: usize) -> u32;

    /// # Safety
    ///
    /// `offset` must be word aligned and `offset + 4 <= self.len()`.
    unsafe fn write32(&self, offset: usize, value: u32);

    fn check(&self, offset: usize) -> Result<()> {
        match offset.checked_add(4) {
            Some(end) if offset % 4 == 0 && end <= self.len() => Ok(()),
            _ => Err(AbacusError::UnknownRegister),
        }
    }

    fn read(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;
        Ok(unsafe { self.read32(offset) })
    }

    fn write(&self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;
        unsafe { self.write32(offset, value) };
        Ok(())
    }
}

/// Acquires and releases the physical register region.
///
/// Bare metal maps one to one; a kernel driver wraps `ioremap`/`iounmap`.
///
/// # Safety
///
/// Every window returned by `map` must satisfy the `RegisterWindow` contract:
/// each aligned offset below `len()` is valid for volatile 32-bit access until
/// the window is passed back to `unmap`.
pub unsafe trait Mapper {
    type Window: RegisterWindow;

    /// Map `len` bytes at physical address `phys`, or `None` if the region
    /// cannot be acquired.
    fn map(&mut self, phys: u64, len: usize) -> Option<Self::Window>;

    fn unmap(&mut self, window: Self::Window);
}

/// Volatile access to a memory-mapped register block.
#[derive(Debug)]
pub struct MmioWindow {
    base: usize,
    len: usize,
}

impl MmioWindow {
    /// # Safety
    ///
    /// `base..base + len` must be device memory, mapped and valid for
    /// volatile 32-bit access for as long as the window lives.
    pub const unsafe fn new(base: usize, len: usize) -> MmioWindow {
        MmioWindow { base, len }
    }
}

impl RegisterWindow for MmioWindow {
    fn len(&self) -> usize {
        self.len
    }

    unsafe fn read32(&self, offset: usize) -> u32 {
        core::ptr::read_volatile((self.base + offset) as *const u32)
    }

    unsafe fn write32(&self, offset: usize, value: u32) {
        core::ptr::write_volatile((self.base + offset) as *mut u32, value)
    }
}

/// Physical address equals virtual address. Only valid without an MMU
/// translation for the peripheral region, i.e. in firmware.
///
/// Safe code cannot build one:
///
/// ```compile_fail
/// let _ = abacus_perfcnt::abacus::device::IdentityMapper::new();
/// ```
///
/// nor reach the global device:
///
/// ```compile_fail
/// let _ = abacus_perfcnt::abacus_device();
/// ```
#[derive(Debug)]
pub struct IdentityMapper {
    _private: (),
}

impl IdentityMapper {
    /// # Safety
    ///
    /// Every physical address this mapper is asked for must be device memory
    /// reachable at the same virtual address.
    pub const unsafe fn new() -> IdentityMapper {
        IdentityMapper { _private: () }
    }
}

unsafe impl Mapper for IdentityMapper {
    type Window = MmioWindow;

    fn map(&mut self, phys: u64, len: usize) -> Option<MmioWindow> {
        let base = usize::try_from(phys).ok()?;
        if base == 0 || base.checked_add(len).is_none() {
            return None;
        }
        Some(unsafe { MmioWindow::new(base, len) })
    }

    fn unmap(&mut self, _window: MmioWindow) {}
}

pub struct AbacusDevice<M: Mapper> {
    config: AbacusConfig,
    map: RegisterMap,
    mapper: Mutex<M>,
    claimed: AtomicBool,
    /// Serializes enable-register write-then-verify sequences.
    enable_lock: Mutex<()>,
}

impl<M: Mapper> AbacusDevice<M> {
    pub const fn new(mapper: M, config: AbacusConfig) -> AbacusDevice<M> {
        AbacusDevice {
            config,
            map: RegisterMap::new(config.base),
            mapper: Mutex::new(mapper),
            claimed: AtomicBool::new(false),
            enable_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AbacusConfig {
        &self.config
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    /// Whether a session currently holds the device.
    pub fn is_open(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Map the register region and start a session.
    ///
    /// Fails with `Busy` while another session is open and with `MapFailure`
    /// if the region cannot be acquired.
    pub fn open(&self) -> Result<Session<'_, M>> {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("abacus: open rejected, device busy");
            return Err(AbacusError::Busy);
        }
        match self.map_region() {
            Ok(window) => {
                info!("abacus: mapped {:#x}+{:#x}", self.config.base, self.config.window_len);
                Ok(Session { device: self, window: Some(window) })
            }
            Err(e) => {
                self.claimed.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn map_region(&self) -> Result<M::Window> {
        self.config.validate().map_err(|e| {
            error!("abacus: invalid register window configuration");
            e
        })?;
        let mut mapper = self.mapper.lock();
        let window = match mapper.map(self.config.base, self.config.window_len) {
            Some(window) => window,
            None => {
                error!("abacus: could not map physical region {:#x}", self.config.base);
                return Err(AbacusError::MapFailure);
            }
        };
        if window.len() < REGISTER_SPAN {
            error!("abacus: mapping of {:#x} bytes is too short", window.len());
            mapper.unmap(window);
            return Err(AbacusError::MapFailure);
        }
        Ok(window)
    }

    fn release(&self, window: M::Window) {
        self.mapper.lock().unmap(window);
        self.claimed.store(false, Ordering::Release);
        info!("abacus: unmapped {:#x}", self.config.base);
    }
}

static ABACUS: AbacusDevice<IdentityMapper> =
    AbacusDevice::new(unsafe { IdentityMapper::new() }, AbacusConfig::DEFAULT);

/// Global device for firmware that runs with physical addressing.
///
/// # Safety
///
/// The ABACUS region at `AbacusConfig::DEFAULT.base` must be identity mapped
/// device memory, i.e. the caller runs on the SoC without translation.
pub unsafe fn abacus_device() -> &'static AbacusDevice<IdentityMapper> {
    &ABACUS
}

/// The register region, mapped for as long as the session is open.
pub struct Session<'d, M: Mapper> {
    device: &'d AbacusDevice<M>,
    window: Option<M::Window>,
}

impl<'d, M: Mapper> Session<'d, M> {
    pub fn is_open(&self) -> bool {
        self.window.is_some()
    }

    fn window(&self) -> Result<&M::Window> {
        self.window.as_ref().ok_or(AbacusError::NotOpen)
    }

    pub fn unit(&self, kind: UnitKind) -> Result<ProfilingUnit<'_, M::Window>> {
        let window = self.window()?;
        if !self.device.config.units.contains(kind.required()) {
            return Err(AbacusError::UnitAbsent);
        }
        Ok(ProfilingUnit::new(kind, self.device.map, window, &self.device.enable_lock))
    }

    pub fn read_counter(&self, kind: UnitKind, counter: &str) -> Result<u32> {
        self.unit(kind)?.read_counter(counter)
    }

    /// Enable lines that currently read back as set.
    pub fn enabled_units(&self) -> Result<UnitSet> {
        let mut set = UnitSet::empty();
        for kind in [UnitKind::InstructionProfile, UnitKind::InstructionCache, UnitKind::StallUnit] {
            let unit = match self.unit(kind) {
                Ok(unit) => unit,
                Err(AbacusError::UnitAbsent) => continue,
                Err(e) => return Err(e),
            };
            if unit.is_enabled()? {
                set |= kind.required();
            }
        }
        Ok(set)
    }

    /// Dump every present unit to the log.
    pub fn log_all(&self) -> Result<()> {
        for kind in UnitKind::ALL {
            let unit = match self.unit(kind) {
                Ok(unit) => unit,
                Err(AbacusError::UnitAbsent) => continue,
                Err(e) => return Err(e),
            };
            let snapshot = unit.snapshot()?;
            info!("abacus: {} unit", kind.name());
            for (counter, value) in snapshot.counters() {
                info!("  {}: {}", counter.label, value);
            }
            for metric in snapshot.metrics() {
                info!("  {}", metric);
            }
        }
        Ok(())
    }

    /// Unmap the region. Later accesses fail with `NotOpen`.
    pub fn close(&mut self) {
        if let Some(window) = self.window.take() {
            self.device.release(window);
        }
    }
}

impl<'d, M: Mapper> Drop for Session<'d, M> {
    fn drop(&mut self) {
        self.close();
    }
}
