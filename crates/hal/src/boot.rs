// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The reset path between the stack being valid and `main`.
//!
//! `rt/reset.S` loads `gp` and `sp`, [`reset`] does everything that needs
//! memory and registers, then the runtime hands over to `main` with `mret`.
//! Nothing here may touch a `static` before [`BootStage::CopyData`] has run.

use crate::bus::{Bus, Hart};
use crate::clock::{self, ClockConfig};
use crate::delay;
use crate::regs::rcc;
use crate::wait::Stalled;

/// MPP = machine, MPIE = 1: `mret` into `main` stays in machine mode with
/// interrupts enabled.
pub const MSTATUS_BOOT: u32 = (0b11 << 11) | (1 << 7);

/// mtvec MODE: vectored, table holds absolute addresses.
pub const MTVEC_MODE_VECTORED_ABS: u32 = 0b11;

pub const fn mtvec_value(vector_base: u32) -> u32 {
    (vector_base & !0b11) | MTVEC_MODE_VECTORED_ABS
}

/// Build-time selection of the system init steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SysConfig {
    /// `None` leaves the chip on its reset clock.
    pub clock: Option<ClockConfig>,
    pub tick: bool,
    pub gpio: bool,
}

impl SysConfig {
    /// From the `clock-init`, `tick-init` and `gpio-enable` features.
    pub const CONFIGURED: Self = Self {
        clock: if cfg!(feature = "clock-init") {
            Some(ClockConfig::CONFIGURED)
        } else {
            None
        },
        tick: cfg!(feature = "tick-init"),
        gpio: cfg!(feature = "gpio-enable"),
    };

    /// Memory setup only.
    pub const MINIMAL: Self = Self {
        clock: None,
        tick: false,
        gpio: false,
    };

    /// The clock tree the chip runs on once init has completed.
    pub const fn effective_clock(&self) -> ClockConfig {
        match self.clock {
            Some(clock) => clock,
            None => ClockConfig::RESET,
        }
    }

    pub const fn hclk_hz(&self) -> u32 {
        self.effective_clock().hclk_hz()
    }
}

impl Default for SysConfig {
    fn default() -> Self {
        Self::CONFIGURED
    }
}

/// A word-aligned `[start, end)` RAM range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: *mut u32,
    pub end: *mut u32,
}

impl MemoryRegion {
    pub const fn new(start: *mut u32, end: *mut u32) -> Self {
        Self { start, end }
    }

    pub const fn empty() -> Self {
        Self::new(core::ptr::null_mut(), core::ptr::null_mut())
    }

    pub fn len_words(&self) -> usize {
        (self.end as usize).saturating_sub(self.start as usize) / 4
    }

    /// # Safety
    ///
    /// The range must be writable RAM that nothing else references.
    pub unsafe fn zero(&self) {
        let mut dst = self.start;
        while dst < self.end {
            core::ptr::write_volatile(dst, 0);
            dst = dst.add(1);
        }
    }

    /// # Safety
    ///
    /// As for [`MemoryRegion::zero`]; `load` must be readable for
    /// [`MemoryRegion::len_words`] words and must not overlap the region.
    pub unsafe fn copy_from(&self, load: *const u32) {
        let mut src = load;
        let mut dst = self.start;
        while dst < self.end {
            core::ptr::write_volatile(dst, core::ptr::read_volatile(src));
            dst = dst.add(1);
            src = src.add(1);
        }
    }
}

pub type InitFn = extern "C" fn();

/// Constructors registered by the toolchain, run before `main`.
#[derive(Debug, Clone, Copy)]
pub struct InitArray<'a> {
    pub preinit: &'a [InitFn],
    pub init: &'a [InitFn],
}

impl<'a> InitArray<'a> {
    /// Pre-init entries first, each list in registration order.
    pub fn run(&self) {
        for f in self.preinit.iter().chain(self.init) {
            f();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preinit.is_empty() && self.init.is_empty()
    }
}

/// Memory layout handed over by the linker.
#[derive(Debug, Clone, Copy)]
pub struct BootImage<'a> {
    pub bss: MemoryRegion,
    pub data: MemoryRegion,
    /// Flash copy of `.data`.
    pub data_load: *const u32,
    pub init: Option<InitArray<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BootStage {
    EarlyRegisters,
    TrapVector,
    ZeroBss,
    CopyData,
    InitArray,
    ClockInit,
    TickInit,
    GpioEnable,
    EnterMain,
}

/// Told about every stage just before it starts.
pub trait BootObserver {
    fn stage(&mut self, _stage: BootStage) {}
}

impl BootObserver for () {}

/// Steps 2 to 6 of the reset path: trap vector, `.bss`, `.data`,
/// constructors, system init.
///
/// # Safety
///
/// `image` must describe this program's own RAM sections and nothing may be
/// using them yet. Must run once, with interrupts disabled.
pub unsafe fn reset<H, O>(
    hart: &mut H,
    image: &BootImage<'_>,
    config: &SysConfig,
    vector_base: u32,
    observer: &mut O,
) -> Result<(), Stalled>
where
    H: Hart,
    O: BootObserver + ?Sized,
{
    observer.stage(BootStage::TrapVector);
    hart.write_mstatus(MSTATUS_BOOT);
    hart.write_mtvec(mtvec_value(vector_base));

    observer.stage(BootStage::ZeroBss);
    image.bss.zero();

    observer.stage(BootStage::CopyData);
    image.data.copy_from(image.data_load);

    if let Some(init) = &image.init {
        observer.stage(BootStage::InitArray);
        init.run();
    }

    system_init(hart, config, observer)
}

/// Clock, SysTick and GPIO gates, each one skippable.
pub fn system_init<B, O>(bus: &mut B, config: &SysConfig, observer: &mut O) -> Result<(), Stalled>
where
    B: Bus,
    O: BootObserver + ?Sized,
{
    if let Some(clock) = &config.clock {
        observer.stage(BootStage::ClockInit);
        clock::init(bus, clock)?;
    }

    if config.tick {
        observer.stage(BootStage::TickInit);
        delay::tick_init(bus);
    }

    if config.gpio {
        observer.stage(BootStage::GpioEnable);
        bus.set_bits(
            rcc::APB2PCENR,
            (rcc::Apb2::IOPAEN | rcc::Apb2::IOPCEN | rcc::Apb2::IOPDEN).bits(),
        );
    }
    Ok(())
}
