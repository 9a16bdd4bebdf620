// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Target runtime.
//!
//! Link with `-Tlink.x` and provide a `memory.x`. The application defines
//! `#[no_mangle] extern "C" fn main() -> !` and, optionally, any handler named
//! in [`crate::vectors::Interrupt::handler_name`].
//!
//! The wrappers below are the service calls for code running on the chip.
//! A bus wait can only fail in a simulation, so here a failure halts.

use core::arch::{asm, global_asm};
use core::ptr::{addr_of, addr_of_mut};

use crate::boot::{self, BootImage, MemoryRegion, SysConfig};
use crate::bus::Mmio;
use crate::clock::{self, ClockConfig, McoSource};
use crate::delay;
use crate::power::{self, AwuPeriod};
use crate::wait::Stalled;
use crate::watchdog::{self, IwdgPeriod};

global_asm!(include_str!("reset.S"));
global_asm!(include_str!("vectors.S"));

extern "C" {
    static mut _sbss: u32;
    static mut _ebss: u32;
    static mut _data_vma: u32;
    static mut _edata: u32;
    static _data_lma: u32;
    static InterruptVector: u32;

    fn main() -> !;
}

#[cfg(feature = "init-array")]
extern "C" {
    static __preinit_array_start: boot::InitFn;
    static __preinit_array_end: boot::InitFn;
    static __init_array_start: boot::InitFn;
    static __init_array_end: boot::InitFn;
}

#[cfg(feature = "init-array")]
unsafe fn init_array() -> Option<boot::InitArray<'static>> {
    unsafe fn table(
        start: *const boot::InitFn,
        end: *const boot::InitFn,
    ) -> &'static [boot::InitFn] {
        let len = end.offset_from(start).max(0) as usize;
        core::slice::from_raw_parts(start, len)
    }

    Some(boot::InitArray {
        preinit: table(addr_of!(__preinit_array_start), addr_of!(__preinit_array_end)),
        init: table(addr_of!(__init_array_start), addr_of!(__init_array_end)),
    })
}

#[cfg(not(feature = "init-array"))]
unsafe fn init_array() -> Option<boot::InitArray<'static>> {
    None
}

#[no_mangle]
unsafe extern "C" fn _start_rust() -> ! {
    let image = BootImage {
        bss: MemoryRegion::new(addr_of_mut!(_sbss), addr_of_mut!(_ebss)),
        data: MemoryRegion::new(addr_of_mut!(_data_vma), addr_of_mut!(_edata)),
        data_load: addr_of!(_data_lma),
        init: init_array(),
    };
    let mut hart = Mmio::new();
    let vector_base = addr_of!(InterruptVector) as u32;

    if boot::reset(&mut hart, &image, &SysConfig::CONFIGURED, vector_base, &mut ()).is_err() {
        halt();
    }
    enter(main as usize)
}

/// Leaves the trap context for `entry`. A return from `entry` lands in `_halt`.
unsafe fn enter(entry: usize) -> ! {
    asm!(
        "csrw mepc, {entry}",
        "la ra, _halt",
        "mret",
        entry = in(reg) entry,
        options(noreturn)
    )
}

/// Parks the core.
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

#[no_mangle]
#[allow(non_snake_case)]
#[link_section = ".text.vector_handler"]
pub extern "C" fn DefaultIRQHandler() -> ! {
    halt()
}

fn or_halt<T>(result: Result<T, Stalled>) -> T {
    match result {
        Ok(value) => value,
        Err(_) => halt(),
    }
}

/// The clock tree `main` runs on.
pub const fn clock() -> ClockConfig {
    SysConfig::CONFIGURED.effective_clock()
}

pub fn delay_ticks(ticks: u32) {
    or_halt(delay::delay_ticks(&mut Mmio::new(), ticks))
}

pub fn delay_us(us: u32) {
    or_halt(delay::delay_us(&mut Mmio::new(), &clock(), us))
}

pub fn delay_ms(ms: u32) {
    or_halt(delay::delay_ms(&mut Mmio::new(), &clock(), ms))
}

pub fn mco_init(source: McoSource) {
    clock::mco_init(&mut Mmio::new(), source)
}

pub fn lsi_enable() {
    or_halt(watchdog::lsi_enable(&mut Mmio::new()))
}

/// Periods above [`IwdgPeriod::MAX_MS`] are clamped.
pub fn iwdg_start(ms: u32) {
    or_halt(watchdog::iwdg_start(&mut Mmio::new(), IwdgPeriod::saturating(ms)))
}

pub fn iwdg_reload(ms: u32) {
    or_halt(watchdog::iwdg_reload(&mut Mmio::new(), IwdgPeriod::saturating(ms)))
}

pub fn sleep_wfi() {
    or_halt(power::sleep_wfi(&mut Mmio::new()))
}

pub fn sleep_wfe() {
    or_halt(power::sleep_wfe(&mut Mmio::new()))
}

pub fn standby_wfi() {
    or_halt(power::standby_wfi(&mut Mmio::new()))
}

pub fn standby_wfe() {
    or_halt(power::standby_wfe(&mut Mmio::new()))
}

pub fn awu_init() {
    or_halt(power::awu_init(&mut Mmio::new()))
}

pub fn awu_set_period(period: AwuPeriod) {
    power::awu_set_period(&mut Mmio::new(), period)
}
