// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Busy-wait delays on the free-running SysTick counter.

use crate::bus::Bus;
use crate::clock::ClockConfig;
use crate::regs::stk;
use crate::wait::{self, Stalled, WaitSite};

/// Starts SysTick as a free-running up-counter on HCLK.
pub fn tick_init<B: Bus>(bus: &mut B) {
    bus.write(stk::CTLR, (stk::Ctlr::STE | stk::Ctlr::STCLK).bits());
}

pub fn now<B: Bus>(bus: &B) -> u32 {
    bus.read(stk::CNT)
}

/// True once `now` has reached or passed `target`, modulo 2^32.
#[inline]
pub const fn reached(now: u32, target: u32) -> bool {
    now.wrapping_sub(target) as i32 >= 0
}

/// Longest wait a single signed comparison in [`reached`] can tell apart.
const MAX_CHUNK: u32 = i32::MAX as u32;

/// Waits until the counter has advanced by at least `ticks`.
pub fn delay_ticks<B: Bus>(bus: &mut B, ticks: u32) -> Result<(), Stalled> {
    delay_long(bus, u64::from(ticks))
}

pub fn delay_us<B: Bus>(bus: &mut B, clock: &ClockConfig, us: u32) -> Result<(), Stalled> {
    delay_long(bus, us_to_ticks(clock, us))
}

pub fn delay_ms<B: Bus>(bus: &mut B, clock: &ClockConfig, ms: u32) -> Result<(), Stalled> {
    delay_long(bus, ms_to_ticks(clock, ms))
}

/// HCLK ticks covering `us`, rounded up so slow clocks never collapse to zero.
pub const fn us_to_ticks(clock: &ClockConfig, us: u32) -> u64 {
    (clock.hclk_hz() as u64 * us as u64).div_ceil(1_000_000)
}

pub const fn ms_to_ticks(clock: &ClockConfig, ms: u32) -> u64 {
    (clock.hclk_hz() as u64 * ms as u64).div_ceil(1_000)
}

fn delay_long<B: Bus>(bus: &mut B, mut ticks: u64) -> Result<(), Stalled> {
    while ticks > u64::from(MAX_CHUNK) {
        wait_chunk(bus, MAX_CHUNK)?;
        ticks -= u64::from(MAX_CHUNK);
    }
    // Loop above leaves at most MAX_CHUNK.
    wait_chunk(bus, ticks as u32)
}

fn wait_chunk<B: Bus>(bus: &mut B, ticks: u32) -> Result<(), Stalled> {
    let target = now(bus).wrapping_add(ticks);
    wait::spin_until(bus, WaitSite::Delay, |b| reached(now(b), target))
}
