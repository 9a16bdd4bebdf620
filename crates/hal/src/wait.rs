// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::Bus;
use crate::clock::SysclkSource;

/// Every place the bring-up code busy-waits on hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WaitSite {
    HsiReady,
    HseReady,
    PllReady,
    ClockSwitch(SysclkSource),
    LsiReady,
    WatchdogPrescaler,
    WatchdogReload,
    Delay,
    Wake,
}

/// A wait gave up. Only bounded buses (simulations) can produce this; on
/// hardware `spin_limit()` is `None` and the wait never returns without the
/// condition holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("stalled waiting for {site:?} after {spins} polls")]
pub struct Stalled {
    pub site: WaitSite,
    pub spins: u32,
}

/// Polls `ready` until it holds, calling [`Bus::relax`] between polls.
pub fn spin_until<B, F>(bus: &mut B, site: WaitSite, mut ready: F) -> Result<(), Stalled>
where
    B: Bus + ?Sized,
    F: FnMut(&B) -> bool,
{
    let limit = bus.spin_limit();
    let mut spins: u32 = 0;

    while !ready(bus) {
        if let Some(limit) = limit {
            if spins >= limit {
                return Err(Stalled { site, spins });
            }
        }
        spins = spins.saturating_add(1);
        bus.relax();
    }
    Ok(())
}

/// Polls until every bit of `mask` at `addr` is set.
pub fn until_set<B: Bus + ?Sized>(
    bus: &mut B,
    site: WaitSite,
    addr: u32,
    mask: u32,
) -> Result<(), Stalled> {
    spin_until(bus, site, |b| b.read(addr) & mask == mask)
}

/// Polls until every bit of `mask` at `addr` is clear.
pub fn until_clear<B: Bus + ?Sized>(
    bus: &mut B,
    site: WaitSite,
    addr: u32,
    mask: u32,
) -> Result<(), Stalled> {
    spin_until(bus, site, |b| b.read(addr) & mask == 0)
}
