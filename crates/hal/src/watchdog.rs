// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Independent watchdog.
//!
//! IWDG runs from LSI / 256, i.e. 2 ms per count, with a 12-bit reload
//! register. Once started it can only be fed; switching LSI off is the only
//! way to stop it.

use crate::bus::Bus;
use crate::regs::{iwdg, rcc};
use crate::wait::{self, Stalled, WaitSite};

/// A watchdog period the reload register can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IwdgPeriod(u16);

impl IwdgPeriod {
    pub const MAX_MS: u16 = 8191;
    pub const MAX: Self = Self(Self::MAX_MS);

    /// `None` when `ms` does not fit the reload register.
    pub const fn from_millis(ms: u32) -> Option<Self> {
        if ms > Self::MAX_MS as u32 {
            None
        } else {
            Some(Self(ms as u16))
        }
    }

    /// Clamps to [`IwdgPeriod::MAX`].
    pub const fn saturating(ms: u32) -> Self {
        match Self::from_millis(ms) {
            Some(p) => p,
            None => Self::MAX,
        }
    }

    pub const fn millis(self) -> u16 {
        self.0
    }

    pub const fn reload_value(self) -> u32 {
        (self.0 as u32 >> 1) & iwdg::RLDR_MASK
    }
}

/// Switches LSI on and waits for it.
pub fn lsi_enable<B: Bus>(bus: &mut B) -> Result<(), Stalled> {
    bus.set_bits(rcc::RSTSCKR, rcc::Rstsckr::LSION.bits());
    wait::until_set(bus, WaitSite::LsiReady, rcc::RSTSCKR, rcc::Rstsckr::LSIRDY.bits())
}

/// Starts LSI and arms the watchdog. Irreversible.
pub fn iwdg_start<B: Bus>(bus: &mut B, period: IwdgPeriod) -> Result<(), Stalled> {
    lsi_enable(bus)?;
    bus.write(iwdg::CTLR, iwdg::KEY_UNLOCK);
    wait::until_clear(bus, WaitSite::WatchdogPrescaler, iwdg::STATR, iwdg::Statr::PVU.bits())?;
    bus.write(iwdg::PSCR, iwdg::PSCR_DIV256);
    wait::until_clear(bus, WaitSite::WatchdogReload, iwdg::STATR, iwdg::Statr::RVU.bits())?;
    bus.write(iwdg::RLDR, period.reload_value());
    bus.write(iwdg::CTLR, iwdg::KEY_RELOAD);
    bus.write(iwdg::CTLR, iwdg::KEY_START);
    Ok(())
}

/// Feeds the watchdog with a new period without re-arming it.
pub fn iwdg_reload<B: Bus>(bus: &mut B, period: IwdgPeriod) -> Result<(), Stalled> {
    bus.write(iwdg::CTLR, iwdg::KEY_UNLOCK);
    wait::until_clear(bus, WaitSite::WatchdogReload, iwdg::STATR, iwdg::Statr::RVU.bits())?;
    bus.write(iwdg::RLDR, period.reload_value());
    bus.write(iwdg::CTLR, iwdg::KEY_RELOAD);
    Ok(())
}
