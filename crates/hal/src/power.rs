// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sleep, standby and the automatic wake-up timer.

use crate::bus::{Bus, Hart};
use crate::regs::{self, exti, pfic, pwr, rcc};
use crate::wait::Stalled;
use crate::watchdog;

/// Momentary processor state. Never stored by the hal; the simulator reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PowerMode {
    #[default]
    Run,
    Sleep,
    Standby,
}

impl PowerMode {
    /// Mode a `wfi` enters given the current PWR_CTLR and PFIC_SCTLR values.
    pub const fn on_wait(pwr_ctlr: u32, sctlr: u32) -> Self {
        let deep = sctlr & pfic::Sctlr::SLEEPDEEP.bits() != 0;
        let pdds = pwr_ctlr & pwr::Ctlr::PDDS.bits() != 0;
        if deep && pdds {
            Self::Standby
        } else {
            Self::Sleep
        }
    }
}

fn enable_pwr<B: Bus>(bus: &mut B) {
    bus.set_bits(rcc::APB1PCENR, rcc::Apb1::PWREN.bits());
}

/// Sleep until an interrupt. Peripherals keep running.
pub fn sleep_wfi<H: Hart>(hart: &mut H) -> Result<(), Stalled> {
    enable_pwr(hart);
    hart.clear_bits(pwr::CTLR, pwr::Ctlr::PDDS.bits());
    hart.wait_for_interrupt()
}

/// Sleep until an event.
pub fn sleep_wfe<H: Hart>(hart: &mut H) -> Result<(), Stalled> {
    enable_pwr(hart);
    hart.clear_bits(pwr::CTLR, pwr::Ctlr::PDDS.bits());
    wait_for_event(hart)
}

/// Standby until a wake-capable interrupt. SLEEPDEEP is only cleared after
/// the core has resumed.
pub fn standby_wfi<H: Hart>(hart: &mut H) -> Result<(), Stalled> {
    enter_standby(hart);
    hart.wait_for_interrupt()?;
    hart.clear_bits(pfic::SCTLR, pfic::Sctlr::SLEEPDEEP.bits());
    Ok(())
}

/// Standby until a wake-capable event.
pub fn standby_wfe<H: Hart>(hart: &mut H) -> Result<(), Stalled> {
    enter_standby(hart);
    wait_for_event(hart)?;
    hart.clear_bits(pfic::SCTLR, pfic::Sctlr::SLEEPDEEP.bits());
    Ok(())
}

fn enter_standby<H: Hart>(hart: &mut H) {
    enable_pwr(hart);
    hart.set_bits(pwr::CTLR, pwr::Ctlr::PDDS.bits());
    hart.set_bits(pfic::SCTLR, pfic::Sctlr::SLEEPDEEP.bits());
}

/// QingKe V2 has no `wfe`. With WFITOWFE set a `wfi` waits for an event
/// instead; the first one swallows the event latched by SETEVENT so the
/// second one really sleeps.
pub fn wait_for_event<H: Hart>(hart: &mut H) -> Result<(), Stalled> {
    let saved = hart.read(pfic::SCTLR);
    let wfitowfe = pfic::Sctlr::WFITOWFE.bits();
    let setevent = pfic::Sctlr::SETEVENT.bits();

    hart.write(pfic::SCTLR, saved | wfitowfe | setevent);
    hart.modify(pfic::SCTLR, |v| (v & !setevent) | (saved & setevent));
    hart.wait_for_interrupt()?;
    hart.wait_for_interrupt()?;
    hart.modify(pfic::SCTLR, |v| (v & !wfitowfe) | (saved & wfitowfe));
    Ok(())
}

/// AWU window and prescaler for a wake-up period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AwuPeriod {
    prescaler: u8,
    window: u8,
}

impl AwuPeriod {
    /// (AWUPSC encoding, LSI divisor), shortest first.
    const PRESCALERS: [(u8, u32); 15] = [
        (0b0001, 1),
        (0b0010, 2),
        (0b0011, 4),
        (0b0100, 8),
        (0b0101, 16),
        (0b0110, 32),
        (0b0111, 64),
        (0b1000, 128),
        (0b1001, 256),
        (0b1010, 512),
        (0b1011, 1024),
        (0b1100, 2048),
        (0b1101, 4096),
        (0b1110, 10240),
        (0b1111, 61440),
    ];
    const WINDOW_COUNTS: u32 = regs::pwr::AWUWR_MASK + 1;
    pub const MAX_MS: u32 = Self::WINDOW_COUNTS * 61440 / (regs::LSI_HZ / 1000);

    /// Finest resolution that still fits the 6-bit window. `None` past
    /// [`AwuPeriod::MAX_MS`].
    pub fn from_millis(ms: u32) -> Option<Self> {
        let lsi_ticks = ms.checked_mul(regs::LSI_HZ / 1000)?;
        Self::PRESCALERS.iter().find_map(|&(bits, div)| {
            let counts = lsi_ticks.div_ceil(div);
            (counts <= Self::WINDOW_COUNTS).then(|| Self {
                prescaler: bits,
                window: counts.saturating_sub(1) as u8,
            })
        })
    }

    pub const fn prescaler_bits(self) -> u32 {
        self.prescaler as u32
    }

    pub const fn window(self) -> u32 {
        self.window as u32
    }

    pub fn divisor(self) -> u32 {
        awu_divisor(self.prescaler_bits())
    }

    /// LSI cycles between two wake events.
    pub fn lsi_ticks(self) -> u32 {
        (self.window() + 1) * self.divisor()
    }
}

/// LSI divisor selected by an AWUPSC value. `0b0000` also passes LSI through.
pub fn awu_divisor(bits: u32) -> u32 {
    AwuPeriod::PRESCALERS
        .iter()
        .find(|(code, _)| *code as u32 == bits & pwr::AWUPSC_MASK)
        .map_or(1, |&(_, div)| div)
}

/// Starts LSI, routes the AWU to EXTI line 9 as an event and enables the timer.
pub fn awu_init<B: Bus>(bus: &mut B) -> Result<(), Stalled> {
    watchdog::lsi_enable(bus)?;
    let line = 1 << exti::LINE_AWU;
    bus.set_bits(exti::EVENR, line);
    bus.set_bits(exti::FTENR, line);
    enable_pwr(bus);
    bus.write(pwr::AWUCSR, pwr::AWUCSR_AWUEN);
    Ok(())
}

pub fn awu_set_period<B: Bus>(bus: &mut B, period: AwuPeriod) {
    enable_pwr(bus);
    bus.write(pwr::AWUPSC, period.prescaler_bits());
    bus.write(pwr::AWUWR, period.window());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::tests::FakeBus;

    #[test]
    fn test_awu_picks_smallest_prescaler() {
        // zero fits the window undivided
        let p = AwuPeriod::from_millis(0).unwrap();
        assert_eq!((p.prescaler_bits(), p.window()), (0b0001, 0));

        let p = AwuPeriod::from_millis(1).unwrap();
        assert_eq!(p.divisor(), 2);
        assert_eq!(p.window(), 63);

        let p = AwuPeriod::from_millis(1000).unwrap();
        assert_eq!(p.divisor(), 2048);
        assert!(p.lsi_ticks() >= 128_000);

        assert!(AwuPeriod::from_millis(AwuPeriod::MAX_MS).is_some());
        assert!(AwuPeriod::from_millis(AwuPeriod::MAX_MS + 1).is_none());
    }

    #[test]
    fn test_standby_flag_cleared_after_wait() {
        let mut bus = FakeBus::default();
        standby_wfi(&mut bus).unwrap();
        assert_eq!(bus.wfi_calls, 1);
        assert_eq!(bus.read(pfic::SCTLR) & pfic::Sctlr::SLEEPDEEP.bits(), 0);
        assert_ne!(bus.read(pwr::CTLR) & pwr::Ctlr::PDDS.bits(), 0);

        let set = bus
            .writes
            .iter()
            .position(|&(a, v)| a == pfic::SCTLR && v & pfic::Sctlr::SLEEPDEEP.bits() != 0);
        let pwren = bus.writes.iter().position(|&(a, _)| a == rcc::APB1PCENR);
        let pdds = bus.writes.iter().position(|&(a, _)| a == pwr::CTLR);
        assert!(pwren < pdds && pdds < set);
    }

    #[test]
    fn test_wfe_emulation_restores_sctlr() {
        let mut bus = FakeBus::default();
        bus.regs.insert(pfic::SCTLR, pfic::Sctlr::SLEEPONEXIT.bits());
        sleep_wfe(&mut bus).unwrap();
        assert_eq!(bus.wfi_calls, 2);
        assert_eq!(bus.read(pfic::SCTLR), pfic::Sctlr::SLEEPONEXIT.bits());
        assert!(bus.writes.iter().any(|&(a, v)| a == pfic::SCTLR
            && v & (pfic::Sctlr::WFITOWFE | pfic::Sctlr::SETEVENT).bits() != 0));
    }

    #[test]
    fn test_awu_init_enables_power_gate_before_timer() {
        let mut bus = FakeBus::with_limit(Some(0));
        bus.regs.insert(rcc::RSTSCKR, rcc::Rstsckr::LSIRDY.bits());
        awu_init(&mut bus).unwrap();
        let pwren = bus.writes.iter().position(|&(a, _)| a == rcc::APB1PCENR);
        let awuen = bus.writes.iter().position(|&(a, _)| a == pwr::AWUCSR);
        assert!(pwren.is_some() && pwren < awuen);
        assert_eq!(bus.read(exti::EVENR), 1 << 9);
    }

    #[test]
    fn test_power_mode_on_wait() {
        let deep = pfic::Sctlr::SLEEPDEEP.bits();
        let pdds = pwr::Ctlr::PDDS.bits();
        assert_eq!(PowerMode::on_wait(pdds, deep), PowerMode::Standby);
        assert_eq!(PowerMode::on_wait(0, deep), PowerMode::Sleep);
        assert_eq!(PowerMode::on_wait(pdds, 0), PowerMode::Sleep);
    }
}
