// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{PeripheralTickResult, SimResult, TickContext};
use ch32boot_hal::regs::stk;
use ch32boot_hal::Interrupt;

const CTLR: u32 = stk::CTLR - stk::BASE;
const SR: u32 = stk::SR - stk::BASE;
const CNT: u32 = stk::CNT - stk::BASE;
const CMP: u32 = stk::CMP - stk::BASE;

/// QingKe system timer: 32-bit up-counter with one compare register.
/// Stopped in standby.
#[derive(Debug, Default, serde::Serialize)]
pub struct Systick {
    ctlr: u32,
    sr: u32,
    cnt: u32,
    cmp: u32,
    /// HCLK cycles not yet worth an HCLK/8 tick.
    #[serde(skip)]
    residue: u64,
}

impl Systick {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.cnt
    }

    fn has(&self, flag: stk::Ctlr) -> bool {
        self.ctlr & flag.bits() != 0
    }

    fn ticks_for(&mut self, cycles: u64) -> u64 {
        if self.has(stk::Ctlr::STCLK) {
            return cycles;
        }
        let total = self.residue + cycles;
        self.residue = total % 8;
        total / 8
    }
}

impl crate::Peripheral for Systick {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            CTLR => self.ctlr,
            SR => self.sr,
            CNT => self.cnt,
            CMP => self.cmp,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            CTLR => self.ctlr = value,
            // CNTIF is write-0-to-clear
            SR => self.sr &= value,
            CNT => self.cnt = value,
            CMP => self.cmp = value,
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &TickContext) -> PeripheralTickResult {
        let mut result = PeripheralTickResult::default();

        if self.has(stk::Ctlr::SWIE) {
            self.ctlr &= !stk::Ctlr::SWIE.bits();
            result.irqs.push(Interrupt::Software);
        }

        if !ctx.hclk_running || !self.has(stk::Ctlr::STE) {
            return result;
        }

        let ticks = self.ticks_for(ctx.cycles);
        if ticks == 0 {
            return result;
        }

        let to_compare = u64::from(self.cmp.wrapping_sub(self.cnt));
        let hit = (to_compare != 0 && to_compare <= ticks) || ticks > u64::from(u32::MAX);
        self.cnt = self.cnt.wrapping_add(ticks as u32);

        if hit {
            self.sr |= stk::SR_CNTIF;
            if self.has(stk::Ctlr::STIE) {
                result.irqs.push(Interrupt::SysTick);
            }
            if self.has(stk::Ctlr::STRE) {
                // restart from zero, carrying the ticks past the compare
                self.cnt = (ticks - to_compare.max(1)) as u32;
            }
        }
        result
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn std::any::Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClockTree, Peripheral};
    use ch32boot_hal::SysclkSource;

    fn ctx(cycles: u64, hclk_running: bool) -> TickContext {
        TickContext {
            cycles,
            lsi_ticks: 0,
            clocks: ClockTree {
                source: SysclkSource::Pll,
                sysclk_hz: 48_000_000,
                hclk_hz: 48_000_000,
                lsi_running: false,
            },
            hclk_running,
        }
    }

    #[test]
    fn test_counts_hclk_and_wraps() {
        let mut timer = Systick::new();
        timer.tick(&ctx(100, true));
        assert_eq!(timer.count(), 0);

        timer.write(CTLR, (stk::Ctlr::STE | stk::Ctlr::STCLK).bits()).unwrap();
        timer.write(CNT, u32::MAX - 9).unwrap();
        timer.tick(&ctx(20, true));
        assert_eq!(timer.count(), 10);

        timer.tick(&ctx(1_000, false));
        assert_eq!(timer.count(), 10);
    }

    #[test]
    fn test_hclk_div8_keeps_residue() {
        let mut timer = Systick::new();
        timer.write(CTLR, stk::Ctlr::STE.bits()).unwrap();
        timer.tick(&ctx(5, true));
        timer.tick(&ctx(5, true));
        assert_eq!(timer.count(), 1);
    }

    #[test]
    fn test_compare_raises_interrupt() {
        let mut timer = Systick::new();
        timer.write(CMP, 50).unwrap();
        timer.write(
            CTLR,
            (stk::Ctlr::STE | stk::Ctlr::STCLK | stk::Ctlr::STIE | stk::Ctlr::STRE).bits(),
        )
        .unwrap();
        assert!(timer.tick(&ctx(49, true)).irqs.is_empty());
        assert_eq!(timer.tick(&ctx(3, true)).irqs, vec![Interrupt::SysTick]);
        assert_eq!(timer.read(SR).unwrap(), stk::SR_CNTIF);
        assert_eq!(timer.count(), 2);
    }
}
