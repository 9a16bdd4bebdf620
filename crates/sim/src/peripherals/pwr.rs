// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{PeripheralTickResult, SimResult, TickContext};
use ch32boot_hal::power::awu_divisor;
use ch32boot_hal::regs::{exti, pwr};

const CTLR: u32 = pwr::CTLR - pwr::BASE;
const CSR: u32 = pwr::CSR - pwr::BASE;
const AWUCSR: u32 = pwr::AWUCSR - pwr::BASE;
const AWUWR: u32 = pwr::AWUWR - pwr::BASE;
const AWUPSC: u32 = pwr::AWUPSC - pwr::BASE;

/// PDDS, PVDE and the PVD level.
const CTLR_MASK: u32 = 0xF2;

/// Power control plus the automatic wake-up timer.
#[derive(Debug, serde::Serialize)]
pub struct Pwr {
    ctlr: u32,
    csr: u32,
    awucsr: u32,
    awuwr: u32,
    awupsc: u32,
    /// LSI ticks since the last AWU expiry.
    awu_elapsed: u64,
}

impl Default for Pwr {
    fn default() -> Self {
        Self::new()
    }
}

impl Pwr {
    pub fn new() -> Self {
        Self {
            ctlr: 0,
            csr: 0,
            awucsr: 0,
            awuwr: pwr::AWUWR_MASK,
            awupsc: 0,
            awu_elapsed: 0,
        }
    }

    pub fn ctlr(&self) -> u32 {
        self.ctlr
    }

    pub fn awu_enabled(&self) -> bool {
        self.awucsr & pwr::AWUCSR_AWUEN != 0
    }

    /// LSI ticks between AWU events with the current window and prescaler.
    pub fn awu_period(&self) -> u64 {
        u64::from(self.awuwr + 1) * u64::from(awu_divisor(self.awupsc))
    }
}

impl crate::Peripheral for Pwr {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            CTLR => self.ctlr,
            CSR => self.csr,
            AWUCSR => self.awucsr,
            AWUWR => self.awuwr,
            AWUPSC => self.awupsc,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            CTLR => self.ctlr = value & CTLR_MASK,
            AWUCSR => {
                let value = value & pwr::AWUCSR_AWUEN;
                if value != self.awucsr {
                    self.awu_elapsed = 0;
                }
                self.awucsr = value;
            }
            AWUWR => self.awuwr = value & pwr::AWUWR_MASK,
            AWUPSC => self.awupsc = value & pwr::AWUPSC_MASK,
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &TickContext) -> PeripheralTickResult {
        let mut result = PeripheralTickResult::default();
        if !self.awu_enabled() || ctx.lsi_ticks == 0 {
            return result;
        }

        let period = self.awu_period();
        self.awu_elapsed += ctx.lsi_ticks;
        if self.awu_elapsed >= period {
            // several expiries within one step collapse into one edge
            self.awu_elapsed %= period;
            tracing::trace!(period, "PWR: AWU expired");
            result.exti_lines.push(exti::LINE_AWU);
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

    fn lsi(ticks: u64) -> TickContext {
        TickContext {
            cycles: 0,
            lsi_ticks: ticks,
            clocks: ClockTree {
                source: SysclkSource::Hsi,
                sysclk_hz: 24_000_000,
                hclk_hz: 8_000_000,
                lsi_running: true,
            },
            hclk_running: false,
        }
    }

    #[test]
    fn test_awu_fires_every_period() {
        let mut pwr = Pwr::new();
        pwr.write(AWUWR, 9).unwrap();
        pwr.write(AWUPSC, 0b0011).unwrap();
        assert_eq!(pwr.awu_period(), 40);

        assert!(pwr.tick(&lsi(100)).exti_lines.is_empty());

        pwr.write(AWUCSR, pwr::AWUCSR_AWUEN).unwrap();
        assert!(pwr.tick(&lsi(39)).exti_lines.is_empty());
        assert_eq!(pwr.tick(&lsi(1)).exti_lines, vec![exti::LINE_AWU]);
        assert!(pwr.tick(&lsi(39)).exti_lines.is_empty());
    }
}
