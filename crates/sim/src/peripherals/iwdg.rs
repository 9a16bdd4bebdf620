// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{PeripheralTickResult, ResetCause, SimResult, TickContext};
use ch32boot_hal::regs::iwdg;

const CTLR: u32 = iwdg::CTLR - iwdg::BASE;
const PSCR: u32 = iwdg::PSCR - iwdg::BASE;
const RLDR: u32 = iwdg::RLDR - iwdg::BASE;
const STATR: u32 = iwdg::STATR - iwdg::BASE;

/// Independent watchdog, clocked by LSI.
///
/// PSCR and RLDR only accept writes after the unlock key and while their
/// previous update is no longer in flight; everything else is dropped the
/// way the silicon drops it.
#[derive(Debug, serde::Serialize)]
pub struct Iwdg {
    pscr: u32,
    rldr: u32,
    counter: u32,
    running: bool,
    unlocked: bool,
    pvu_busy: Option<u64>,
    rvu_busy: Option<u64>,
    /// A reload key arrived while RLDR was still propagating.
    reload_pending: bool,
    #[serde(skip)]
    prescale_acc: u64,
    #[serde(skip)]
    update_ticks: u64,
    pub dropped_writes: u32,
}

impl Iwdg {
    pub fn new(update_lsi_ticks: u64) -> Self {
        Self {
            pscr: 0,
            rldr: iwdg::RLDR_MASK,
            counter: iwdg::RLDR_MASK,
            running: false,
            unlocked: false,
            pvu_busy: None,
            rvu_busy: None,
            reload_pending: false,
            prescale_acc: 0,
            update_ticks: update_lsi_ticks,
            dropped_writes: 0,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// LSI periods per count: 4, 8, ... 256.
    pub fn divisor(&self) -> u64 {
        (4u64 << self.pscr).min(256)
    }

    fn statr(&self) -> u32 {
        let mut statr = iwdg::Statr::empty();
        statr.set(iwdg::Statr::PVU, self.pvu_busy.is_some());
        statr.set(iwdg::Statr::RVU, self.rvu_busy.is_some());
        statr.bits()
    }

    fn key(&mut self, key: u32) {
        match key {
            iwdg::KEY_UNLOCK => self.unlocked = true,
            iwdg::KEY_RELOAD => {
                self.unlocked = false;
                if self.rvu_busy.is_some() {
                    self.reload_pending = true;
                } else {
                    self.counter = self.rldr;
                }
            }
            iwdg::KEY_START => {
                if !self.running {
                    tracing::info!(rldr = self.rldr, divisor = self.divisor(), "IWDG: started");
                }
                self.running = true;
                self.counter = self.rldr;
            }
            other => tracing::trace!(key = format_args!("{:#x}", other), "IWDG: ignored key"),
        }
    }

    fn guarded(&mut self, register: &'static str, busy: bool) -> bool {
        if self.unlocked && !busy {
            return true;
        }
        tracing::warn!(register, locked = !self.unlocked, busy, "IWDG: write dropped");
        self.dropped_writes += 1;
        false
    }
}

fn settle(slot: &mut Option<u64>, ticks: u64) -> bool {
    match slot {
        Some(left) if *left <= ticks => {
            *slot = None;
            true
        }
        Some(left) => {
            *left -= ticks;
            false
        }
        None => false,
    }
}

impl crate::Peripheral for Iwdg {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            PSCR => self.pscr,
            RLDR => self.rldr,
            STATR => self.statr(),
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            CTLR => self.key(value & 0xFFFF),
            PSCR => {
                if self.guarded("PSCR", self.pvu_busy.is_some()) {
                    self.pscr = value & iwdg::PSCR_MASK;
                    self.pvu_busy = Some(self.update_ticks);
                }
            }
            RLDR => {
                if self.guarded("RLDR", self.rvu_busy.is_some()) {
                    self.rldr = value & iwdg::RLDR_MASK;
                    self.rvu_busy = Some(self.update_ticks);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &TickContext) -> PeripheralTickResult {
        let mut result = PeripheralTickResult::default();
        let lsi = ctx.lsi_ticks;
        if lsi == 0 {
            return result;
        }

        settle(&mut self.pvu_busy, lsi);
        if settle(&mut self.rvu_busy, lsi) && self.reload_pending {
            self.reload_pending = false;
            self.counter = self.rldr;
        }

        if !self.running {
            return result;
        }

        self.prescale_acc += lsi;
        let divisor = self.divisor();
        let counts = self.prescale_acc / divisor;
        self.prescale_acc %= divisor;

        if counts >= u64::from(self.counter) {
            self.counter = 0;
            tracing::warn!("IWDG: counter reached zero, resetting");
            result.reset = Some(ResetCause::Watchdog);
        } else {
            self.counter -= counts as u32;
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
                hclk_hz: 24_000_000,
                lsi_running: true,
            },
            hclk_running: true,
        }
    }

    #[test]
    fn test_locked_writes_are_dropped() {
        let mut wdg = Iwdg::new(5);
        wdg.write(PSCR, 0b111).unwrap();
        assert_eq!(wdg.read(PSCR).unwrap(), 0);
        assert_eq!(wdg.dropped_writes, 1);

        wdg.write(CTLR, iwdg::KEY_UNLOCK).unwrap();
        wdg.write(PSCR, 0b111).unwrap();
        assert_eq!(wdg.read(STATR).unwrap(), iwdg::Statr::PVU.bits());
        // second write while the first is still propagating
        wdg.write(PSCR, 0b001).unwrap();
        assert_eq!(wdg.read(PSCR).unwrap(), 0b111);
        assert_eq!(wdg.dropped_writes, 2);

        wdg.tick(&lsi(5));
        assert_eq!(wdg.read(STATR).unwrap(), 0);
    }

    #[test]
    fn test_expires_after_reload_counts() {
        let mut wdg = Iwdg::new(0);
        wdg.write(CTLR, iwdg::KEY_UNLOCK).unwrap();
        wdg.write(PSCR, iwdg::PSCR_DIV256).unwrap();
        wdg.tick(&lsi(1));
        wdg.write(RLDR, 10).unwrap();
        wdg.tick(&lsi(1));
        wdg.write(CTLR, iwdg::KEY_RELOAD).unwrap();
        wdg.write(CTLR, iwdg::KEY_START).unwrap();
        assert_eq!(wdg.counter(), 10);

        assert_eq!(wdg.tick(&lsi(256 * 9)).reset, None);
        assert_eq!(wdg.counter(), 1);
        assert_eq!(wdg.tick(&lsi(256)).reset, Some(ResetCause::Watchdog));
    }
}
