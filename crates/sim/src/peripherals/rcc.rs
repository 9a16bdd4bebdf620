// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{ClockTree, PeripheralTickResult, ResetCause, SimResult, TickContext};
use ch32boot_config::{CrystalConfig, TimingConfig};
use ch32boot_hal::regs::{self, rcc};
use ch32boot_hal::{AhbPrescaler, SysclkSource};

const CTLR: u32 = rcc::CTLR - rcc::BASE;
const CFGR0: u32 = rcc::CFGR0 - rcc::BASE;
const INTR: u32 = rcc::INTR - rcc::BASE;
const APB2PRSTR: u32 = rcc::APB2PRSTR - rcc::BASE;
const APB1PRSTR: u32 = rcc::APB1PRSTR - rcc::BASE;
const AHBPCENR: u32 = rcc::AHBPCENR - rcc::BASE;
const APB2PCENR: u32 = rcc::APB2PCENR - rcc::BASE;
const APB1PCENR: u32 = rcc::APB1PCENR - rcc::BASE;
const RSTSCKR: u32 = rcc::RSTSCKR - rcc::BASE;

const CTLR_ON_MASK: u32 = rcc::Ctlr::HSION.bits()
    | rcc::Ctlr::HSEON.bits()
    | rcc::Ctlr::HSEBYP.bits()
    | rcc::Ctlr::CSSON.bits()
    | rcc::Ctlr::PLLON.bits();
const CTLR_READY_MASK: u32 =
    rcc::Ctlr::HSIRDY.bits() | rcc::Ctlr::HSERDY.bits() | rcc::Ctlr::PLLRDY.bits();
/// HSICAL, factory value.
const HSI_CAL: u32 = 0x58 << 8;
const DEFAULT_TRIM: u32 = 16 << rcc::CTLR_HSITRIM_SHIFT;
/// SW, HPRE, ADCPRE, PLLSRC and MCO.
const CFGR0_WRITABLE: u32 = rcc::CFGR0_SW_MASK
    | rcc::CFGR0_HPRE_MASK
    | (0x1F << 11)
    | rcc::CFGR0_PLLSRC
    | rcc::CFGR0_MCO_MASK;
const RSTSCKR_FLAGS: u32 = 0xFC00_0000;

/// Reset and clock control: oscillator start-up, PLL lock and the SYSCLK switch.
#[derive(Debug, serde::Serialize)]
pub struct Rcc {
    ctlr: u32,
    cfgr0: u32,
    intr: u32,
    apb2prstr: u32,
    apb1prstr: u32,
    ahbpcenr: u32,
    apb2pcenr: u32,
    apb1pcenr: u32,
    rstsckr: u32,

    hsi_settle: Option<u64>,
    hse_settle: Option<u64>,
    pll_settle: Option<u64>,
    lsi_settle: Option<u64>,
    switch_settle: Option<u64>,

    crystal: Option<CrystalConfig>,
    crystal_routed: bool,
    /// A running IWDG keeps LSI on regardless of LSION.
    lsi_forced: bool,
    #[serde(skip)]
    timing: TimingConfig,
    /// Writes the hardware ignored, e.g. PLLSRC while the PLL runs.
    pub rejected_writes: u32,
}

impl Rcc {
    pub fn new(timing: TimingConfig, crystal: Option<CrystalConfig>) -> Self {
        Self {
            ctlr: rcc::Ctlr::HSION.bits() | rcc::Ctlr::HSIRDY.bits() | DEFAULT_TRIM | HSI_CAL,
            cfgr0: AhbPrescaler::Div3.hpre_bits(),
            intr: 0,
            apb2prstr: 0,
            apb1prstr: 0,
            ahbpcenr: 0x14,
            apb2pcenr: 0,
            apb1pcenr: 0,
            rstsckr: (rcc::Rstsckr::PINRSTF | rcc::Rstsckr::PORRSTF).bits(),
            hsi_settle: None,
            hse_settle: None,
            pll_settle: None,
            lsi_settle: None,
            switch_settle: None,
            crystal,
            crystal_routed: false,
            lsi_forced: false,
            timing,
            rejected_writes: 0,
        }
    }

    /// State after a non power-on reset: registers at reset value, the
    /// cause latched in RSTSCKR next to any flags not yet cleared.
    pub fn after_reset(&self, cause: ResetCause) -> Self {
        let mut next = Self::new(self.timing, self.crystal);
        let kept = self.rstsckr & RSTSCKR_FLAGS;
        next.rstsckr = kept | reset_flag(cause);
        next
    }

    pub fn active_source(&self) -> SysclkSource {
        let sws = (self.cfgr0 & rcc::CFGR0_SWS_MASK) >> rcc::CFGR0_SWS_SHIFT;
        SysclkSource::from_bits(sws).unwrap_or(SysclkSource::Hsi)
    }

    fn requested_source(&self) -> Option<SysclkSource> {
        SysclkSource::from_bits(self.cfgr0 & rcc::CFGR0_SW_MASK)
    }

    fn pll_from_hse(&self) -> bool {
        self.cfgr0 & rcc::CFGR0_PLLSRC != 0
    }

    fn has(&self, flag: rcc::Ctlr) -> bool {
        self.ctlr & flag.bits() != 0
    }

    pub fn source_ready(&self, source: SysclkSource) -> bool {
        match source {
            SysclkSource::Hsi => self.has(rcc::Ctlr::HSIRDY),
            SysclkSource::Hse => self.has(rcc::Ctlr::HSERDY),
            SysclkSource::Pll => self.has(rcc::Ctlr::PLLRDY),
        }
    }

    pub fn lsi_running(&self) -> bool {
        self.rstsckr & rcc::Rstsckr::LSIRDY.bits() != 0
    }

    pub fn apb1_enabled(&self, mask: u32) -> bool {
        self.apb1pcenr & mask == mask
    }

    pub fn apb2_enabled(&self, mask: u32) -> bool {
        self.apb2pcenr & mask == mask
    }

    /// The crystal only oscillates once AFIO hands PA1/PA2 to it.
    pub fn set_crystal_routed(&mut self, routed: bool) {
        self.crystal_routed = routed;
    }

    /// Starts LSI on behalf of the watchdog.
    pub fn force_lsi(&mut self) {
        if self.lsi_forced {
            return;
        }
        self.lsi_forced = true;
        if !self.lsi_running() && self.lsi_settle.is_none() {
            self.lsi_settle = Some(self.timing.lsi_startup_cycles);
        }
    }

    pub fn reset_flags(&self) -> u32 {
        self.rstsckr & RSTSCKR_FLAGS
    }

    fn hse_hz(&self) -> u32 {
        self.crystal.map_or(0, |c| c.frequency_hz)
    }

    pub fn clock_tree(&self) -> ClockTree {
        let source = self.active_source();
        let sysclk_hz = match source {
            SysclkSource::Hsi => regs::HSI_HZ,
            SysclkSource::Hse => self.hse_hz(),
            SysclkSource::Pll => {
                let reference = if self.pll_from_hse() {
                    self.hse_hz()
                } else {
                    regs::HSI_HZ
                };
                reference * ch32boot_hal::ClockConfig::PLL_MULTIPLIER
            }
        };
        let hpre = (self.cfgr0 & rcc::CFGR0_HPRE_MASK) >> rcc::CFGR0_HPRE_SHIFT;
        ClockTree {
            source,
            sysclk_hz,
            hclk_hz: sysclk_hz / AhbPrescaler::from_hpre(hpre).divisor(),
            lsi_running: self.lsi_running(),
        }
    }

    fn write_ctlr(&mut self, value: u32) {
        let mut on = value & CTLR_ON_MASK;

        // Whatever drives SYSCLK, directly or through the PLL, stays on.
        match self.active_source() {
            SysclkSource::Hsi => on |= rcc::Ctlr::HSION.bits(),
            SysclkSource::Hse => on |= rcc::Ctlr::HSEON.bits(),
            SysclkSource::Pll => {
                on |= rcc::Ctlr::PLLON.bits();
                on |= if self.pll_from_hse() {
                    rcc::Ctlr::HSEON.bits()
                } else {
                    rcc::Ctlr::HSION.bits()
                };
            }
        }
        if on & !value & CTLR_ON_MASK != 0 {
            tracing::debug!(
                kept = format_args!("{:#x}", on & !value),
                "RCC: oscillator feeding SYSCLK cannot be stopped"
            );
        }

        let was = self.ctlr;
        let mut ready = was & CTLR_READY_MASK;
        let rising = on & !was;
        let falling = was & !on & CTLR_ON_MASK;

        if rising & rcc::Ctlr::HSION.bits() != 0 {
            self.hsi_settle = Some(self.timing.hsi_startup_cycles);
        }
        if falling & rcc::Ctlr::HSION.bits() != 0 {
            self.hsi_settle = None;
            ready &= !rcc::Ctlr::HSIRDY.bits();
        }

        if rising & rcc::Ctlr::HSEON.bits() != 0 {
            self.hse_settle = match self.crystal {
                Some(crystal) => Some(crystal.startup_cycles),
                None => {
                    tracing::warn!("RCC: HSEON set but no crystal is fitted");
                    None
                }
            };
        }
        if falling & rcc::Ctlr::HSEON.bits() != 0 {
            self.hse_settle = None;
            ready &= !rcc::Ctlr::HSERDY.bits();
        }

        if rising & rcc::Ctlr::PLLON.bits() != 0 {
            self.pll_settle = Some(self.timing.pll_lock_cycles);
        }
        if falling & rcc::Ctlr::PLLON.bits() != 0 {
            self.pll_settle = None;
            ready &= !rcc::Ctlr::PLLRDY.bits();
        }

        let trim = value & rcc::CTLR_HSITRIM_MASK;
        self.ctlr = on | ready | trim | HSI_CAL;
    }

    fn write_cfgr0(&mut self, value: u32) {
        let mut next = value & CFGR0_WRITABLE;

        if self.has(rcc::Ctlr::PLLON) && (next ^ self.cfgr0) & rcc::CFGR0_PLLSRC != 0 {
            tracing::warn!("RCC: PLLSRC change ignored while PLLON is set");
            self.rejected_writes += 1;
            next = (next & !rcc::CFGR0_PLLSRC) | (self.cfgr0 & rcc::CFGR0_PLLSRC);
        }

        let sw_changed = (next ^ self.cfgr0) & rcc::CFGR0_SW_MASK != 0;
        self.cfgr0 = next | (self.cfgr0 & rcc::CFGR0_SWS_MASK);

        match self.requested_source() {
            Some(target) if target != self.active_source() => {
                if sw_changed || self.switch_settle.is_none() {
                    self.switch_settle = Some(self.timing.clock_switch_cycles);
                }
            }
            Some(_) => self.switch_settle = None,
            None => {
                tracing::warn!("RCC: reserved SW encoding 0b11");
                self.switch_settle = None;
            }
        }
    }

    fn write_rstsckr(&mut self, value: u32) {
        let lsion = rcc::Rstsckr::LSION.bits();
        if value & lsion != 0 && self.rstsckr & lsion == 0 {
            self.lsi_settle = Some(self.timing.lsi_startup_cycles);
        }
        if value & lsion == 0 && !self.lsi_forced {
            self.lsi_settle = None;
            self.rstsckr &= !rcc::Rstsckr::LSIRDY.bits();
        }
        self.rstsckr = (self.rstsckr & !lsion) | (value & lsion);
        if value & rcc::Rstsckr::RMVF.bits() != 0 {
            self.rstsckr &= !RSTSCKR_FLAGS;
        }
    }

    fn read_reg(&self, offset: u32) -> u32 {
        match offset {
            CTLR => self.ctlr,
            CFGR0 => self.cfgr0,
            INTR => self.intr,
            APB2PRSTR => self.apb2prstr,
            APB1PRSTR => self.apb1prstr,
            AHBPCENR => self.ahbpcenr,
            APB2PCENR => self.apb2pcenr,
            APB1PCENR => self.apb1pcenr,
            RSTSCKR => self.rstsckr,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u32, value: u32) {
        match offset {
            CTLR => self.write_ctlr(value),
            CFGR0 => self.write_cfgr0(value),
            INTR => {
                let clear = (value >> rcc::INTR_CLEAR_SHIFT) & 0x9F;
                self.intr = (self.intr & !clear & 0xFF) | (value & 0x1F00);
            }
            APB2PRSTR => self.apb2prstr = value,
            APB1PRSTR => self.apb1prstr = value,
            AHBPCENR => self.ahbpcenr = value,
            APB2PCENR => self.apb2pcenr = value,
            APB1PCENR => self.apb1pcenr = value,
            RSTSCKR => self.write_rstsckr(value),
            _ => {}
        }
    }
}

fn reset_flag(cause: ResetCause) -> u32 {
    match cause {
        ResetCause::PowerOn => (rcc::Rstsckr::PORRSTF | rcc::Rstsckr::PINRSTF).bits(),
        ResetCause::Pin => rcc::Rstsckr::PINRSTF.bits(),
        ResetCause::Software => rcc::Rstsckr::SFTRSTF.bits(),
        ResetCause::Watchdog => rcc::Rstsckr::IWDGRSTF.bits(),
    }
}

/// Counts `slot` down by `cycles`. True on the step it reaches zero.
fn settle(slot: &mut Option<u64>, cycles: u64) -> bool {
    match slot {
        Some(left) if *left <= cycles => {
            *slot = None;
            true
        }
        Some(left) => {
            *left -= cycles;
            false
        }
        None => false,
    }
}

impl crate::Peripheral for Rcc {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(self.read_reg(offset))
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        self.write_reg(offset, value);
        Ok(())
    }

    fn tick(&mut self, ctx: &TickContext) -> PeripheralTickResult {
        if ctx.hclk_running {
            let cycles = ctx.cycles;

            if settle(&mut self.hsi_settle, cycles) {
                self.ctlr |= rcc::Ctlr::HSIRDY.bits();
                self.intr |= rcc::INTR_HSIRDYF;
                tracing::debug!("RCC: HSI ready");
            }

            if self.crystal_routed && settle(&mut self.hse_settle, cycles) {
                self.ctlr |= rcc::Ctlr::HSERDY.bits();
                self.intr |= rcc::INTR_HSERDYF;
                tracing::debug!("RCC: HSE ready");
            }

            let reference = if self.pll_from_hse() {
                SysclkSource::Hse
            } else {
                SysclkSource::Hsi
            };
            if self.source_ready(reference) && settle(&mut self.pll_settle, cycles) {
                self.ctlr |= rcc::Ctlr::PLLRDY.bits();
                self.intr |= rcc::INTR_PLLRDYF;
                tracing::debug!(reference = ?reference, "RCC: PLL locked");
            }

            if let Some(target) = self.requested_source() {
                if self.source_ready(target) && settle(&mut self.switch_settle, cycles) {
                    self.cfgr0 = (self.cfgr0 & !rcc::CFGR0_SWS_MASK) | target.sws_bits();
                    tracing::debug!(source = ?target, "RCC: SYSCLK switched");
                }
            }
        }

        if settle(&mut self.lsi_settle, ctx.cycles) {
            self.rstsckr |= rcc::Rstsckr::LSIRDY.bits();
            self.intr |= rcc::INTR_LSIRDYF;
            tracing::debug!("RCC: LSI ready");
        }

        PeripheralTickResult::default()
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
    use crate::Peripheral;

    fn ctx(cycles: u64) -> TickContext {
        TickContext {
            cycles,
            lsi_ticks: 0,
            clocks: ClockTree {
                source: SysclkSource::Hsi,
                sysclk_hz: regs::HSI_HZ,
                hclk_hz: regs::HSI_HZ / 3,
                lsi_running: false,
            },
            hclk_running: true,
        }
    }

    fn crystal() -> Option<CrystalConfig> {
        Some(CrystalConfig {
            frequency_hz: 24_000_000,
            startup_cycles: 100,
        })
    }

    #[test]
    fn test_reset_state() {
        let rcc = Rcc::new(TimingConfig::default(), None);
        let tree = rcc.clock_tree();
        assert_eq!(tree.source, SysclkSource::Hsi);
        assert_eq!(tree.hclk_hz, 8_000_000);
        assert!(rcc.source_ready(SysclkSource::Hsi));
    }

    #[test]
    fn test_hse_needs_routed_pins() {
        let mut rcc = Rcc::new(TimingConfig::default(), crystal());
        rcc.write(CTLR, (rcc::Ctlr::HSION | rcc::Ctlr::HSEON).bits()).unwrap();
        rcc.tick(&ctx(1_000));
        assert!(!rcc.source_ready(SysclkSource::Hse));

        rcc.set_crystal_routed(true);
        rcc.tick(&ctx(99));
        assert!(!rcc.source_ready(SysclkSource::Hse));
        rcc.tick(&ctx(1));
        assert!(rcc.source_ready(SysclkSource::Hse));
    }

    #[test]
    fn test_pllsrc_locked_while_pll_on() {
        let mut rcc = Rcc::new(TimingConfig::default(), crystal());
        rcc.write(CTLR, (rcc::Ctlr::HSION | rcc::Ctlr::PLLON).bits()).unwrap();
        rcc.write(CFGR0, rcc::CFGR0_PLLSRC).unwrap();
        assert_eq!(rcc.read(CFGR0).unwrap() & rcc::CFGR0_PLLSRC, 0);
        assert_eq!(rcc.rejected_writes, 1);
    }

    #[test]
    fn test_switch_waits_for_ready_source() {
        let timing = TimingConfig {
            pll_lock_cycles: 50,
            clock_switch_cycles: 2,
            ..TimingConfig::default()
        };
        let mut rcc = Rcc::new(timing, None);
        rcc.write(CFGR0, SysclkSource::Pll.sw_bits()).unwrap();
        rcc.tick(&ctx(10));
        assert_eq!(rcc.active_source(), SysclkSource::Hsi);

        rcc.write(CTLR, (rcc::Ctlr::HSION | rcc::Ctlr::PLLON).bits()).unwrap();
        rcc.tick(&ctx(50));
        assert!(rcc.source_ready(SysclkSource::Pll));
        rcc.tick(&ctx(2));
        assert_eq!(rcc.active_source(), SysclkSource::Pll);
        assert_eq!(rcc.clock_tree().sysclk_hz, 48_000_000);
    }

    #[test]
    fn test_active_source_cannot_be_stopped() {
        let mut rcc = Rcc::new(TimingConfig::default(), None);
        rcc.write(CTLR, 0).unwrap();
        assert!(rcc.source_ready(SysclkSource::Hsi));
    }

    #[test]
    fn test_reset_flags() {
        let mut rcc = Rcc::new(TimingConfig::default(), None);
        rcc.write(RSTSCKR, rcc::Rstsckr::RMVF.bits()).unwrap();
        assert_eq!(rcc.reset_flags(), 0);
        let next = rcc.after_reset(ResetCause::Watchdog);
        assert_eq!(next.reset_flags(), rcc::Rstsckr::IWDGRSTF.bits());
    }
}
