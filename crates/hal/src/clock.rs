// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! System clock bring-up.
//!
//! Four fixed paths, one per [`ClockSource`]. Each one programs the flash
//! wait-state no later than the oscillator that needs it, polls every
//! readiness flag it depends on and only returns once the SWS field reports
//! the requested source.

use crate::bus::Bus;
use crate::regs::{self, afio, flash, gpio, rcc};
use crate::wait::{self, Stalled, WaitSite};

/// Input of the SYSCLK multiplexer, as encoded in SW/SWS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SysclkSource {
    Hsi = 0b00,
    Hse = 0b01,
    Pll = 0b10,
}

impl SysclkSource {
    pub const fn sw_bits(self) -> u32 {
        self as u32
    }

    pub const fn sws_bits(self) -> u32 {
        (self as u32) << rcc::CFGR0_SWS_SHIFT
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Self::Hsi),
            0b01 => Some(Self::Hse),
            0b10 => Some(Self::Pll),
            _ => None,
        }
    }
}

/// The four supported bring-up paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ClockSource {
    Hsi,
    HsiPll,
    Hse,
    HsePll,
}

impl ClockSource {
    /// What SWS must read back once this path has completed.
    pub const fn sysclk(self) -> SysclkSource {
        match self {
            Self::Hsi => SysclkSource::Hsi,
            Self::Hse => SysclkSource::Hse,
            Self::HsiPll | Self::HsePll => SysclkSource::Pll,
        }
    }

    pub const fn uses_crystal(self) -> bool {
        matches!(self, Self::Hse | Self::HsePll)
    }
}

/// HCLK = SYSCLK / prescaler. Discriminants are the HPRE encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AhbPrescaler {
    Div1 = 0b0000,
    Div2 = 0b0001,
    Div3 = 0b0010,
    Div4 = 0b0011,
    Div5 = 0b0100,
    Div6 = 0b0101,
    Div7 = 0b0110,
    Div8 = 0b0111,
    Div16 = 0b1011,
    Div32 = 0b1100,
    Div64 = 0b1101,
    Div128 = 0b1110,
    Div256 = 0b1111,
}

impl AhbPrescaler {
    pub const fn hpre_bits(self) -> u32 {
        (self as u32) << rcc::CFGR0_HPRE_SHIFT
    }

    pub const fn divisor(self) -> u32 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div3 => 3,
            Self::Div4 => 4,
            Self::Div5 => 5,
            Self::Div6 => 6,
            Self::Div7 => 7,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div32 => 32,
            Self::Div64 => 64,
            Self::Div128 => 128,
            Self::Div256 => 256,
        }
    }

    /// Decodes an HPRE field. `0b1000..=0b1010` alias /2 on this part.
    pub const fn from_hpre(bits: u32) -> Self {
        match bits & 0xF {
            0b0000 => Self::Div1,
            0b0001 | 0b1000 => Self::Div2,
            0b0010 | 0b1001 => Self::Div3,
            0b0011 | 0b1010 => Self::Div4,
            0b0100 => Self::Div5,
            0b0101 => Self::Div6,
            0b0110 => Self::Div7,
            0b0111 => Self::Div8,
            0b1011 => Self::Div16,
            0b1100 => Self::Div32,
            0b1101 => Self::Div64,
            0b1110 => Self::Div128,
            _ => Self::Div256,
        }
    }
}

/// Flash read wait-states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlashLatency {
    Zero = 0,
    One = 1,
    Two = 2,
}

impl FlashLatency {
    /// Highest SYSCLK flash can be read at with zero wait-states.
    pub const ZERO_WAIT_MAX_HZ: u32 = 24_000_000;
    pub const ONE_WAIT_MAX_HZ: u32 = 48_000_000;

    pub const fn for_sysclk(hz: u32) -> Self {
        if hz <= Self::ZERO_WAIT_MAX_HZ {
            Self::Zero
        } else if hz <= Self::ONE_WAIT_MAX_HZ {
            Self::One
        } else {
            Self::Two
        }
    }

    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn from_bits(bits: u32) -> Self {
        match bits & flash::ACTLR_LATENCY_MASK {
            0 => Self::Zero,
            1 => Self::One,
            _ => Self::Two,
        }
    }

    /// True when reads at `sysclk_hz` are stretched enough.
    pub const fn is_sufficient_for(self, sysclk_hz: u32) -> bool {
        self as u32 >= Self::for_sysclk(sysclk_hz) as u32
    }
}

/// Source routed to the MCO pin (PC4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum McoSource {
    Sysclk = 0b100,
    Hsi = 0b101,
    Hse = 0b110,
    Pll = 0b111,
}

/// The build-time clock selection. Immutable once the device is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockConfig {
    pub source: ClockSource,
    pub prescaler: AhbPrescaler,
    /// 5-bit HSI trim, 16 is the factory midpoint.
    pub hsi_trim: u8,
    pub hse_hz: u32,
}

impl ClockConfig {
    pub const DEFAULT_HSI_TRIM: u8 = 16;
    pub const DEFAULT_HSE_HZ: u32 = 24_000_000;
    /// Fixed PLL factor on this part.
    pub const PLL_MULTIPLIER: u32 = 2;

    /// What the chip runs on straight out of reset: HSI, HCLK = SYSCLK / 3.
    pub const RESET: Self = Self::new(ClockSource::Hsi, AhbPrescaler::Div3);

    /// Selected by the `clk-*` cargo features. Explicit choices win over
    /// the default `clk-hsi-pll`.
    pub const CONFIGURED: Self = Self::new(Self::configured_source(), AhbPrescaler::Div1);

    const fn configured_source() -> ClockSource {
        if cfg!(feature = "clk-hse-pll") {
            ClockSource::HsePll
        } else if cfg!(feature = "clk-hse") {
            ClockSource::Hse
        } else if cfg!(feature = "clk-hsi") {
            ClockSource::Hsi
        } else {
            ClockSource::HsiPll
        }
    }

    pub const fn new(source: ClockSource, prescaler: AhbPrescaler) -> Self {
        Self {
            source,
            prescaler,
            hsi_trim: Self::DEFAULT_HSI_TRIM,
            hse_hz: Self::DEFAULT_HSE_HZ,
        }
    }

    pub const fn hsi() -> Self {
        Self::new(ClockSource::Hsi, AhbPrescaler::Div1)
    }

    pub const fn hsi_pll() -> Self {
        Self::new(ClockSource::HsiPll, AhbPrescaler::Div1)
    }

    pub const fn hse() -> Self {
        Self::new(ClockSource::Hse, AhbPrescaler::Div1)
    }

    pub const fn hse_pll() -> Self {
        Self::new(ClockSource::HsePll, AhbPrescaler::Div1)
    }

    pub const fn with_prescaler(mut self, prescaler: AhbPrescaler) -> Self {
        self.prescaler = prescaler;
        self
    }

    pub const fn with_trim(mut self, trim: u8) -> Self {
        self.hsi_trim = trim & 0x1F;
        self
    }

    pub const fn with_hse_frequency(mut self, hz: u32) -> Self {
        self.hse_hz = hz;
        self
    }

    pub const fn pll_multiplier(&self) -> u32 {
        match self.source {
            ClockSource::HsiPll | ClockSource::HsePll => Self::PLL_MULTIPLIER,
            ClockSource::Hsi | ClockSource::Hse => 1,
        }
    }

    pub const fn sysclk_hz(&self) -> u32 {
        let reference = if self.source.uses_crystal() {
            self.hse_hz
        } else {
            regs::HSI_HZ
        };
        reference * self.pll_multiplier()
    }

    pub const fn hclk_hz(&self) -> u32 {
        self.sysclk_hz() / self.prescaler.divisor()
    }

    /// Derived from the SYSCLK band, never chosen independently.
    pub const fn flash_latency(&self) -> FlashLatency {
        FlashLatency::for_sysclk(self.sysclk_hz())
    }

    const fn trim_bits(&self) -> u32 {
        (self.hsi_trim as u32 & 0x1F) << rcc::CTLR_HSITRIM_SHIFT
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::CONFIGURED
    }
}

/// Brings up the clock tree described by `config`.
pub fn init<B: Bus>(bus: &mut B, config: &ClockConfig) -> Result<(), Stalled> {
    match config.source {
        ClockSource::Hsi => init_hsi(bus, config),
        ClockSource::HsiPll => init_hsi_pll(bus, config),
        ClockSource::Hse => init_hse(bus, config),
        ClockSource::HsePll => init_hse_pll(bus, config),
    }
}

/// Reads SWS back.
pub fn active_source<B: Bus>(bus: &B) -> Option<SysclkSource> {
    let sws = (bus.read(rcc::CFGR0) & rcc::CFGR0_SWS_MASK) >> rcc::CFGR0_SWS_SHIFT;
    SysclkSource::from_bits(sws)
}

fn wait_for_switch<B: Bus>(bus: &mut B, target: SysclkSource) -> Result<(), Stalled> {
    wait::spin_until(bus, WaitSite::ClockSwitch(target), |b| {
        b.read(rcc::CFGR0) & rcc::CFGR0_SWS_MASK == target.sws_bits()
    })
}

fn init_hsi<B: Bus>(bus: &mut B, config: &ClockConfig) -> Result<(), Stalled> {
    bus.write(flash::ACTLR, config.flash_latency().bits());
    bus.write(rcc::INTR, rcc::INTR_CLEAR_ALL);
    bus.write(
        rcc::CFGR0,
        config.prescaler.hpre_bits() | SysclkSource::Hsi.sw_bits(),
    );
    bus.write(rcc::CTLR, rcc::Ctlr::HSION.bits() | config.trim_bits());
    wait_for_switch(bus, SysclkSource::Hsi)
}

fn init_hsi_pll<B: Bus>(bus: &mut B, config: &ClockConfig) -> Result<(), Stalled> {
    bus.write(flash::ACTLR, config.flash_latency().bits());
    bus.write(rcc::INTR, rcc::INTR_CLEAR_ALL);
    // PLLSRC = 0 selects HSI as the PLL reference.
    bus.write(rcc::CFGR0, config.prescaler.hpre_bits());
    bus.write(rcc::CTLR, rcc::Ctlr::HSION.bits() | config.trim_bits());
    wait::until_set(bus, WaitSite::HsiReady, rcc::CTLR, rcc::Ctlr::HSIRDY.bits())?;

    bus.set_bits(rcc::CTLR, rcc::Ctlr::PLLON.bits());
    wait::until_set(bus, WaitSite::PllReady, rcc::CTLR, rcc::Ctlr::PLLRDY.bits())?;

    bus.modify(rcc::CFGR0, |v| {
        (v & !rcc::CFGR0_SW_MASK) | SysclkSource::Pll.sw_bits()
    });
    wait_for_switch(bus, SysclkSource::Pll)
}

/// The crystal pins are GPIO until AFIO remaps them, and AFIO ignores
/// writes until its clock gate is open.
fn route_crystal_pins<B: Bus>(bus: &mut B) {
    bus.set_bits(rcc::APB2PCENR, rcc::Apb2::AFIOEN.bits());
    bus.set_bits(afio::PCFR1, afio::PCFR1_PA12_RM);
}

fn init_hse<B: Bus>(bus: &mut B, config: &ClockConfig) -> Result<(), Stalled> {
    route_crystal_pins(bus);
    bus.write(flash::ACTLR, config.flash_latency().bits());
    bus.write(
        rcc::CTLR,
        (rcc::Ctlr::HSION | rcc::Ctlr::HSEON).bits() | config.trim_bits(),
    );
    wait::until_set(bus, WaitSite::HseReady, rcc::CTLR, rcc::Ctlr::HSERDY.bits())?;

    bus.write(
        rcc::CFGR0,
        config.prescaler.hpre_bits() | SysclkSource::Hse.sw_bits(),
    );
    wait_for_switch(bus, SysclkSource::Hse)?;

    // Running from the crystal now; HSI is no longer needed.
    bus.write(rcc::CTLR, rcc::Ctlr::HSEON.bits());
    Ok(())
}

fn init_hse_pll<B: Bus>(bus: &mut B, config: &ClockConfig) -> Result<(), Stalled> {
    route_crystal_pins(bus);
    // Covers the bare-crystal stage as well as the PLL output.
    bus.write(flash::ACTLR, config.flash_latency().bits());
    bus.write(
        rcc::CTLR,
        (rcc::Ctlr::HSION | rcc::Ctlr::HSEON | rcc::Ctlr::PLLON).bits() | config.trim_bits(),
    );
    wait::until_set(bus, WaitSite::HseReady, rcc::CTLR, rcc::Ctlr::HSERDY.bits())?;

    // Park SYSCLK on the bare crystal while the PLL is re-referenced.
    bus.write(
        rcc::CFGR0,
        config.prescaler.hpre_bits() | SysclkSource::Hse.sw_bits(),
    );
    wait_for_switch(bus, SysclkSource::Hse)?;

    // PLLSRC is locked while the PLL runs: stop it, swap the reference, restart.
    bus.write(rcc::CTLR, rcc::Ctlr::HSEON.bits());
    bus.write(
        rcc::CFGR0,
        config.prescaler.hpre_bits() | SysclkSource::Hse.sw_bits() | rcc::CFGR0_PLLSRC,
    );
    bus.write(rcc::CTLR, (rcc::Ctlr::HSEON | rcc::Ctlr::PLLON).bits());
    wait::until_set(bus, WaitSite::PllReady, rcc::CTLR, rcc::Ctlr::PLLRDY.bits())?;

    bus.write(
        rcc::CFGR0,
        config.prescaler.hpre_bits() | SysclkSource::Pll.sw_bits() | rcc::CFGR0_PLLSRC,
    );
    wait_for_switch(bus, SysclkSource::Pll)
}

/// Drives `source` out on PC4.
pub fn mco_init<B: Bus>(bus: &mut B, source: McoSource) {
    bus.set_bits(
        rcc::APB2PCENR,
        (rcc::Apb2::AFIOEN | rcc::Apb2::IOPCEN).bits(),
    );
    let shift = 4 * 4;
    bus.modify(gpio::GPIOC + gpio::CFGLR, |v| {
        (v & !(0xF << shift)) | (gpio::MODE_AF_PP_50MHZ << shift)
    });
    bus.modify(rcc::CFGR0, |v| {
        (v & !rcc::CFGR0_MCO_MASK) | ((source as u32) << rcc::CFGR0_MCO_SHIFT)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequencies_per_variant() {
        assert_eq!(ClockConfig::hsi().sysclk_hz(), 24_000_000);
        assert_eq!(ClockConfig::hsi_pll().sysclk_hz(), 48_000_000);
        assert_eq!(ClockConfig::hse().sysclk_hz(), 24_000_000);
        assert_eq!(ClockConfig::hse_pll().sysclk_hz(), 48_000_000);
        assert_eq!(
            ClockConfig::hse_pll().with_hse_frequency(12_000_000).sysclk_hz(),
            24_000_000
        );
        assert_eq!(ClockConfig::RESET.hclk_hz(), 8_000_000);
        assert_eq!(
            ClockConfig::hsi_pll()
                .with_prescaler(AhbPrescaler::Div4)
                .hclk_hz(),
            12_000_000
        );
    }

    #[test]
    fn test_latency_follows_frequency_band() {
        assert_eq!(ClockConfig::hsi().flash_latency(), FlashLatency::Zero);
        assert_eq!(ClockConfig::hsi_pll().flash_latency(), FlashLatency::One);
        assert_eq!(
            ClockConfig::hse().with_hse_frequency(25_000_000).flash_latency(),
            FlashLatency::One
        );
        // The divider does not change flash timing, SYSCLK does.
        assert_eq!(
            ClockConfig::hsi_pll()
                .with_prescaler(AhbPrescaler::Div256)
                .flash_latency(),
            FlashLatency::One
        );
        assert!(FlashLatency::One.is_sufficient_for(48_000_000));
        assert!(!FlashLatency::Zero.is_sufficient_for(48_000_000));
    }

    #[test]
    fn test_hpre_encoding_roundtrips_through_decoder() {
        for p in [
            AhbPrescaler::Div1,
            AhbPrescaler::Div3,
            AhbPrescaler::Div8,
            AhbPrescaler::Div16,
            AhbPrescaler::Div256,
        ] {
            let field = p.hpre_bits() >> rcc::CFGR0_HPRE_SHIFT;
            assert_eq!(AhbPrescaler::from_hpre(field), p);
        }
        assert_eq!(AhbPrescaler::from_hpre(0b1000), AhbPrescaler::Div2);
    }

    #[test]
    fn test_trim_is_five_bits() {
        let cfg = ClockConfig::hsi().with_trim(0xFF);
        assert_eq!(cfg.hsi_trim, 0x1F);
        assert_eq!(cfg.trim_bits(), rcc::CTLR_HSITRIM_MASK);
    }

    #[test]
    fn test_sysclk_source_bits() {
        assert_eq!(SysclkSource::Pll.sws_bits(), 0x08);
        assert_eq!(SysclkSource::Hse.sws_bits(), 0x04);
        assert_eq!(SysclkSource::from_bits(0b11), None);
        assert_eq!(ClockSource::HsePll.sysclk(), SysclkSource::Pll);
    }

    #[test]
    fn test_configured_defaults_to_hsi_pll() {
        // The test build uses the crate's default feature set.
        assert_eq!(ClockConfig::CONFIGURED.source, ClockSource::HsiPll);
        assert_eq!(ClockConfig::default(), ClockConfig::CONFIGURED);
    }

    #[test]
    fn test_hse_pll_sets_latency_before_crystal_starts() {
        let mut bus = crate::bus::tests::FakeBus::with_limit(Some(1));
        let config = ClockConfig::hse_pll().with_hse_frequency(25_000_000);
        // No crystal answers on the fake bus; only the write order matters.
        let err = init_hse_pll(&mut bus, &config).unwrap_err();
        assert_eq!(err.site, WaitSite::HseReady);

        let position = |addr: u32, pred: fn(u32) -> bool| {
            bus.writes.iter().position(|&(a, v)| a == addr && pred(v))
        };
        let latency = position(flash::ACTLR, |v| v == FlashLatency::Two.bits());
        let hse_on = position(rcc::CTLR, |v| v & rcc::Ctlr::HSEON.bits() != 0);
        assert!(latency.is_some());
        assert!(latency < hse_on, "writes {:x?}", bus.writes);
    }

    #[test]
    fn test_mco_routes_pc4() {
        let mut bus = crate::bus::tests::FakeBus::default();
        mco_init(&mut bus, McoSource::Sysclk);
        assert_eq!(
            (bus.read(gpio::GPIOC + gpio::CFGLR) >> 16) & 0xF,
            gpio::MODE_AF_PP_50MHZ
        );
        assert_eq!(bus.read(rcc::CFGR0) & rcc::CFGR0_MCO_MASK, 0b100 << 24);
        assert_ne!(bus.read(rcc::APB2PCENR) & rcc::Apb2::IOPCEN.bits(), 0);
    }
}
