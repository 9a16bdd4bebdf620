// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register map of the CH32V003 blocks touched during bring-up.
//!
//! Addresses are absolute. Single-bit fields are `bitflags`, multi-bit fields
//! are plain masks with a shift.

pub mod rcc {
    use bitflags::bitflags;

    pub const BASE: u32 = 0x4002_1000;
    pub const CTLR: u32 = BASE;
    pub const CFGR0: u32 = BASE + 0x04;
    pub const INTR: u32 = BASE + 0x08;
    pub const APB2PRSTR: u32 = BASE + 0x0C;
    pub const APB1PRSTR: u32 = BASE + 0x10;
    pub const AHBPCENR: u32 = BASE + 0x14;
    pub const APB2PCENR: u32 = BASE + 0x18;
    pub const APB1PCENR: u32 = BASE + 0x1C;
    pub const RSTSCKR: u32 = BASE + 0x24;

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctlr: u32 {
            const HSION = 1 << 0;
            const HSIRDY = 1 << 1;
            const HSEON = 1 << 16;
            const HSERDY = 1 << 17;
            const HSEBYP = 1 << 18;
            const CSSON = 1 << 19;
            const PLLON = 1 << 24;
            const PLLRDY = 1 << 25;
        }
    }

    pub const CTLR_HSITRIM_SHIFT: u32 = 3;
    pub const CTLR_HSITRIM_MASK: u32 = 0x1F << CTLR_HSITRIM_SHIFT;
    pub const CTLR_HSICAL_MASK: u32 = 0xFF << 8;

    pub const CFGR0_SW_MASK: u32 = 0b11;
    pub const CFGR0_SWS_SHIFT: u32 = 2;
    pub const CFGR0_SWS_MASK: u32 = 0b11 << CFGR0_SWS_SHIFT;
    pub const CFGR0_HPRE_SHIFT: u32 = 4;
    pub const CFGR0_HPRE_MASK: u32 = 0xF << CFGR0_HPRE_SHIFT;
    pub const CFGR0_PLLSRC: u32 = 1 << 16;
    pub const CFGR0_MCO_SHIFT: u32 = 24;
    pub const CFGR0_MCO_MASK: u32 = 0b111 << CFGR0_MCO_SHIFT;

    /// Writing this to INTR clears every oscillator-ready and CSS flag.
    pub const INTR_CLEAR_ALL: u32 = 0x009F_0000;
    pub const INTR_LSIRDYF: u32 = 1 << 0;
    pub const INTR_HSIRDYF: u32 = 1 << 2;
    pub const INTR_HSERDYF: u32 = 1 << 3;
    pub const INTR_PLLRDYF: u32 = 1 << 4;
    pub const INTR_CLEAR_SHIFT: u32 = 16;

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Apb2: u32 {
            const AFIOEN = 1 << 0;
            const IOPAEN = 1 << 2;
            const IOPCEN = 1 << 4;
            const IOPDEN = 1 << 5;
            const ADC1EN = 1 << 9;
            const TIM1EN = 1 << 11;
            const SPI1EN = 1 << 12;
            const USART1EN = 1 << 14;
        }
    }

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Apb1: u32 {
            const TIM2EN = 1 << 0;
            const WWDGEN = 1 << 11;
            const I2C1EN = 1 << 21;
            const PWREN = 1 << 28;
        }
    }

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Rstsckr: u32 {
            const LSION = 1 << 0;
            const LSIRDY = 1 << 1;
            const RMVF = 1 << 24;
            const PINRSTF = 1 << 26;
            const PORRSTF = 1 << 27;
            const SFTRSTF = 1 << 28;
            const IWDGRSTF = 1 << 29;
            const WWDGRSTF = 1 << 30;
            const LPWRRSTF = 1 << 31;
        }
    }
}

pub mod flash {
    pub const BASE: u32 = 0x4002_2000;
    pub const ACTLR: u32 = BASE;
    pub const ACTLR_LATENCY_MASK: u32 = 0b11;
}

pub mod afio {
    pub const BASE: u32 = 0x4001_0000;
    pub const ECR: u32 = BASE;
    pub const PCFR1: u32 = BASE + 0x04;
    pub const EXTICR: u32 = BASE + 0x08;

    /// Routes PA1/PA2 to the crystal oscillator instead of GPIO.
    pub const PCFR1_PA12_RM: u32 = 1 << 15;
}

pub mod gpio {
    pub const GPIOA: u32 = 0x4001_0800;
    pub const GPIOC: u32 = 0x4001_1000;
    pub const GPIOD: u32 = 0x4001_1400;

    pub const CFGLR: u32 = 0x00;
    pub const INDR: u32 = 0x08;
    pub const OUTDR: u32 = 0x0C;
    pub const BSHR: u32 = 0x10;
    pub const BCR: u32 = 0x14;
    pub const LCKR: u32 = 0x18;

    /// CFGLR nibble: alternate function push-pull, 50 MHz.
    pub const MODE_AF_PP_50MHZ: u32 = 0b1011;
    /// CFGLR nibble: general purpose push-pull, 10 MHz.
    pub const MODE_OUT_PP_10MHZ: u32 = 0b0001;
}

pub mod exti {
    pub const BASE: u32 = 0x4001_0400;
    pub const INTENR: u32 = BASE;
    pub const EVENR: u32 = BASE + 0x04;
    pub const RTENR: u32 = BASE + 0x08;
    pub const FTENR: u32 = BASE + 0x0C;
    pub const SWIEVR: u32 = BASE + 0x10;
    pub const INTFR: u32 = BASE + 0x14;

    pub const LINE_PVD: u32 = 8;
    pub const LINE_AWU: u32 = 9;
    pub const LINE_MASK: u32 = 0x3FF;
}

pub mod pwr {
    use bitflags::bitflags;

    pub const BASE: u32 = 0x4000_7000;
    pub const CTLR: u32 = BASE;
    pub const CSR: u32 = BASE + 0x04;
    pub const AWUCSR: u32 = BASE + 0x08;
    pub const AWUWR: u32 = BASE + 0x0C;
    pub const AWUPSC: u32 = BASE + 0x10;

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctlr: u32 {
            const PDDS = 1 << 1;
            const PVDE = 1 << 4;
        }
    }

    pub const AWUCSR_AWUEN: u32 = 1 << 1;
    pub const AWUWR_MASK: u32 = 0x3F;
    pub const AWUPSC_MASK: u32 = 0xF;
}

pub mod pfic {
    use bitflags::bitflags;

    pub const BASE: u32 = 0xE000_E000;
    pub const IENR: u32 = BASE + 0x100;
    pub const IRER: u32 = BASE + 0x180;
    pub const SCTLR: u32 = BASE + 0xD10;

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Sctlr: u32 {
            const SLEEPONEXIT = 1 << 1;
            const SLEEPDEEP = 1 << 2;
            const WFITOWFE = 1 << 3;
            const SEVONPEND = 1 << 4;
            const SETEVENT = 1 << 5;
            const SYSRESET = 1 << 31;
        }
    }
}

pub mod stk {
    use bitflags::bitflags;

    pub const BASE: u32 = 0xE000_F000;
    pub const CTLR: u32 = BASE;
    pub const SR: u32 = BASE + 0x04;
    pub const CNT: u32 = BASE + 0x08;
    pub const CMP: u32 = BASE + 0x10;

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctlr: u32 {
            const STE = 1 << 0;
            const STIE = 1 << 1;
            /// Count on HCLK instead of HCLK/8.
            const STCLK = 1 << 2;
            const STRE = 1 << 3;
            const SWIE = 1 << 31;
        }
    }

    pub const SR_CNTIF: u32 = 1 << 0;
}

pub mod iwdg {
    use bitflags::bitflags;

    pub const BASE: u32 = 0x4000_3000;
    pub const CTLR: u32 = BASE;
    pub const PSCR: u32 = BASE + 0x04;
    pub const RLDR: u32 = BASE + 0x08;
    pub const STATR: u32 = BASE + 0x0C;

    pub const KEY_UNLOCK: u32 = 0x5555;
    pub const KEY_RELOAD: u32 = 0xAAAA;
    pub const KEY_START: u32 = 0xCCCC;

    pub const PSCR_MASK: u32 = 0b111;
    /// LSI / 256.
    pub const PSCR_DIV256: u32 = 0b111;
    pub const RLDR_MASK: u32 = 0x0FFF;

    bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Statr: u32 {
            /// Prescaler update in progress.
            const PVU = 1 << 0;
            /// Reload update in progress.
            const RVU = 1 << 1;
        }
    }
}

/// Frequency of the internal RC oscillator.
pub const HSI_HZ: u32 = 24_000_000;
/// Frequency of the internal low-speed oscillator feeding IWDG and AWU.
pub const LSI_HZ: u32 = 128_000;
