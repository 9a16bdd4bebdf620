// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The interrupt vector table.
//!
//! On target the table lives in `rt/vectors.S` and every named slot is bound
//! at link time: `link.x` only `PROVIDE`s the name as `DefaultIRQHandler`, so
//! an application defining `#[no_mangle] extern "C" fn TIM2_IRQHandler()`
//! takes the slot over. [`VectorTable`] is the same contract as a value, for
//! hosts that dispatch interrupts themselves.

/// Number of words in the table, including the reset jump.
pub const TABLE_LEN: usize = 39;

/// Symbol every unclaimed slot resolves to.
pub const DEFAULT_HANDLER: &str = "DefaultIRQHandler";

macro_rules! interrupts {
    ($($name:ident = $slot:literal => $symbol:literal,)+) => {
        /// Every overridable slot of the table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[allow(non_camel_case_types)]
        pub enum Interrupt {
            $($name = $slot,)+
        }

        impl Interrupt {
            pub const ALL: &'static [Interrupt] = &[$(Interrupt::$name,)+];

            pub const fn slot(self) -> usize {
                self as usize
            }

            /// Reserved symbol an application defines to claim the slot.
            pub const fn handler_name(self) -> &'static str {
                match self {
                    $(Interrupt::$name => $symbol,)+
                }
            }

            pub const fn from_slot(slot: usize) -> Option<Self> {
                match slot {
                    $($slot => Some(Interrupt::$name),)+
                    _ => None,
                }
            }
        }
    };
}

interrupts! {
    Nmi = 2 => "NMI_Handler",
    HardFault = 3 => "HardFault_Handler",
    SysTick = 12 => "SysTick_Handler",
    Software = 14 => "SW_Handler",
    Wwdg = 16 => "WWDG_IRQHandler",
    Pvd = 17 => "PVD_IRQHandler",
    Flash = 18 => "FLASH_IRQHandler",
    Rcc = 19 => "RCC_IRQHandler",
    Exti7_0 = 20 => "EXTI7_0_IRQHandler",
    Awu = 21 => "AWU_IRQHandler",
    Dma1Channel1 = 22 => "DMA1_Channel1_IRQHandler",
    Dma1Channel2 = 23 => "DMA1_Channel2_IRQHandler",
    Dma1Channel3 = 24 => "DMA1_Channel3_IRQHandler",
    Dma1Channel4 = 25 => "DMA1_Channel4_IRQHandler",
    Dma1Channel5 = 26 => "DMA1_Channel5_IRQHandler",
    Dma1Channel6 = 27 => "DMA1_Channel6_IRQHandler",
    Dma1Channel7 = 28 => "DMA1_Channel7_IRQHandler",
    Adc1 = 29 => "ADC1_IRQHandler",
    I2c1Ev = 30 => "I2C1_EV_IRQHandler",
    I2c1Er = 31 => "I2C1_ER_IRQHandler",
    Usart1 = 32 => "USART1_IRQHandler",
    Spi1 = 33 => "SPI1_IRQHandler",
    Tim1Brk = 34 => "TIM1_BRK_IRQHandler",
    Tim1Up = 35 => "TIM1_UP_IRQHandler",
    Tim1TrgCom = 36 => "TIM1_TRG_COM_IRQHandler",
    Tim1Cc = 37 => "TIM1_CC_IRQHandler",
    Tim2 = 38 => "TIM2_IRQHandler",
}

impl Interrupt {
    /// Sources able to bring the chip out of standby.
    pub const fn wakes_from_standby(self) -> bool {
        matches!(self, Self::Exti7_0 | Self::Awu | Self::Pvd)
    }
}

/// What the word at a table offset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// `j handle_reset`, executed in place.
    ResetJump,
    Reserved,
    Vector(Interrupt),
}

impl Slot {
    pub const fn at(index: usize) -> Option<Self> {
        if index == 0 {
            return Some(Self::ResetJump);
        }
        if index >= TABLE_LEN {
            return None;
        }
        match Interrupt::from_slot(index) {
            Some(irq) => Some(Self::Vector(irq)),
            None => Some(Self::Reserved),
        }
    }
}

pub type Handler = fn();

/// How a slot resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    User(Handler),
    /// The default handler: spins forever.
    Fallback,
}

/// Collects overrides. Slots nobody claims fall back to the default handler.
#[derive(Debug, Clone)]
pub struct VectorTableBuilder {
    slots: [Option<Handler>; TABLE_LEN],
}

impl Default for VectorTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorTableBuilder {
    pub const fn new() -> Self {
        Self {
            slots: [None; TABLE_LEN],
        }
    }

    /// Later overrides of the same slot replace earlier ones.
    pub fn override_slot(mut self, irq: Interrupt, handler: Handler) -> Self {
        self.slots[irq.slot()] = Some(handler);
        self
    }

    pub fn freeze(self) -> VectorTable {
        VectorTable { slots: self.slots }
    }
}

/// A frozen table. Every slot resolves.
#[derive(Debug, Clone)]
pub struct VectorTable {
    slots: [Option<Handler>; TABLE_LEN],
}

impl Default for VectorTable {
    fn default() -> Self {
        VectorTableBuilder::new().freeze()
    }
}

impl VectorTable {
    pub fn builder() -> VectorTableBuilder {
        VectorTableBuilder::new()
    }

    pub fn resolve(&self, irq: Interrupt) -> Resolution {
        match self.slots[irq.slot()] {
            Some(handler) => Resolution::User(handler),
            None => Resolution::Fallback,
        }
    }

    pub fn overridden(&self) -> impl Iterator<Item = Interrupt> + '_ {
        Interrupt::ALL
            .iter()
            .copied()
            .filter(|irq| self.slots[irq.slot()].is_some())
    }
}
