// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{PeripheralTickResult, SimResult, TickContext};
use ch32boot_hal::regs::exti;
use ch32boot_hal::Interrupt;

const INTENR: u32 = exti::INTENR - exti::BASE;
const EVENR: u32 = exti::EVENR - exti::BASE;
const RTENR: u32 = exti::RTENR - exti::BASE;
const FTENR: u32 = exti::FTENR - exti::BASE;
const SWIEVR: u32 = exti::SWIEVR - exti::BASE;
const INTFR: u32 = exti::INTFR - exti::BASE;

/// External interrupt/event controller: GPIO lines 0-7, PVD on 8, AWU on 9.
#[derive(Debug, Default, serde::Serialize)]
pub struct Exti {
    pub intenr: u32,
    pub evenr: u32,
    pub rtenr: u32,
    pub ftenr: u32,
    pub swievr: u32,
    pub intfr: u32,
    #[serde(skip)]
    software: u32,
}

/// Vector a line raises when unmasked.
pub fn line_interrupt(line: u32) -> Option<Interrupt> {
    match line {
        0..=7 => Some(Interrupt::Exti7_0),
        exti::LINE_PVD => Some(Interrupt::Pvd),
        exti::LINE_AWU => Some(Interrupt::Awu),
        _ => None,
    }
}

impl Exti {
    pub fn new() -> Self {
        Self::default()
    }

    /// An edge arrived on `line`. Lines without an enabled edge ignore it.
    pub fn trigger(&mut self, line: u32) -> PeripheralTickResult {
        let bit = 1 << line;
        if line > 9 || (self.rtenr | self.ftenr) & bit == 0 {
            return PeripheralTickResult::default();
        }
        self.fire(line)
    }

    fn fire(&mut self, line: u32) -> PeripheralTickResult {
        let bit = 1 << line;
        let mut result = PeripheralTickResult::default();
        if self.evenr & bit != 0 {
            result.events.push(line);
        }
        if self.intenr & bit != 0 {
            self.intfr |= bit;
            result.irqs.extend(line_interrupt(line));
        }
        result
    }
}

impl crate::Peripheral for Exti {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            INTENR => self.intenr,
            EVENR => self.evenr,
            RTENR => self.rtenr,
            FTENR => self.ftenr,
            SWIEVR => self.swievr,
            INTFR => self.intfr,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        let value = value & exti::LINE_MASK;
        match offset {
            INTENR => self.intenr = value,
            EVENR => self.evenr = value,
            RTENR => self.rtenr = value,
            FTENR => self.ftenr = value,
            SWIEVR => {
                self.software |= value & !self.swievr;
                self.swievr = value;
            }
            INTFR => {
                // write 1 to clear, also drops the software request
                self.intfr &= !value;
                self.swievr &= !value;
            }
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self, _ctx: &TickContext) -> PeripheralTickResult {
        let mut result = PeripheralTickResult::default();
        let mut pending = std::mem::take(&mut self.software);
        while pending != 0 {
            let line = pending.trailing_zeros();
            pending &= pending - 1;
            result.merge(self.fire(line));
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
