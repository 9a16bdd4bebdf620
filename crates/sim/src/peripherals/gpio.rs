// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;
use ch32boot_hal::regs::gpio;

/// One GPIO port. Eight pins, four configuration bits each.
#[derive(Debug, serde::Serialize)]
pub struct GpioPort {
    cfglr: u32,
    indr: u32,
    outdr: u32,
    lckr: u32,
}

impl Default for GpioPort {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioPort {
    pub fn new() -> Self {
        Self {
            // floating inputs
            cfglr: 0x4444_4444,
            indr: 0,
            outdr: 0,
            lckr: 0,
        }
    }

    /// CFGLR nibble of `pin`.
    pub fn mode(&self, pin: u32) -> u32 {
        (self.cfglr >> (4 * (pin & 0x7))) & 0xF
    }

    pub fn output(&self) -> u32 {
        self.outdr
    }

    /// Drives the input data register, as an external signal would.
    pub fn set_input(&mut self, pin: u32, high: bool) {
        let bit = 1 << (pin & 0x7);
        if high {
            self.indr |= bit;
        } else {
            self.indr &= !bit;
        }
    }
}

impl crate::Peripheral for GpioPort {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            gpio::CFGLR => self.cfglr,
            gpio::INDR => self.indr,
            gpio::OUTDR => self.outdr,
            gpio::LCKR => self.lckr,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            gpio::CFGLR => self.cfglr = value,
            gpio::OUTDR => self.outdr = value & 0xFF,
            gpio::BSHR => {
                let set = value & 0xFF;
                let reset = (value >> 16) & 0xFF;
                // set wins
                self.outdr = (self.outdr & !reset) | set;
            }
            gpio::BCR => self.outdr &= !(value & 0xFF),
            gpio::LCKR => self.lckr = value & 0x1FF,
            _ => {}
        }
        Ok(())
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
