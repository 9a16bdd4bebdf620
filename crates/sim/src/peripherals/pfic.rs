// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;
use ch32boot_hal::regs::pfic;

const SCTLR: u32 = pfic::SCTLR - pfic::BASE;

/// The parts of the interrupt controller that sleep and reset go through.
#[derive(Debug, Default, serde::Serialize)]
pub struct Pfic {
    sctlr: u32,
    event: bool,
    sysreset: bool,
}

impl Pfic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sctlr(&self) -> u32 {
        self.sctlr
    }

    /// Consumes the event latched by SETEVENT.
    pub fn take_event(&mut self) -> bool {
        std::mem::take(&mut self.event)
    }

    /// Latches a wake-up event, as an unmasked EXTI event line does.
    pub fn latch_event(&mut self) {
        self.event = true;
    }

    pub fn take_sysreset(&mut self) -> bool {
        std::mem::take(&mut self.sysreset)
    }
}

impl crate::Peripheral for Pfic {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            SCTLR => self.sctlr,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        if offset == SCTLR {
            if value & pfic::Sctlr::SETEVENT.bits() != 0 {
                self.event = true;
            }
            if value & pfic::Sctlr::SYSRESET.bits() != 0 {
                self.sysreset = true;
            }
            self.sctlr = value & !pfic::Sctlr::SYSRESET.bits();
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
