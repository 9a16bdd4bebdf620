// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{PeripheralTickResult, SimResult, TickContext};
use ch32boot_hal::regs::flash;
use ch32boot_hal::FlashLatency;

const ACTLR: u32 = flash::ACTLR - flash::BASE;

/// SYSCLK ran faster than the programmed wait-states allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FlashViolation {
    pub sysclk_hz: u32,
    pub latency: FlashLatency,
}

/// Flash interface. Only the access control register is modelled.
#[derive(Debug, Default, serde::Serialize)]
pub struct Flash {
    actlr: u32,
    pub violations: Vec<FlashViolation>,
}

impl Flash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latency(&self) -> FlashLatency {
        FlashLatency::from_bits(self.actlr & flash::ACTLR_LATENCY_MASK)
    }

    /// Records a violation the first time a given frequency outruns the latency.
    pub fn check(&mut self, sysclk_hz: u32) {
        let latency = self.latency();
        if latency.is_sufficient_for(sysclk_hz) {
            return;
        }
        let violation = FlashViolation { sysclk_hz, latency };
        if self.violations.last() != Some(&violation) {
            tracing::warn!(sysclk_hz, ?latency, "FLASH: too few wait-states for SYSCLK");
            self.violations.push(violation);
        }
    }
}

impl crate::Peripheral for Flash {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            ACTLR => self.actlr,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        if offset == ACTLR {
            self.actlr = value & flash::ACTLR_LATENCY_MASK;
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &TickContext) -> PeripheralTickResult {
        self.check(ctx.clocks.sysclk_hz);
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

    #[test]
    fn test_violation_recorded_once() {
        let mut flash = Flash::new();
        flash.check(24_000_000);
        assert!(flash.violations.is_empty());
        flash.check(48_000_000);
        flash.check(48_000_000);
        assert_eq!(flash.violations.len(), 1);

        flash.write(ACTLR, FlashLatency::One.bits()).unwrap();
        flash.check(48_000_000);
        assert_eq!(flash.violations.len(), 1);
    }
}
