// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;
use ch32boot_hal::regs::afio;

const ECR: u32 = afio::ECR - afio::BASE;
const PCFR1: u32 = afio::PCFR1 - afio::BASE;
const EXTICR: u32 = afio::EXTICR - afio::BASE;

/// Alternate function I/O: pin remapping and the EXTI port selection.
#[derive(Debug, Default, serde::Serialize)]
pub struct Afio {
    ecr: u32,
    pcfr1: u32,
    exticr: u32,
}

impl Afio {
    pub fn new() -> Self {
        Self::default()
    }

    /// PA1/PA2 belong to the crystal oscillator.
    pub fn pa12_remapped(&self) -> bool {
        self.pcfr1 & afio::PCFR1_PA12_RM != 0
    }

    /// Port (0 = A, 2 = C, 3 = D) feeding EXTI line `line`.
    pub fn exti_port(&self, line: u32) -> u32 {
        (self.exticr >> (2 * (line & 0x7))) & 0b11
    }
}

impl crate::Peripheral for Afio {
    fn read(&self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            ECR => self.ecr,
            PCFR1 => self.pcfr1,
            EXTICR => self.exticr,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            ECR => self.ecr = value & 0xFF,
            PCFR1 => self.pcfr1 = value,
            EXTICR => self.exticr = value & 0xFFFF,
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
