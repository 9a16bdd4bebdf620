// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register-level model of the CH32V003 blocks the bring-up layer touches.
//!
//! [`SimChip`] implements the hal's `Bus` and `Hart`, so the real clock,
//! delay, watchdog and power routines run unchanged against it. Time moves
//! only when the code under test writes a register or spins.

pub mod bus;
pub mod chip;
pub mod harness;
pub mod observer;
pub mod peripherals;

use ch32boot_hal::{Interrupt, SysclkSource};
use std::any::Any;

pub use bus::SystemBus;
pub use chip::{Dispatch, ResetRecord, SimChip, StageRecorder, Stimulus, WakeSource};
pub use harness::{BootHarness, BootOutcome, BootReport};
pub use observer::{ChipObserver, Journal, JournalEntry, TracingObserver};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("No peripheral mapped at {0:#010x}")]
    Unmapped(u32),
    #[error("Unaligned word access at {0:#010x}")]
    Misaligned(u32),
    #[error("Peripheral '{0}' missing from the bus")]
    MissingPeripheral(&'static str),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Why the chip restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetCause {
    PowerOn,
    Pin,
    Software,
    Watchdog,
}

/// Clock frequencies as RCC currently drives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ClockTree {
    pub source: SysclkSource,
    pub sysclk_hz: u32,
    pub hclk_hz: u32,
    pub lsi_running: bool,
}

/// What a peripheral sees while time advances.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// HCLK cycles elapsed in this step.
    pub cycles: u64,
    /// LSI periods elapsed in this step. Zero while LSI is off.
    pub lsi_ticks: u64,
    pub clocks: ClockTree,
    /// False in standby: the core clock domain is stopped.
    pub hclk_running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeripheralTickResult {
    pub reset: Option<ResetCause>,
    /// EXTI lines that saw an edge. The bus routes them through EXTI.
    pub exti_lines: Vec<u32>,
    /// EXTI lines that produced a wake-up event.
    pub events: Vec<u32>,
    pub irqs: Vec<Interrupt>,
}

impl PeripheralTickResult {
    pub fn merge(&mut self, other: PeripheralTickResult) {
        self.reset = self.reset.or(other.reset);
        self.exti_lines.extend(other.exti_lines);
        self.events.extend(other.events);
        self.irqs.extend(other.irqs);
    }
}

/// A memory-mapped block. Offsets are relative to its base and word aligned.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u32) -> SimResult<u32>;
    fn write(&mut self, offset: u32, value: u32) -> SimResult<()>;
    fn tick(&mut self, _ctx: &TickContext) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
