// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Bring-up layer for the WCH CH32V003.
//!
//! Takes the core from reset to `main` and offers the few services an
//! application needs afterwards: delays, the independent watchdog, sleep and
//! standby, the wake-up timer. Every routine talks to hardware through
//! [`Bus`]/[`Hart`], so the same code runs against [`Mmio`] on the chip and
//! against a register simulation on the host.

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod bus;
pub mod clock;
pub mod delay;
pub mod power;
pub mod regs;
pub mod vectors;
pub mod wait;
pub mod watchdog;

#[cfg(all(target_arch = "riscv32", target_os = "none"))]
pub mod rt;

pub use boot::{BootImage, BootObserver, BootStage, MemoryRegion, SysConfig};
pub use bus::{Bus, Hart, Mmio};
pub use clock::{AhbPrescaler, ClockConfig, ClockSource, FlashLatency, McoSource, SysclkSource};
pub use power::{AwuPeriod, PowerMode};
pub use vectors::{Interrupt, Resolution, VectorTable, VectorTableBuilder};
pub use wait::{Stalled, WaitSite};
pub use watchdog::IwdgPeriod;
