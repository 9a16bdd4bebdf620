// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::afio::Afio;
use crate::peripherals::exti::Exti;
use crate::peripherals::flash::Flash;
use crate::peripherals::gpio::GpioPort;
use crate::peripherals::iwdg::Iwdg;
use crate::peripherals::pfic::Pfic;
use crate::peripherals::pwr::Pwr;
use crate::peripherals::rcc::Rcc;
use crate::peripherals::systick::Systick;
use crate::{ClockTree, Peripheral, PeripheralTickResult, SimResult, SimulationError, TickContext};
use ch32boot_config::BoardConfig;
use ch32boot_hal::regs::{self, afio, exti, flash, gpio, iwdg, pfic, pwr, rcc, stk};

/// Enable bit that must be set in RCC before a block answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockGate {
    Apb1(u32),
    Apb2(u32),
}

pub struct PeripheralEntry {
    pub name: &'static str,
    pub base: u32,
    pub size: u32,
    pub gate: Option<ClockGate>,
    pub dev: Box<dyn Peripheral>,
}

impl std::fmt::Debug for PeripheralEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralEntry")
            .field("name", &self.name)
            .field("base", &format_args!("{:#010x}", self.base))
            .field("gate", &self.gate)
            .finish()
    }
}

impl PeripheralEntry {
    fn new(
        name: &'static str,
        base: u32,
        size: u32,
        gate: Option<ClockGate>,
        dev: Box<dyn Peripheral>,
    ) -> Self {
        Self {
            name,
            base,
            size,
            gate,
            dev,
        }
    }

    fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// Every register block of the chip behind one address decoder.
#[derive(Debug)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    /// LSI phase carried between steps, in units of `hclk_hz`.
    lsi_acc: u64,
    /// Writes a closed clock gate swallowed.
    pub dropped_writes: u32,
}

impl SystemBus {
    pub fn new(board: &BoardConfig) -> Self {
        let apb2 = |flag: rcc::Apb2| Some(ClockGate::Apb2(flag.bits()));
        let peripherals = vec![
            PeripheralEntry::new(
                "rcc",
                rcc::BASE,
                0x400,
                None,
                Box::new(Rcc::new(board.timing, board.hse)),
            ),
            PeripheralEntry::new("flash", flash::BASE, 0x400, None, Box::new(Flash::new())),
            PeripheralEntry::new(
                "afio",
                afio::BASE,
                0x400,
                apb2(rcc::Apb2::AFIOEN),
                Box::new(Afio::new()),
            ),
            PeripheralEntry::new("exti", exti::BASE, 0x400, None, Box::new(Exti::new())),
            PeripheralEntry::new(
                "gpioa",
                gpio::GPIOA,
                0x400,
                apb2(rcc::Apb2::IOPAEN),
                Box::new(GpioPort::new()),
            ),
            PeripheralEntry::new(
                "gpioc",
                gpio::GPIOC,
                0x400,
                apb2(rcc::Apb2::IOPCEN),
                Box::new(GpioPort::new()),
            ),
            PeripheralEntry::new(
                "gpiod",
                gpio::GPIOD,
                0x400,
                apb2(rcc::Apb2::IOPDEN),
                Box::new(GpioPort::new()),
            ),
            PeripheralEntry::new(
                "pwr",
                pwr::BASE,
                0x400,
                Some(ClockGate::Apb1(rcc::Apb1::PWREN.bits())),
                Box::new(Pwr::new()),
            ),
            PeripheralEntry::new(
                "iwdg",
                iwdg::BASE,
                0x400,
                None,
                Box::new(Iwdg::new(board.timing.iwdg_update_lsi_ticks)),
            ),
            PeripheralEntry::new("pfic", pfic::BASE, 0x1000, None, Box::new(Pfic::new())),
            PeripheralEntry::new("stk", stk::BASE, 0x100, None, Box::new(Systick::new())),
        ];

        Self {
            peripherals,
            lsi_acc: 0,
            dropped_writes: 0,
        }
    }

    fn entry_index(&self, addr: u32) -> SimResult<usize> {
        if addr % 4 != 0 {
            return Err(SimulationError::Misaligned(addr));
        }
        self.peripherals
            .iter()
            .position(|p| p.contains(addr))
            .ok_or(SimulationError::Unmapped(addr))
    }

    fn gate_open(&self, gate: Option<ClockGate>) -> SimResult<bool> {
        let Some(gate) = gate else {
            return Ok(true);
        };
        let rcc = self.peripheral::<Rcc>("rcc")?;
        Ok(match gate {
            ClockGate::Apb1(mask) => rcc.apb1_enabled(mask),
            ClockGate::Apb2(mask) => rcc.apb2_enabled(mask),
        })
    }

    /// A gated block reads as zero.
    pub fn read_u32(&self, addr: u32) -> SimResult<u32> {
        let index = self.entry_index(addr)?;
        let entry = &self.peripherals[index];
        if !self.gate_open(entry.gate)? {
            return Ok(0);
        }
        entry.dev.read(addr - entry.base)
    }

    /// `Ok(false)` when a closed clock gate dropped the write.
    pub fn write_u32(&mut self, addr: u32, value: u32) -> SimResult<bool> {
        let index = self.entry_index(addr)?;
        if !self.gate_open(self.peripherals[index].gate)? {
            let entry = &self.peripherals[index];
            tracing::warn!(
                peripheral = entry.name,
                addr = format_args!("{:#010x}", addr),
                "Write dropped: peripheral clock disabled"
            );
            self.dropped_writes += 1;
            return Ok(false);
        }
        let entry = &mut self.peripherals[index];
        entry.dev.write(addr - entry.base, value)?;
        Ok(true)
    }

    pub fn peripheral<T: Peripheral + 'static>(&self, name: &'static str) -> SimResult<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
            .ok_or(SimulationError::MissingPeripheral(name))
    }

    pub fn peripheral_mut<T: Peripheral + 'static>(
        &mut self,
        name: &'static str,
    ) -> SimResult<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
            .ok_or(SimulationError::MissingPeripheral(name))
    }

    pub fn clocks(&self) -> SimResult<ClockTree> {
        Ok(self.peripheral::<Rcc>("rcc")?.clock_tree())
    }

    /// Advances every block by `cycles` HCLK periods. With `hclk_running`
    /// false (standby) only the LSI domain moves.
    pub fn tick(&mut self, cycles: u64, hclk_running: bool) -> SimResult<PeripheralTickResult> {
        let routed = self.peripheral::<Afio>("afio")?.pa12_remapped();
        let watchdog_running = self.peripheral::<Iwdg>("iwdg")?.running();
        let rcc = self.peripheral_mut::<Rcc>("rcc")?;
        rcc.set_crystal_routed(routed);
        if watchdog_running {
            rcc.force_lsi();
        }
        let clocks = rcc.clock_tree();

        let lsi_ticks = if clocks.lsi_running && clocks.hclk_hz > 0 {
            let hclk = u64::from(clocks.hclk_hz);
            self.lsi_acc += cycles * u64::from(regs::LSI_HZ);
            let ticks = self.lsi_acc / hclk;
            self.lsi_acc %= hclk;
            ticks
        } else {
            self.lsi_acc = 0;
            0
        };

        let ctx = TickContext {
            cycles,
            lsi_ticks,
            clocks,
            hclk_running,
        };

        let mut result = PeripheralTickResult::default();
        for entry in &mut self.peripherals {
            result.merge(entry.dev.tick(&ctx));
        }

        // A switch completed by this tick must meet the wait-states already set.
        let sysclk_hz = self.peripheral::<Rcc>("rcc")?.clock_tree().sysclk_hz;
        self.peripheral_mut::<Flash>("flash")?.check(sysclk_hz);

        let lines = std::mem::take(&mut result.exti_lines);
        if !lines.is_empty() {
            let exti = self.peripheral_mut::<Exti>("exti")?;
            for line in lines {
                result.merge(exti.trigger(line));
            }
        }
        Ok(result)
    }

    /// Raises an edge on an EXTI line, as a pin or the PVD would.
    pub fn trigger_exti(&mut self, line: u32) -> SimResult<PeripheralTickResult> {
        Ok(self.peripheral_mut::<Exti>("exti")?.trigger(line))
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let map = self
            .peripherals
            .iter()
            .map(|p| (p.name.to_string(), p.dev.snapshot()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}
