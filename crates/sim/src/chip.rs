// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The simulated core: CSRs, sleep states, interrupt dispatch and time.

use crate::bus::SystemBus;
use crate::observer::{ChipObserver, Journal, JournalEntry};
use crate::peripherals::pfic::Pfic;
use crate::peripherals::pwr::Pwr;
use crate::peripherals::rcc::Rcc;
use crate::{ClockTree, Peripheral, PeripheralTickResult, ResetCause, SimResult};
use ch32boot_config::BoardConfig;
use ch32boot_hal::regs::pfic;
use ch32boot_hal::{
    BootStage, Bus, Hart, Interrupt, PowerMode, Resolution, Stalled, VectorTable, WaitSite,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something that happens to the chip from outside at a given cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stimulus {
    Interrupt(Interrupt),
    /// An edge on an EXTI line: a pin, the PVD or the AWU.
    ExtiLine(u32),
    Reset(ResetCause),
}

/// Why a `wfi` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeSource {
    Interrupt(Interrupt),
    Event(u32),
    /// The event register was already set when the wait started.
    LatchedEvent,
    Reset(ResetCause),
}

/// Outcome of taking an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled(Interrupt),
    /// No handler: the default handler spins forever.
    Halted(Interrupt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ResetRecord {
    pub at_cycle: u64,
    pub cause: ResetCause,
}

#[derive(Debug)]
pub struct SimChip {
    bus: SystemBus,
    board: BoardConfig,
    cycles: Arc<AtomicU64>,
    elapsed_ns: u64,
    ns_residue: u64,
    mstatus: u32,
    mtvec: u32,
    mode: PowerMode,
    interrupts_enabled: bool,
    vectors: VectorTable,
    pending: BTreeSet<Interrupt>,
    halted: Option<Interrupt>,
    last_event: Option<u32>,
    scheduled: Vec<(u64, Stimulus)>,
    resets: Vec<ResetRecord>,
    reset_latched: bool,
    journal: Journal,
    observers: Vec<Arc<dyn ChipObserver>>,
}

impl SimChip {
    pub fn new(board: &BoardConfig) -> Self {
        Self {
            bus: SystemBus::new(board),
            board: board.clone(),
            cycles: Arc::new(AtomicU64::new(0)),
            elapsed_ns: 0,
            ns_residue: 0,
            mstatus: 0,
            mtvec: 0,
            mode: PowerMode::Run,
            interrupts_enabled: false,
            vectors: VectorTable::default(),
            pending: BTreeSet::new(),
            halted: None,
            last_event: None,
            scheduled: Vec::new(),
            resets: Vec::new(),
            reset_latched: false,
            journal: Journal::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ChipObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_vectors(mut self, vectors: VectorTable) -> Self {
        self.vectors = vectors;
        self
    }

    pub fn observers(&self) -> &[Arc<dyn ChipObserver>] {
        &self.observers
    }

    pub fn board(&self) -> &BoardConfig {
        &self.board
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Shared view of the cycle counter, for observers living outside the chip.
    pub fn cycle_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.cycles)
    }

    /// Wall-clock time since power-on.
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }

    pub fn mstatus(&self) -> u32 {
        self.mstatus
    }

    pub fn mtvec(&self) -> u32 {
        self.mtvec
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    pub fn system(&self) -> &SystemBus {
        &self.bus
    }

    pub fn system_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    pub fn peripheral<T: Peripheral + 'static>(&self, name: &'static str) -> SimResult<&T> {
        self.bus.peripheral(name)
    }

    pub fn clocks(&self) -> SimResult<ClockTree> {
        self.bus.clocks()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    pub fn reset_log(&self) -> &[ResetRecord] {
        &self.resets
    }

    /// The interrupt whose missing handler stopped the core, if any.
    pub fn is_halted(&self) -> Option<Interrupt> {
        self.halted
    }

    pub fn pending(&self) -> impl Iterator<Item = Interrupt> + '_ {
        self.pending.iter().copied()
    }

    /// The `mret` into `main`: MPIE becomes MIE.
    pub fn enter_main(&mut self) {
        self.interrupts_enabled = self.mstatus & (1 << 7) != 0;
        self.service_pending();
    }

    /// Clears the latch that keeps busy-waits from spinning after a reset.
    pub fn acknowledge_reset(&mut self) -> Option<ResetRecord> {
        self.reset_latched = false;
        self.resets.last().copied()
    }

    pub fn schedule(&mut self, after_cycles: u64, stimulus: Stimulus) {
        let at = self.cycles() + after_cycles;
        let index = self.scheduled.partition_point(|(cycle, _)| *cycle <= at);
        self.scheduled.insert(index, (at, stimulus));
    }

    /// HCLK cycles in `ms` at the current clock tree.
    pub fn cycles_for_ms(&self, ms: u64) -> u64 {
        let hclk = self.clocks().map_or(0, |c| c.hclk_hz);
        u64::from(hclk) / 1_000 * ms
    }

    pub fn schedule_ms(&mut self, after_ms: u64, stimulus: Stimulus) {
        let cycles = self.cycles_for_ms(after_ms);
        self.schedule(cycles, stimulus);
    }

    /// Lets time pass without the core touching the bus.
    pub fn advance(&mut self, mut cycles: u64) {
        while cycles > 0 {
            let now = self.cycles();
            let step = match self.scheduled.first() {
                Some((at, _)) if *at <= now => 0,
                Some((at, _)) => (*at - now).min(cycles),
                None => cycles,
            };
            if step > 0 {
                self.step(step);
                cycles -= step;
            }
            self.fire_due();
        }
    }

    pub fn advance_ms(&mut self, ms: u64) {
        let cycles = self.cycles_for_ms(ms);
        self.advance(cycles);
    }

    fn fire_due(&mut self) {
        let now = self.cycles();
        while self.scheduled.first().is_some_and(|(at, _)| *at <= now) {
            let (_, stimulus) = self.scheduled.remove(0);
            tracing::debug!(cycle = now, ?stimulus, "Stimulus");
            match stimulus {
                Stimulus::Interrupt(irq) => {
                    self.raise(irq);
                }
                Stimulus::ExtiLine(line) => match self.bus.trigger_exti(line) {
                    Ok(result) => self.absorb(result),
                    Err(e) => tracing::warn!(%e, "EXTI stimulus failed"),
                },
                Stimulus::Reset(cause) => self.apply_reset(cause),
            }
        }
    }

    fn step(&mut self, cycles: u64) {
        let hclk_running = self.mode != PowerMode::Standby;
        let hclk_hz = self.clocks().map_or(0, |c| u64::from(c.hclk_hz));
        match self.bus.tick(cycles, hclk_running) {
            Ok(result) => {
                self.cycles.fetch_add(cycles, Ordering::Relaxed);
                self.add_time(cycles, hclk_hz);
                self.absorb(result);
            }
            Err(e) => {
                tracing::error!(%e, "Peripheral tick failed");
                self.cycles.fetch_add(cycles, Ordering::Relaxed);
            }
        }
    }

    fn add_time(&mut self, cycles: u64, hclk_hz: u64) {
        if hclk_hz == 0 {
            return;
        }
        let total = cycles * 1_000_000_000 + self.ns_residue;
        self.elapsed_ns += total / hclk_hz;
        self.ns_residue = total % hclk_hz;
    }

    fn absorb(&mut self, result: PeripheralTickResult) {
        for line in result.events {
            self.last_event = Some(line);
            if let Ok(pfic) = self.bus.peripheral_mut::<Pfic>("pfic") {
                pfic.latch_event();
            }
        }
        self.pending.extend(result.irqs);
        if let Some(cause) = result.reset {
            self.apply_reset(cause);
            return;
        }
        if self.mode == PowerMode::Run {
            self.service_pending();
        }
    }

    /// Pends `irq` and takes it at once if the core can.
    pub fn raise(&mut self, irq: Interrupt) -> Option<Dispatch> {
        self.pending.insert(irq);
        if self.mode != PowerMode::Run || !self.interrupts_enabled {
            return None;
        }
        self.service_pending().into_iter().find(|d| match d {
            Dispatch::Handled(i) | Dispatch::Halted(i) => *i == irq,
        })
    }

    /// Takes every pending interrupt, lowest slot first.
    pub fn service_pending(&mut self) -> Vec<Dispatch> {
        let mut taken = Vec::new();
        if !self.interrupts_enabled || self.halted.is_some() {
            return taken;
        }
        while let Some(irq) = self.pending.pop_first() {
            match self.vectors.resolve(irq) {
                Resolution::User(handler) => {
                    handler();
                    taken.push(Dispatch::Handled(irq));
                }
                Resolution::Fallback => {
                    tracing::error!(?irq, "No handler installed, core halted in default handler");
                    self.halted = Some(irq);
                    taken.push(Dispatch::Halted(irq));
                    break;
                }
            }
        }
        taken
    }

    pub fn apply_reset(&mut self, cause: ResetCause) {
        let cycle = self.cycles();
        let rcc = match self.bus.peripheral::<Rcc>("rcc") {
            Ok(rcc) => rcc.after_reset(cause),
            Err(_) => Rcc::new(self.board.timing, self.board.hse),
        };

        self.bus = SystemBus::new(&self.board);
        if let Ok(slot) = self.bus.peripheral_mut::<Rcc>("rcc") {
            *slot = rcc;
        }
        self.mstatus = 0;
        self.mtvec = 0;
        self.mode = PowerMode::Run;
        self.interrupts_enabled = false;
        self.pending.clear();
        self.halted = None;
        self.last_event = None;
        self.reset_latched = true;
        self.resets.push(ResetRecord {
            at_cycle: cycle,
            cause,
        });

        self.journal.push(JournalEntry::Reset { cycle, cause });
        for observer in &self.observers {
            observer.on_reset(cycle, cause);
        }
    }

    fn note_wake(&mut self, source: WakeSource) {
        let cycle = self.cycles();
        self.mode = PowerMode::Run;
        self.journal.push(JournalEntry::Wake { cycle, source });
        for observer in &self.observers {
            observer.on_wake(cycle, source);
        }
    }

    fn take_event(&mut self) -> bool {
        self.bus
            .peripheral_mut::<Pfic>("pfic")
            .map(|p| p.take_event())
            .unwrap_or(false)
    }

    fn wake_source(&mut self, event_mode: bool) -> Option<WakeSource> {
        if event_mode {
            return self.take_event().then(|| match self.last_event.take() {
                Some(line) => WakeSource::Event(line),
                None => WakeSource::LatchedEvent,
            });
        }
        let standby = self.mode == PowerMode::Standby;
        self.pending
            .iter()
            .find(|irq| !standby || irq.wakes_from_standby())
            .map(|irq| WakeSource::Interrupt(*irq))
    }
}

impl Bus for SimChip {
    fn read(&self, addr: u32) -> u32 {
        match self.bus.read_u32(addr) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(%e, "Bus read failed");
                0
            }
        }
    }

    fn write(&mut self, addr: u32, value: u32) {
        let cycle = self.cycles();
        let accepted = match self.bus.write_u32(addr, value) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(%e, "Bus write failed");
                false
            }
        };
        self.journal.push(JournalEntry::Write {
            cycle,
            addr,
            value,
            accepted,
        });
        for observer in &self.observers {
            observer.on_write(cycle, addr, value, accepted);
        }

        if addr == pfic::SCTLR {
            let sysreset = self
                .bus
                .peripheral_mut::<Pfic>("pfic")
                .map(|p| p.take_sysreset())
                .unwrap_or(false);
            if sysreset {
                self.apply_reset(ResetCause::Software);
            }
        }
        self.advance(1);
    }

    fn relax(&mut self) {
        self.advance(self.board.timing.relax_cycles);
    }

    /// Zero after an unacknowledged reset, so code still running from
    /// before the reset unwinds instead of polling a fresh chip.
    fn spin_limit(&self) -> Option<u32> {
        if self.reset_latched {
            Some(0)
        } else {
            self.board.timing.spin_limit
        }
    }
}

impl Hart for SimChip {
    fn write_mstatus(&mut self, value: u32) {
        self.mstatus = value;
    }

    fn write_mtvec(&mut self, value: u32) {
        self.mtvec = value;
    }

    fn wait_for_interrupt(&mut self) -> Result<(), Stalled> {
        let pwr_ctlr = self.bus.peripheral::<Pwr>("pwr").map_or(0, |p| p.ctlr());
        let sctlr = self.bus.peripheral::<Pfic>("pfic").map_or(0, |p| p.sctlr());
        let event_mode = sctlr & pfic::Sctlr::WFITOWFE.bits() != 0;

        if event_mode && self.take_event() {
            self.last_event = None;
            self.note_wake(WakeSource::LatchedEvent);
            return Ok(());
        }

        let mode = PowerMode::on_wait(pwr_ctlr, sctlr);
        let cycle = self.cycles();
        self.mode = mode;
        self.journal.push(JournalEntry::Sleep { cycle, mode });
        for observer in &self.observers {
            observer.on_sleep(cycle, mode);
        }

        let resets_before = self.resets.len();
        let limit = self.board.timing.spin_limit;
        let mut spins: u32 = 0;
        loop {
            if self.resets.len() != resets_before {
                let cause = self.resets[self.resets.len() - 1].cause;
                self.note_wake(WakeSource::Reset(cause));
                return Ok(());
            }
            if let Some(source) = self.wake_source(event_mode) {
                self.note_wake(source);
                self.service_pending();
                return Ok(());
            }
            if limit.is_some_and(|limit| spins >= limit) {
                let stalled = Stalled {
                    site: WaitSite::Wake,
                    spins,
                };
                let cycle = self.cycles();
                self.journal.push(JournalEntry::Stall { cycle, stalled });
                for observer in &self.observers {
                    observer.on_stall(cycle, &stalled);
                }
                return Err(stalled);
            }
            spins = spins.saturating_add(1);
            self.advance(self.board.timing.relax_cycles);
        }
    }
}

/// Boot stages with the cycle they started at, for [`ch32boot_hal::boot::reset`].
#[derive(Debug)]
pub struct StageRecorder {
    cycles: Arc<AtomicU64>,
    observers: Vec<Arc<dyn ChipObserver>>,
    pub stages: Vec<(u64, BootStage)>,
}

impl StageRecorder {
    pub fn for_chip(chip: &SimChip) -> Self {
        Self {
            cycles: chip.cycle_counter(),
            observers: chip.observers().to_vec(),
            stages: Vec::new(),
        }
    }

    /// Folds the recorded stages into the chip journal.
    pub fn commit(self, chip: &mut SimChip) -> Vec<BootStage> {
        for &(cycle, stage) in &self.stages {
            chip.journal_mut().insert_stage(cycle, stage);
        }
        self.stages.into_iter().map(|(_, stage)| stage).collect()
    }
}

impl ch32boot_hal::BootObserver for StageRecorder {
    fn stage(&mut self, stage: BootStage) {
        let cycle = self.cycles.load(Ordering::Relaxed);
        for observer in &self.observers {
            observer.on_boot_stage(cycle, stage);
        }
        self.stages.push((cycle, stage));
    }
}
