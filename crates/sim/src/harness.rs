// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Runs the real reset path against a [`SimChip`] and a host-side RAM image.

use crate::chip::{SimChip, StageRecorder};
use crate::observer::ChipObserver;
use anyhow::{bail, Context, Result};
use ch32boot_config::BoardConfig;
use ch32boot_hal::boot::{self, BootImage, InitArray, InitFn, MemoryRegion, SysConfig};
use ch32boot_hal::{BootObserver, BootStage, ClockConfig, ClockSource, Stalled, VectorTable};
use std::sync::Arc;

/// What RAM holds at power-on, so untouched words are recognisable.
pub const RAM_POWER_ON_PATTERN: u32 = 0xA5A5_A5A5;

/// Flash origin, where the vector table sits.
pub const VECTOR_BASE: u32 = 0x0000_0000;

/// The program's sections as `main` finds them.
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    pub data: &'a [u32],
    pub bss: &'a [u32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// `main` ran.
    Entered,
    /// A readiness wait never completed; `main` was not reached.
    Hung(Stalled),
}

#[derive(Debug)]
pub struct BootReport {
    pub outcome: BootOutcome,
    pub stages: Vec<BootStage>,
    /// Cycle at which control passed to `main`.
    pub entry_cycle: Option<u64>,
    pub chip: SimChip,
}

impl BootReport {
    pub fn entered(&self) -> bool {
        self.outcome == BootOutcome::Entered
    }
}

/// Build-time selection of the simulated firmware, taken from the board file.
pub fn sys_config(board: &BoardConfig) -> SysConfig {
    let clock = board.boot.clock.map(|source| {
        let config = match source {
            ClockSource::Hsi => ClockConfig::hsi(),
            ClockSource::HsiPll => ClockConfig::hsi_pll(),
            ClockSource::Hse => ClockConfig::hse(),
            ClockSource::HsePll => ClockConfig::hse_pll(),
        }
        .with_prescaler(board.boot.prescaler);
        match board.hse {
            Some(crystal) => config.with_hse_frequency(crystal.frequency_hz),
            None => config,
        }
    });
    SysConfig {
        clock,
        tick: board.boot.tick,
        gpio: board.boot.gpio,
    }
}

#[derive(Debug)]
pub struct BootHarness {
    chip: SimChip,
    config: SysConfig,
    ram: Vec<u32>,
    data_image: Vec<u32>,
    bss_words: usize,
    init: Option<(Vec<InitFn>, Vec<InitFn>)>,
}

impl BootHarness {
    pub fn new(board: &BoardConfig) -> Result<Self> {
        board.validate().context("Board rejected")?;
        let ram_bytes = board.ram_bytes()?;
        let words = usize::try_from(ram_bytes / 4).context("RAM size does not fit host memory")?;
        Ok(Self {
            chip: SimChip::new(board),
            config: sys_config(board),
            ram: vec![RAM_POWER_ON_PATTERN; words],
            data_image: Vec::new(),
            bss_words: 0,
            init: None,
        })
    }

    /// Initialised `.data` contents, as stored in flash.
    pub fn with_data(mut self, words: &[u32]) -> Self {
        self.data_image = words.to_vec();
        self
    }

    pub fn with_bss(mut self, words: usize) -> Self {
        self.bss_words = words;
        self
    }

    pub fn with_config(mut self, config: SysConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_init_array(mut self, preinit: &[InitFn], init: &[InitFn]) -> Self {
        self.init = Some((preinit.to_vec(), init.to_vec()));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ChipObserver>) -> Self {
        self.chip = self.chip.with_observer(observer);
        self
    }

    pub fn with_vectors(mut self, vectors: VectorTable) -> Self {
        self.chip = self.chip.with_vectors(vectors);
        self
    }

    pub fn config(&self) -> &SysConfig {
        &self.config
    }

    /// Boots and, if the reset path completes, calls `main`.
    pub fn run<F>(self, main: F) -> Result<BootReport>
    where
        F: FnOnce(&mut SimChip, EntryView<'_>) -> Result<()>,
    {
        let Self {
            mut chip,
            config,
            mut ram,
            data_image,
            bss_words,
            init,
        } = self;

        let data_words = data_image.len();
        if data_words + bss_words > ram.len() {
            bail!(
                ".data ({} words) and .bss ({} words) exceed {} words of RAM",
                data_words,
                bss_words,
                ram.len()
            );
        }

        let mut recorder = StageRecorder::for_chip(&chip);
        recorder.stage(BootStage::EarlyRegisters);

        let base = ram.as_mut_ptr();
        // SAFETY: both regions lie inside `ram`, which outlives the call and
        // is not otherwise borrowed until `reset` returns.
        let (data, bss) = unsafe {
            let data_end = base.add(data_words);
            (
                MemoryRegion::new(base, data_end),
                MemoryRegion::new(data_end, data_end.add(bss_words)),
            )
        };
        let image = BootImage {
            bss,
            data,
            data_load: data_image.as_ptr(),
            init: init.as_ref().map(|(preinit, init)| InitArray { preinit, init }),
        };

        // SAFETY: `image` describes host memory owned by this function.
        let result = unsafe { boot::reset(&mut chip, &image, &config, VECTOR_BASE, &mut recorder) };

        let outcome = match result {
            Ok(()) => {
                recorder.stage(BootStage::EnterMain);
                BootOutcome::Entered
            }
            Err(stalled) => {
                tracing::error!(site = ?stalled.site, spins = stalled.spins, "Boot hung");
                BootOutcome::Hung(stalled)
            }
        };
        let stages = recorder.commit(&mut chip);

        let mut entry_cycle = None;
        if outcome == BootOutcome::Entered {
            entry_cycle = Some(chip.cycles());
            chip.enter_main();
            let view = EntryView {
                data: &ram[..data_words],
                bss: &ram[data_words..data_words + bss_words],
            };
            main(&mut chip, view).context("main failed")?;
        }

        Ok(BootReport {
            outcome,
            stages,
            entry_cycle,
            chip,
        })
    }

    /// Boots without running anything afterwards.
    pub fn boot(self) -> Result<BootReport> {
        self.run(|_, _| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sys_config_from_board() {
        let mut board = BoardConfig::default();
        board.boot.clock = Some(ClockSource::HsePll);
        board.hse = Some(ch32boot_config::CrystalConfig {
            frequency_hz: 12_000_000,
            startup_cycles: 100,
        });
        let config = sys_config(&board);
        assert_eq!(config.effective_clock().sysclk_hz(), 24_000_000);

        board.boot.clock = None;
        assert_eq!(sys_config(&board).clock, None);
    }

    #[test]
    fn test_oversized_image_rejected() {
        let harness = BootHarness::new(&BoardConfig::default())
            .unwrap()
            .with_bss(1024);
        let err = harness.boot().unwrap_err();
        assert!(err.to_string().contains("exceed"));
    }
}
