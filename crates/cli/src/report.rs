// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use ch32boot_hal::{BootStage, PowerMode, Stalled};
use ch32boot_sim::peripherals::flash::{Flash, FlashViolation};
use ch32boot_sim::peripherals::rcc::Rcc;
use ch32boot_sim::{ClockTree, ResetRecord, SimChip};
use serde::Serialize;
use std::path::Path;
use tracing::error;

pub const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pass,
    ConfigError,
    /// A readiness wait gave up.
    Hung,
    /// The chip restarted under the scenario.
    Reset,
    /// An interrupt reached the default handler.
    Halted,
}

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub result_schema_version: String,
    pub command: &'static str,
    pub status: RunStatus,
    pub message: Option<String>,
    pub board: Option<String>,
    pub clock: Option<ClockTree>,
    pub cycles: u64,
    pub elapsed_ms: u64,
    pub stages: Vec<BootStage>,
    pub stalled: Option<Stalled>,
    pub resets: Vec<ResetRecord>,
    pub flash_violations: Vec<FlashViolation>,
    pub rejected_clock_writes: u32,
    pub dropped_writes: u32,
}

impl RunResult {
    /// A run that never got as far as building a chip.
    pub fn config_error(command: &'static str, board: Option<String>, message: String) -> Self {
        Self {
            result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            command,
            status: RunStatus::ConfigError,
            message: Some(message),
            board,
            clock: None,
            cycles: 0,
            elapsed_ms: 0,
            stages: Vec::new(),
            stalled: None,
            resets: Vec::new(),
            flash_violations: Vec::new(),
            rejected_clock_writes: 0,
            dropped_writes: 0,
        }
    }

    /// A clean `status` becomes [`RunStatus::Halted`] if an interrupt
    /// reached the default handler.
    pub fn from_chip(
        command: &'static str,
        status: RunStatus,
        chip: &SimChip,
        stages: Vec<BootStage>,
        stalled: Option<Stalled>,
    ) -> Self {
        let flash_violations = chip
            .peripheral::<Flash>("flash")
            .map(|f| f.violations.clone())
            .unwrap_or_default();
        let rejected_clock_writes = chip
            .peripheral::<Rcc>("rcc")
            .map_or(0, |r| r.rejected_writes);
        let status = match (status, chip.is_halted()) {
            (RunStatus::Pass, Some(_)) => RunStatus::Halted,
            (status, _) => status,
        };
        Self {
            result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            command,
            status,
            message: None,
            board: Some(chip.board().name.clone()),
            clock: chip.clocks().ok(),
            cycles: chip.cycles(),
            elapsed_ms: chip.elapsed_ms(),
            stages,
            stalled,
            resets: chip.reset_log().to_vec(),
            flash_violations,
            rejected_clock_writes,
            dropped_writes: chip.system().dropped_writes,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct HartSnapshot {
    mstatus: u32,
    mtvec: u32,
    mode: PowerMode,
    halted_on: Option<ch32boot_hal::Interrupt>,
}

#[derive(Debug, Serialize)]
struct ChipSnapshot {
    snapshot_schema_version: String,
    cycles: u64,
    hart: HartSnapshot,
    peripherals: serde_json::Value,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) {
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, value) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create {:?}: {}", path, e),
    }
}

/// Writes `result.json` and, when a chip exists, `snapshot.json` and
/// `journal.json` into `output_dir`.
pub fn write_outputs(output_dir: &Path, result: &RunResult, chip: Option<&SimChip>) {
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    write_json(&output_dir.join("result.json"), result);

    let Some(chip) = chip else {
        return;
    };
    let snapshot = ChipSnapshot {
        snapshot_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        cycles: chip.cycles(),
        hart: HartSnapshot {
            mstatus: chip.mstatus(),
            mtvec: chip.mtvec(),
            mode: chip.mode(),
            halted_on: chip.is_halted(),
        },
        peripherals: chip.system().snapshot(),
    };
    write_json(&output_dir.join("snapshot.json"), &snapshot);
    write_json(&output_dir.join("journal.json"), chip.journal().entries());
}
