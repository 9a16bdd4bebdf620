// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::chip::WakeSource;
use crate::ResetCause;
use ch32boot_hal::{BootStage, PowerMode, Stalled};

/// Hooks into a running [`crate::SimChip`]. All methods default to no-ops.
pub trait ChipObserver: std::fmt::Debug + Send + Sync {
    fn on_write(&self, _cycle: u64, _addr: u32, _value: u32, _accepted: bool) {}
    fn on_boot_stage(&self, _cycle: u64, _stage: BootStage) {}
    fn on_sleep(&self, _cycle: u64, _mode: PowerMode) {}
    fn on_wake(&self, _cycle: u64, _source: WakeSource) {}
    fn on_stall(&self, _cycle: u64, _stalled: &Stalled) {}
    fn on_reset(&self, _cycle: u64, _cause: ResetCause) {}
}

/// Forwards chip activity to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ChipObserver for TracingObserver {
    fn on_write(&self, cycle: u64, addr: u32, value: u32, accepted: bool) {
        tracing::trace!(
            cycle,
            addr = format_args!("{:#010x}", addr),
            value = format_args!("{:#010x}", value),
            accepted,
            "write"
        );
    }

    fn on_boot_stage(&self, cycle: u64, stage: BootStage) {
        tracing::debug!(cycle, ?stage, "Boot stage");
    }

    fn on_sleep(&self, cycle: u64, mode: PowerMode) {
        tracing::debug!(cycle, ?mode, "Core waiting");
    }

    fn on_wake(&self, cycle: u64, source: WakeSource) {
        tracing::debug!(cycle, ?source, "Core resumed");
    }

    fn on_stall(&self, cycle: u64, stalled: &Stalled) {
        tracing::warn!(cycle, site = ?stalled.site, spins = stalled.spins, "Wait gave up");
    }

    fn on_reset(&self, cycle: u64, cause: ResetCause) {
        tracing::info!(cycle, ?cause, "Chip reset");
    }
}

/// One recorded step of a run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    Write {
        cycle: u64,
        addr: u32,
        value: u32,
        accepted: bool,
    },
    Stage {
        cycle: u64,
        stage: BootStage,
    },
    Sleep {
        cycle: u64,
        mode: PowerMode,
    },
    Wake {
        cycle: u64,
        source: WakeSource,
    },
    Stall {
        cycle: u64,
        stalled: Stalled,
    },
    Reset {
        cycle: u64,
        cause: ResetCause,
    },
}

impl JournalEntry {
    pub fn cycle(&self) -> u64 {
        match self {
            Self::Write { cycle, .. }
            | Self::Stage { cycle, .. }
            | Self::Sleep { cycle, .. }
            | Self::Wake { cycle, .. }
            | Self::Stall { cycle, .. }
            | Self::Reset { cycle, .. } => *cycle,
        }
    }
}

/// Ordered record of everything a [`crate::SimChip`] saw. Always on.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn push(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Places a stage marker ahead of everything that happened from `cycle` on.
    pub fn insert_stage(&mut self, cycle: u64, stage: BootStage) {
        let index = self.entries.partition_point(|e| e.cycle() < cycle);
        self.entries.insert(index, JournalEntry::Stage { cycle, stage });
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Accepted writes to `addr`, in order.
    pub fn writes_to(&self, addr: u32) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().filter_map(move |e| match e {
            JournalEntry::Write {
                addr: a,
                value,
                accepted: true,
                ..
            } if *a == addr => Some(*value),
            _ => None,
        })
    }

    /// Index of the first entry matching `pred`.
    pub fn position(&self, pred: impl Fn(&JournalEntry) -> bool) -> Option<usize> {
        self.entries.iter().position(pred)
    }

    pub fn stages(&self) -> Vec<BootStage> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Stage { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.entries).unwrap_or(serde_json::Value::Null)
    }
}
