// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use ch32boot_hal::{AhbPrescaler, ClockSource};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_flash() -> String {
    "16KiB".to_string()
}

fn default_ram() -> String {
    "2KiB".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported schema_version '{0}', supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("invalid size '{value}' for {field}: {reason}")]
    InvalidSize {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("crystal frequency {0} Hz is outside 4-25 MHz")]
    CrystalOutOfRange(u32),
    #[error("clock source {0:?} needs an `hse` section on the board")]
    MissingCrystal(ClockSource),
}

/// External crystal fitted to PA1/PA2.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CrystalConfig {
    pub frequency_hz: u32,
    #[serde(default = "CrystalConfig::default_startup_cycles")]
    pub startup_cycles: u64,
}

impl CrystalConfig {
    pub const MIN_HZ: u32 = 4_000_000;
    pub const MAX_HZ: u32 = 25_000_000;

    fn default_startup_cycles() -> u64 {
        2_048
    }
}

/// Analog settling times and wait budgets, in HCLK cycles unless noted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub hsi_startup_cycles: u64,
    pub pll_lock_cycles: u64,
    pub lsi_startup_cycles: u64,
    pub clock_switch_cycles: u64,
    /// Cost of one busy-wait iteration.
    pub relax_cycles: u64,
    /// Polls before a wait is declared hung. `None` waits forever.
    pub spin_limit: Option<u32>,
    /// LSI ticks for an IWDG prescaler/reload write to propagate.
    pub iwdg_update_lsi_ticks: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            hsi_startup_cycles: 6,
            pll_lock_cycles: 400,
            lsi_startup_cycles: 3_000,
            clock_switch_cycles: 4,
            relax_cycles: 4,
            spin_limit: Some(1_000_000),
            iwdg_update_lsi_ticks: 5,
        }
    }
}

/// What the simulated firmware was built with.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BootSettings {
    /// `None` skips clock init.
    #[serde(default = "BootSettings::default_clock")]
    pub clock: Option<ClockSource>,
    #[serde(default = "BootSettings::default_prescaler")]
    pub prescaler: AhbPrescaler,
    #[serde(default = "default_true")]
    pub tick: bool,
    #[serde(default = "default_true")]
    pub gpio: bool,
}

impl BootSettings {
    fn default_clock() -> Option<ClockSource> {
        Some(ClockSource::HsiPll)
    }

    fn default_prescaler() -> AhbPrescaler {
        AhbPrescaler::Div1
    }
}

impl Default for BootSettings {
    fn default() -> Self {
        Self {
            clock: Self::default_clock(),
            prescaler: Self::default_prescaler(),
            tick: true,
            gpio: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default = "default_flash")]
    pub flash: String, // e.g. "16KiB"
    #[serde(default = "default_ram")]
    pub ram: String,
    #[serde(default)]
    pub hse: Option<CrystalConfig>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub boot: BootSettings,
}

impl Default for BoardConfig {
    /// A bare CH32V003F4 with no crystal.
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "ch32v003f4".to_string(),
            flash: default_flash(),
            ram: default_ram(),
            hse: None,
            timing: TimingConfig::default(),
            boot: BootSettings::default(),
        }
    }
}

impl BoardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read board config at {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid board config {:?}", path))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let board: Self = serde_yaml::from_str(yaml).context("Failed to parse Board YAML")?;
        board.validate()?;
        tracing::debug!(board = %board.name, "Loaded board config");
        Ok(board)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.schema_version != "1.0" {
            return Err(ConfigError::UnsupportedSchema(self.schema_version.clone()));
        }
        if self.flash_bytes()? == 0 {
            return Err(ConfigError::Zero("flash"));
        }
        if self.ram_bytes()? == 0 {
            return Err(ConfigError::Zero("ram"));
        }
        if self.timing.relax_cycles == 0 {
            return Err(ConfigError::Zero("timing.relax_cycles"));
        }
        if let Some(hse) = &self.hse {
            if !(CrystalConfig::MIN_HZ..=CrystalConfig::MAX_HZ).contains(&hse.frequency_hz) {
                return Err(ConfigError::CrystalOutOfRange(hse.frequency_hz));
            }
        }
        Ok(())
    }

    /// Unlike [`BoardConfig::validate`], a missing crystal is a property of
    /// the scenario, not of the board file.
    pub fn check_clock(&self, source: ClockSource) -> std::result::Result<(), ConfigError> {
        if source.uses_crystal() && self.hse.is_none() {
            return Err(ConfigError::MissingCrystal(source));
        }
        Ok(())
    }

    pub fn flash_bytes(&self) -> std::result::Result<u64, ConfigError> {
        size_field("flash", &self.flash)
    }

    pub fn ram_bytes(&self) -> std::result::Result<u64, ConfigError> {
        size_field("ram", &self.ram)
    }
}

fn size_field(field: &'static str, value: &str) -> std::result::Result<u64, ConfigError> {
    parse_size(value).map_err(|e| ConfigError::InvalidSize {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
