// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use ch32boot_config::{BoardConfig, TimingConfig};
use ch32boot_hal::{AhbPrescaler, ClockSource};

#[test]
fn test_full_board_parses() {
    let yaml = r#"
schema_version: "1.0"
name: "ch32v003-xtal"
flash: "16KiB"
ram: "2KiB"
hse:
  frequency_hz: 24000000
timing:
  pll_lock_cycles: 1000
  spin_limit: 5000
boot:
  clock: hse-pll
  prescaler: div2
  gpio: false
"#;
    let board = BoardConfig::from_yaml(yaml).unwrap();
    let hse = board.hse.unwrap();
    assert_eq!(hse.frequency_hz, 24_000_000);
    assert_eq!(hse.startup_cycles, 2_048);
    assert_eq!(board.timing.pll_lock_cycles, 1_000);
    assert_eq!(board.timing.spin_limit, Some(5_000));
    // unspecified timing keys keep their defaults
    assert_eq!(
        board.timing.relax_cycles,
        TimingConfig::default().relax_cycles
    );
    assert_eq!(board.boot.clock, Some(ClockSource::HsePll));
    assert_eq!(board.boot.prescaler, AhbPrescaler::Div2);
    assert!(board.boot.tick);
    assert!(!board.boot.gpio);
}

#[test]
fn test_clock_init_can_be_disabled() {
    let yaml = r#"
name: "minimal"
boot:
  clock: null
"#;
    let board = BoardConfig::from_yaml(yaml).unwrap();
    assert_eq!(board.boot.clock, None);
}

#[test]
fn test_from_file_reports_path() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("ch32boot-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("board.yaml");
    std::fs::write(&path, "name: \"from-disk\"\nram: \"1KiB\"\n")?;

    let board = BoardConfig::from_file(&path)?;
    assert_eq!(board.name, "from-disk");
    assert_eq!(board.ram_bytes()?, 1024);

    let missing = BoardConfig::from_file(dir.join("nope.yaml")).unwrap_err();
    assert!(format!("{:#}", missing).contains("nope.yaml"));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
