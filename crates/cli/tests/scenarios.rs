// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut dir = std::env::temp_dir();
    dir.push("ch32boot-tests");
    dir.push(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn write_board(dir: &PathBuf, contents: &str) -> PathBuf {
    let path = dir.join("board.yaml");
    std::fs::write(&path, contents).expect("Failed to write board");
    path
}

fn ch32boot(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ch32boot"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn json_result(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rfind(|l| l.starts_with('{'))
        .unwrap_or_else(|| panic!("No JSON result on stdout: {}", stdout));
    serde_json::from_str(line).expect("Failed to parse result JSON")
}

#[test]
fn test_boot_default_board_passes() {
    let output = ch32boot(&["boot", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let json = json_result(&output);
    assert_eq!(json["status"], "pass");
    assert_eq!(json["clock"]["sysclk_hz"], 48_000_000);
    assert_eq!(json["clock"]["source"], "pll");
    let stages = json["stages"].as_array().unwrap();
    assert_eq!(stages.first().unwrap(), "early_registers");
    assert_eq!(stages.last().unwrap(), "enter_main");
    assert!(json["flash_violations"].as_array().unwrap().is_empty());
}

#[test]
fn test_boot_on_reset_clock() {
    let output = ch32boot(&["boot", "--no-clock", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let json = json_result(&output);
    assert_eq!(json["clock"]["hclk_hz"], 8_000_000);
    assert!(!json["stages"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "clock_init"));
}

#[test]
fn test_boot_hse_pll_from_board_file() {
    let dir = temp_dir("hse-pll");
    let board = write_board(
        &dir,
        r#"
schema_version: "1.0"
name: crystal-board
hse:
  frequency_hz: 12000000
boot:
  clock: hse-pll
"#,
    );
    let output = ch32boot(&["boot", "--board", board.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let json = json_result(&output);
    assert_eq!(json["board"], "crystal-board");
    assert_eq!(json["clock"]["sysclk_hz"], 24_000_000);
}

#[test]
fn test_crystal_clock_without_crystal_is_config_error() {
    let dir = temp_dir("no-crystal");
    let output = ch32boot(&[
        "boot",
        "--clock",
        "hse",
        "--output-dir",
        dir.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));

    let result = std::fs::read_to_string(dir.join("result.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&result).unwrap();
    assert_eq!(json["status"], "config_error");
    assert!(!dir.join("snapshot.json").exists());
}

#[test]
fn test_missing_board_file_is_config_error() {
    let output = ch32boot(&["boot", "--board", "/nonexistent/board.yaml"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unknown_clock_rejected_by_parser() {
    let output = ch32boot(&["boot", "--clock", "pll"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown clock source"));
}

#[test]
fn test_boot_outputs_written() {
    let dir = temp_dir("outputs");
    let output_dir = dir.join("artifacts");
    let output = ch32boot(&["boot", "--output-dir", output_dir.to_str().unwrap()]);
    assert!(output.status.success());

    for name in ["result.json", "snapshot.json", "journal.json"] {
        assert!(output_dir.join(name).exists(), "{} missing", name);
    }

    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_dir.join("snapshot.json")).unwrap())
            .unwrap();
    assert_eq!(snapshot["hart"]["mstatus"], 0x1880);
    assert!(snapshot["peripherals"].get("rcc").is_some());

    let journal: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_dir.join("journal.json")).unwrap())
            .unwrap();
    let entries = journal.as_array().unwrap();
    assert!(entries.iter().any(|e| e["kind"] == "write"));
    assert!(entries.iter().any(|e| e["kind"] == "stage"));
}

#[test]
fn test_watchdog_expires_without_feeding() {
    let output = ch32boot(&[
        "watchdog",
        "--no-clock",
        "--period-ms",
        "50",
        "--run-ms",
        "120",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(3));
    let json = json_result(&output);
    assert_eq!(json["status"], "reset");
    assert_eq!(json["resets"][0]["cause"], "watchdog");
}

#[test]
fn test_watchdog_fed_in_time_survives() {
    let output = ch32boot(&[
        "watchdog",
        "--no-clock",
        "--period-ms",
        "50",
        "--feed-every-ms",
        "20",
        "--run-ms",
        "120",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let json = json_result(&output);
    assert_eq!(json["status"], "pass");
    assert!(json["resets"].as_array().unwrap().is_empty());
    assert!(json["elapsed_ms"].as_u64().unwrap() >= 120);
}

#[test]
fn test_watchdog_period_out_of_range() {
    let output = ch32boot(&["watchdog", "--period-ms", "8192"]);
    assert_eq!(output.status.code(), Some(2));
}
