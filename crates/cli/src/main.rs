// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod report;

use anyhow::Context;
use ch32boot_config::BoardConfig;
use ch32boot_hal::{delay, watchdog};
use ch32boot_hal::{AhbPrescaler, ClockConfig, ClockSource, IwdgPeriod, Stalled};
use ch32boot_sim::harness::sys_config;
use ch32boot_sim::{BootHarness, BootOutcome, SimChip, TracingObserver};
use clap::{Parser, Subcommand};
use report::{RunResult, RunStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

/// Longest single busy-wait the watchdog scenario issues. Keeps each wait
/// well inside the board's spin limit.
const MAX_DELAY_CHUNK_MS: u32 = 20;

fn parse_clock(s: &str) -> Result<ClockSource, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "hsi" => Ok(ClockSource::Hsi),
        "hsi-pll" | "hsi_pll" => Ok(ClockSource::HsiPll),
        "hse" => Ok(ClockSource::Hse),
        "hse-pll" | "hse_pll" => Ok(ClockSource::HsePll),
        other => Err(format!(
            "Unknown clock source '{}', expected one of: hsi, hsi-pll, hse, hse-pll",
            other
        )),
    }
}

fn parse_prescaler(s: &str) -> Result<AhbPrescaler, String> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("div")
        .or_else(|| trimmed.strip_prefix("/"))
        .unwrap_or(trimmed);
    let divisor: u32 = digits
        .parse()
        .map_err(|e| format!("Invalid prescaler '{}': {}", s, e))?;
    match divisor {
        1 => Ok(AhbPrescaler::Div1),
        2 => Ok(AhbPrescaler::Div2),
        3 => Ok(AhbPrescaler::Div3),
        4 => Ok(AhbPrescaler::Div4),
        5 => Ok(AhbPrescaler::Div5),
        6 => Ok(AhbPrescaler::Div6),
        7 => Ok(AhbPrescaler::Div7),
        8 => Ok(AhbPrescaler::Div8),
        16 => Ok(AhbPrescaler::Div16),
        32 => Ok(AhbPrescaler::Div32),
        64 => Ok(AhbPrescaler::Div64),
        128 => Ok(AhbPrescaler::Div128),
        256 => Ok(AhbPrescaler::Div256),
        _ => Err(format!("HCLK cannot be divided by {}", divisor)),
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "CH32V003 bring-up layer, run against the register-level simulator",
    long_about = None
)]
struct Cli {
    /// Log every register write and boot stage
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reset path up to `main` and report what happened.
    Boot(BootArgs),

    /// Boot, arm the independent watchdog and optionally keep feeding it.
    Watchdog(WatchdogArgs),
}

/// Board selection and the build-time options the simulated firmware uses.
#[derive(Parser, Debug)]
struct BoardArgs {
    /// Board description (YAML). Defaults to a bare CH32V003F4.
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// System clock path: hsi, hsi-pll, hse or hse-pll
    #[arg(long, value_parser = parse_clock, conflicts_with = "no_clock")]
    clock: Option<ClockSource>,

    /// HCLK divider applied to SYSCLK (1-8, 16, 32, 64, 128, 256)
    #[arg(long, value_parser = parse_prescaler)]
    prescaler: Option<AhbPrescaler>,

    /// Stay on the reset clock (HSI / 3)
    #[arg(long)]
    no_clock: bool,

    /// Leave SysTick stopped
    #[arg(long)]
    no_tick: bool,

    /// Leave the GPIO port clocks gated
    #[arg(long)]
    no_gpio: bool,

    /// Directory for result.json, snapshot.json and journal.json
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the run result as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct BootArgs {
    #[command(flatten)]
    board: BoardArgs,
}

#[derive(Parser, Debug)]
struct WatchdogArgs {
    #[command(flatten)]
    board: BoardArgs,

    /// Watchdog timeout, at most 8191 ms
    #[arg(long, default_value = "100")]
    period_ms: u32,

    /// Feed the watchdog this often. Omit to let it expire.
    #[arg(long)]
    feed_every_ms: Option<u32>,

    /// How long to keep the scenario going after the watchdog is armed
    #[arg(long, default_value = "300")]
    run_ms: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays parseable.
    let level = if cli.trace {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Boot(args) => run_boot(args, cli.trace),
        Commands::Watchdog(args) => run_watchdog(args, cli.trace),
    }
}

fn load_board(args: &BoardArgs) -> anyhow::Result<BoardConfig> {
    let mut board = match &args.board {
        Some(path) => BoardConfig::from_file(path)?,
        None => BoardConfig::default(),
    };

    if args.no_clock {
        board.boot.clock = None;
    } else if let Some(clock) = args.clock {
        board.boot.clock = Some(clock);
    }
    if let Some(prescaler) = args.prescaler {
        board.boot.prescaler = prescaler;
    }
    if args.no_tick {
        board.boot.tick = false;
    }
    if args.no_gpio {
        board.boot.gpio = false;
    }

    if let Some(clock) = board.boot.clock {
        board
            .check_clock(clock)
            .with_context(|| format!("Board '{}' cannot run {:?}", board.name, clock))?;
    }
    Ok(board)
}

fn harness(board: &BoardConfig, trace: bool) -> anyhow::Result<BootHarness> {
    let harness = BootHarness::new(board)?;
    Ok(if trace {
        harness.with_observer(Arc::new(TracingObserver))
    } else {
        harness
    })
}

fn config_error(command: &'static str, args: &BoardArgs, e: anyhow::Error) -> ExitCode {
    let msg = format!("{:#}", e);
    error!("{}", msg);
    let board = args.board.as_ref().map(|p| p.display().to_string());
    let result = RunResult::config_error(command, board, msg);
    finish(args, &result, None)
}

/// Emits the result and maps its status to an exit code.
fn finish(args: &BoardArgs, result: &RunResult, chip: Option<&SimChip>) -> ExitCode {
    if let Some(output_dir) = &args.output_dir {
        report::write_outputs(output_dir, result, chip);
    }
    if args.json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
    }

    match result.status {
        RunStatus::Pass => {
            info!(
                cycles = result.cycles,
                elapsed_ms = result.elapsed_ms,
                "{} passed",
                result.command
            );
            ExitCode::from(EXIT_PASS)
        }
        RunStatus::ConfigError => ExitCode::from(EXIT_CONFIG_ERROR),
        status => {
            error!(?status, message = ?result.message, "{} failed", result.command);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn run_boot(args: BootArgs, trace: bool) -> ExitCode {
    let prepared = load_board(&args.board).and_then(|board| harness(&board, trace));
    let harness = match prepared {
        Ok(h) => h,
        Err(e) => return config_error("boot", &args.board, e),
    };

    let report = match harness.boot() {
        Ok(r) => r,
        Err(e) => return config_error("boot", &args.board, e),
    };

    let (status, stalled) = match report.outcome {
        BootOutcome::Entered => (RunStatus::Pass, None),
        BootOutcome::Hung(stalled) => (RunStatus::Hung, Some(stalled)),
    };
    let mut result = RunResult::from_chip("boot", status, &report.chip, report.stages, stalled);
    if let Some(stalled) = stalled {
        result = result.with_message(stalled.to_string());
    }
    finish(&args.board, &result, Some(&report.chip))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Supervision {
    Survived,
    Hung(Stalled),
    Reset,
}

/// Arms the watchdog and lets `run_ms` pass, feeding it every
/// `feed_every_ms` when given.
fn supervise(
    chip: &mut SimChip,
    clock: &ClockConfig,
    period: IwdgPeriod,
    feed_every_ms: Option<u32>,
    run_ms: u32,
) -> Supervision {
    if let Err(stalled) = watchdog::iwdg_start(chip, period) {
        return Supervision::Hung(stalled);
    }
    let start = chip.elapsed_ms();

    let Some(feed_every_ms) = feed_every_ms else {
        chip.advance_ms(u64::from(run_ms));
        return if chip.reset_log().is_empty() {
            Supervision::Survived
        } else {
            Supervision::Reset
        };
    };

    while chip.elapsed_ms() - start < u64::from(run_ms) {
        let mut remaining = feed_every_ms;
        while remaining > 0 {
            let step = remaining.min(MAX_DELAY_CHUNK_MS);
            let waited = delay::delay_ms(chip, clock, step);
            if !chip.reset_log().is_empty() {
                return Supervision::Reset;
            }
            if let Err(stalled) = waited {
                return Supervision::Hung(stalled);
            }
            remaining -= step;
        }
        if let Err(stalled) = watchdog::iwdg_reload(chip, period) {
            return Supervision::Hung(stalled);
        }
        tracing::debug!(at_ms = chip.elapsed_ms(), "Watchdog fed");
    }
    Supervision::Survived
}

fn run_watchdog(args: WatchdogArgs, trace: bool) -> ExitCode {
    let Some(period) = IwdgPeriod::from_millis(args.period_ms) else {
        let e = anyhow::anyhow!(
            "Watchdog period {} ms exceeds the {} ms the reload register holds",
            args.period_ms,
            IwdgPeriod::MAX_MS
        );
        return config_error("watchdog", &args.board, e);
    };
    if args.feed_every_ms == Some(0) {
        let e = anyhow::anyhow!("--feed-every-ms must be greater than zero");
        return config_error("watchdog", &args.board, e);
    }

    let board = match load_board(&args.board) {
        Ok(b) => b,
        Err(e) => return config_error("watchdog", &args.board, e),
    };
    let clock = sys_config(&board).effective_clock();
    let report = match harness(&board, trace).and_then(|h| h.boot()) {
        Ok(r) => r,
        Err(e) => return config_error("watchdog", &args.board, e),
    };

    let stages = report.stages;
    let mut chip = report.chip;
    if let BootOutcome::Hung(stalled) = report.outcome {
        let result =
            RunResult::from_chip("watchdog", RunStatus::Hung, &chip, stages, Some(stalled))
                .with_message(format!("Boot hung: {}", stalled));
        return finish(&args.board, &result, Some(&chip));
    }

    info!(
        period_ms = period.millis(),
        feed_every_ms = ?args.feed_every_ms,
        run_ms = args.run_ms,
        "Arming watchdog"
    );
    let result = match supervise(&mut chip, &clock, period, args.feed_every_ms, args.run_ms) {
        Supervision::Survived => {
            RunResult::from_chip("watchdog", RunStatus::Pass, &chip, stages, None)
        }
        Supervision::Hung(stalled) => {
            RunResult::from_chip("watchdog", RunStatus::Hung, &chip, stages, Some(stalled))
                .with_message(stalled.to_string())
        }
        Supervision::Reset => {
            let message = match chip.reset_log().first() {
                Some(record) => format!("{:?} reset at cycle {}", record.cause, record.at_cycle),
                None => "Chip reset".to_string(),
            };
            RunResult::from_chip("watchdog", RunStatus::Reset, &chip, stages, None)
                .with_message(message)
        }
    };
    finish(&args.board, &result, Some(&chip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_names() {
        assert_eq!(parse_clock("hsi"), Ok(ClockSource::Hsi));
        assert_eq!(parse_clock("HSE_PLL"), Ok(ClockSource::HsePll));
        assert!(parse_clock("pll").is_err());
    }

    #[test]
    fn test_parse_prescaler_forms() {
        assert_eq!(parse_prescaler("3"), Ok(AhbPrescaler::Div3));
        assert_eq!(parse_prescaler("div16"), Ok(AhbPrescaler::Div16));
        assert_eq!(parse_prescaler("/256"), Ok(AhbPrescaler::Div256));
        assert!(parse_prescaler("9").is_err());
        assert!(parse_prescaler("x").is_err());
    }

    #[test]
    fn test_overrides_applied_to_board() {
        let args = BoardArgs {
            board: None,
            clock: Some(ClockSource::Hsi),
            prescaler: Some(AhbPrescaler::Div2),
            no_clock: false,
            no_tick: true,
            no_gpio: false,
            output_dir: None,
            json: false,
        };
        let board = load_board(&args).unwrap();
        assert_eq!(board.boot.clock, Some(ClockSource::Hsi));
        assert_eq!(board.boot.prescaler, AhbPrescaler::Div2);
        assert!(!board.boot.tick);
        assert!(board.boot.gpio);
    }

    #[test]
    fn test_crystal_clock_without_crystal_rejected() {
        let args = BoardArgs {
            board: None,
            clock: Some(ClockSource::Hse),
            prescaler: None,
            no_clock: false,
            no_tick: false,
            no_gpio: false,
            output_dir: None,
            json: false,
        };
        let err = load_board(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("hse"));
    }
}
