// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Post-boot services against the simulated chip: delays, watchdog, sleep.

use ch32boot_config::BoardConfig;
use ch32boot_hal::regs::{exti, pfic, pwr, rcc, stk};
use ch32boot_hal::{delay, power, watchdog};
use ch32boot_hal::{
    AhbPrescaler, AwuPeriod, Bus, ClockConfig, ClockSource, Interrupt, IwdgPeriod, PowerMode,
    WaitSite,
};
use ch32boot_sim::harness::sys_config;
use ch32boot_sim::peripherals::iwdg::Iwdg;
use ch32boot_sim::{BootHarness, JournalEntry, ResetCause, SimChip, Stimulus, WakeSource};

fn booted(board: &BoardConfig) -> (SimChip, ClockConfig) {
    let clock = sys_config(board).effective_clock();
    let report = BootHarness::new(board).unwrap().boot().unwrap();
    assert!(report.entered());
    (report.chip, clock)
}

fn last_wake(chip: &SimChip) -> Option<(usize, WakeSource)> {
    chip.journal()
        .entries()
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, e)| match e {
            JournalEntry::Wake { source, .. } => Some((i, *source)),
            _ => None,
        })
}

#[test]
fn test_delay_ms_tracks_wall_time() {
    let (mut chip, clock) = booted(&BoardConfig::default());
    assert_eq!(clock.hclk_hz(), 48_000_000);

    let start = chip.elapsed_ns();
    delay::delay_ms(&mut chip, &clock, 10).unwrap();
    let waited = chip.elapsed_ns() - start;
    assert!(waited >= 10_000_000, "{} ns", waited);
    assert!(waited < 10_001_000, "{} ns", waited);
}

#[test]
fn test_delay_across_counter_wrap() {
    let (mut chip, _) = booted(&BoardConfig::default());
    chip.write(stk::CNT, u32::MAX - 1_000);

    let start = chip.cycles();
    delay::delay_ticks(&mut chip, 5_000).unwrap();
    let spent = chip.cycles() - start;
    assert!((5_000..5_000 + 8).contains(&spent), "{} cycles", spent);
    assert!(delay::now(&chip) < 5_000);
}

#[test]
fn test_delay_us_on_reset_clock() {
    let mut board = BoardConfig::default();
    board.boot.clock = None;
    let (mut chip, clock) = booted(&board);
    assert_eq!(delay::us_to_ticks(&clock, 1), 8);

    let start = chip.cycles();
    delay::delay_us(&mut chip, &clock, 250).unwrap();
    assert!(chip.cycles() - start >= 2_000);
}

#[test]
fn test_delay_longer_than_half_the_counter() {
    let mut board = BoardConfig::default();
    // Coarse polling keeps a 100 s wait to a few thousand bus steps.
    board.timing.relax_cycles = 1 << 20;
    board.timing.spin_limit = None;
    let (mut chip, clock) = booted(&board);
    assert_eq!(clock.hclk_hz(), 48_000_000);

    let start = chip.cycles();
    delay::delay_ms(&mut chip, &clock, 100_000).unwrap();
    let spent = chip.cycles() - start;
    assert!(spent >= 4_800_000_000, "{} cycles", spent);
    assert!(spent < 4_800_000_000 + 4 * (1 << 20), "{} cycles", spent);

    let start = chip.cycles();
    delay::delay_ticks(&mut chip, u32::MAX).unwrap();
    assert!(chip.cycles() - start >= u64::from(u32::MAX));
}

#[test]
fn test_delay_us_below_one_megahertz() {
    let mut board = BoardConfig::default();
    board.boot.clock = Some(ClockSource::Hsi);
    board.boot.prescaler = AhbPrescaler::Div256;
    let (mut chip, clock) = booted(&board);
    assert_eq!(chip.clocks().unwrap().hclk_hz, 93_750);

    let start = chip.elapsed_ns();
    delay::delay_us(&mut chip, &clock, 1_000).unwrap();
    assert!(chip.elapsed_ns() - start >= 1_000_000);

    let start = chip.cycles();
    delay::delay_us(&mut chip, &clock, 1).unwrap();
    assert!(chip.cycles() - start >= 1);
}

#[test]
fn test_watchdog_start_brings_up_lsi() {
    let mut chip = SimChip::new(&BoardConfig::default());
    assert!(!chip.clocks().unwrap().lsi_running);

    watchdog::iwdg_start(&mut chip, IwdgPeriod::from_millis(20).unwrap()).unwrap();
    assert!(chip.clocks().unwrap().lsi_running);
    let iwdg = chip.peripheral::<Iwdg>("iwdg").unwrap();
    assert!(iwdg.running());
    assert_eq!(iwdg.dropped_writes, 0);
}

#[test]
fn test_watchdog_expires_after_period() {
    let (mut chip, _) = booted(&BoardConfig::default());
    watchdog::iwdg_start(&mut chip, IwdgPeriod::from_millis(100).unwrap()).unwrap();
    assert!(chip.peripheral::<Iwdg>("iwdg").unwrap().running());

    chip.advance_ms(99);
    assert!(chip.reset_log().is_empty());
    chip.advance_ms(2);

    let reset = chip.acknowledge_reset().expect("watchdog reset");
    assert_eq!(reset.cause, ResetCause::Watchdog);
    assert_ne!(chip.read(rcc::RSTSCKR) & rcc::Rstsckr::IWDGRSTF.bits(), 0);
    // back on the reset clock, watchdog stopped
    assert_eq!(chip.clocks().unwrap().hclk_hz, 8_000_000);
    assert!(!chip.peripheral::<Iwdg>("iwdg").unwrap().running());
}

#[test]
fn test_feeding_keeps_watchdog_quiet() {
    let (mut chip, clock) = booted(&BoardConfig::default());
    let period = IwdgPeriod::from_millis(50).unwrap();
    watchdog::iwdg_start(&mut chip, period).unwrap();

    for _ in 0..6 {
        delay::delay_ms(&mut chip, &clock, 30).unwrap();
        watchdog::iwdg_reload(&mut chip, period).unwrap();
    }
    assert!(chip.reset_log().is_empty());
    assert_eq!(chip.peripheral::<Iwdg>("iwdg").unwrap().dropped_writes, 0);
}

#[test]
fn test_watchdog_period_limits() {
    assert_eq!(IwdgPeriod::from_millis(8191).map(|p| p.reload_value()), Some(4095));
    assert_eq!(IwdgPeriod::from_millis(8192), None);
    assert_eq!(IwdgPeriod::saturating(60_000), IwdgPeriod::MAX);
}

#[test]
fn test_sleep_wakes_on_interrupt() {
    let mut chip = SimChip::new(&BoardConfig::default());
    chip.schedule(1_000, Stimulus::Interrupt(Interrupt::Tim2));

    power::sleep_wfi(&mut chip).unwrap();
    assert_eq!(chip.mode(), PowerMode::Run);
    assert!(chip.cycles() >= 1_000);
    assert_eq!(
        last_wake(&chip).map(|(_, source)| source),
        Some(WakeSource::Interrupt(Interrupt::Tim2))
    );
}

#[test]
fn test_sleep_wfe_skips_its_own_event() {
    let mut chip = SimChip::new(&BoardConfig::default());
    chip.write(exti::EVENR, 1 << 0);
    chip.write(exti::RTENR, 1 << 0);
    chip.schedule(2_000, Stimulus::ExtiLine(0));

    power::sleep_wfe(&mut chip).unwrap();
    assert!(chip.cycles() >= 2_000);
    assert_eq!(
        last_wake(&chip).map(|(_, source)| source),
        Some(WakeSource::Event(0))
    );
    assert_eq!(
        chip.read(pfic::SCTLR) & (pfic::Sctlr::WFITOWFE | pfic::Sctlr::SETEVENT).bits(),
        0
    );
}

#[test]
fn test_standby_clears_sleepdeep_only_after_wake() {
    let mut chip = SimChip::new(&BoardConfig::default());
    // not a standby wake source
    chip.schedule(100, Stimulus::Interrupt(Interrupt::Tim2));
    chip.schedule(5_000, Stimulus::Interrupt(Interrupt::Exti7_0));

    power::standby_wfi(&mut chip).unwrap();
    let (wake_at, source) = last_wake(&chip).unwrap();
    assert_eq!(source, WakeSource::Interrupt(Interrupt::Exti7_0));

    let deep = pfic::Sctlr::SLEEPDEEP.bits();
    let cleared_at = chip
        .journal()
        .entries()
        .iter()
        .rposition(|e| {
            matches!(e, JournalEntry::Write { addr, value, .. }
                if *addr == pfic::SCTLR && value & deep == 0)
        })
        .unwrap();
    assert!(wake_at < cleared_at);
    assert_eq!(chip.read(pfic::SCTLR) & deep, 0);
    assert_ne!(chip.read(pwr::CTLR) & pwr::Ctlr::PDDS.bits(), 0);
}

#[test]
fn test_standby_without_wake_source_stalls() {
    let mut board = BoardConfig::default();
    board.timing.spin_limit = Some(1_000);
    let mut chip = SimChip::new(&board);

    let err = power::standby_wfi(&mut chip).unwrap_err();
    assert_eq!(err.site, WaitSite::Wake);
    assert_eq!(chip.mode(), PowerMode::Standby);
    assert_ne!(chip.read(pfic::SCTLR) & pfic::Sctlr::SLEEPDEEP.bits(), 0);
}

#[test]
fn test_awu_wakes_standby_wfe() {
    let (mut chip, _) = booted(&BoardConfig::default());
    power::awu_init(&mut chip).unwrap();
    let period = AwuPeriod::from_millis(10).unwrap();
    assert_eq!(period.lsi_ticks(), 1_280);
    power::awu_set_period(&mut chip, period);

    let start = chip.elapsed_ns();
    power::standby_wfe(&mut chip).unwrap();
    let slept = chip.elapsed_ns() - start;

    assert_eq!(
        last_wake(&chip).map(|(_, source)| source),
        Some(WakeSource::Event(exti::LINE_AWU))
    );
    assert!(slept <= 10_100_000, "{} ns", slept);
    assert_eq!(chip.read(pfic::SCTLR) & pfic::Sctlr::SLEEPDEEP.bits(), 0);
    assert!(chip.journal().entries().iter().any(|e| matches!(
        e,
        JournalEntry::Sleep {
            mode: PowerMode::Standby,
            ..
        }
    )));
}

#[test]
fn test_pwr_writes_dropped_without_clock() {
    let mut chip = SimChip::new(&BoardConfig::default());
    chip.write(pwr::CTLR, pwr::Ctlr::PDDS.bits());
    assert_eq!(chip.read(pwr::CTLR), 0);
    assert_eq!(chip.system().dropped_writes, 1);
    assert!(matches!(
        chip.journal().entries().last(),
        Some(JournalEntry::Write { accepted: false, .. })
    ));
}
