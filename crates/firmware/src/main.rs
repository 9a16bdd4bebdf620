// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod app {
    use ch32boot_hal::regs::gpio;
    use ch32boot_hal::{rt, AwuPeriod, Bus, Mmio};
    use panic_halt as _;

    const LED_PIN: u32 = 0;
    const WATCHDOG_MS: u32 = 2_000;
    const BLINKS_PER_NAP: u32 = 10;
    const NAP_MS: u32 = 500;

    fn led_init(bus: &mut Mmio) {
        let shift = LED_PIN * 4;
        bus.modify(gpio::GPIOD + gpio::CFGLR, |cfg| {
            (cfg & !(0xF << shift)) | (gpio::MODE_OUT_PP_10MHZ << shift)
        });
    }

    fn led(bus: &mut Mmio, on: bool) {
        let bit = 1 << LED_PIN;
        if on {
            bus.write(gpio::GPIOD + gpio::BSHR, bit);
        } else {
            bus.write(gpio::GPIOD + gpio::BCR, bit);
        }
    }

    #[no_mangle]
    extern "C" fn main() -> ! {
        let mut bus = Mmio::new();
        led_init(&mut bus);

        rt::iwdg_start(WATCHDOG_MS);
        rt::awu_init();
        if let Some(period) = AwuPeriod::from_millis(NAP_MS) {
            rt::awu_set_period(period);
        }

        loop {
            for _ in 0..BLINKS_PER_NAP {
                led(&mut bus, true);
                rt::delay_ms(100);
                led(&mut bus, false);
                rt::delay_ms(100);
                rt::iwdg_reload(WATCHDOG_MS);
            }
            // The AWU event ends the nap. IWDG keeps counting on LSI.
            rt::standby_wfe();
            rt::iwdg_reload(WATCHDOG_MS);
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("ch32boot-firmware runs on the CH32V003 only; build it for riscv32ec-unknown-none-elf");
}
