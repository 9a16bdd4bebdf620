// ch32boot - CH32V003 Bring-up Layer
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::wait::Stalled;

/// Word access to the memory-mapped register space.
///
/// Hardware uses [`Mmio`]; host tests plug in a register simulation with the
/// same read/write contract.
pub trait Bus {
    fn read(&self, addr: u32) -> u32;
    fn write(&mut self, addr: u32, value: u32);

    fn modify(&mut self, addr: u32, f: impl FnOnce(u32) -> u32) {
        let value = self.read(addr);
        self.write(addr, f(value));
    }

    fn set_bits(&mut self, addr: u32, mask: u32) {
        self.modify(addr, |v| v | mask);
    }

    fn clear_bits(&mut self, addr: u32, mask: u32) {
        self.modify(addr, |v| v & !mask);
    }

    /// Called once per iteration of every busy-wait.
    fn relax(&mut self) {
        core::hint::spin_loop();
    }

    /// Polls a busy-wait may spend before giving up. `None` waits forever.
    fn spin_limit(&self) -> Option<u32> {
        None
    }
}

/// The executing core: machine CSRs and the sleep instruction.
pub trait Hart: Bus {
    fn write_mstatus(&mut self, value: u32);
    fn write_mtvec(&mut self, value: u32);

    /// Executes `wfi`. Returns once the core resumes.
    fn wait_for_interrupt(&mut self) -> Result<(), Stalled>;
}

/// The real register space. Zero-sized; every access is volatile.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "riscv32")]
impl Bus for Mmio {
    #[inline(always)]
    fn read(&self, addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    #[inline(always)]
    fn write(&mut self, addr: u32, value: u32) {
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
    }
}

#[cfg(target_arch = "riscv32")]
impl Hart for Mmio {
    #[inline(always)]
    fn write_mstatus(&mut self, value: u32) {
        unsafe { core::arch::asm!("csrw mstatus, {0}", in(reg) value) }
    }

    #[inline(always)]
    fn write_mtvec(&mut self, value: u32) {
        unsafe { core::arch::asm!("csrw mtvec, {0}", in(reg) value) }
    }

    #[inline(always)]
    fn wait_for_interrupt(&mut self) -> Result<(), Stalled> {
        unsafe { riscv::asm::wfi() };
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Register store for unit tests that need no peripheral behaviour.
    #[derive(Debug, Default)]
    pub(crate) struct FakeBus {
        pub regs: HashMap<u32, u32>,
        pub writes: Vec<(u32, u32)>,
        pub relaxes: u32,
        pub limit: Option<u32>,
        /// After this many relaxes, OR `mask` into `addr`.
        pub set_after_relaxes: Option<(u32, u32, u32)>,
        /// Every read of `addr` advances it by `step` first.
        pub counter: Option<(u32, u32)>,
        pub counter_value: Cell<u32>,
        pub mstatus: u32,
        pub mtvec: u32,
        pub wfi_calls: u32,
    }

    impl FakeBus {
        pub fn with_limit(limit: Option<u32>) -> Self {
            Self {
                limit,
                ..Self::default()
            }
        }
    }

    impl Bus for FakeBus {
        fn read(&self, addr: u32) -> u32 {
            if let Some((counter_addr, step)) = self.counter {
                if counter_addr == addr {
                    let next = self.counter_value.get().wrapping_add(step);
                    self.counter_value.set(next);
                    return next;
                }
            }
            self.regs.get(&addr).copied().unwrap_or(0)
        }

        fn write(&mut self, addr: u32, value: u32) {
            self.writes.push((addr, value));
            self.regs.insert(addr, value);
        }

        fn relax(&mut self) {
            self.relaxes += 1;
            if let Some((after, addr, mask)) = self.set_after_relaxes {
                if self.relaxes >= after {
                    *self.regs.entry(addr).or_insert(0) |= mask;
                }
            }
        }

        fn spin_limit(&self) -> Option<u32> {
            self.limit
        }
    }

    impl Hart for FakeBus {
        fn write_mstatus(&mut self, value: u32) {
            self.mstatus = value;
        }

        fn write_mtvec(&mut self, value: u32) {
            self.mtvec = value;
        }

        fn wait_for_interrupt(&mut self) -> Result<(), Stalled> {
            self.wfi_calls += 1;
            Ok(())
        }
    }

    #[test]
    fn test_modify_helpers() {
        let mut bus = FakeBus::default();
        bus.write(0x100, 0b1010);
        bus.set_bits(0x100, 0b0001);
        assert_eq!(bus.read(0x100), 0b1011);
        bus.clear_bits(0x100, 0b1000);
        assert_eq!(bus.read(0x100), 0b0011);
        assert_eq!(bus.writes.len(), 3);
    }
}
