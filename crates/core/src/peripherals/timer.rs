// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::{CpuState, InterruptRequest};
use crate::TimerPeripheral;

pub const TIFR0: u16 = 0x35;
pub const TCCR0B: u16 = 0x45;
pub const TCNT0: u16 = 0x46;
pub const TIMSK0: u16 = 0x6E;

pub const TOV0: u8 = 1 << 0;
pub const TOIE0: u8 = 1 << 0;
pub const TIMER0_OVF_VECTOR: u16 = 16;

/// 8-bit Timer0 in normal mode.
///
/// The prescaler counts steps rather than clock cycles since the timer is
/// ticked once per instruction. Registers live in the data space, so the
/// firmware configures the timer with plain OUT/STS.
#[derive(Debug, Default)]
pub struct Timer0 {
    psc_cnt: u32,
}

impl Timer0 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prescaler divider selected by TCCR0B CS02:0; `None` while stopped.
    fn divider(tccr0b: u8) -> Option<u32> {
        match tccr0b & 0x07 {
            1 => Some(1),
            2 => Some(8),
            3 => Some(64),
            4 => Some(256),
            5 => Some(1024),
            // 0 = stopped, 6/7 = external clock on T0, not modelled
            _ => None,
        }
    }
}

impl TimerPeripheral for Timer0 {
    fn tick(&mut self, cpu: &mut CpuState) {
        let Some(div) = Self::divider(cpu.peek_data(TCCR0B)) else {
            return;
        };

        self.psc_cnt += 1;
        if self.psc_cnt < div {
            return;
        }
        self.psc_cnt = 0;

        let cnt = cpu.peek_data(TCNT0).wrapping_add(1);
        cpu.poke_data(TCNT0, cnt);
        if cnt != 0 {
            return;
        }

        cpu.poke_data(TIFR0, cpu.peek_data(TIFR0) | TOV0);
        if cpu.peek_data(TIMSK0) & TOIE0 != 0 {
            cpu.raise_interrupt(InterruptRequest {
                vector: TIMER0_OVF_VECTOR,
                flag_addr: TIFR0,
                flag_mask: TOV0,
            });
        }
    }
}

/// TIFR0 write hook: flags are cleared by writing a one.
pub fn clear_flags_on_write(data: &mut [u8], value: u8, old: u8) -> bool {
    if let Some(slot) = data.get_mut(TIFR0 as usize) {
        *slot = old & !value;
    }
    true
}
