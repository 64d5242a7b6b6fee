// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::CpuState;
use crate::metrics::SessionMetrics;
use crate::peripherals::gpio::ButtonInput;
use crate::peripherals::uart::UartPort;
use crate::snapshot::CpuSnapshot;
use crate::{Engine, SimResult, SimulationError, TimerPeripheral};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type SharedSession = Arc<Mutex<EmulationSession>>;

/// Host-facing I/O endpoints of a session.
#[derive(Debug, Clone, Default)]
pub struct SessionIo {
    pub uart: Option<UartPort>,
    pub gpio_input: u16,
    pub buttons: HashMap<String, ButtonInput>,
}

/// One run of firmware: CPU state, the engine stepping it and the timer
/// ticking alongside it.
pub struct EmulationSession {
    cpu: CpuState,
    engine: Box<dyn Engine>,
    timer: Box<dyn TimerPeripheral>,
    io: SessionIo,
    metrics: Arc<SessionMetrics>,
    decode_warned: bool,
}

impl std::fmt::Debug for EmulationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulationSession")
            .field("engine", &self.engine.name())
            .field("pc", &self.cpu.pc)
            .field("cycles", &self.cpu.cycles)
            .finish()
    }
}

impl EmulationSession {
    pub fn new(
        cpu: CpuState,
        engine: Box<dyn Engine>,
        timer: Box<dyn TimerPeripheral>,
        io: SessionIo,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            cpu,
            engine,
            timer,
            io,
            metrics,
            decode_warned: false,
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// One engine step followed by exactly one timer tick.
    pub fn step(&mut self) -> SimResult<()> {
        let res = self.engine.step(&mut self.cpu);
        self.timer.tick(&mut self.cpu);
        res
    }

    /// Runs `steps` back-to-back step+tick pairs.
    ///
    /// Decode errors do not stop the frame; the first one per session is
    /// logged as a warning.
    pub fn run_frame(&mut self, steps: u64) {
        for _ in 0..steps {
            match self.step() {
                Ok(()) => {}
                Err(e @ SimulationError::DecodeError { .. }) => {
                    self.metrics.record_decode_error();
                    if !self.decode_warned {
                        tracing::warn!("{}; continuing past it", e);
                        self.decode_warned = true;
                    }
                }
                Err(e) => tracing::warn!("Step failed: {}", e),
            }
        }
        self.metrics.record_frame(steps);
        tracing::debug!(
            "Frame done: {} steps, pc={:#06x}, cycles={}",
            steps,
            self.cpu.pc,
            self.cpu.cycles
        );
    }

    /// Host-to-device UART byte. Ignored when the board has no UART.
    pub fn receive_byte(&mut self, byte: u8) {
        match self.io.uart {
            Some(uart) => uart.receive(&mut self.cpu, byte),
            None => tracing::debug!("No UART on this board; byte {:#04x} dropped", byte),
        }
    }

    /// Drives a board button. Returns `false` for an unknown button id.
    pub fn set_button(&mut self, id: &str, pressed: bool) -> bool {
        let Some(button) = self.io.buttons.get(id).copied() else {
            return false;
        };
        let port = self.cpu.peek_data(self.io.gpio_input);
        self.cpu
            .poke_data(self.io.gpio_input, button.apply(port, pressed));
        true
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        self.cpu.snapshot()
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }
}
