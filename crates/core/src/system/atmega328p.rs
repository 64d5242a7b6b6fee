// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::avr::AvrEngine;
use crate::cpu::CpuState;
use crate::memory::{FirmwareImage, ProgramWords};
use crate::peripherals::gpio::{ButtonInput, GpioOutputHook, LedBinding};
use crate::peripherals::timer::{self, Timer0};
use crate::peripherals::uart::UartPort;
use crate::session::{EmulationSession, SessionIo};
use crate::system::HostWiring;
use crate::{SimResult, SimulationError};
use avrlab_config::BoardDescriptor;

/// Wires the board's registers to host endpoints and returns a session at
/// the reset vector.
pub fn build(
    board: &BoardDescriptor,
    image: &FirmwareImage,
    wiring: &HostWiring,
) -> SimResult<EmulationSession> {
    let data_size = board
        .data_size()
        .map_err(|e| SimulationError::Config(format!("{:#}", e)))?;
    let program = ProgramWords::from_image(image);
    tracing::debug!(
        "Program: {} words, data space: {} bytes",
        program.len(),
        data_size
    );
    let mut cpu = CpuState::new(program, data_size);
    let regs = &board.registers;

    let leds: Vec<LedBinding> = board
        .leds()
        .map(|io| {
            let sink = wiring.leds.get(&io.id).cloned();
            if sink.is_none() {
                tracing::debug!("LED '{}' has no host element", io.id);
            }
            LedBinding::new(&io.id, io.pin, io.active_high, sink)
        })
        .collect();
    cpu.on_write(regs.gpio_output, GpioOutputHook::new(leds));

    let uart = UartPort::new(regs, &board.uart_status_bits);
    uart.install(&mut cpu, wiring.serial.clone());

    cpu.on_write(timer::TIFR0, timer::clear_flags_on_write);

    // Input pins idle at their released level.
    let mut idle = 0xFF;
    let mut buttons = std::collections::HashMap::new();
    for io in board.buttons() {
        let button = ButtonInput::new(io.pin, io.active_high);
        idle = button.apply(idle, false);
        buttons.insert(io.id.clone(), button);
    }
    cpu.poke_data(regs.gpio_input, idle);

    let io = SessionIo {
        uart: Some(uart),
        gpio_input: regs.gpio_input,
        buttons,
    };
    Ok(EmulationSession::new(
        cpu,
        Box::new(AvrEngine::new()),
        Box::new(Timer0::new()),
        io,
        wiring.metrics.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SessionMetrics;
    use crate::serial::SerialLink;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn wiring() -> HostWiring {
        HostWiring {
            serial: Arc::new(SerialLink::new(64)),
            leds: HashMap::new(),
            metrics: Arc::new(SessionMetrics::new()),
        }
    }

    #[test]
    fn test_initial_register_state() {
        let board = BoardDescriptor::arduino_uno();
        let image = FirmwareImage::new(32 * 1024);
        let session = build(&board, &image, &wiring()).unwrap();
        let cpu = session.cpu();

        assert_eq!(cpu.peek_data(board.registers.gpio_input), 0xFF);
        assert_eq!(cpu.peek_data(board.registers.uart_status) & 0x20, 0x20);
        assert_eq!(cpu.sp(), 0x8FF);
        assert_eq!(cpu.program().len(), 16 * 1024);
    }

    #[test]
    fn test_active_high_button_idles_low() {
        let mut board = BoardDescriptor::arduino_uno();
        board.board_io[1].active_high = true;
        let session = build(&board, &FirmwareImage::new(64), &wiring()).unwrap();
        assert_eq!(session.cpu().peek_data(board.registers.gpio_input), 0xFB);
    }
}
