// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::CpuState;
use crate::serial::SerialLink;
use avrlab_config::{RegisterMap, UartStatusBits};
use std::sync::Arc;

/// Polled UART seen through its data and status registers.
///
/// Transmit and receive share one data address, as on USART0. A firmware
/// store is forwarded to the serial link and not kept, so a byte written for
/// transmit never shadows the last received byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartPort {
    pub data: u16,
    pub status: u16,
    pub rx_complete: u8,
    pub tx_ready: u8,
}

impl UartPort {
    pub fn new(registers: &RegisterMap, bits: &UartStatusBits) -> Self {
        Self {
            data: registers.uart_data,
            status: registers.uart_status,
            rx_complete: 1 << (bits.rx_complete & 0x07),
            tx_ready: 1 << (bits.tx_ready & 0x07),
        }
    }

    /// Binds the data register hooks and marks the transmitter ready.
    pub fn install(&self, cpu: &mut CpuState, link: Arc<SerialLink>) {
        cpu.on_write(self.data, move |_: &mut [u8], value: u8, _old: u8| {
            link.push_byte(value);
            true
        });

        let status = self.status as usize;
        let rx_complete = self.rx_complete;
        cpu.on_read(self.data, move |data: &mut [u8], addr: u16| {
            if let Some(flags) = data.get_mut(status) {
                *flags &= !rx_complete;
            }
            data.get(addr as usize).copied().unwrap_or(0)
        });

        let flags = cpu.peek_data(self.status);
        cpu.poke_data(self.status, flags | self.tx_ready);
    }

    /// Latches a byte from the host and signals receive-complete.
    pub fn receive(&self, cpu: &mut CpuState, byte: u8) {
        cpu.poke_data(self.data, byte);
        let flags = cpu.peek_data(self.status);
        cpu.poke_data(self.status, flags | self.rx_complete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ProgramWords;

    fn setup() -> (CpuState, UartPort, Arc<SerialLink>) {
        let mut cpu = CpuState::new(ProgramWords::from_words(vec![0; 4]), 0x900);
        let port = UartPort::new(&RegisterMap::default(), &UartStatusBits::default());
        let link = Arc::new(SerialLink::new(64));
        port.install(&mut cpu, link.clone());
        (cpu, port, link)
    }

    #[test]
    fn test_transmit_ready_after_install() {
        let (cpu, port, _) = setup();
        assert_eq!(cpu.peek_data(port.status) & port.tx_ready, port.tx_ready);
        assert_eq!(cpu.peek_data(port.status) & port.rx_complete, 0);
    }

    #[test]
    fn test_firmware_write_goes_to_link() {
        let (mut cpu, port, link) = setup();
        for b in b"hi\n" {
            cpu.write_data(port.data, *b);
        }
        assert_eq!(link.output(), "hi\n");
        assert_eq!(cpu.peek_data(port.data), 0);
    }

    #[test]
    fn test_receive_then_read_clears_flag() {
        let (mut cpu, port, _) = setup();
        port.receive(&mut cpu, 0x41);
        assert_ne!(cpu.peek_data(port.status) & port.rx_complete, 0);

        assert_eq!(cpu.read_data(port.data), 0x41);
        assert_eq!(cpu.peek_data(port.status) & port.rx_complete, 0);
        // Transmit-ready survives the read
        assert_ne!(cpu.peek_data(port.status) & port.tx_ready, 0);
    }
}
