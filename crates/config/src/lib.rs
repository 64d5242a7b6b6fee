// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_frame_rate() -> u32 {
    60
}

fn default_serial_window() -> usize {
    8 * 1024
}

fn default_true() -> bool {
    true
}

/// Microcontroller families a board can declare.
///
/// Only [`Target::Atmega328p`] is connected to an execution engine. The other
/// targets accept firmware for selection but cannot run it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[serde(alias = "atmega328", alias = "arduino-uno", alias = "uno")]
    Atmega328p,
    #[serde(alias = "pico", alias = "rp2040-pico")]
    Rp2040,
}

impl Target {
    pub fn has_engine(&self) -> bool {
        matches!(self, Target::Atmega328p)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Atmega328p => write!(f, "atmega328p"),
            Target::Rp2040 => write!(f, "rp2040"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemoryRange {
    #[serde(default)]
    pub base: u64,
    pub size: String, // e.g. "32KiB"
}

/// Data-space addresses of the memory-mapped registers the host binds to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub gpio_output: u16,
    pub gpio_input: u16,
    pub uart_data: u16,
    pub uart_status: u16,
}

impl Default for RegisterMap {
    fn default() -> Self {
        // ATmega328P: PORTB, PIND, UDR0, UCSR0A
        Self {
            gpio_output: 0x25,
            gpio_input: 0x29,
            uart_data: 0xC6,
            uart_status: 0xC0,
        }
    }
}

/// Bit positions inside the UART status register.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct UartStatusBits {
    pub rx_complete: u8,
    pub tx_ready: u8,
}

impl Default for UartStatusBits {
    fn default() -> Self {
        // RXC0 and UDRE0
        Self {
            rx_complete: 7,
            tx_ready: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoardIoKind {
    Led,
    Button,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoardIoBinding {
    pub id: String,
    pub kind: BoardIoKind,
    pub pin: u8,
    #[serde(default = "default_true")]
    pub active_high: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct SerialSettings {
    /// Number of output characters retained by the serial link.
    #[serde(default = "default_serial_window")]
    pub window: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            window: default_serial_window(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("clock_hz must be non-zero")]
    ZeroClock,
    #[error("frame_rate must be non-zero")]
    ZeroFrameRate,
    #[error("frame_rate {frame_rate} exceeds clock_hz {clock_hz}")]
    FrameRateAboveClock { frame_rate: u32, clock_hz: u64 },
    #[error("board io '{id}' uses pin {pin}; 8-bit ports only have pins 0-7")]
    PinOutOfRange { id: String, pin: u8 },
    #[error("duplicate board io id '{0}'")]
    DuplicateIo(String),
    #[error("serial window must be non-zero")]
    ZeroSerialWindow,
    #[error("register {name} at {addr:#x} is outside data memory ({data_size} bytes)")]
    RegisterOutOfRange {
        name: &'static str,
        addr: u16,
        data_size: u64,
    },
}

/// Describes one emulated board: target chip, clock, memories, register map
/// and the on-board LEDs and buttons wired to GPIO pins.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoardDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub target: Target,
    pub clock_hz: u64,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    pub flash: MemoryRange,
    /// SRAM; data space spans `0..sram.base + sram.size`.
    pub sram: MemoryRange,
    #[serde(default)]
    pub registers: RegisterMap,
    #[serde(default)]
    pub uart_status_bits: UartStatusBits,
    #[serde(default)]
    pub board_io: Vec<BoardIoBinding>,
    #[serde(default)]
    pub serial: SerialSettings,
}

impl BoardDescriptor {
    /// Arduino Uno: ATmega328P at 16 MHz, LED on PB5, push-button on PD2.
    pub fn arduino_uno() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "arduino-uno".to_string(),
            target: Target::Atmega328p,
            clock_hz: 16_000_000,
            frame_rate: default_frame_rate(),
            flash: MemoryRange {
                base: 0,
                size: "32KiB".to_string(),
            },
            sram: MemoryRange {
                base: 0x100,
                size: "2KiB".to_string(),
            },
            registers: RegisterMap::default(),
            uart_status_bits: UartStatusBits::default(),
            board_io: vec![
                BoardIoBinding {
                    id: "led_builtin".to_string(),
                    kind: BoardIoKind::Led,
                    pin: 5,
                    active_high: true,
                },
                BoardIoBinding {
                    id: "button".to_string(),
                    kind: BoardIoKind::Button,
                    pin: 2,
                    active_high: false,
                },
            ],
            serial: SerialSettings::default(),
        }
    }

    /// Raspberry Pi Pico. Firmware can be selected but no engine runs it.
    pub fn raspberry_pi_pico() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "raspberry-pi-pico".to_string(),
            target: Target::Rp2040,
            clock_hz: 125_000_000,
            frame_rate: default_frame_rate(),
            flash: MemoryRange {
                base: 0x1000_0000,
                size: "2MiB".to_string(),
            },
            sram: MemoryRange {
                base: 0x2000_0000,
                size: "264KiB".to_string(),
            },
            registers: RegisterMap::default(),
            uart_status_bits: UartStatusBits::default(),
            board_io: Vec::new(),
            serial: SerialSettings::default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read board descriptor {:?}", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let board: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Board Descriptor YAML")?;
        board.validate()?;
        Ok(board)
    }

    pub fn flash_size(&self) -> Result<usize> {
        Ok(parse_size(&self.flash.size)? as usize)
    }

    /// Size of the data space: registers, I/O and SRAM.
    pub fn data_size(&self) -> Result<usize> {
        Ok((self.sram.base + parse_size(&self.sram.size)?) as usize)
    }

    pub fn leds(&self) -> impl Iterator<Item = &BoardIoBinding> {
        self.board_io.iter().filter(|b| b.kind == BoardIoKind::Led)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &BoardIoBinding> {
        self.board_io
            .iter()
            .filter(|b| b.kind == BoardIoKind::Button)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_hz == 0 {
            return Err(ConfigError::ZeroClock);
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        if u64::from(self.frame_rate) > self.clock_hz {
            return Err(ConfigError::FrameRateAboveClock {
                frame_rate: self.frame_rate,
                clock_hz: self.clock_hz,
            });
        }
        if self.serial.window == 0 {
            return Err(ConfigError::ZeroSerialWindow);
        }

        let mut seen = HashSet::new();
        for io in &self.board_io {
            if io.pin > 7 {
                return Err(ConfigError::PinOutOfRange {
                    id: io.id.clone(),
                    pin: io.pin,
                });
            }
            if !seen.insert(io.id.as_str()) {
                return Err(ConfigError::DuplicateIo(io.id.clone()));
            }
        }

        // Register addresses only matter for targets that actually execute.
        if self.target.has_engine() {
            if let Ok(data_size) = self.data_size() {
                let data_size = data_size as u64;
                let regs = [
                    ("gpio_output", self.registers.gpio_output),
                    ("gpio_input", self.registers.gpio_input),
                    ("uart_data", self.registers.uart_data),
                    ("uart_status", self.registers.uart_status),
                ];
                for (name, addr) in regs {
                    if u64::from(addr) >= data_size {
                        return Err(ConfigError::RegisterOutOfRange {
                            name,
                            addr,
                            data_size,
                        });
                    }
                }
            }
        }

        tracing::debug!("Board '{}' validated", self.name);
        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uno_preset_is_valid() {
        let board = BoardDescriptor::arduino_uno();
        assert_eq!(board.validate(), Ok(()));
        assert_eq!(board.leds().count(), 1);
        assert_eq!(board.buttons().count(), 1);
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let mut board = BoardDescriptor::arduino_uno();
        board.frame_rate = 0;
        assert_eq!(board.validate(), Err(ConfigError::ZeroFrameRate));
    }

    #[test]
    fn test_duplicate_io_rejected() {
        let mut board = BoardDescriptor::arduino_uno();
        board.board_io.push(BoardIoBinding {
            id: "led_builtin".to_string(),
            kind: BoardIoKind::Led,
            pin: 4,
            active_high: true,
        });
        assert_eq!(
            board.validate(),
            Err(ConfigError::DuplicateIo("led_builtin".to_string()))
        );
    }

    #[test]
    fn test_pin_out_of_range_rejected() {
        let mut board = BoardDescriptor::arduino_uno();
        board.board_io[0].pin = 8;
        assert!(matches!(
            board.validate(),
            Err(ConfigError::PinOutOfRange { pin: 8, .. })
        ));
    }

    #[test]
    fn test_stub_target_skips_register_check() {
        let board = BoardDescriptor::raspberry_pi_pico();
        assert!(!board.target.has_engine());
        assert_eq!(board.validate(), Ok(()));
    }
}
