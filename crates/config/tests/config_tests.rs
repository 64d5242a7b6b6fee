// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use avrlab_config::{BoardDescriptor, BoardIoKind, RegisterMap, Target};

#[test]
fn test_minimal_board_yaml_uses_defaults() {
    let yaml = r#"
name: "uno-clone"
target: "uno"
clock_hz: 16000000
flash:
  size: "32KiB"
sram:
  base: 0x100
  size: "2KiB"
"#;
    let board = BoardDescriptor::from_yaml(yaml).unwrap();
    assert_eq!(board.schema_version, "1.0");
    assert_eq!(board.target, Target::Atmega328p);
    assert_eq!(board.frame_rate, 60);
    assert_eq!(board.registers, RegisterMap::default());
    assert_eq!(board.uart_status_bits.rx_complete, 7);
    assert_eq!(board.uart_status_bits.tx_ready, 5);
    assert_eq!(board.serial.window, 8 * 1024);
    assert!(board.board_io.is_empty());
    assert_eq!(board.flash_size().unwrap(), 32 * 1024);
    assert_eq!(board.data_size().unwrap(), 0x900);
}

#[test]
fn test_board_io_and_registers_parse() {
    let yaml = r#"
name: "custom"
target: "atmega328p"
clock_hz: 8000000
frame_rate: 30
flash:
  size: "32KiB"
sram:
  base: 0x100
  size: "2KiB"
registers:
  gpio_output: 0x2B
  gpio_input: 0x23
  uart_data: 0xC6
  uart_status: 0xC0
board_io:
  - id: "red"
    kind: "led"
    pin: 7
  - id: "sw1"
    kind: "button"
    pin: 0
    active_high: false
serial:
  window: 128
"#;
    let board = BoardDescriptor::from_yaml(yaml).unwrap();
    assert_eq!(board.frame_rate, 30);
    assert_eq!(board.registers.gpio_output, 0x2B);
    assert_eq!(board.registers.gpio_input, 0x23);
    assert_eq!(board.board_io.len(), 2);
    assert_eq!(board.board_io[0].kind, BoardIoKind::Led);
    assert!(board.board_io[0].active_high);
    assert_eq!(board.board_io[1].kind, BoardIoKind::Button);
    assert!(!board.board_io[1].active_high);
    assert_eq!(board.serial.window, 128);
}

#[test]
fn test_invalid_board_is_rejected_on_load() {
    let yaml = r#"
name: "broken"
target: "atmega328p"
clock_hz: 0
flash:
  size: "32KiB"
sram:
  base: 0x100
  size: "2KiB"
"#;
    let err = BoardDescriptor::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("clock_hz"));
}

#[test]
fn test_register_outside_data_space_is_rejected() {
    let yaml = r#"
name: "tiny"
target: "atmega328p"
clock_hz: 1000000
flash:
  size: "1KiB"
sram:
  base: 0x60
  size: "64B"
registers:
  gpio_output: 0x25
  gpio_input: 0x23
  uart_data: 0xC6
  uart_status: 0xC0
"#;
    assert!(BoardDescriptor::from_yaml(yaml).is_err());
}

#[test]
fn test_unknown_target_is_a_parse_error() {
    let yaml = r#"
name: "mystery"
target: "z80"
clock_hz: 1000000
flash:
  size: "1KiB"
sram:
  size: "1KiB"
"#;
    assert!(BoardDescriptor::from_yaml(yaml).is_err());
}
