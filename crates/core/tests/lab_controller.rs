// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use avrlab_core::controller::{ButtonEvent, LabController, LabState};
use avrlab_core::serial::{SerialBridge, Terminal};
use avrlab_core::signals::{LedIndicator, PinSink};
use avrlab_core::BoardDescriptor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::sleep;

fn hex_record(kind: u8, addr: u16, data: &[u8]) -> String {
    let mut sum = (data.len() as u8)
        .wrapping_add((addr >> 8) as u8)
        .wrapping_add(addr as u8)
        .wrapping_add(kind);
    let mut line = format!(":{:02X}{:04X}{:02X}", data.len(), addr, kind);
    for b in data {
        line.push_str(&format!("{:02X}", b));
        sum = sum.wrapping_add(*b);
    }
    line.push_str(&format!("{:02X}\n", sum.wrapping_neg()));
    line
}

fn hex_text(words: &[u16]) -> String {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let mut text = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        text.push_str(&hex_record(0, (i * 16) as u16, chunk));
    }
    text.push_str(&hex_record(1, 0, &[]));
    text
}

/// Uno wiring at a clock slow enough for 100 steps per 60 Hz frame.
fn slow_uno() -> BoardDescriptor {
    let mut board = BoardDescriptor::arduino_uno();
    board.clock_hz = 6_000;
    board
}

fn load(lab: &mut LabController, words: &[u16]) {
    let flash = lab.board().flash_size().unwrap();
    lab.load_firmware(avrlab_loader::parse_intel_hex(&hex_text(words), flash));
}

const BLINK: [u16; 6] = [0xE200, 0xB904, 0xE010, 0x2710, 0xB915, 0xCFFD];

const ECHO: [u16; 9] = [
    0x9100, 0x00C0, 0xFF07, 0xCFFC, 0x9110, 0x00C6, 0x9310, 0x00C6, 0xCFF7,
];

// ldi r16,0; loop: in r17,PIND; sbrs r17,2; inc r16; rjmp loop
const BUTTON_COUNTER: [u16; 5] = [0xE000, 0xB119, 0xFF12, 0x9503, 0xCFFC];

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<String>>);

impl Terminal for Capture {
    fn write(&mut self, text: &str) {
        self.0.lock().unwrap().push_str(text);
    }
}

#[tokio::test(start_paused = true)]
async fn test_blink_runs_in_real_time() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    let led = Arc::new(LedIndicator::new());
    lab.attach_led("led_builtin", led.clone());

    load(&mut lab, &BLINK);
    assert_eq!(lab.state(), LabState::Loaded);
    lab.run();
    assert_eq!(lab.state(), LabState::Running);

    sleep(Duration::from_millis(100)).await;
    let frames = lab.metrics().get_frames();
    assert!(frames >= 5, "got {} frames", frames);
    assert_eq!(lab.metrics().get_instructions(), frames * 100);
    assert!(led.changes() > 0);
    assert!(lab.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_double_stop_keeps_cpu_state() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    load(&mut lab, &BLINK);
    lab.run();
    sleep(Duration::from_millis(50)).await;

    lab.stop();
    assert_eq!(lab.state(), LabState::Stopped);
    let first = lab.snapshot().unwrap();
    let frames = lab.metrics().get_frames();

    lab.stop();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(lab.state(), LabState::Stopped);
    assert_eq!(lab.snapshot().unwrap(), first);
    assert_eq!(lab.metrics().get_frames(), frames);
}

#[tokio::test(start_paused = true)]
async fn test_run_after_stop_restarts_from_reset_vector() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    load(&mut lab, &BLINK);
    lab.run();
    sleep(Duration::from_millis(100)).await;
    lab.stop();
    let stopped = lab.snapshot().unwrap();
    assert!(stopped.cycles > 0);

    lab.run();
    let fresh = lab.snapshot().unwrap();
    assert_eq!(fresh.pc, 0);
    assert_eq!(fresh.cycles, 0);
    assert_eq!(lab.state(), LabState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_reset_turns_leds_off_and_reruns() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    let led = Arc::new(LedIndicator::new());
    lab.attach_led("led_builtin", led.clone());
    load(&mut lab, &BLINK);
    lab.run();
    sleep(Duration::from_millis(30)).await;

    lab.reset();
    assert!(!led.is_on());
    assert_eq!(lab.state(), LabState::Running);
    assert_eq!(lab.snapshot().unwrap().cycles, 0);
    assert!(lab.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reset_from_stopped_reruns_fresh() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    load(&mut lab, &BLINK);
    lab.run();
    sleep(Duration::from_millis(50)).await;
    lab.stop();
    assert!(lab.snapshot().unwrap().cycles > 0);

    lab.reset();
    assert_eq!(lab.state(), LabState::Running);
    let fresh = lab.snapshot().unwrap();
    assert_eq!(fresh.pc, 0);
    assert_eq!(fresh.cycles, 0);
    assert!(lab.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_load_while_running_discards_session() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    load(&mut lab, &ECHO);
    lab.run();
    sleep(Duration::from_millis(50)).await;
    assert!(lab.metrics().get_frames() > 0);

    load(&mut lab, &BLINK);
    assert_eq!(lab.state(), LabState::Loaded);
    assert!(lab.session().is_none());
    assert!(lab.snapshot().is_none());

    let frames = lab.metrics().get_frames();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(lab.metrics().get_frames(), frames);
    assert!(!lab.receive_byte(b'x'));
    assert!(!lab.serial().is_connected());

    lab.run();
    assert_eq!(lab.state(), LabState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_reset_without_firmware_goes_idle_with_one_notice() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    lab.reset();
    lab.stop();
    assert_eq!(lab.state(), LabState::Idle);
    assert_eq!(lab.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_echo_through_bridge() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    load(&mut lab, &ECHO);
    lab.run();

    let capture = Capture::default();
    let bridge = SerialBridge::attach(lab.serial().clone(), Box::new(capture.clone()));
    for ch in ["h", "i"] {
        assert_eq!(bridge.on_data(ch), 1);
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(capture.0.lock().unwrap().as_str(), "hi");

    // The session keeps running without a terminal.
    bridge.detach();
    assert!(lab.receive_byte(b'!'));
    sleep(Duration::from_millis(20)).await;
    assert_eq!(lab.serial().output(), "hi!");
    assert_eq!(capture.0.lock().unwrap().as_str(), "hi");

    // A late terminal sees the backlog.
    let late = Capture::default();
    let _bridge = SerialBridge::attach(lab.serial().clone(), Box::new(late.clone()));
    assert_eq!(late.0.lock().unwrap().as_str(), "hi!");

    lab.stop();
    assert!(!lab.receive_byte(b'?'));
}

#[tokio::test(start_paused = true)]
async fn test_button_press_reaches_firmware() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    load(&mut lab, &BUTTON_COUNTER);
    lab.run();
    sleep(Duration::from_millis(20)).await;
    let session = lab.session().unwrap();
    assert_eq!(session.lock().unwrap().cpu().reg(16), 0);

    assert!(lab.button_event("button", ButtonEvent::PointerDown));
    sleep(Duration::from_millis(20)).await;
    let pressed_count = session.lock().unwrap().cpu().reg(16);
    assert!(pressed_count > 0);

    assert!(lab.button_event("button", ButtonEvent::PointerLeave));
    sleep(Duration::from_millis(20)).await;
    let settled = session.lock().unwrap().cpu().reg(16);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(session.lock().unwrap().cpu().reg(16), settled);

    assert!(!lab.button_event("no-such-button", ButtonEvent::PointerDown));
}

#[tokio::test(start_paused = true)]
async fn test_led_sink_is_optional() {
    let mut lab = LabController::new(slow_uno(), Handle::current());
    load(&mut lab, &BLINK);
    lab.run();
    sleep(Duration::from_millis(50)).await;
    assert!(lab.metrics().get_instructions() > 0);
    assert!(lab.notices().is_empty());

    let sink: Arc<dyn PinSink> = Arc::new(LedIndicator::new());
    lab.attach_led("led_builtin", sink);
    lab.detach_led("led_builtin");
}
