// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Lab session lifecycle: load firmware, run, stop and reset.
//!
//! The controller owns at most one active session and its scheduling handle.
//! Nothing here fails hard; problems surface as user-visible notices.

use crate::memory::FirmwareImage;
use crate::metrics::SessionMetrics;
use crate::scheduler::{FrameScheduler, ScheduleHandle};
use crate::serial::SerialLink;
use crate::session::SharedSession;
use crate::signals::{DigitalLevel, PinSink};
use crate::snapshot::CpuSnapshot;
use crate::system::{self, HostWiring};
use avrlab_config::BoardDescriptor;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabState {
    /// No firmware.
    Idle,
    /// Firmware parsed, no session.
    Loaded,
    Running,
    /// Scheduler cancelled; the last CPU state is kept for inspection.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    PointerDown,
    PointerUp,
    PointerLeave,
}

impl ButtonEvent {
    pub fn is_press(self) -> bool {
        matches!(self, ButtonEvent::PointerDown)
    }
}

#[derive(Debug)]
struct ActiveSession {
    session: SharedSession,
    schedule: ScheduleHandle,
}

pub struct LabController {
    board: BoardDescriptor,
    runtime: Handle,
    scheduler: FrameScheduler,
    state: LabState,
    firmware: Option<FirmwareImage>,
    active: Option<ActiveSession>,
    serial: Arc<SerialLink>,
    leds: HashMap<String, Arc<dyn PinSink>>,
    metrics: Arc<SessionMetrics>,
    notices: Vec<String>,
}

impl std::fmt::Debug for LabController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabController")
            .field("board", &self.board.name)
            .field("state", &self.state)
            .field("firmware", &self.firmware.as_ref().map(|f| f.len()))
            .field("notices", &self.notices.len())
            .finish()
    }
}

impl LabController {
    pub fn new(board: BoardDescriptor, runtime: Handle) -> Self {
        let scheduler = FrameScheduler::for_board(&board);
        let serial = Arc::new(SerialLink::new(board.serial.window));
        Self {
            board,
            runtime,
            scheduler,
            state: LabState::Idle,
            firmware: None,
            active: None,
            serial,
            leds: HashMap::new(),
            metrics: Arc::new(SessionMetrics::new()),
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> LabState {
        self.state
    }

    pub fn board(&self) -> &BoardDescriptor {
        &self.board
    }

    pub fn serial(&self) -> &Arc<SerialLink> {
        &self.serial
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn firmware(&self) -> Option<&FirmwareImage> {
        self.firmware.as_ref()
    }

    /// The current session, running or stopped.
    pub fn session(&self) -> Option<SharedSession> {
        self.active.as_ref().map(|a| a.session.clone())
    }

    pub fn snapshot(&self) -> Option<CpuSnapshot> {
        let active = self.active.as_ref()?;
        let guard = active.session.lock().ok()?;
        Some(guard.snapshot())
    }

    /// Connects a host element to an LED by board io id. Applies from the next Run.
    pub fn attach_led(&mut self, id: &str, sink: Arc<dyn PinSink>) {
        self.leds.insert(id.to_string(), sink);
    }

    pub fn detach_led(&mut self, id: &str) {
        self.leds.remove(id);
    }

    fn notice(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{}", msg);
        self.notices.push(msg);
    }

    fn cancel_active(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.schedule.cancel();
        }
        self.serial.disconnect();
    }

    /// Replaces the firmware image. A running session is stopped first and
    /// the previous session is discarded.
    pub fn load_firmware(&mut self, mut image: FirmwareImage) {
        self.cancel_active();
        self.active = None;

        let flash_size = match self.board.flash_size() {
            Ok(size) => size,
            Err(e) => {
                self.notice(format!("Cannot determine flash size: {:#}", e));
                return;
            }
        };
        if image.len() > flash_size {
            self.notice(format!(
                "Firmware image of {} bytes exceeds {} bytes of flash; truncated",
                image.len(),
                flash_size
            ));
            image.truncate(flash_size);
        }

        info!("Firmware loaded: {} bytes", image.len());
        self.firmware = Some(image);
        self.state = LabState::Loaded;
    }

    /// Starts a fresh session from the reset vector. A running or stopped
    /// session is discarded first.
    pub fn run(&mut self) {
        let Some(image) = self.firmware.as_ref() else {
            self.notice("No firmware loaded; load a HEX file before running");
            return;
        };
        if !self.board.target.has_engine() {
            let target = self.board.target;
            self.notice(format!(
                "Target {} has no execution engine; firmware can be loaded but not run",
                target
            ));
            return;
        }

        let wiring = HostWiring {
            serial: self.serial.clone(),
            leds: self.leds.clone(),
            metrics: self.metrics.clone(),
        };
        let session = match system::build_session(&self.board, image, &wiring) {
            Ok(session) => session,
            Err(e) => {
                self.notice(format!("Cannot start session: {}", e));
                return;
            }
        };

        self.cancel_active();
        self.active = None;
        self.metrics.reset();

        let shared = session.into_shared();
        self.serial.connect(&shared);
        let schedule = self.scheduler.start(&self.runtime, shared.clone());
        self.active = Some(ActiveSession {
            session: shared,
            schedule,
        });
        self.state = LabState::Running;
        info!(
            "Session running: {} steps/frame at {} fps",
            self.scheduler.steps_per_frame(),
            self.board.frame_rate
        );
    }

    /// Halts scheduling and keeps the CPU state. No-op unless running.
    pub fn stop(&mut self) {
        if self.state != LabState::Running {
            debug!("Stop ignored in state {:?}", self.state);
            return;
        }
        self.cancel_active();
        self.state = LabState::Stopped;
        info!("Session stopped");
    }

    /// Cancels any session, turns LEDs off and, if firmware is present, runs
    /// it again from the reset vector.
    pub fn reset(&mut self) {
        self.cancel_active();
        self.active = None;
        for sink in self.leds.values() {
            sink.set_level(DigitalLevel::Low);
        }

        if self.firmware.is_some() {
            self.state = LabState::Loaded;
            self.run();
        } else {
            self.state = LabState::Idle;
            self.notice("Reset with no firmware loaded");
        }
    }

    /// Feeds one byte to the emulated UART. Ignored unless running.
    pub fn receive_byte(&self, byte: u8) -> bool {
        if self.state != LabState::Running {
            debug!("Serial input ignored in state {:?}", self.state);
            return false;
        }
        self.serial.receive_byte(byte)
    }

    /// Applies a pointer event to a board button. Ignored unless running.
    pub fn button_event(&self, id: &str, event: ButtonEvent) -> bool {
        if self.state != LabState::Running {
            debug!("Button '{}' event ignored in state {:?}", id, self.state);
            return false;
        }
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        let applied = match active.session.lock() {
            Ok(mut session) => session.set_button(id, event.is_press()),
            Err(_) => false,
        };
        if !applied {
            debug!("No button '{}' on board {}", id, self.board.name);
        }
        applied
    }
}
