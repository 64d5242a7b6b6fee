// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod atmega328p;

use crate::memory::FirmwareImage;
use crate::metrics::SessionMetrics;
use crate::serial::SerialLink;
use crate::session::EmulationSession;
use crate::signals::PinSink;
use crate::{SimResult, SimulationError};
use avrlab_config::{BoardDescriptor, Target};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Host-side endpoints a new session is wired to.
#[derive(Clone)]
pub struct HostWiring {
    pub serial: Arc<SerialLink>,
    pub leds: HashMap<String, Arc<dyn PinSink>>,
    pub metrics: Arc<SessionMetrics>,
}

/// Builds a fresh session for `board` from `image`, with hooks installed.
pub fn build_session(
    board: &BoardDescriptor,
    image: &FirmwareImage,
    wiring: &HostWiring,
) -> SimResult<EmulationSession> {
    match board.target {
        Target::Atmega328p => {
            info!("Building ATmega328P session for board '{}'", board.name);
            atmega328p::build(board, image, wiring)
        }
        other => Err(SimulationError::NoEngine(other)),
    }
}
