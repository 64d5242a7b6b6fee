// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::WriteHook;
use crate::signals::{DigitalLevel, PinSink};
use std::sync::Arc;

/// One output pin wired to a host-side sink.
pub struct LedBinding {
    pub id: String,
    pub mask: u8,
    pub active_high: bool,
    /// `None` when the host has no element for this LED; writes are ignored.
    pub sink: Option<Arc<dyn PinSink>>,
}

impl std::fmt::Debug for LedBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedBinding")
            .field("id", &self.id)
            .field("mask", &self.mask)
            .field("active_high", &self.active_high)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl LedBinding {
    pub fn new(id: &str, pin: u8, active_high: bool, sink: Option<Arc<dyn PinSink>>) -> Self {
        Self {
            id: id.to_string(),
            mask: 1 << (pin & 0x07),
            active_high,
            sink,
        }
    }
}

/// Write hook on the GPIO output port.
///
/// Only bits that actually changed are forwarded, so a sink sees one call per
/// edge. The written value is always stored by the bus.
#[derive(Debug, Default)]
pub struct GpioOutputHook {
    bindings: Vec<LedBinding>,
}

impl GpioOutputHook {
    pub fn new(bindings: Vec<LedBinding>) -> Self {
        Self { bindings }
    }
}

impl WriteHook for GpioOutputHook {
    fn on_write(&mut self, _data: &mut [u8], value: u8, old: u8) -> bool {
        let changed = value ^ old;
        if changed == 0 {
            return false;
        }
        for led in &self.bindings {
            if changed & led.mask == 0 {
                continue;
            }
            let high = value & led.mask != 0;
            let level = DigitalLevel::from(high == led.active_high);
            match &led.sink {
                Some(sink) => sink.set_level(level),
                None => tracing::trace!("LED '{}' has no sink", led.id),
            }
        }
        false
    }
}

/// A push-button on the GPIO input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonInput {
    pub mask: u8,
    pub active_high: bool,
}

impl ButtonInput {
    pub fn new(pin: u8, active_high: bool) -> Self {
        Self {
            mask: 1 << (pin & 0x07),
            active_high,
        }
    }

    /// Input port value with this button pressed or released.
    ///
    /// An active-low button (the default pulled-up wiring) reads low while
    /// pressed and high when released.
    pub fn apply(&self, port: u8, pressed: bool) -> u8 {
        let high = pressed == self.active_high;
        if high {
            port | self.mask
        } else {
            port & !self.mask
        }
    }
}
