// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// Host-side visual element driven by an output pin, such as an LED widget.
///
/// Sinks are write-only from the emulator's point of view; nothing reads a
/// sink back into CPU state.
pub trait PinSink: Send + Sync {
    fn set_level(&self, level: DigitalLevel);
}

/// LED indicator that remembers its state and counts level changes.
#[derive(Debug, Default)]
pub struct LedIndicator {
    on: AtomicBool,
    changes: AtomicU64,
}

impl LedIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    pub fn level(&self) -> DigitalLevel {
        DigitalLevel::from(self.is_on())
    }

    pub fn changes(&self) -> u64 {
        self.changes.load(Ordering::SeqCst)
    }
}

impl PinSink for LedIndicator {
    fn set_level(&self, level: DigitalLevel) {
        self.on.store(level.into(), Ordering::SeqCst);
        self.changes.fetch_add(1, Ordering::SeqCst);
    }
}
