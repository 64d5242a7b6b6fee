// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Host-side stand-ins for the lab's UI widgets when running headless.

use crate::size_limited_writer::SizeLimitedWriter;
use anyhow::{Context, Result};
use avrlab_core::serial::Terminal;
use avrlab_core::signals::{DigitalLevel, PinSink};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Prints serial output straight to stdout.
pub struct StdoutTerminal;

impl Terminal for StdoutTerminal {
    fn write(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        // A closed pipe must not take the UART hook down with it.
        let _ = out.write_all(text.as_bytes()).and_then(|_| out.flush());
    }
}

/// Appends serial output to a file, up to a byte cap.
pub struct TranscriptTerminal {
    writer: SizeLimitedWriter<BufWriter<File>>,
    warned: bool,
}

impl TranscriptTerminal {
    pub fn create(path: &Path, max_bytes: u64) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create serial transcript {:?}", path))?;
        Ok(Self {
            writer: SizeLimitedWriter::new(BufWriter::new(file), max_bytes),
            warned: false,
        })
    }
}

impl Terminal for TranscriptTerminal {
    fn write(&mut self, text: &str) {
        if let Err(e) = self
            .writer
            .write_all(text.as_bytes())
            .and_then(|_| self.writer.flush())
        {
            if !self.warned {
                warn!("Serial transcript write failed: {}", e);
                self.warned = true;
            }
            return;
        }
        if self.writer.limit_reached() && self.writer.bytes_dropped() > 0 && !self.warned {
            warn!(
                "Serial transcript capped at {} bytes; later output is dropped",
                self.writer.bytes_written()
            );
            self.warned = true;
        }
    }
}

/// Logs LED edges instead of drawing them.
#[derive(Debug)]
pub struct LedLogger {
    id: String,
    edges: AtomicU64,
}

impl LedLogger {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            edges: AtomicU64::new(0),
        }
    }

    pub fn edges(&self) -> u64 {
        self.edges.load(Ordering::Relaxed)
    }
}

impl PinSink for LedLogger {
    fn set_level(&self, level: DigitalLevel) {
        let n = self.edges.fetch_add(1, Ordering::Relaxed) + 1;
        // Real-time blink firmware would flood INFO otherwise.
        if n <= 16 {
            info!("LED '{}' -> {:?}", self.id, level);
        } else {
            tracing::trace!("LED '{}' -> {:?}", self.id, level);
        }
    }
}
