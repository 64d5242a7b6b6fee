// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};

/// Caps how much serial output reaches a transcript file.
///
/// Bytes past `max_bytes` are accepted and discarded so a chatty firmware
/// never fails the terminal that feeds this writer.
pub struct SizeLimitedWriter<W: Write> {
    inner: W,
    bytes_written: u64,
    bytes_dropped: u64,
    max_bytes: u64,
}

impl<W: Write> SizeLimitedWriter<W> {
    pub fn new(inner: W, max_bytes: u64) -> Self {
        Self {
            inner,
            bytes_written: 0,
            bytes_dropped: 0,
            max_bytes,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_dropped(&self) -> u64 {
        self.bytes_dropped
    }

    pub fn limit_reached(&self) -> bool {
        self.bytes_written >= self.max_bytes
    }
}

impl<W: Write> Write for SizeLimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = self.max_bytes.saturating_sub(self.bytes_written);
        if remaining == 0 {
            self.bytes_dropped += buf.len() as u64;
            return Ok(buf.len());
        }

        let take = buf.len().min(remaining as usize);
        let written = self.inner.write(&buf[..take])?;
        self.bytes_written += written as u64;
        if written == take && take < buf.len() {
            // Report the whole buffer as consumed; the tail is discarded.
            self.bytes_dropped += (buf.len() - take) as u64;
            return Ok(buf.len());
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
