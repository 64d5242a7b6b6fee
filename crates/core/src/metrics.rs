// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct SessionMetrics {
    instruction_count: AtomicU64,
    frame_count: AtomicU64,
    decode_error_count: AtomicU64,
    start_time: Mutex<Instant>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            instruction_count: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            decode_error_count: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.instruction_count.store(0, Ordering::SeqCst);
        self.frame_count.store(0, Ordering::SeqCst);
        self.decode_error_count.store(0, Ordering::SeqCst);
        if let Ok(mut start) = self.start_time.lock() {
            *start = Instant::now();
        }
    }

    pub fn record_frame(&self, instructions: u64) {
        self.instruction_count
            .fetch_add(instructions, Ordering::Relaxed);
        self.frame_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_instructions(&self) -> u64 {
        self.instruction_count.load(Ordering::SeqCst)
    }

    pub fn get_frames(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    pub fn get_decode_errors(&self) -> u64 {
        self.decode_error_count.load(Ordering::SeqCst)
    }

    pub fn get_ips(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_instructions() as f64 / elapsed
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accumulate_and_reset() {
        let metrics = SessionMetrics::new();
        metrics.record_frame(100);
        metrics.record_frame(100);
        metrics.record_decode_error();
        assert_eq!(metrics.get_instructions(), 200);
        assert_eq!(metrics.get_frames(), 2);
        assert_eq!(metrics.get_decode_errors(), 1);

        metrics.reset();
        assert_eq!(metrics.get_instructions(), 0);
        assert_eq!(metrics.get_frames(), 0);
        assert_eq!(metrics.get_decode_errors(), 0);
    }
}
