// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::session::SharedSession;
use avrlab_config::BoardDescriptor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Paces a session at `clock_hz` in fixed frames.
///
/// Each frame runs `clock_hz / frame_rate` steps back to back and then sleeps
/// for one frame period. Only the average rate across frames tracks the
/// nominal clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameScheduler {
    steps_per_frame: u64,
    frame_period: Duration,
}

impl FrameScheduler {
    pub fn new(clock_hz: u64, frame_rate: u32) -> Self {
        let frame_rate = frame_rate.max(1);
        Self {
            steps_per_frame: clock_hz / u64::from(frame_rate),
            frame_period: Duration::from_micros(1_000_000 / u64::from(frame_rate)),
        }
    }

    pub fn for_board(board: &BoardDescriptor) -> Self {
        Self::new(board.clock_hz, board.frame_rate)
    }

    pub fn steps_per_frame(&self) -> u64 {
        self.steps_per_frame
    }

    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    /// Spawns the frame loop on `runtime`. The first frame runs as soon as the
    /// task is polled.
    pub fn start(&self, runtime: &Handle, session: SharedSession) -> ScheduleHandle {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let steps = self.steps_per_frame;
        let period = self.frame_period;

        let task = runtime.spawn(async move {
            while flag.load(Ordering::SeqCst) {
                if !run_one_frame(&session, steps) {
                    break;
                }
                tokio::time::sleep(period).await;
            }
            tracing::debug!("Frame loop exited");
        });

        tracing::debug!(
            "Frame loop started: {} steps every {:?}",
            steps,
            period
        );
        ScheduleHandle {
            running,
            task: Some(task),
        }
    }
}

/// Runs one frame with the session locked. The lock never spans an await.
fn run_one_frame(session: &SharedSession, steps: u64) -> bool {
    match session.lock() {
        Ok(mut guard) => {
            guard.run_frame(steps);
            true
        }
        Err(_) => {
            tracing::error!("Session lock poisoned; stopping frame loop");
            false
        }
    }
}

/// Cancellation handle for a running frame loop.
///
/// Cancelling clears the running flag and aborts the pending sleep. A frame
/// already executing finishes first; no further frame starts.
#[derive(Debug)]
pub struct ScheduleHandle {
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ScheduleHandle {
    pub fn cancel(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
