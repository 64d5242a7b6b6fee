// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod controller;
pub mod cpu;
pub mod decoder;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod scheduler;
pub mod serial;
pub mod session;
pub mod signals;
pub mod snapshot;
pub mod system;

pub use avrlab_config::{BoardDescriptor, Target};
pub use cpu::CpuState;


#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Instruction decoding error at word {pc:#06x}: opcode {opcode:#06x}")]
    DecodeError { pc: u32, opcode: u16 },
    #[error("No execution engine is available for target {0}")]
    NoEngine(Target),
    #[error("Invalid board configuration: {0}")]
    Config(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// An instruction-level CPU model.
///
/// `step` fetches, decodes and executes exactly one instruction (or dispatches
/// one pending interrupt) against the given state. Memory-mapped side effects
/// happen through the hooks installed on the data bus while the step runs.
pub trait Engine: Send {
    fn step(&mut self, cpu: &mut CpuState) -> SimResult<()>;

    fn name(&self) -> &'static str {
        "engine"
    }
}

/// A peripheral that advances in lockstep with the engine, once per step.
pub trait TimerPeripheral: Send {
    fn tick(&mut self, cpu: &mut CpuState);
}
