// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod avr;

use crate::bus::{DataBus, ReadHook, WriteHook};
use crate::memory::ProgramWords;
use crate::snapshot::CpuSnapshot;

pub const REGISTER_COUNT: usize = 32;
pub const SPL: u16 = 0x5D;
pub const SPH: u16 = 0x5E;
pub const SREG: u16 = 0x5F;

bitflags::bitflags! {
    /// AVR status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sreg: u8 {
        const C = 1 << 0;
        const Z = 1 << 1;
        const N = 1 << 2;
        const V = 1 << 3;
        const S = 1 << 4;
        const H = 1 << 5;
        const T = 1 << 6;
        const I = 1 << 7;
    }
}

/// An interrupt raised by a peripheral, waiting for the engine to dispatch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptRequest {
    pub vector: u16,
    /// Status register holding the flag that raised the request.
    pub flag_addr: u16,
    pub flag_mask: u8,
}

/// Architectural state of one emulated CPU.
///
/// The register file, I/O space and SRAM all live in the data bus, so the
/// register and stack accessors below are views over `bus`. Mutation goes
/// through instruction execution (the engine) or the hook surface installed
/// by the system binder.
#[derive(Debug)]
pub struct CpuState {
    bus: DataBus,
    program: ProgramWords,
    pub pc: u32,
    pub cycles: u64,
    pending_interrupt: Option<InterruptRequest>,
}

impl CpuState {
    /// Fresh state at the reset vector with SP at the top of data memory.
    pub fn new(program: ProgramWords, data_size: usize) -> Self {
        let mut cpu = Self {
            bus: DataBus::new(data_size),
            program,
            pc: 0,
            cycles: 0,
            pending_interrupt: None,
        };
        cpu.set_sp(data_size.saturating_sub(1) as u16);
        cpu
    }

    pub fn program(&self) -> &ProgramWords {
        &self.program
    }

    pub fn data_size(&self) -> usize {
        self.bus.len()
    }

    pub fn reg(&self, r: u8) -> u8 {
        self.bus.peek(r as u16 & 0x1F)
    }

    pub fn set_reg(&mut self, r: u8, value: u8) {
        self.bus.poke(r as u16 & 0x1F, value);
    }

    /// Little-endian register pair `r+1:r`.
    pub fn pair(&self, r: u8) -> u16 {
        self.reg(r) as u16 | ((self.reg(r + 1) as u16) << 8)
    }

    pub fn set_pair(&mut self, r: u8, value: u16) {
        self.set_reg(r, value as u8);
        self.set_reg(r + 1, (value >> 8) as u8);
    }

    pub fn x(&self) -> u16 {
        self.pair(26)
    }

    pub fn y(&self) -> u16 {
        self.pair(28)
    }

    pub fn z(&self) -> u16 {
        self.pair(30)
    }

    pub fn sreg(&self) -> Sreg {
        Sreg::from_bits_retain(self.bus.peek(SREG))
    }

    pub fn set_sreg(&mut self, sreg: Sreg) {
        self.bus.poke(SREG, sreg.bits());
    }

    pub fn flag(&self, flag: Sreg) -> bool {
        self.sreg().contains(flag)
    }

    pub fn set_flag(&mut self, flag: Sreg, on: bool) {
        let mut sreg = self.sreg();
        sreg.set(flag, on);
        self.set_sreg(sreg);
    }

    pub fn sp(&self) -> u16 {
        self.bus.peek(SPL) as u16 | ((self.bus.peek(SPH) as u16) << 8)
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.bus.poke(SPL, sp as u8);
        self.bus.poke(SPH, (sp >> 8) as u8);
    }

    pub fn push(&mut self, value: u8) {
        let sp = self.sp();
        self.bus.write(sp, value);
        self.set_sp(sp.wrapping_sub(1));
    }

    pub fn pop(&mut self) -> u8 {
        let sp = self.sp().wrapping_add(1);
        self.set_sp(sp);
        self.bus.read(sp)
    }

    /// Pushes the return address low byte first, matching the hardware layout.
    pub fn push_pc(&mut self, ret: u32) {
        let sp = self.sp();
        self.bus.poke(sp, ret as u8);
        self.bus.poke(sp.wrapping_sub(1), (ret >> 8) as u8);
        self.set_sp(sp.wrapping_sub(2));
    }

    pub fn pop_pc(&mut self) -> u32 {
        let sp = self.sp().wrapping_add(2);
        self.set_sp(sp);
        ((self.bus.peek(sp.wrapping_sub(1)) as u32) << 8) | self.bus.peek(sp) as u32
    }

    /// Data-space load as seen by the CPU; read hooks fire.
    pub fn read_data(&mut self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    /// Data-space store as seen by the CPU; write hooks fire.
    pub fn write_data(&mut self, addr: u16, value: u8) {
        self.bus.write(addr, value);
    }

    /// Raw load with no hook side effects.
    pub fn peek_data(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    pub(crate) fn poke_data(&mut self, addr: u16, value: u8) {
        self.bus.poke(addr, value);
    }

    pub(crate) fn on_read(&mut self, addr: u16, hook: impl ReadHook + 'static) {
        self.bus.on_read(addr, hook);
    }

    pub(crate) fn on_write(&mut self, addr: u16, hook: impl WriteHook + 'static) {
        self.bus.on_write(addr, hook);
    }

    /// Sets the program counter, wrapping around the end of flash.
    pub fn set_pc(&mut self, pc: u32) {
        let len = self.program.len() as u32;
        self.pc = if len == 0 { 0 } else { pc % len };
    }

    pub fn add_cycles(&mut self, n: u64) {
        self.cycles += n;
    }

    /// Latches an interrupt request; a newer request replaces an older one.
    pub fn raise_interrupt(&mut self, request: InterruptRequest) {
        self.pending_interrupt = Some(request);
    }

    pub fn take_interrupt(&mut self) -> Option<InterruptRequest> {
        self.pending_interrupt.take()
    }

    pub fn pending_interrupt(&self) -> Option<InterruptRequest> {
        self.pending_interrupt
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc,
            sp: self.sp(),
            sreg: self.sreg().bits(),
            registers: (0..REGISTER_COUNT as u8).map(|r| self.reg(r)).collect(),
            cycles: self.cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu() -> CpuState {
        CpuState::new(ProgramWords::from_words(vec![0; 16]), 0x900)
    }

    #[test]
    fn test_reset_state() {
        let cpu = cpu();
        assert_eq!(cpu.pc, 0);
        assert_eq!(cpu.sp(), 0x8FF);
        assert!(cpu.sreg().is_empty());
    }

    #[test]
    fn test_register_pairs_alias_data_space() {
        let mut cpu = cpu();
        cpu.set_pair(30, 0x1234);
        assert_eq!(cpu.z(), 0x1234);
        assert_eq!(cpu.peek_data(30), 0x34);
        assert_eq!(cpu.peek_data(31), 0x12);
    }

    #[test]
    fn test_push_pop_pc_layout() {
        let mut cpu = cpu();
        cpu.push_pc(0x0123);
        assert_eq!(cpu.sp(), 0x8FD);
        assert_eq!(cpu.peek_data(0x8FF), 0x23);
        assert_eq!(cpu.peek_data(0x8FE), 0x01);
        assert_eq!(cpu.pop_pc(), 0x0123);
        assert_eq!(cpu.sp(), 0x8FF);
    }

    #[test]
    fn test_push_pop_byte() {
        let mut cpu = cpu();
        cpu.push(0xAB);
        cpu.push(0xCD);
        assert_eq!(cpu.pop(), 0xCD);
        assert_eq!(cpu.pop(), 0xAB);
    }

    #[test]
    fn test_set_pc_wraps() {
        let mut cpu = cpu();
        cpu.set_pc(17);
        assert_eq!(cpu.pc, 1);
    }

    #[test]
    fn test_flags() {
        let mut cpu = cpu();
        cpu.set_flag(Sreg::Z, true);
        cpu.set_flag(Sreg::I, true);
        assert_eq!(cpu.peek_data(SREG), 0x82);
        cpu.set_flag(Sreg::Z, false);
        assert!(!cpu.flag(Sreg::Z));
        assert!(cpu.flag(Sreg::I));
    }
}
