// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::{CpuState, Sreg};
use crate::decoder::avr::{decode, instruction_words, AddrMode, Instruction, Pointer};
use crate::{Engine, SimResult, SimulationError};

/// I/O space instructions address data memory at this offset.
const IO_OFFSET: u16 = 0x20;

/// Instruction-level ATmega328P core.
///
/// Cycle counts are approximate; the scheduler only relies on one step per
/// instruction.
#[derive(Debug, Default)]
pub struct AvrEngine;

impl AvrEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Services the pending interrupt if global interrupts are enabled and the
    /// raising flag is still set. Returns true if a vector was entered.
    fn dispatch_interrupt(&mut self, cpu: &mut CpuState) -> bool {
        if !cpu.flag(Sreg::I) {
            return false;
        }
        let Some(req) = cpu.take_interrupt() else {
            return false;
        };
        let flags = cpu.peek_data(req.flag_addr);
        if flags & req.flag_mask == 0 {
            // Firmware cleared the flag before we got here.
            return false;
        }
        cpu.poke_data(req.flag_addr, flags & !req.flag_mask);
        let ret = cpu.pc;
        cpu.push_pc(ret);
        cpu.set_flag(Sreg::I, false);
        cpu.set_pc(req.vector as u32 * 2);
        cpu.add_cycles(4);
        tracing::trace!("Interrupt vector {} taken from {:#06x}", req.vector, ret);
        true
    }

    fn skip_next(cpu: &mut CpuState, next_pc: u32) -> u64 {
        let words = instruction_words(cpu.program().fetch(next_pc));
        cpu.set_pc(next_pc + words);
        1 + words as u64
    }

    fn relative(cpu: &CpuState, base: u32, k: i32) -> u32 {
        let len = cpu.program().len() as i64;
        if len == 0 {
            return 0;
        }
        (base as i64 + k as i64).rem_euclid(len) as u32
    }

    fn execute(&mut self, cpu: &mut CpuState, instr: Instruction, next_pc: u32) -> u64 {
        use Instruction::*;

        match instr {
            Nop | Sleep | Break | Wdr => 1,

            Movw { d, r } => {
                let v = cpu.pair(r);
                cpu.set_pair(d, v);
                1
            }
            Mul { d, r } => {
                let res = cpu.reg(d) as u16 * cpu.reg(r) as u16;
                cpu.set_pair(0, res);
                let mut s = cpu.sreg();
                s.set(Sreg::C, res & 0x8000 != 0);
                s.set(Sreg::Z, res == 0);
                cpu.set_sreg(s);
                2
            }

            Add { d, r } => {
                let (a, b) = (cpu.reg(d), cpu.reg(r));
                let res = add(cpu, a, b, false);
                cpu.set_reg(d, res);
                1
            }
            Adc { d, r } => {
                let c = cpu.flag(Sreg::C);
                let (a, b) = (cpu.reg(d), cpu.reg(r));
                let res = add(cpu, a, b, c);
                cpu.set_reg(d, res);
                1
            }
            Sub { d, r } => {
                let (a, b) = (cpu.reg(d), cpu.reg(r));
                let res = sub(cpu, a, b, false, false);
                cpu.set_reg(d, res);
                1
            }
            Sbc { d, r } => {
                let c = cpu.flag(Sreg::C);
                let (a, b) = (cpu.reg(d), cpu.reg(r));
                let res = sub(cpu, a, b, c, true);
                cpu.set_reg(d, res);
                1
            }
            Subi { d, k } => {
                let a = cpu.reg(d);
                let res = sub(cpu, a, k, false, false);
                cpu.set_reg(d, res);
                1
            }
            Sbci { d, k } => {
                let c = cpu.flag(Sreg::C);
                let a = cpu.reg(d);
                let res = sub(cpu, a, k, c, true);
                cpu.set_reg(d, res);
                1
            }
            Cp { d, r } => {
                let (a, b) = (cpu.reg(d), cpu.reg(r));
                sub(cpu, a, b, false, false);
                1
            }
            Cpc { d, r } => {
                let c = cpu.flag(Sreg::C);
                let (a, b) = (cpu.reg(d), cpu.reg(r));
                sub(cpu, a, b, c, true);
                1
            }
            Cpi { d, k } => {
                let a = cpu.reg(d);
                sub(cpu, a, k, false, false);
                1
            }
            Cpse { d, r } => {
                if cpu.reg(d) == cpu.reg(r) {
                    return Self::skip_next(cpu, next_pc);
                }
                1
            }

            And { d, r } => {
                let res = cpu.reg(d) & cpu.reg(r);
                logic(cpu, d, res)
            }
            Andi { d, k } => {
                let res = cpu.reg(d) & k;
                logic(cpu, d, res)
            }
            Or { d, r } => {
                let res = cpu.reg(d) | cpu.reg(r);
                logic(cpu, d, res)
            }
            Ori { d, k } => {
                let res = cpu.reg(d) | k;
                logic(cpu, d, res)
            }
            Eor { d, r } => {
                let res = cpu.reg(d) ^ cpu.reg(r);
                logic(cpu, d, res)
            }
            Mov { d, r } => {
                let v = cpu.reg(r);
                cpu.set_reg(d, v);
                1
            }
            Ldi { d, k } => {
                cpu.set_reg(d, k);
                1
            }

            Com { d } => {
                let res = !cpu.reg(d);
                cpu.set_reg(d, res);
                let mut s = cpu.sreg();
                set_nzs(&mut s, res, false);
                s.insert(Sreg::C);
                cpu.set_sreg(s);
                1
            }
            Neg { d } => {
                let a = cpu.reg(d);
                let res = sub(cpu, 0, a, false, false);
                cpu.set_reg(d, res);
                1
            }
            Swap { d } => {
                let v = cpu.reg(d);
                cpu.set_reg(d, v.rotate_left(4));
                1
            }
            Inc { d } => {
                let res = cpu.reg(d).wrapping_add(1);
                cpu.set_reg(d, res);
                let mut s = cpu.sreg();
                set_nzs(&mut s, res, res == 0x80);
                cpu.set_sreg(s);
                1
            }
            Dec { d } => {
                let res = cpu.reg(d).wrapping_sub(1);
                cpu.set_reg(d, res);
                let mut s = cpu.sreg();
                set_nzs(&mut s, res, res == 0x7F);
                cpu.set_sreg(s);
                1
            }
            Asr { d } => {
                let v = cpu.reg(d);
                shift(cpu, d, v, (v >> 1) | (v & 0x80))
            }
            Lsr { d } => {
                let v = cpu.reg(d);
                shift(cpu, d, v, v >> 1)
            }
            Ror { d } => {
                let v = cpu.reg(d);
                let carry_in = if cpu.flag(Sreg::C) { 0x80 } else { 0 };
                shift(cpu, d, v, (v >> 1) | carry_in)
            }

            Adiw { d, k } => {
                let val = cpu.pair(d);
                let res = val.wrapping_add(k as u16);
                cpu.set_pair(d, res);
                let (v15, r15) = (val & 0x8000 != 0, res & 0x8000 != 0);
                word_flags(cpu, res, !v15 && r15, v15 && !r15);
                2
            }
            Sbiw { d, k } => {
                let val = cpu.pair(d);
                let res = val.wrapping_sub(k as u16);
                cpu.set_pair(d, res);
                let (v15, r15) = (val & 0x8000 != 0, res & 0x8000 != 0);
                word_flags(cpu, res, v15 && !r15, r15 && !v15);
                2
            }

            Lds { d, k } => {
                let v = cpu.read_data(k);
                cpu.set_reg(d, v);
                2
            }
            Sts { k, r } => {
                let v = cpu.reg(r);
                cpu.write_data(k, v);
                2
            }
            Ld { d, ptr, mode } => {
                let addr = pointer_address(cpu, ptr, mode);
                let v = cpu.read_data(addr);
                cpu.set_reg(d, v);
                2
            }
            St { r, ptr, mode } => {
                let v = cpu.reg(r);
                let addr = pointer_address(cpu, ptr, mode);
                cpu.write_data(addr, v);
                2
            }
            Ldd { d, ptr, q } => {
                let addr = cpu.pair(ptr.base()).wrapping_add(q as u16);
                let v = cpu.read_data(addr);
                cpu.set_reg(d, v);
                2
            }
            Std { r, ptr, q } => {
                let addr = cpu.pair(ptr.base()).wrapping_add(q as u16);
                let v = cpu.reg(r);
                cpu.write_data(addr, v);
                2
            }
            Lpm { d, post_inc } => {
                let z = cpu.z();
                let v = cpu.program().read_byte(z as u32);
                cpu.set_reg(d, v);
                if post_inc {
                    cpu.set_pair(30, z.wrapping_add(1));
                }
                3
            }
            Push { r } => {
                let v = cpu.reg(r);
                cpu.push(v);
                2
            }
            Pop { d } => {
                let v = cpu.pop();
                cpu.set_reg(d, v);
                2
            }
            In { d, a } => {
                let v = cpu.read_data(a as u16 + IO_OFFSET);
                cpu.set_reg(d, v);
                1
            }
            Out { a, r } => {
                let v = cpu.reg(r);
                cpu.write_data(a as u16 + IO_OFFSET, v);
                1
            }

            Sbi { a, b } => {
                let addr = a as u16 + IO_OFFSET;
                let v = cpu.read_data(addr);
                cpu.write_data(addr, v | (1 << b));
                2
            }
            Cbi { a, b } => {
                let addr = a as u16 + IO_OFFSET;
                let v = cpu.read_data(addr);
                cpu.write_data(addr, v & !(1 << b));
                2
            }
            Sbic { a, b } => {
                if cpu.read_data(a as u16 + IO_OFFSET) & (1 << b) == 0 {
                    return Self::skip_next(cpu, next_pc);
                }
                1
            }
            Sbis { a, b } => {
                if cpu.read_data(a as u16 + IO_OFFSET) & (1 << b) != 0 {
                    return Self::skip_next(cpu, next_pc);
                }
                1
            }
            Sbrc { r, b } => {
                if cpu.reg(r) & (1 << b) == 0 {
                    return Self::skip_next(cpu, next_pc);
                }
                1
            }
            Sbrs { r, b } => {
                if cpu.reg(r) & (1 << b) != 0 {
                    return Self::skip_next(cpu, next_pc);
                }
                1
            }

            Rjmp { k } => {
                let target = Self::relative(cpu, next_pc, k as i32);
                cpu.set_pc(target);
                2
            }
            Rcall { k } => {
                cpu.push_pc(next_pc);
                let target = Self::relative(cpu, next_pc, k as i32);
                cpu.set_pc(target);
                3
            }
            Jmp { k } => {
                cpu.set_pc(k);
                3
            }
            Call { k } => {
                cpu.push_pc(next_pc);
                cpu.set_pc(k);
                4
            }
            Ijmp => {
                let z = cpu.z() as u32;
                cpu.set_pc(z);
                2
            }
            Icall => {
                cpu.push_pc(next_pc);
                let z = cpu.z() as u32;
                cpu.set_pc(z);
                3
            }
            Ret => {
                let ret = cpu.pop_pc();
                cpu.set_pc(ret);
                4
            }
            Reti => {
                let ret = cpu.pop_pc();
                cpu.set_pc(ret);
                cpu.set_flag(Sreg::I, true);
                4
            }
            Brbs { s, k } => {
                if cpu.sreg().bits() & (1 << s) != 0 {
                    let target = Self::relative(cpu, next_pc, k as i32);
                    cpu.set_pc(target);
                    return 2;
                }
                1
            }
            Brbc { s, k } => {
                if cpu.sreg().bits() & (1 << s) == 0 {
                    let target = Self::relative(cpu, next_pc, k as i32);
                    cpu.set_pc(target);
                    return 2;
                }
                1
            }

            Bset { s } => {
                let bits = cpu.sreg().bits() | (1 << s);
                cpu.set_sreg(Sreg::from_bits_retain(bits));
                1
            }
            Bclr { s } => {
                let bits = cpu.sreg().bits() & !(1 << s);
                cpu.set_sreg(Sreg::from_bits_retain(bits));
                1
            }
            Bst { r, b } => {
                let on = cpu.reg(r) & (1 << b) != 0;
                cpu.set_flag(Sreg::T, on);
                1
            }
            Bld { d, b } => {
                let v = cpu.reg(d);
                let v = if cpu.flag(Sreg::T) {
                    v | (1 << b)
                } else {
                    v & !(1 << b)
                };
                cpu.set_reg(d, v);
                1
            }

            // Rejected in step() before dispatch.
            Unknown(_) => 1,
        }
    }
}

impl Engine for AvrEngine {
    fn step(&mut self, cpu: &mut CpuState) -> SimResult<()> {
        if self.dispatch_interrupt(cpu) {
            return Ok(());
        }

        let pc = cpu.pc;
        let op = cpu.program().fetch(pc);
        let next = cpu.program().fetch(pc + 1);
        let instr = decode(op, next);
        let next_pc = pc + instruction_words(op);

        if let Instruction::Unknown(opcode) = instr {
            cpu.set_pc(next_pc);
            cpu.add_cycles(1);
            return Err(SimulationError::DecodeError { pc, opcode });
        }

        // Sequential flow; branches overwrite this below.
        cpu.set_pc(next_pc);
        let cycles = self.execute(cpu, instr, next_pc);
        cpu.add_cycles(cycles);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "avr"
    }
}

fn set_nzs(s: &mut Sreg, res: u8, v: bool) {
    let n = res & 0x80 != 0;
    s.set(Sreg::N, n);
    s.set(Sreg::Z, res == 0);
    s.set(Sreg::V, v);
    s.set(Sreg::S, n ^ v);
}

fn add(cpu: &mut CpuState, d: u8, r: u8, carry: bool) -> u8 {
    let res = d.wrapping_add(r).wrapping_add(carry as u8);
    let carries = (d & r) | (r & !res) | (!res & d);
    let v = ((d & r & !res) | (!d & !r & res)) & 0x80 != 0;

    let mut s = cpu.sreg();
    s.set(Sreg::H, carries & 0x08 != 0);
    s.set(Sreg::C, carries & 0x80 != 0);
    set_nzs(&mut s, res, v);
    cpu.set_sreg(s);
    res
}

/// `keep_z` is the SBC/CPC rule: Z can only be cleared, never set.
fn sub(cpu: &mut CpuState, d: u8, r: u8, carry: bool, keep_z: bool) -> u8 {
    let res = d.wrapping_sub(r).wrapping_sub(carry as u8);
    let borrows = (!d & r) | (r & res) | (res & !d);
    let v = ((d & !r & !res) | (!d & r & res)) & 0x80 != 0;

    let mut s = cpu.sreg();
    let z_before = s.contains(Sreg::Z);
    s.set(Sreg::H, borrows & 0x08 != 0);
    s.set(Sreg::C, borrows & 0x80 != 0);
    set_nzs(&mut s, res, v);
    if keep_z {
        s.set(Sreg::Z, res == 0 && z_before);
    }
    cpu.set_sreg(s);
    res
}

fn logic(cpu: &mut CpuState, d: u8, res: u8) -> u64 {
    cpu.set_reg(d, res);
    let mut s = cpu.sreg();
    set_nzs(&mut s, res, false);
    cpu.set_sreg(s);
    1
}

fn shift(cpu: &mut CpuState, d: u8, before: u8, res: u8) -> u64 {
    cpu.set_reg(d, res);
    let c = before & 0x01 != 0;
    let n = res & 0x80 != 0;
    let v = n ^ c;
    let mut s = cpu.sreg();
    s.set(Sreg::C, c);
    s.set(Sreg::N, n);
    s.set(Sreg::Z, res == 0);
    s.set(Sreg::V, v);
    s.set(Sreg::S, n ^ v);
    cpu.set_sreg(s);
    1
}

fn word_flags(cpu: &mut CpuState, res: u16, v: bool, c: bool) {
    let n = res & 0x8000 != 0;
    let mut s = cpu.sreg();
    s.set(Sreg::N, n);
    s.set(Sreg::Z, res == 0);
    s.set(Sreg::V, v);
    s.set(Sreg::C, c);
    s.set(Sreg::S, n ^ v);
    cpu.set_sreg(s);
}

fn pointer_address(cpu: &mut CpuState, ptr: Pointer, mode: AddrMode) -> u16 {
    let base = ptr.base();
    let addr = cpu.pair(base);
    match mode {
        AddrMode::Plain => addr,
        AddrMode::PostInc => {
            cpu.set_pair(base, addr.wrapping_add(1));
            addr
        }
        AddrMode::PreDec => {
            let addr = addr.wrapping_sub(1);
            cpu.set_pair(base, addr);
            addr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ProgramWords;

    fn cpu_with(words: &[u16]) -> CpuState {
        CpuState::new(ProgramWords::from_words(words.to_vec()), 0x900)
    }

    fn run(cpu: &mut CpuState, steps: usize) {
        let mut engine = AvrEngine::new();
        for _ in 0..steps {
            engine.step(cpu).unwrap();
        }
    }

    #[test]
    fn test_ldi_add_flags() {
        // ldi r16,0xFF; ldi r17,0x01; add r16,r17
        let mut cpu = cpu_with(&[0xEF0F, 0xE011, 0x0F01]);
        run(&mut cpu, 3);
        assert_eq!(cpu.reg(16), 0x00);
        let s = cpu.sreg();
        assert!(s.contains(Sreg::Z));
        assert!(s.contains(Sreg::C));
        assert!(s.contains(Sreg::H));
        assert!(!s.contains(Sreg::V));
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn test_signed_overflow_on_add() {
        // ldi r16,0x7F; ldi r17,0x01; add r16,r17
        let mut cpu = cpu_with(&[0xE70F, 0xE011, 0x0F01]);
        run(&mut cpu, 3);
        assert_eq!(cpu.reg(16), 0x80);
        let s = cpu.sreg();
        assert!(s.contains(Sreg::V));
        assert!(s.contains(Sreg::N));
        assert!(!s.contains(Sreg::S));
    }

    #[test]
    fn test_cpi_and_breq() {
        // ldi r16,5; cpi r16,5; breq +1; ldi r17,1; ldi r18,2
        let mut cpu = cpu_with(&[0xE005, 0x3005, 0xF009, 0xE011, 0xE022]);
        run(&mut cpu, 4);
        assert_eq!(cpu.reg(17), 0);
        assert_eq!(cpu.reg(18), 2);
    }

    #[test]
    fn test_sbc_keeps_zero_flag_chain() {
        // 16-bit compare 0x0100 - 0x0100 via sub/sbc
        // ldi r24,0; ldi r25,1; ldi r26,0; ldi r27,1; sub r24,r26; sbc r25,r27
        let mut cpu = cpu_with(&[0xE080, 0xE091, 0xE0A0, 0xE0B1, 0x1B8A, 0x0B9B]);
        run(&mut cpu, 6);
        assert!(cpu.flag(Sreg::Z));
        assert!(!cpu.flag(Sreg::C));
    }

    #[test]
    fn test_rcall_ret_restores_pc_and_sp() {
        // rcall +1; nop; ret
        let mut cpu = cpu_with(&[0xD001, 0x0000, 0x9508]);
        let sp = cpu.sp();
        run(&mut cpu, 1);
        assert_eq!(cpu.pc, 2);
        assert_eq!(cpu.sp(), sp - 2);
        run(&mut cpu, 1);
        assert_eq!(cpu.pc, 1);
        assert_eq!(cpu.sp(), sp);
    }

    #[test]
    fn test_call_and_jmp_are_two_words() {
        // call 0x0004; nop; nop; nop; jmp 0x0000
        let mut cpu = cpu_with(&[0x940E, 0x0004, 0x0000, 0x0000, 0x940C, 0x0000]);
        run(&mut cpu, 1);
        assert_eq!(cpu.pc, 4);
        assert_eq!(cpu.pop_pc(), 2);
        run(&mut cpu, 1);
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn test_skip_over_two_word_instruction() {
        // ldi r16,0x80; sbrs r16,7; lds r17,0x0100; ldi r18,1
        let mut cpu = cpu_with(&[0xE800, 0xFF07, 0x9110, 0x0100, 0xE021, 0x0000]);
        run(&mut cpu, 3);
        assert_eq!(cpu.reg(18), 1);
        assert_eq!(cpu.pc, 5);
    }

    #[test]
    fn test_push_pop_and_st_x_post_increment() {
        // ldi r26,0x00; ldi r27,0x01; ldi r16,0xAA; st X+,r16; push r16; pop r17
        let mut cpu = cpu_with(&[0xE0A0, 0xE0B1, 0xEA0A, 0x930D, 0x930F, 0x911F]);
        run(&mut cpu, 6);
        assert_eq!(cpu.peek_data(0x100), 0xAA);
        assert_eq!(cpu.x(), 0x101);
        assert_eq!(cpu.reg(17), 0xAA);
    }

    #[test]
    fn test_adiw_sbiw() {
        // ldi r24,0xFF; ldi r25,0xFF; adiw r24,1; sbiw r24,1
        let mut cpu = cpu_with(&[0xEF8F, 0xEF9F, 0x9601, 0x9701]);
        run(&mut cpu, 3);
        assert_eq!(cpu.pair(24), 0);
        assert!(cpu.flag(Sreg::Z));
        assert!(cpu.flag(Sreg::C));
        run(&mut cpu, 1);
        assert_eq!(cpu.pair(24), 0xFFFF);
        assert!(cpu.flag(Sreg::C));
        assert!(cpu.flag(Sreg::N));
    }

    #[test]
    fn test_lpm_reads_program_bytes() {
        // ldi r30,4; ldi r31,0; lpm r0,Z+; lpm r0,Z
        // Z = 4 addresses the low byte of the word at index 2 (0x9005).
        let mut cpu = cpu_with(&[0xE0E4, 0xE0F0, 0x9005, 0x95C8, 0x0000, 0x0000]);
        run(&mut cpu, 3);
        assert_eq!(cpu.reg(0), 0x05);
        assert_eq!(cpu.z(), 5);
        run(&mut cpu, 1);
        assert_eq!(cpu.reg(0), 0x90);
    }

    #[test]
    fn test_unknown_opcode_advances_pc() {
        let mut cpu = cpu_with(&[0xFFFF, 0x0000]);
        let mut engine = AvrEngine::new();
        let err = engine.step(&mut cpu).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::DecodeError {
                pc: 0,
                opcode: 0xFFFF
            }
        ));
        assert_eq!(cpu.pc, 1);
        assert!(engine.step(&mut cpu).is_ok());
    }

    #[test]
    fn test_interrupt_dispatch_requires_global_enable() {
        use crate::cpu::InterruptRequest;
        let mut cpu = cpu_with(&[0u16; 64]);
        let mut engine = AvrEngine::new();
        cpu.poke_data(0x35, 0x01);
        cpu.raise_interrupt(InterruptRequest {
            vector: 16,
            flag_addr: 0x35,
            flag_mask: 0x01,
        });

        engine.step(&mut cpu).unwrap();
        assert_eq!(cpu.pc, 1);
        assert!(cpu.pending_interrupt().is_some());

        cpu.set_flag(Sreg::I, true);
        engine.step(&mut cpu).unwrap();
        assert_eq!(cpu.pc, 32);
        assert!(!cpu.flag(Sreg::I));
        assert_eq!(cpu.peek_data(0x35), 0x00);
        assert_eq!(cpu.pop_pc(), 1);
    }
}
