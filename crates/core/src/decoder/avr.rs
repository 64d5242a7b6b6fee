// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    X,
    Y,
    Z,
}

impl Pointer {
    /// Low register of the pointer pair.
    pub fn base(self) -> u8 {
        match self {
            Pointer::X => 26,
            Pointer::Y => 28,
            Pointer::Z => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Plain,
    PostInc,
    PreDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Movw { d: u8, r: u8 },
    Mul { d: u8, r: u8 },

    // Two-register ALU
    Add { d: u8, r: u8 },
    Adc { d: u8, r: u8 },
    Sub { d: u8, r: u8 },
    Sbc { d: u8, r: u8 },
    And { d: u8, r: u8 },
    Or { d: u8, r: u8 },
    Eor { d: u8, r: u8 },
    Mov { d: u8, r: u8 },
    Cp { d: u8, r: u8 },
    Cpc { d: u8, r: u8 },
    Cpse { d: u8, r: u8 },

    // Register-immediate, r16..r31
    Ldi { d: u8, k: u8 },
    Cpi { d: u8, k: u8 },
    Sbci { d: u8, k: u8 },
    Subi { d: u8, k: u8 },
    Ori { d: u8, k: u8 },
    Andi { d: u8, k: u8 },

    // Single-register
    Com { d: u8 },
    Neg { d: u8 },
    Swap { d: u8 },
    Inc { d: u8 },
    Dec { d: u8 },
    Asr { d: u8 },
    Lsr { d: u8 },
    Ror { d: u8 },

    // Word immediate on r24..r31
    Adiw { d: u8, k: u8 },
    Sbiw { d: u8, k: u8 },

    // Data transfer
    Lds { d: u8, k: u16 },
    Sts { k: u16, r: u8 },
    Ld { d: u8, ptr: Pointer, mode: AddrMode },
    St { r: u8, ptr: Pointer, mode: AddrMode },
    Ldd { d: u8, ptr: Pointer, q: u8 },
    Std { r: u8, ptr: Pointer, q: u8 },
    Lpm { d: u8, post_inc: bool },
    Push { r: u8 },
    Pop { d: u8 },
    In { d: u8, a: u8 },
    Out { a: u8, r: u8 },

    // Bit I/O
    Sbi { a: u8, b: u8 },
    Cbi { a: u8, b: u8 },
    Sbic { a: u8, b: u8 },
    Sbis { a: u8, b: u8 },

    // Flow control
    Rjmp { k: i16 },
    Rcall { k: i16 },
    Jmp { k: u32 },
    Call { k: u32 },
    Ijmp,
    Icall,
    Ret,
    Reti,
    Brbs { s: u8, k: i8 },
    Brbc { s: u8, k: i8 },
    Sbrc { r: u8, b: u8 },
    Sbrs { r: u8, b: u8 },

    // Status and bit transfer
    Bset { s: u8 },
    Bclr { s: u8 },
    Bld { d: u8, b: u8 },
    Bst { r: u8, b: u8 },

    Sleep,
    Break,
    Wdr,

    Unknown(u16),
}

/// Number of program words occupied by the instruction starting with `op`.
pub fn instruction_words(op: u16) -> u32 {
    let jmp_call = op & 0xFE0E;
    let lds_sts = op & 0xFE0F;
    if jmp_call == 0x940C || jmp_call == 0x940E || lds_sts == 0x9000 || lds_sts == 0x9200 {
        2
    } else {
        1
    }
}

#[inline(always)]
fn d5(op: u16) -> u8 {
    ((op >> 4) & 0x1F) as u8
}

#[inline(always)]
fn r5(op: u16) -> u8 {
    ((op & 0x0F) | ((op >> 5) & 0x10)) as u8
}

#[inline(always)]
fn d_hi(op: u16) -> u8 {
    16 + ((op >> 4) & 0x0F) as u8
}

#[inline(always)]
fn k8(op: u16) -> u8 {
    (((op >> 4) & 0xF0) | (op & 0x0F)) as u8
}

#[inline(always)]
fn io5(op: u16) -> (u8, u8) {
    (((op >> 3) & 0x1F) as u8, (op & 0x07) as u8)
}

/// Decodes one AVR instruction. `next` is the following program word, only
/// consumed by the 32-bit forms.
pub fn decode(op: u16, next: u16) -> Instruction {
    if op == 0x0000 {
        return Instruction::Nop;
    }
    if op & 0xFF00 == 0x0100 {
        return Instruction::Movw {
            d: (((op >> 4) & 0x0F) * 2) as u8,
            r: ((op & 0x0F) * 2) as u8,
        };
    }

    let (d, r) = (d5(op), r5(op));
    match op & 0xFC00 {
        0x0400 => return Instruction::Cpc { d, r },
        0x0800 => return Instruction::Sbc { d, r },
        0x0C00 => return Instruction::Add { d, r },
        0x1000 => return Instruction::Cpse { d, r },
        0x1400 => return Instruction::Cp { d, r },
        0x1800 => return Instruction::Sub { d, r },
        0x1C00 => return Instruction::Adc { d, r },
        0x2000 => return Instruction::And { d, r },
        0x2400 => return Instruction::Eor { d, r },
        0x2800 => return Instruction::Or { d, r },
        0x2C00 => return Instruction::Mov { d, r },
        0x9C00 => return Instruction::Mul { d, r },
        0xF000 => {
            return Instruction::Brbs {
                s: (op & 0x07) as u8,
                k: branch_offset(op),
            }
        }
        0xF400 => {
            return Instruction::Brbc {
                s: (op & 0x07) as u8,
                k: branch_offset(op),
            }
        }
        _ => {}
    }

    let (dh, k) = (d_hi(op), k8(op));
    match op & 0xF000 {
        0x3000 => return Instruction::Cpi { d: dh, k },
        0x4000 => return Instruction::Sbci { d: dh, k },
        0x5000 => return Instruction::Subi { d: dh, k },
        0x6000 => return Instruction::Ori { d: dh, k },
        0x7000 => return Instruction::Andi { d: dh, k },
        0xC000 => return Instruction::Rjmp { k: rel12(op) },
        0xD000 => return Instruction::Rcall { k: rel12(op) },
        0xE000 => return Instruction::Ldi { d: dh, k },
        _ => {}
    }

    // LDD/STD with displacement; q = 0 covers plain LD/ST through Y and Z.
    if op & 0xD000 == 0x8000 {
        let q = ((op & 0x07) | ((op >> 7) & 0x18) | ((op >> 8) & 0x20)) as u8;
        let ptr = if op & 0x0008 != 0 {
            Pointer::Y
        } else {
            Pointer::Z
        };
        return if op & 0x0200 != 0 {
            Instruction::Std { r: d, ptr, q }
        } else {
            Instruction::Ldd { d, ptr, q }
        };
    }

    match op & 0xFE00 {
        0x9000 => return decode_load(op, next, d),
        0x9200 => return decode_store(op, next, d),
        0x9400 => return decode_one_operand(op, next, d),
        _ => {}
    }

    match op & 0xFF00 {
        0x9600 | 0x9700 => {
            let d = 24 + (((op >> 4) & 0x03) * 2) as u8;
            let k = ((op & 0x0F) | ((op >> 2) & 0x30)) as u8;
            return if op & 0x0100 == 0 {
                Instruction::Adiw { d, k }
            } else {
                Instruction::Sbiw { d, k }
            };
        }
        0x9800 => {
            let (a, b) = io5(op);
            return Instruction::Cbi { a, b };
        }
        0x9900 => {
            let (a, b) = io5(op);
            return Instruction::Sbic { a, b };
        }
        0x9A00 => {
            let (a, b) = io5(op);
            return Instruction::Sbi { a, b };
        }
        0x9B00 => {
            let (a, b) = io5(op);
            return Instruction::Sbis { a, b };
        }
        _ => {}
    }

    let a6 = ((op & 0x0F) | ((op >> 5) & 0x30)) as u8;
    match op & 0xF800 {
        0xB000 => return Instruction::In { d, a: a6 },
        0xB800 => return Instruction::Out { a: a6, r: d },
        _ => {}
    }

    let b = (op & 0x07) as u8;
    match op & 0xFE08 {
        0xF800 => Instruction::Bld { d, b },
        0xFA00 => Instruction::Bst { r: d, b },
        0xFC00 => Instruction::Sbrc { r: d, b },
        0xFE00 => Instruction::Sbrs { r: d, b },
        _ => Instruction::Unknown(op),
    }
}

fn decode_load(op: u16, next: u16, d: u8) -> Instruction {
    use AddrMode::*;
    use Pointer::*;
    match op & 0x000F {
        0x0 => Instruction::Lds { d, k: next },
        0x1 => Instruction::Ld { d, ptr: Z, mode: PostInc },
        0x2 => Instruction::Ld { d, ptr: Z, mode: PreDec },
        0x4 => Instruction::Lpm { d, post_inc: false },
        0x5 => Instruction::Lpm { d, post_inc: true },
        0x9 => Instruction::Ld { d, ptr: Y, mode: PostInc },
        0xA => Instruction::Ld { d, ptr: Y, mode: PreDec },
        0xC => Instruction::Ld { d, ptr: X, mode: Plain },
        0xD => Instruction::Ld { d, ptr: X, mode: PostInc },
        0xE => Instruction::Ld { d, ptr: X, mode: PreDec },
        0xF => Instruction::Pop { d },
        _ => Instruction::Unknown(op),
    }
}

fn decode_store(op: u16, next: u16, r: u8) -> Instruction {
    use AddrMode::*;
    use Pointer::*;
    match op & 0x000F {
        0x0 => Instruction::Sts { k: next, r },
        0x1 => Instruction::St { r, ptr: Z, mode: PostInc },
        0x2 => Instruction::St { r, ptr: Z, mode: PreDec },
        0x9 => Instruction::St { r, ptr: Y, mode: PostInc },
        0xA => Instruction::St { r, ptr: Y, mode: PreDec },
        0xC => Instruction::St { r, ptr: X, mode: Plain },
        0xD => Instruction::St { r, ptr: X, mode: PostInc },
        0xE => Instruction::St { r, ptr: X, mode: PreDec },
        0xF => Instruction::Push { r },
        _ => Instruction::Unknown(op),
    }
}

fn decode_one_operand(op: u16, next: u16, d: u8) -> Instruction {
    match op {
        0x9409 => return Instruction::Ijmp,
        0x9509 => return Instruction::Icall,
        0x9508 => return Instruction::Ret,
        0x9518 => return Instruction::Reti,
        0x9588 => return Instruction::Sleep,
        0x9598 => return Instruction::Break,
        0x95A8 => return Instruction::Wdr,
        0x95C8 => return Instruction::Lpm { d: 0, post_inc: false },
        _ => {}
    }
    match op & 0xFF8F {
        0x9408 => {
            return Instruction::Bset {
                s: ((op >> 4) & 0x07) as u8,
            }
        }
        0x9488 => {
            return Instruction::Bclr {
                s: ((op >> 4) & 0x07) as u8,
            }
        }
        _ => {}
    }

    let long_k = || ((((op >> 3) & 0x3E) | (op & 0x01)) as u32) << 16 | next as u32;
    match op & 0x000F {
        0x0 => Instruction::Com { d },
        0x1 => Instruction::Neg { d },
        0x2 => Instruction::Swap { d },
        0x3 => Instruction::Inc { d },
        0x5 => Instruction::Asr { d },
        0x6 => Instruction::Lsr { d },
        0x7 => Instruction::Ror { d },
        0xA => Instruction::Dec { d },
        0xC | 0xD => Instruction::Jmp { k: long_k() },
        0xE | 0xF => Instruction::Call { k: long_k() },
        _ => Instruction::Unknown(op),
    }
}

fn rel12(op: u16) -> i16 {
    ((op << 4) as i16) >> 4
}

fn branch_offset(op: u16) -> i8 {
    ((((op >> 3) & 0x7F) as u8) << 1) as i8 >> 1
}
