use std::fmt::Display;

use super::registers::{RegisterFile, RegisterPointer};
use super::{SWord, WORD_BITS, Word};

/// Bits `hi..=lo` of `inst`, right-aligned.
pub fn bits(inst: u32, hi: u32, lo: u32) -> u32 {
    ((inst as u64 >> lo) & ((1u64 << (hi - lo + 1)) - 1)) as u32
}

/// Reinterprets the low `len` bits of `value` as a two's-complement number
/// and widens it to a full word.
pub fn sign_extend(value: u32, len: u32) -> Word {
    debug_assert!((1..=WORD_BITS).contains(&len));
    let shift = WORD_BITS - len;
    (((value << shift) as SWord) >> shift) as Word
}

pub fn imm_i(inst: u32) -> Word {
    sign_extend(bits(inst, 31, 20), 12)
}

pub fn imm_u(inst: u32) -> Word {
    bits(inst, 31, 12) << 12
}

pub fn imm_s(inst: u32) -> Word {
    sign_extend((bits(inst, 31, 25) << 5) | bits(inst, 11, 7), 12)
}

pub fn imm_b(inst: u32) -> Word {
    sign_extend(
        (bits(inst, 31, 31) << 12)
            | (bits(inst, 7, 7) << 11)
            | (bits(inst, 30, 25) << 5)
            | (bits(inst, 11, 8) << 1),
        13,
    )
}

pub fn imm_j(inst: u32) -> Word {
    sign_extend(
        (bits(inst, 31, 31) << 20)
            | (bits(inst, 19, 12) << 12)
            | (bits(inst, 20, 20) << 11)
            | (bits(inst, 30, 21) << 1),
        21,
    )
}

/// Instruction encoding formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    I,
    U,
    S,
    R,
    B,
    J,
    N,
}

// Instruction Formats
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct R {
    pub rd: RegisterPointer,
    pub rs1: RegisterPointer,
    pub rs2: RegisterPointer,
    pub src1: Word,
    pub src2: Word,
}

impl Display for R {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, {}", reg(self.rd), reg(self.rs1), reg(self.rs2))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct I {
    pub rd: RegisterPointer,
    pub rs1: RegisterPointer,
    pub src1: Word,
    pub imm: Word,
}

impl Display for I {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            reg(self.rd),
            reg(self.rs1),
            self.imm as SWord
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct S {
    pub rs1: RegisterPointer,
    pub rs2: RegisterPointer,
    pub src1: Word,
    pub src2: Word,
    pub imm: Word,
}

impl Display for S {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}({})",
            reg(self.rs2),
            self.imm as SWord,
            reg(self.rs1)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct U {
    pub rd: RegisterPointer,
    pub imm: Word,
}

impl Display for U {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {:#x}", reg(self.rd), self.imm >> 12)
    }
}

// Variant of S with the immediate scattered differently
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct B {
    pub rs1: RegisterPointer,
    pub rs2: RegisterPointer,
    pub src1: Word,
    pub src2: Word,
    pub imm: Word,
}

impl Display for B {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            reg(self.rs1),
            reg(self.rs2),
            self.imm as SWord
        )
    }
}

// Variant of U
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct J {
    pub rd: RegisterPointer,
    pub imm: Word,
}

impl Display for J {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", reg(self.rd), self.imm as SWord)
    }
}

fn reg(index: RegisterPointer) -> &'static str {
    RegisterFile::name(index as usize)
}

/// Decoded operands, one variant per format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operands {
    I(I),
    U(U),
    S(S),
    R(R),
    B(B),
    J(J),
    N,
}

impl Operands {
    /// Extracts register indices and immediates for `format` and reads the
    /// source registers. Returns `None` if a register field names a register
    /// this machine does not have.
    pub fn decode(inst: u32, format: Format, regs: &RegisterFile) -> Option<Self> {
        let rd = bits(inst, 11, 7) as RegisterPointer;
        let rs1 = bits(inst, 19, 15) as RegisterPointer;
        let rs2 = bits(inst, 24, 20) as RegisterPointer;
        let has = |r: RegisterPointer| regs.contains(r as usize);
        let read = |r: RegisterPointer| regs.get(r as usize);
        let ops = match format {
            Format::I => {
                if !(has(rd) && has(rs1)) {
                    return None;
                }
                Operands::I(I {
                    rd,
                    rs1,
                    src1: read(rs1),
                    imm: imm_i(inst),
                })
            }
            Format::U => {
                if !has(rd) {
                    return None;
                }
                Operands::U(U {
                    rd,
                    imm: imm_u(inst),
                })
            }
            Format::S => {
                if !(has(rs1) && has(rs2)) {
                    return None;
                }
                Operands::S(S {
                    rs1,
                    rs2,
                    src1: read(rs1),
                    src2: read(rs2),
                    imm: imm_s(inst),
                })
            }
            Format::R => {
                if !(has(rd) && has(rs1) && has(rs2)) {
                    return None;
                }
                Operands::R(R {
                    rd,
                    rs1,
                    rs2,
                    src1: read(rs1),
                    src2: read(rs2),
                })
            }
            Format::B => {
                if !(has(rs1) && has(rs2)) {
                    return None;
                }
                Operands::B(B {
                    rs1,
                    rs2,
                    src1: read(rs1),
                    src2: read(rs2),
                    imm: imm_b(inst),
                })
            }
            Format::J => {
                if !has(rd) {
                    return None;
                }
                Operands::J(J {
                    rd,
                    imm: imm_j(inst),
                })
            }
            Format::N => Operands::N,
        };
        Some(ops)
    }
}
