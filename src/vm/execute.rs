use crate::error::VmError;

use super::instruction::{Op, Rule};
use super::memory::Memory;
use super::operand::{B, I, J, Operands, R, S, U, sign_extend};
use super::registers::{A0, RegisterFile};
use super::{Decode, SWord, Word};

/// What the run loop should do after an instruction retires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Next,
    /// Guest asked to stop with this exit code.
    Halt(Word),
}

/// Runs one decoded instruction.
///
/// `s.dnpc` starts at `s.snpc`; control-flow instructions overwrite it.
/// `x0` is cleared again before returning.
pub fn execute(
    s: &mut Decode,
    rule: &Rule,
    ops: Operands,
    regs: &mut RegisterFile,
    mem: &mut Memory,
) -> Result<Signal, VmError> {
    s.dnpc = s.snpc;
    let signal = dispatch(s, rule.op, ops, regs, mem);
    regs.reset_zero();
    signal
}

fn bool_word(b: bool) -> Word {
    b as Word
}

fn signed(val: Word) -> SWord {
    val as SWord
}

fn div(a: Word, b: Word) -> Word {
    if b == 0 {
        return Word::MAX;
    }
    signed(a).wrapping_div(signed(b)) as Word
}

fn divu(a: Word, b: Word) -> Word {
    a.checked_div(b).unwrap_or(Word::MAX)
}

fn rem(a: Word, b: Word) -> Word {
    if b == 0 {
        return a;
    }
    signed(a).wrapping_rem(signed(b)) as Word
}

fn remu(a: Word, b: Word) -> Word {
    a.checked_rem(b).unwrap_or(a)
}

fn mulh(a: Word, b: Word) -> Word {
    ((signed(a) as i64 * signed(b) as i64) >> 32) as Word
}

fn mulhsu(a: Word, b: Word) -> Word {
    ((signed(a) as i64 * b as i64) >> 32) as Word
}

fn mulhu(a: Word, b: Word) -> Word {
    ((a as u64 * b as u64) >> 32) as Word
}

fn arith_imm(op: Op, a: Word, imm: Word) -> Option<Word> {
    let shamt = imm & 0x1f;
    Some(match op {
        Op::ADDI => a.wrapping_add(imm),
        Op::SLTI => bool_word(signed(a) < signed(imm)),
        Op::SLTIU => bool_word(a < imm),
        Op::XORI => a ^ imm,
        Op::ORI => a | imm,
        Op::ANDI => a & imm,
        Op::SLLI => a << shamt,
        Op::SRLI => a >> shamt,
        Op::SRAI => (signed(a) >> shamt) as Word,
        _ => return None,
    })
}

fn arith_reg(op: Op, a: Word, b: Word) -> Option<Word> {
    let shamt = b & 0x1f;
    Some(match op {
        Op::ADD => a.wrapping_add(b),
        Op::SUB => a.wrapping_sub(b),
        Op::SLL => a << shamt,
        Op::SLT => bool_word(signed(a) < signed(b)),
        Op::SLTU => bool_word(a < b),
        Op::XOR => a ^ b,
        Op::SRL => a >> shamt,
        Op::SRA => (signed(a) >> shamt) as Word,
        Op::OR => a | b,
        Op::AND => a & b,
        Op::MUL => a.wrapping_mul(b),
        Op::MULH => mulh(a, b),
        Op::MULHSU => mulhsu(a, b),
        Op::MULHU => mulhu(a, b),
        Op::DIV => div(a, b),
        Op::DIVU => divu(a, b),
        Op::REM => rem(a, b),
        Op::REMU => remu(a, b),
        _ => return None,
    })
}

fn taken(op: Op, a: Word, b: Word) -> Option<bool> {
    Some(match op {
        Op::BEQ => a == b,
        Op::BNE => a != b,
        Op::BLT => signed(a) < signed(b),
        Op::BGE => signed(a) >= signed(b),
        Op::BLTU => a < b,
        Op::BGEU => a >= b,
        _ => return None,
    })
}

fn dispatch(
    s: &mut Decode,
    op: Op,
    ops: Operands,
    regs: &mut RegisterFile,
    mem: &mut Memory,
) -> Result<Signal, VmError> {
    let pc = s.pc;
    let illegal = VmError::IllegalInstruction { pc, inst: s.inst };
    match ops {
        Operands::U(U { rd, imm }) => match op {
            Op::LUI => regs.set(rd as usize, imm),
            Op::AUIPC => regs.set(rd as usize, pc.wrapping_add(imm)),
            _ => return Err(illegal),
        },
        Operands::J(J { rd, imm }) => {
            if op != Op::JAL {
                return Err(illegal);
            }
            regs.set(rd as usize, s.snpc);
            s.dnpc = pc.wrapping_add(imm);
        }
        Operands::B(B {
            src1, src2, imm, ..
        }) => {
            if taken(op, src1, src2).ok_or(illegal)? {
                s.dnpc = pc.wrapping_add(imm);
            }
        }
        Operands::S(S {
            src1, src2, imm, ..
        }) => {
            let len = match op {
                Op::SB => 1,
                Op::SH => 2,
                Op::SW => 4,
                _ => return Err(illegal),
            };
            mem.write(src1.wrapping_add(imm), len, src2 as u64)
                .map_err(|e| e.at_pc(pc))?;
        }
        Operands::R(R { rd, src1, src2, .. }) => {
            let val = arith_reg(op, src1, src2).ok_or(illegal)?;
            regs.set(rd as usize, val);
        }
        Operands::I(I { rd, src1, imm, .. }) => match op {
            Op::LB | Op::LH | Op::LW | Op::LBU | Op::LHU => {
                let (len, sext) = match op {
                    Op::LB => (1, true),
                    Op::LH => (2, true),
                    Op::LBU => (1, false),
                    Op::LHU => (2, false),
                    _ => (4, false),
                };
                let raw = mem
                    .read(src1.wrapping_add(imm), len)
                    .map_err(|e| e.at_pc(pc))? as Word;
                let val = if sext {
                    sign_extend(raw, len as u32 * 8)
                } else {
                    raw
                };
                regs.set(rd as usize, val);
            }
            Op::JALR => {
                s.dnpc = src1.wrapping_add(imm) & !1;
                regs.set(rd as usize, s.snpc);
            }
            Op::CSRRW | Op::CSRRS => {
                let csr = (imm & 0xfff) as u16;
                let slot = regs
                    .csr
                    .get_mut(csr)
                    .ok_or(VmError::UnknownCsr { pc, csr })?;
                let old = *slot;
                *slot = if op == Op::CSRRW { src1 } else { old | src1 };
                regs.set(rd as usize, old);
            }
            _ => {
                let val = arith_imm(op, src1, imm).ok_or(illegal)?;
                regs.set(rd as usize, val);
            }
        },
        Operands::N => match op {
            Op::EBREAK => return Ok(Signal::Halt(regs.get(A0))),
            Op::ECALL => {
                regs.csr.mepc = pc;
                regs.csr.mcause = regs.get(regs.cause_register());
                s.dnpc = regs.csr.mtvec;
            }
            Op::MRET => s.dnpc = regs.csr.mepc,
            _ => return Err(illegal),
        },
    }
    Ok(Signal::Next)
}
