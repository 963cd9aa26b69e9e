use std::fmt::{self, Display};

use crate::error::PatternError;

use super::Word;
use super::operand::{Format, I, Operands};
use super::pattern::Pattern;
use super::registers::RegisterFile;

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    LUI,
    AUIPC,
    JAL,
    JALR,

    BEQ,
    BNE,
    BLT,
    BGE,
    BLTU,
    BGEU,

    LB,
    LH,
    LW,
    LBU,
    LHU,

    SB,
    SH,
    SW,

    ADDI,
    SLTI,
    SLTIU,
    XORI,
    ORI,
    ANDI,
    SLLI,
    SRLI,
    SRAI,

    ADD,
    SUB,
    SLL,
    SLT,
    SLTU,
    XOR,
    SRL,
    SRA,
    OR,
    AND,

    MUL,
    MULH,
    MULHSU,
    MULHU,
    DIV,
    DIVU,
    REM,
    REMU,

    CSRRW,
    CSRRS,
    ECALL,
    EBREAK,
    MRET,

    INV,
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format!("{:?}", self).to_lowercase())
    }
}

/// One entry of a decode table: bit pattern, operand format, operation.
pub type RuleDef = (&'static str, Format, Op);

/// RV32IM plus the machine-mode trap instructions.
///
/// Order matters: the first matching pattern wins, so the catch-all `INV`
/// must stay last.
pub const RV32IM: &[RuleDef] = &[
    ("??????? ????? ????? ??? ????? 01101 11", Format::U, Op::LUI),
    ("??????? ????? ????? ??? ????? 00101 11", Format::U, Op::AUIPC),
    ("??????? ????? ????? ??? ????? 11011 11", Format::J, Op::JAL),
    ("??????? ????? ????? 000 ????? 11001 11", Format::I, Op::JALR),
    ("??????? ????? ????? 000 ????? 11000 11", Format::B, Op::BEQ),
    ("??????? ????? ????? 001 ????? 11000 11", Format::B, Op::BNE),
    ("??????? ????? ????? 100 ????? 11000 11", Format::B, Op::BLT),
    ("??????? ????? ????? 101 ????? 11000 11", Format::B, Op::BGE),
    ("??????? ????? ????? 110 ????? 11000 11", Format::B, Op::BLTU),
    ("??????? ????? ????? 111 ????? 11000 11", Format::B, Op::BGEU),
    ("??????? ????? ????? 000 ????? 00000 11", Format::I, Op::LB),
    ("??????? ????? ????? 001 ????? 00000 11", Format::I, Op::LH),
    ("??????? ????? ????? 010 ????? 00000 11", Format::I, Op::LW),
    ("??????? ????? ????? 100 ????? 00000 11", Format::I, Op::LBU),
    ("??????? ????? ????? 101 ????? 00000 11", Format::I, Op::LHU),
    ("??????? ????? ????? 000 ????? 01000 11", Format::S, Op::SB),
    ("??????? ????? ????? 001 ????? 01000 11", Format::S, Op::SH),
    ("??????? ????? ????? 010 ????? 01000 11", Format::S, Op::SW),
    ("??????? ????? ????? 000 ????? 00100 11", Format::I, Op::ADDI),
    ("??????? ????? ????? 010 ????? 00100 11", Format::I, Op::SLTI),
    ("??????? ????? ????? 011 ????? 00100 11", Format::I, Op::SLTIU),
    ("??????? ????? ????? 100 ????? 00100 11", Format::I, Op::XORI),
    ("??????? ????? ????? 110 ????? 00100 11", Format::I, Op::ORI),
    ("??????? ????? ????? 111 ????? 00100 11", Format::I, Op::ANDI),
    ("0000000 ????? ????? 001 ????? 00100 11", Format::I, Op::SLLI),
    ("0000000 ????? ????? 101 ????? 00100 11", Format::I, Op::SRLI),
    ("0100000 ????? ????? 101 ????? 00100 11", Format::I, Op::SRAI),
    ("0000000 ????? ????? 000 ????? 01100 11", Format::R, Op::ADD),
    ("0100000 ????? ????? 000 ????? 01100 11", Format::R, Op::SUB),
    ("0000000 ????? ????? 001 ????? 01100 11", Format::R, Op::SLL),
    ("0000000 ????? ????? 010 ????? 01100 11", Format::R, Op::SLT),
    ("0000000 ????? ????? 011 ????? 01100 11", Format::R, Op::SLTU),
    ("0000000 ????? ????? 100 ????? 01100 11", Format::R, Op::XOR),
    ("0000000 ????? ????? 101 ????? 01100 11", Format::R, Op::SRL),
    ("0100000 ????? ????? 101 ????? 01100 11", Format::R, Op::SRA),
    ("0000000 ????? ????? 110 ????? 01100 11", Format::R, Op::OR),
    ("0000000 ????? ????? 111 ????? 01100 11", Format::R, Op::AND),
    ("0000001 ????? ????? 000 ????? 01100 11", Format::R, Op::MUL),
    ("0000001 ????? ????? 001 ????? 01100 11", Format::R, Op::MULH),
    ("0000001 ????? ????? 010 ????? 01100 11", Format::R, Op::MULHSU),
    ("0000001 ????? ????? 011 ????? 01100 11", Format::R, Op::MULHU),
    ("0000001 ????? ????? 100 ????? 01100 11", Format::R, Op::DIV),
    ("0000001 ????? ????? 101 ????? 01100 11", Format::R, Op::DIVU),
    ("0000001 ????? ????? 110 ????? 01100 11", Format::R, Op::REM),
    ("0000001 ????? ????? 111 ????? 01100 11", Format::R, Op::REMU),
    ("??????? ????? ????? 001 ????? 11100 11", Format::I, Op::CSRRW),
    ("??????? ????? ????? 010 ????? 11100 11", Format::I, Op::CSRRS),
    ("0000000 00000 00000 000 00000 11100 11", Format::N, Op::ECALL),
    ("0000000 00001 00000 000 00000 11100 11", Format::N, Op::EBREAK),
    ("0011000 00010 00000 000 00000 11100 11", Format::N, Op::MRET),
    ("??????? ????? ????? ??? ????? ????? ??", Format::N, Op::INV),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rule {
    pub pattern: Pattern,
    pub format: Format,
    pub op: Op,
}

/// Ordered, compiled decode table.
#[derive(Clone, Debug)]
pub struct Decoder {
    rules: Vec<Rule>,
}

impl Decoder {
    pub fn new() -> Result<Self, PatternError> {
        Self::from_table(RV32IM)
    }

    pub fn from_table(table: &[RuleDef]) -> Result<Self, PatternError> {
        let rules = table
            .iter()
            .map(|(pattern, format, op)| {
                Ok(Rule {
                    pattern: Pattern::compile(pattern)?,
                    format: *format,
                    op: *op,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        Ok(Self { rules })
    }

    /// First rule whose pattern accepts `inst`.
    pub fn lookup(&self, inst: u32) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.pattern.matches(inst))
    }
}

/// Human readable form of a decoded instruction at `pc`.
pub fn disassemble(pc: Word, op: Op, ops: &Operands) -> String {
    let reg = |r: u8| RegisterFile::name(r as usize);
    match (op, ops) {
        (Op::LB | Op::LH | Op::LW | Op::LBU | Op::LHU | Op::JALR, Operands::I(i)) => {
            format!("{op} {}, {}({})", reg(i.rd), i.imm as i32, reg(i.rs1))
        }
        (Op::SLLI | Op::SRLI | Op::SRAI, Operands::I(i)) => {
            format!("{op} {}, {}, {}", reg(i.rd), reg(i.rs1), i.imm & 0x1f)
        }
        (Op::CSRRW | Op::CSRRS, Operands::I(I { rd, rs1, imm, .. })) => {
            format!("{op} {}, {:#x}, {}", reg(*rd), imm & 0xfff, reg(*rs1))
        }
        (_, Operands::I(i)) => format!("{op} {i}"),
        (_, Operands::U(u)) => format!("{op} {u}"),
        (_, Operands::S(s)) => format!("{op} {s}"),
        (_, Operands::R(r)) => format!("{op} {r}"),
        (_, Operands::B(b)) => format!(
            "{op} {}, {}, {:#x}",
            reg(b.rs1),
            reg(b.rs2),
            pc.wrapping_add(b.imm)
        ),
        (_, Operands::J(j)) => format!("{op} {}, {:#x}", reg(j.rd), pc.wrapping_add(j.imm)),
        (_, Operands::N) => op.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::encode;

    fn op_of(inst: u32) -> Op {
        Decoder::new().unwrap().lookup(inst).unwrap().op
    }

    #[test]
    fn test_table_compiles() {
        let decoder = Decoder::new().unwrap();
        assert_eq!(RV32IM.len(), decoder.rules.len());
        assert_eq!(Op::INV, decoder.rules.last().unwrap().op);
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(Op::EBREAK, op_of(encode::EBREAK));
        assert_eq!(Op::ECALL, op_of(encode::ECALL));
        assert_eq!(Op::MRET, op_of(encode::MRET));
        assert_eq!(Op::SRAI, op_of(encode::i(encode::OP_IMM, 1, 0b101, 2, 0x403)));
        assert_eq!(Op::SRLI, op_of(encode::i(encode::OP_IMM, 1, 0b101, 2, 3)));
        assert_eq!(Op::SUB, op_of(encode::r(encode::OP, 0, 0b0100000, 1, 2, 3)));
        assert_eq!(Op::MULHU, op_of(encode::r(encode::OP, 0b011, 1, 1, 2, 3)));
        assert_eq!(Op::JALR, op_of(encode::jalr(1, 2, 0)));
    }

    #[test]
    fn test_catch_all_only_when_nothing_else_matches() {
        assert_eq!(Op::INV, op_of(0));
        assert_eq!(Op::INV, op_of(0xffff_ffff));
        // funct7 that no shift or M-extension rule accepts
        assert_eq!(Op::INV, op_of(encode::r(encode::OP, 0, 0b0000010, 1, 2, 3)));
        assert_eq!(Op::ADDI, op_of(encode::addi(1, 0, 1)));
    }

    #[test]
    fn test_ordering_is_respected() {
        let table: &[RuleDef] = &[
            ("??????? ????? ????? ??? ????? ????? ??", Format::N, Op::INV),
            ("0000000 00001 00000 000 00000 11100 11", Format::N, Op::EBREAK),
        ];
        let decoder = Decoder::from_table(table).unwrap();
        assert_eq!(Op::INV, decoder.lookup(encode::EBREAK).unwrap().op);
    }

    #[test]
    fn test_no_match_without_catch_all() {
        let table: &[RuleDef] = &[(
            "0000000 00001 00000 000 00000 11100 11",
            Format::N,
            Op::EBREAK,
        )];
        let decoder = Decoder::from_table(table).unwrap();
        assert!(decoder.lookup(0x13).is_none());
    }

    #[test]
    fn test_bad_table_is_reported() {
        let table: &[RuleDef] = &[("01 2", Format::N, Op::INV)];
        assert!(Decoder::from_table(table).is_err());
    }

    #[test]
    fn test_disassemble() {
        let regs = RegisterFile::new(32, 0);
        let show = |inst: u32, pc: Word| {
            let rule = *Decoder::new().unwrap().lookup(inst).unwrap();
            let ops = Operands::decode(inst, rule.format, &regs).unwrap();
            disassemble(pc, rule.op, &ops)
        };
        assert_eq!("addi a0, $0, -1", show(encode::addi(10, 0, -1), 0));
        assert_eq!("lw ra, 12(sp)", show(encode::lw(1, 2, 12), 0));
        assert_eq!("sw a0, -4(s0)", show(encode::sw(8, 10, -4), 0));
        assert_eq!("beq a0, a1, 0x80000008", show(encode::beq(10, 11, 8), 0x8000_0000));
        assert_eq!("jal ra, 0x7ffffffc", show(encode::jal(1, -4), 0x8000_0000));
        assert_eq!("lui t0, 0x12345", show(encode::lui(5, 0x12345), 0));
        assert_eq!("ebreak", show(encode::EBREAK, 0));
    }
}
