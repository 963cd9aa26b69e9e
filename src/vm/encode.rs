//! Tiny assembler used by the tests.

pub const OP_IMM: u32 = 0b0010011;
pub const OP: u32 = 0b0110011;
pub const LOAD: u32 = 0b0000011;
pub const STORE: u32 = 0b0100011;
pub const BRANCH: u32 = 0b1100011;
pub const JALR: u32 = 0b1100111;
pub const JAL: u32 = 0b1101111;
pub const LUI: u32 = 0b0110111;
pub const AUIPC: u32 = 0b0010111;
pub const SYSTEM: u32 = 0b1110011;

pub const EBREAK: u32 = 0x0010_0073;
pub const ECALL: u32 = 0x0000_0073;
pub const MRET: u32 = 0x3020_0073;

pub fn r(opcode: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn i(opcode: u32, rd: u32, funct3: u32, rs1: u32, imm: i32) -> u32 {
    (((imm as u32) & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn s(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 5) & 0x7f) << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | ((imm & 0x1f) << 7)
        | opcode
}

pub fn b(opcode: u32, funct3: u32, rs1: u32, rs2: u32, offset: i32) -> u32 {
    let imm = offset as u32;
    (((imm >> 12) & 1) << 31)
        | (((imm >> 5) & 0x3f) << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xf) << 8)
        | (((imm >> 11) & 1) << 7)
        | opcode
}

pub fn j(opcode: u32, rd: u32, offset: i32) -> u32 {
    let imm = offset as u32;
    (((imm >> 20) & 1) << 31)
        | (((imm >> 1) & 0x3ff) << 21)
        | (((imm >> 11) & 1) << 20)
        | (((imm >> 12) & 0xff) << 12)
        | (rd << 7)
        | opcode
}

pub fn u(opcode: u32, rd: u32, imm20: u32) -> u32 {
    ((imm20 & 0xfffff) << 12) | (rd << 7) | opcode
}

pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    i(OP_IMM, rd, 0b000, rs1, imm)
}

pub fn lui(rd: u32, imm20: u32) -> u32 {
    u(LUI, rd, imm20)
}

pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r(OP, 0b000, 0, rd, rs1, rs2)
}

pub fn sw(rs1: u32, rs2: u32, imm: i32) -> u32 {
    s(STORE, 0b010, rs1, rs2, imm)
}

pub fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
    i(LOAD, rd, 0b010, rs1, imm)
}

pub fn beq(rs1: u32, rs2: u32, offset: i32) -> u32 {
    b(BRANCH, 0b000, rs1, rs2, offset)
}

pub fn bne(rs1: u32, rs2: u32, offset: i32) -> u32 {
    b(BRANCH, 0b001, rs1, rs2, offset)
}

pub fn jal(rd: u32, offset: i32) -> u32 {
    j(JAL, rd, offset)
}

pub fn jalr(rd: u32, rs1: u32, imm: i32) -> u32 {
    i(JALR, rd, 0b000, rs1, imm)
}

pub fn csrrw(rd: u32, csr: u32, rs1: u32) -> u32 {
    i(SYSTEM, rd, 0b001, rs1, csr as i32)
}

pub fn csrrs(rd: u32, csr: u32, rs1: u32) -> u32 {
    i(SYSTEM, rd, 0b010, rs1, csr as i32)
}

/// Little-endian image of `words`.
pub fn image(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
