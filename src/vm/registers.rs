use std::fmt::Write;

use super::Word;

pub type RegisterPointer = u8;

/// ABI names, indexed by register number.
pub const ABI_NAMES: [&str; 32] = [
    "$0", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

pub const A0: usize = 10;
pub const A5: usize = 15;
pub const A7: usize = 17;

pub const CSR_MSTATUS: u16 = 0x300;
pub const CSR_MTVEC: u16 = 0x305;
pub const CSR_MEPC: u16 = 0x341;
pub const CSR_MCAUSE: u16 = 0x342;

/// Machine-mode trap state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Csrs {
    pub mstatus: Word,
    pub mtvec: Word,
    pub mepc: Word,
    pub mcause: Word,
}

impl Csrs {
    pub fn get_mut(&mut self, csr: u16) -> Option<&mut Word> {
        match csr {
            CSR_MSTATUS => Some(&mut self.mstatus),
            CSR_MTVEC => Some(&mut self.mtvec),
            CSR_MEPC => Some(&mut self.mepc),
            CSR_MCAUSE => Some(&mut self.mcause),
            _ => None,
        }
    }
}

/// General purpose registers, pc and trap CSRs.
///
/// `x0` always reads as zero. Writes to it are accepted and wiped by
/// [`RegisterFile::reset_zero`] once the instruction retires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    gpr: Vec<Word>,
    pub pc: Word,
    pub csr: Csrs,
}

impl RegisterFile {
    pub fn new(count: usize, pc: Word) -> Self {
        Self {
            gpr: vec![0; count],
            pc,
            csr: Csrs::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.gpr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gpr.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.gpr.len()
    }

    /// Panics on an index past the register count; decoding rejects those
    /// before any handler runs.
    pub fn get(&self, index: usize) -> Word {
        if index == 0 {
            return 0;
        }
        self.gpr[index]
    }

    pub fn set(&mut self, index: usize, val: Word) {
        if let Some(reg) = self.gpr.get_mut(index) {
            *reg = val;
        }
    }

    pub fn reset_zero(&mut self) {
        self.gpr[0] = 0;
    }

    /// Register used to pass the syscall number / trap cause.
    pub fn cause_register(&self) -> usize {
        if self.gpr.len() == 16 { A5 } else { A7 }
    }

    /// Resolves `pc`, `zero`, `0`, `xN` or an ABI name, with or without a
    /// leading `$`.
    pub fn lookup(&self, name: &str) -> Option<Word> {
        let name = name.strip_prefix('$').unwrap_or(name);
        if name == "pc" {
            return Some(self.pc);
        }
        self.index_of(name).map(|i| self.get(i))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        let index = match name {
            "0" | "zero" => Some(0),
            "fp" => Some(8),
            _ => match name.strip_prefix('x').map(str::parse::<usize>) {
                Some(Ok(i)) => Some(i),
                _ => ABI_NAMES.iter().position(|abi| abi.trim_start_matches('$') == name),
            },
        }?;
        self.contains(index).then_some(index)
    }

    pub fn name(index: usize) -> &'static str {
        ABI_NAMES[index]
    }

    /// One line per register plus pc and the CSRs.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, name) in ABI_NAMES.iter().take(self.len()).enumerate() {
            let val = self.get(i);
            let _ = writeln!(out, "{name:<4} x{i:<2} {val:#010x} {val}");
        }
        let _ = writeln!(out, "pc       {:#010x}", self.pc);
        let _ = writeln!(
            out,
            "mstatus {:#010x} mtvec {:#010x} mepc {:#010x} mcause {:#010x}",
            self.csr.mstatus, self.csr.mtvec, self.csr.mepc, self.csr.mcause
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_register() {
        let mut regs = RegisterFile::new(32, 0);
        regs.set(0, 7);
        assert_eq!(0, regs.get(0));
        regs.reset_zero();
        assert_eq!(0, regs.get(0));
    }

    #[test]
    fn test_lookup() {
        let mut regs = RegisterFile::new(32, 0x8000_0000);
        regs.set(10, 5);
        regs.set(2, 0x1000);
        assert_eq!(Some(5), regs.lookup("$a0"));
        assert_eq!(Some(5), regs.lookup("x10"));
        assert_eq!(Some(0x1000), regs.lookup("sp"));
        assert_eq!(Some(0), regs.lookup("$0"));
        assert_eq!(Some(0x8000_0000), regs.lookup("$pc"));
        assert_eq!(None, regs.lookup("$q1"));
    }

    #[test]
    fn test_embedded_register_count() {
        let regs = RegisterFile::new(16, 0);
        assert_eq!(None, regs.lookup("a7"));
        assert_eq!(Some(0), regs.lookup("a5"));
        assert_eq!(A5, regs.cause_register());
    }
}
