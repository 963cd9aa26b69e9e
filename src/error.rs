use thiserror::Error;

use crate::vm::{PAddr, Word};

/// Conditions that stop guest execution for good.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("address = {addr:#010x} is out of bound of pmem [{left:#010x}, {right:#010x}] at pc = {pc:#010x}")]
    OutOfBound {
        addr: PAddr,
        left: PAddr,
        right: PAddr,
        pc: Word,
    },

    #[error("invalid opcode at pc = {pc:#010x}: {inst:#010x} ({inst:032b})")]
    IllegalInstruction { pc: Word, inst: u32 },

    #[error("unknown csr {csr:#05x} at pc = {pc:#010x}")]
    UnknownCsr { pc: Word, csr: u16 },

    #[error("unsupported access width {0}")]
    BadWidth(usize),
}

impl VmError {
    /// Stamps the faulting guest pc onto an out-of-bound report.
    pub fn at_pc(self, at: Word) -> Self {
        match self {
            VmError::OutOfBound {
                addr, left, right, ..
            } => VmError::OutOfBound {
                addr,
                left,
                right,
                pc: at,
            },
            other => other,
        }
    }
}

/// Problems compiling a bit-pattern rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("invalid character '{found}' in pattern string \"{pattern}\"")]
    InvalidChar { pattern: String, found: char },

    #[error("pattern too long: \"{pattern}\" has {bits} bits")]
    TooLong { pattern: String, bits: u32 },
}

/// Recoverable debugger expression failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("no match at position {offset}")]
    Lex { offset: usize },

    #[error("bad expression at position {offset}")]
    Syntax { offset: usize },

    #[error("number too large at position {offset}")]
    Overflow { offset: usize },

    #[error("empty expression")]
    Empty,

    #[error("unknown register {0}")]
    UnknownRegister(String),

    #[error("division by zero")]
    DivideByZero,

    #[error("cannot read memory: {0}")]
    Memory(#[from] VmError),
}

impl ExprError {
    /// Position in the input worth pointing at, if there is one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            ExprError::Lex { offset }
            | ExprError::Syntax { offset }
            | ExprError::Overflow { offset } => Some(*offset),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unsupported register count {0}, expected 16 or 32")]
    RegisterCount(usize),

    #[error("memory size must be non-zero")]
    EmptyMemory,

    #[error("memory at {base:#010x} with {size:#x} bytes runs past the 32-bit address space")]
    AddressSpace { base: PAddr, size: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("program execution has ended, to restart the program exit and run again")]
    Finished,

    #[error("emulator has quit")]
    Quit,
}
