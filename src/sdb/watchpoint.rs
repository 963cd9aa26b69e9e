use std::fmt;

use crate::error::ExprError;
use crate::vm::Word;
use crate::vm::memory::Memory;
use crate::vm::registers::RegisterFile;

use super::expr::evaluate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Watchpoint {
    pub no: usize,
    pub expr: String,
    /// Value seen at the last check.
    pub value: Word,
}

/// A watchpoint whose expression changed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hit {
    pub no: usize,
    pub expr: String,
    pub old: Word,
    pub new: Word,
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "watchpoint {}: {}", self.no, self.expr)?;
        writeln!(f, "old value = {} ({:#x})", self.old, self.old)?;
        write!(f, "new value = {} ({:#x})", self.new, self.new)
    }
}

#[derive(Debug, Default)]
pub struct WatchpointPool {
    next_no: usize,
    active: Vec<Watchpoint>,
}

impl WatchpointPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `expr` once to seed its value. Returns the new number.
    pub fn add(
        &mut self,
        expr: &str,
        regs: &RegisterFile,
        mem: &Memory,
    ) -> Result<usize, ExprError> {
        let value = evaluate(expr, regs, mem)?;
        let no = self.next_no;
        self.next_no += 1;
        self.active.push(Watchpoint {
            no,
            expr: expr.trim().to_string(),
            value,
        });
        log::debug!("watchpoint {no} set on '{}' = {value:#x}", expr.trim());
        Ok(no)
    }

    pub fn remove(&mut self, no: usize) -> bool {
        let before = self.active.len();
        self.active.retain(|wp| wp.no != no);
        before != self.active.len()
    }

    /// Re-evaluates every watchpoint and reports the ones that changed.
    /// An expression that fails now (say, a dereference that went out of
    /// bounds) keeps its old value.
    pub fn check(&mut self, regs: &RegisterFile, mem: &Memory) -> Vec<Hit> {
        let mut hits = Vec::new();
        for wp in &mut self.active {
            let Ok(new) = evaluate(&wp.expr, regs, mem) else {
                continue;
            };
            if new != wp.value {
                hits.push(Hit {
                    no: wp.no,
                    expr: wp.expr.clone(),
                    old: wp.value,
                    new,
                });
                wp.value = new;
            }
        }
        hits
    }

    pub fn iter(&self) -> impl Iterator<Item = &Watchpoint> {
        self.active.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
