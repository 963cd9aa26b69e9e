use std::{
    fmt::Write,
    time::{Duration, Instant},
};

use crate::config::MachineConfig;
use crate::error::{PatternError, RunError, VmError};

pub mod execute;
pub mod instruction;
pub mod memory;
pub mod operand;
pub mod pattern;
pub mod registers;

#[cfg(test)]
pub(crate) mod encode;

use execute::{Signal, execute};
use instruction::{Decoder, Rule, disassemble};
use memory::Memory;
use operand::Operands;
use registers::RegisterFile;

pub type Word = u32;
pub type SWord = i32;
pub type PAddr = u32;

pub const WORD_BITS: u32 = Word::BITS;
/// Width of every instruction in bytes.
pub const INST_LEN: usize = 4;
/// Budget meaning "until something other than the budget stops us".
pub const UNBOUNDED: u64 = u64::MAX;

/// Program run when no image is given. Ends with a good trap.
pub const BUILTIN_IMAGE: [u32; 5] = [
    0x0000_0297, // auipc t0, 0
    0x0002_8823, // sb    zero, 16(t0)
    0x0102_c503, // lbu   a0, 16(t0)
    0x0010_0073, // ebreak
    0xdead_beef, // data
];

/// Per-instruction scratch record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decode {
    /// Address of this instruction.
    pub pc: Word,
    /// Address right after it.
    pub snpc: Word,
    /// Where execution actually continues.
    pub dnpc: Word,
    pub inst: u32,
    /// Instruction trace line, only filled when tracing.
    pub logbuf: String,
}

impl Decode {
    fn new(pc: Word) -> Self {
        Self {
            pc,
            snpc: pc,
            dnpc: pc,
            ..Default::default()
        }
    }

    fn fetch(&mut self, mem: &Memory) -> Result<u32, VmError> {
        let inst = mem
            .read(self.snpc, INST_LEN)
            .map_err(|e| e.at_pc(self.pc))? as u32;
        self.snpc = self.snpc.wrapping_add(INST_LEN as Word);
        Ok(inst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
    /// The guest halted itself.
    Ended { code: Word, pc: Word },
    Aborted { pc: Word, error: VmError },
    Quit,
}

impl RunState {
    /// Ended or aborted: this program cannot run any further.
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Ended { .. } | RunState::Aborted { .. })
    }
}

pub struct Machine {
    pub regs: RegisterFile,
    pub mem: Memory,
    decoder: Decoder,
    state: RunState,
    inst_count: u64,
    host_time: Duration,
    trace_limit: u64,
    print_step: bool,
}

impl Machine {
    pub fn new(config: &MachineConfig) -> Result<Self, PatternError> {
        Ok(Self {
            regs: RegisterFile::new(config.num_regs, config.entry()),
            mem: Memory::new(config.mem_base, config.mem_size),
            decoder: Decoder::new()?,
            state: RunState::Stopped,
            inst_count: 0,
            host_time: Duration::ZERO,
            trace_limit: config.trace_limit,
            print_step: false,
        })
    }

    /// Copies a raw program image to the start of physical memory.
    pub fn load(&mut self, image: &[u8]) -> Result<(), VmError> {
        let base = self.mem.left();
        self.mem.load(image, base)?;
        log::info!("loaded {} byte image at {:#010x}", image.len(), base);
        Ok(())
    }

    pub fn load_builtin(&mut self) -> Result<(), VmError> {
        let image: Vec<u8> = BUILTIN_IMAGE.iter().flat_map(|w| w.to_le_bytes()).collect();
        log::info!("no image given, using the built-in program");
        self.load(&image)
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn inst_count(&self) -> u64 {
        self.inst_count
    }

    /// Runs with a budget below `limit` echo each instruction to stdout.
    /// Zero turns the echo off.
    pub fn set_trace_limit(&mut self, limit: u64) {
        self.trace_limit = limit;
    }

    /// Nonzero exit code or an abort.
    pub fn exit_status_bad(&self) -> bool {
        match self.state {
            RunState::Ended { code, .. } => code != 0,
            RunState::Aborted { .. } => true,
            _ => false,
        }
    }

    /// Decodes the instruction at `pc` without executing it.
    pub fn peek(&self) -> Option<String> {
        let inst = self.mem.read(self.regs.pc, INST_LEN).ok()? as u32;
        let rule = self.decoder.lookup(inst)?;
        let ops = Operands::decode(inst, rule.format, &self.regs)?;
        Some(disassemble(self.regs.pc, rule.op, &ops))
    }

    fn itrace(s: &Decode, rule: &Rule, ops: &Operands) -> String {
        let mut line = format!("{:#010x}:", s.pc);
        for byte in s.inst.to_be_bytes() {
            let _ = write!(line, " {byte:02x}");
        }
        let _ = write!(line, "   {}", disassemble(s.pc, rule.op, ops));
        line
    }

    /// Fetches, decodes and executes one instruction.
    pub fn exec_once(&mut self) -> Result<(Decode, Signal), VmError> {
        let mut s = Decode::new(self.regs.pc);
        s.inst = s.fetch(&self.mem)?;
        let illegal = VmError::IllegalInstruction {
            pc: s.pc,
            inst: s.inst,
        };
        let rule = *self.decoder.lookup(s.inst).ok_or(illegal.clone())?;
        let ops = Operands::decode(s.inst, rule.format, &self.regs).ok_or(illegal)?;
        if self.print_step || log::log_enabled!(log::Level::Trace) {
            s.logbuf = Self::itrace(&s, &rule, &ops);
        }
        let signal = execute(&mut s, &rule, ops, &mut self.regs, &mut self.mem)?;
        self.regs.pc = s.dnpc;
        Ok((s, signal))
    }

    pub fn run(&mut self, budget: u64) -> Result<&RunState, RunError> {
        self.run_until(budget, |_| false)
    }

    /// Executes up to `budget` instructions. After each one `stop` is asked
    /// whether to pause early.
    pub fn run_until(
        &mut self,
        budget: u64,
        mut stop: impl FnMut(&Machine) -> bool,
    ) -> Result<&RunState, RunError> {
        match self.state {
            RunState::Ended { .. } | RunState::Aborted { .. } => return Err(RunError::Finished),
            RunState::Quit => return Err(RunError::Quit),
            _ => self.state = RunState::Running,
        }
        self.print_step = budget < self.trace_limit;

        let start = Instant::now();
        for _ in 0..budget {
            match self.exec_once() {
                Ok((s, signal)) => {
                    self.inst_count += 1;
                    if !s.logbuf.is_empty() {
                        log::trace!("{}", s.logbuf);
                        if self.print_step {
                            println!("{}", s.logbuf);
                        }
                    }
                    if let Signal::Halt(code) = signal {
                        self.state = RunState::Ended { code, pc: s.pc };
                    }
                }
                Err(error) => {
                    self.state = RunState::Aborted {
                        pc: self.regs.pc,
                        error,
                    };
                }
            }
            if self.state != RunState::Running {
                break;
            }
            if stop(self) {
                self.state = RunState::Stopped;
                break;
            }
        }
        self.host_time += start.elapsed();

        if self.state == RunState::Running {
            self.state = RunState::Stopped;
        }
        match &self.state {
            RunState::Ended { code, pc } => {
                if *code == 0 {
                    log::info!("HIT GOOD TRAP at pc = {pc:#010x}");
                } else {
                    log::warn!("HIT BAD TRAP (code {code}) at pc = {pc:#010x}");
                }
                self.statistic();
            }
            RunState::Aborted { pc, error } => {
                log::error!("ABORT at pc = {pc:#010x}: {error}");
                self.report_fatal();
            }
            RunState::Running | RunState::Stopped | RunState::Quit => {}
        }
        Ok(&self.state)
    }

    /// External stop request. Terminal for the whole emulator.
    pub fn quit(&mut self) {
        self.state = RunState::Quit;
        self.statistic();
    }

    fn report_fatal(&self) {
        log::error!("machine state:\n{}", self.regs.dump());
        self.statistic();
    }

    fn statistic(&self) {
        let micros = self.host_time.as_micros();
        log::info!("host time spent = {micros} us");
        log::info!("total guest instructions = {}", self.inst_count);
        if micros > 0 {
            log::info!(
                "simulation frequency = {} inst/s",
                self.inst_count as u128 * 1_000_000 / micros
            );
        } else {
            log::info!(
                "Finish running in less than 1 us and can not calculate the simulation frequency"
            );
        }
    }
}
