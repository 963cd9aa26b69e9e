//! Simple debugger: a line-oriented shell over a [`Machine`].

use std::io::{self, BufRead, Write};

use crate::error::ExprError;
use crate::vm::{INST_LEN, Machine, UNBOUNDED, Word};

pub mod expr;
pub mod watchpoint;

use expr::evaluate;
use watchpoint::WatchpointPool;

/// Whether the shell keeps reading commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

type Handler = fn(&mut Debugger, Option<&str>, &mut dyn Write) -> io::Result<Flow>;

struct Command {
    name: &'static str,
    description: &'static str,
    handler: Handler,
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        description: "Display information about all supported commands",
        handler: Debugger::cmd_help,
    },
    Command {
        name: "c",
        description: "Continue the execution of the program",
        handler: Debugger::cmd_c,
    },
    Command {
        name: "q",
        description: "Exit the emulator",
        handler: Debugger::cmd_q,
    },
    Command {
        name: "si",
        description: "si [N]: execute N instructions, one by default",
        handler: Debugger::cmd_si,
    },
    Command {
        name: "info",
        description: "info r: print registers, info w: list watchpoints",
        handler: Debugger::cmd_info,
    },
    Command {
        name: "x",
        description: "x N EXPR: dump N words of memory starting at EXPR",
        handler: Debugger::cmd_x,
    },
    Command {
        name: "p",
        description: "p EXPR: evaluate EXPR",
        handler: Debugger::cmd_p,
    },
    Command {
        name: "w",
        description: "w EXPR: stop when the value of EXPR changes",
        handler: Debugger::cmd_w,
    },
    Command {
        name: "d",
        description: "d N: delete watchpoint N",
        handler: Debugger::cmd_d,
    },
];

pub struct Debugger {
    machine: Machine,
    watchpoints: WatchpointPool,
    batch: bool,
}

/// Prints `err`, with a caret under the offending spot of `text` when known.
fn report(out: &mut dyn Write, text: &str, err: &ExprError) -> io::Result<()> {
    writeln!(out, "{err}")?;
    if let Some(offset) = err.offset() {
        writeln!(out, "{text}")?;
        let column = text.get(..offset).map_or(offset, |s| s.chars().count());
        writeln!(out, "{:>width$}", "^", width = column + 1)?;
    }
    Ok(())
}

impl Debugger {
    pub fn new(machine: Machine, batch: bool) -> Self {
        Self {
            machine,
            watchpoints: WatchpointPool::new(),
            batch,
        }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn into_machine(self) -> Machine {
        self.machine
    }

    /// Reads commands until `q` or end of input. Batch mode just runs the
    /// program to completion.
    pub fn mainloop<R: BufRead>(&mut self, mut input: R, out: &mut dyn Write) -> io::Result<()> {
        if self.batch {
            return self.execute(UNBOUNDED, out);
        }
        let mut line = String::new();
        loop {
            write!(out, "(rvdb) ")?;
            out.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            if self.command(&line, out)? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Runs a single command line.
    pub fn command(&mut self, line: &str, out: &mut dyn Write) -> io::Result<Flow> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, args)) => (name, Some(args.trim()).filter(|a| !a.is_empty())),
            None => (line, None),
        };
        match COMMANDS.iter().find(|c| c.name == name) {
            Some(cmd) => (cmd.handler)(self, args, out),
            None => {
                writeln!(out, "Unknown command '{name}'")?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Runs up to `budget` instructions, pausing early on a watchpoint hit.
    fn execute(&mut self, budget: u64, out: &mut dyn Write) -> io::Result<()> {
        let Debugger {
            machine,
            watchpoints,
            ..
        } = self;
        let mut hits = Vec::new();
        let result = machine.run_until(budget, |m| {
            if watchpoints.is_empty() {
                return false;
            }
            let changed = watchpoints.check(&m.regs, &m.mem);
            let stop = !changed.is_empty();
            hits.extend(changed);
            stop
        });
        if let Err(e) = result {
            writeln!(out, "{e}")?;
        }
        for hit in hits {
            writeln!(out, "{hit}")?;
        }
        Ok(())
    }

    fn cmd_help(&mut self, args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        match args {
            None => {
                for cmd in COMMANDS {
                    writeln!(out, "{} - {}", cmd.name, cmd.description)?;
                }
            }
            Some(name) => match COMMANDS.iter().find(|c| c.name == name) {
                Some(cmd) => writeln!(out, "{} - {}", cmd.name, cmd.description)?,
                None => writeln!(out, "Unknown command '{name}'")?,
            },
        }
        Ok(Flow::Continue)
    }

    fn cmd_c(&mut self, _args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        self.execute(UNBOUNDED, out)?;
        Ok(Flow::Continue)
    }

    fn cmd_q(&mut self, _args: Option<&str>, _out: &mut dyn Write) -> io::Result<Flow> {
        self.machine.quit();
        Ok(Flow::Exit)
    }

    fn cmd_si(&mut self, args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        let steps = match args.map(str::parse::<u64>) {
            None => 1,
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                writeln!(out, "invalid step count '{}'", args.unwrap_or_default())?;
                return Ok(Flow::Continue);
            }
        };
        self.execute(steps, out)?;
        Ok(Flow::Continue)
    }

    fn cmd_info(&mut self, args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        match args {
            Some("r") => write!(out, "{}", self.machine.regs.dump())?,
            Some("w") => {
                if self.watchpoints.is_empty() {
                    writeln!(out, "No watchpoints.")?;
                } else {
                    writeln!(out, "{:<4} {:<12} What", "Num", "Value")?;
                    for wp in self.watchpoints.iter() {
                        writeln!(out, "{:<4} {:<#12x} {}", wp.no, wp.value, wp.expr)?;
                    }
                }
            }
            Some(other) => writeln!(out, "Unknown argument '{other}', expected r or w")?,
            None => writeln!(out, "info needs an argument: r or w")?,
        }
        Ok(Flow::Continue)
    }

    fn cmd_x(&mut self, args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        let Some((count, text)) = args.and_then(|a| a.split_once(char::is_whitespace)) else {
            writeln!(out, "usage: x N EXPR")?;
            return Ok(Flow::Continue);
        };
        let Ok(count) = count.parse::<usize>() else {
            writeln!(out, "invalid word count '{count}'")?;
            return Ok(Flow::Continue);
        };
        let base = match evaluate(text, &self.machine.regs, &self.machine.mem) {
            Ok(base) => base,
            Err(e) => {
                report(out, text, &e)?;
                return Ok(Flow::Continue);
            }
        };
        for i in 0..count {
            let addr = base.wrapping_add((i * INST_LEN) as Word);
            if i % 4 == 0 {
                if i > 0 {
                    writeln!(out)?;
                }
                write!(out, "{addr:#010x}:")?;
            }
            match self.machine.mem.read(addr, INST_LEN) {
                Ok(word) => write!(out, " {word:#010x}")?,
                Err(e) => {
                    writeln!(out)?;
                    writeln!(out, "{e}")?;
                    return Ok(Flow::Continue);
                }
            }
        }
        if count > 0 {
            writeln!(out)?;
        }
        Ok(Flow::Continue)
    }

    fn cmd_p(&mut self, args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        let text = args.unwrap_or_default();
        match evaluate(text, &self.machine.regs, &self.machine.mem) {
            Ok(val) => writeln!(out, "{text} = {val} ({val:#x})")?,
            Err(e) => report(out, text, &e)?,
        }
        Ok(Flow::Continue)
    }

    fn cmd_w(&mut self, args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        let text = args.unwrap_or_default();
        match self
            .watchpoints
            .add(text, &self.machine.regs, &self.machine.mem)
        {
            Ok(no) => writeln!(out, "watchpoint {no}: {text}")?,
            Err(e) => report(out, text, &e)?,
        }
        Ok(Flow::Continue)
    }

    fn cmd_d(&mut self, args: Option<&str>, out: &mut dyn Write) -> io::Result<Flow> {
        match args.map(str::parse::<usize>) {
            Some(Ok(no)) if self.watchpoints.remove(no) => {
                writeln!(out, "deleted watchpoint {no}")?
            }
            Some(Ok(no)) => writeln!(out, "no watchpoint number {no}")?,
            _ => writeln!(out, "usage: d N")?,
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::vm::RunState;
    use crate::vm::encode::{self, EBREAK};

    const BASE: Word = 0x8000_0000;

    fn debugger(batch: bool) -> Debugger {
        let mut machine = Machine::new(&MachineConfig {
            mem_base: BASE,
            mem_size: 0x1000,
            ..Default::default()
        })
        .unwrap();
        let program = [
            encode::addi(5, 0, 10),
            encode::addi(10, 0, 0),
            encode::add(10, 10, 5),
            encode::addi(5, 5, -1),
            encode::bne(5, 0, -8),
            EBREAK,
        ];
        machine.load(&encode::image(&program)).unwrap();
        Debugger::new(machine, batch)
    }

    fn run(dbg: &mut Debugger, line: &str) -> String {
        let mut out = Vec::new();
        dbg.command(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_step_and_print() {
        let mut dbg = debugger(false);
        run(&mut dbg, "si 3");
        assert_eq!("$a0 = 10 (0xa)\n", run(&mut dbg, "p $a0"));
        assert_eq!("$pc = 2147483660 (0x8000000c)\n", run(&mut dbg, "p $pc"));
        run(&mut dbg, "si");
        assert_eq!(4, dbg.machine().inst_count());
        assert_eq!("invalid step count 'x'\n", run(&mut dbg, "si x"));
    }

    #[test]
    fn test_expression_error_points_at_input() {
        let mut dbg = debugger(false);
        assert_eq!(
            "no match at position 4\n1 + @\n    ^\n",
            run(&mut dbg, "p 1 + @")
        );
        assert_eq!("division by zero\n", run(&mut dbg, "p 1 / 0"));
    }

    #[test]
    fn test_caret_counts_characters() {
        let mut dbg = debugger(false);
        // the no-break space is two bytes wide
        assert_eq!(
            "no match at position 5\n1\u{a0}+ @\n    ^\n",
            run(&mut dbg, "p 1\u{a0}+ @")
        );
    }

    #[test]
    fn test_watchpoint_stops_run() {
        let mut dbg = debugger(false);
        assert_eq!("watchpoint 0: $a0\n", run(&mut dbg, "w $a0"));
        let out = run(&mut dbg, "c");
        assert!(out.contains("old value = 0"), "{out}");
        assert!(out.contains("new value = 10"), "{out}");
        assert_eq!(&RunState::Stopped, dbg.machine().state());

        let out = run(&mut dbg, "c");
        assert!(out.contains("new value = 19"), "{out}");

        assert!(run(&mut dbg, "info w").contains("0x13"));
        assert_eq!("deleted watchpoint 0\n", run(&mut dbg, "d 0"));
        assert_eq!("no watchpoint number 0\n", run(&mut dbg, "d 0"));
        run(&mut dbg, "c");
        assert_eq!(
            &RunState::Ended {
                code: 55,
                pc: BASE + 20
            },
            dbg.machine().state()
        );
        assert_eq!(
            "program execution has ended, to restart the program exit and run again\n",
            run(&mut dbg, "c")
        );
    }

    #[test]
    fn test_examine_memory() {
        let mut dbg = debugger(false);
        let out = run(&mut dbg, "x 5 $pc");
        assert_eq!(
            format!(
                "0x80000000: {:#010x} {:#010x} {:#010x} {:#010x}\n0x80000010: {:#010x}\n",
                encode::addi(5, 0, 10),
                encode::addi(10, 0, 0),
                encode::add(10, 10, 5),
                encode::addi(5, 5, -1),
                encode::bne(5, 0, -8),
            ),
            out
        );
        assert_eq!("usage: x N EXPR\n", run(&mut dbg, "x 5"));
    }

    #[test]
    fn test_unknown_and_help() {
        let mut dbg = debugger(false);
        assert_eq!("Unknown command 'foo'\n", run(&mut dbg, "foo bar"));
        assert_eq!(
            "si - si [N]: execute N instructions, one by default\n",
            run(&mut dbg, "help si")
        );
        assert_eq!(COMMANDS.len(), run(&mut dbg, "help").lines().count());
        assert!(run(&mut dbg, "info r").contains("a0"));
    }

    #[test]
    fn test_mainloop_quits() {
        let mut dbg = debugger(false);
        let mut out = Vec::new();
        dbg.mainloop(&b"si 2\np $t0\nq\nsi\n"[..], &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("$t0 = 10"), "{out}");
        assert_eq!(&RunState::Quit, dbg.machine().state());
        assert_eq!(2, dbg.machine().inst_count());
    }

    #[test]
    fn test_batch_runs_to_completion() {
        let mut dbg = debugger(true);
        let mut out = Vec::new();
        dbg.mainloop(io::empty(), &mut out).unwrap();
        assert!(dbg.machine().state().is_finished());
        assert!(dbg.into_machine().exit_status_bad());
    }
}
