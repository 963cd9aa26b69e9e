use std::{
    io::{self, Stdout},
    time::Duration,
};

use ratatui::{
    Frame, Terminal,
    crossterm::{
        event::{
            DisableMouseCapture, EnableMouseCapture, Event, KeyCode, MouseEventKind, poll, read,
        },
        execute,
    },
    layout::{Constraint, Layout, Margin, Position},
    prelude::CrosstermBackend,
    style::{Color, Style, Stylize},
    text::Text,
    widgets::{
        Block, Cell, Row, ScrollDirection, Scrollbar, ScrollbarOrientation, ScrollbarState, Table,
        TableState,
    },
};

use crate::vm::{Machine, RunState, Word, registers::RegisterFile};

const BYTES_PER_ROW: usize = 16;
/// Instructions executed per frame while running.
const RUN_CHUNK: u64 = 64;

pub struct GUI {
    pause: bool,
    machine: Machine,
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

#[derive(Default, Debug)]
struct GUIState {
    mem_table_state: TableState,
    mem_scroll_pos: usize,
    reg_table_state: TableState,
    reg_scroll_pos: usize,
    last_mouse_pos: Position,
}

#[derive(Default, Debug)]
struct Inputs {
    exit: bool,
    step: bool,
    toggle_pause: bool,
    follow_pc: bool,
    scroll_dir: Option<ScrollDirection>,
    mouse_loc: Option<(u16, u16)>,
}

impl GUI {
    pub fn new(mut machine: Machine) -> Self {
        // stdout belongs to the terminal now
        machine.set_trace_limit(0);
        Self {
            pause: true,
            machine,
            terminal: ratatui::init(),
        }
    }

    /// Runs until the user quits and hands the machine back.
    pub fn run(mut self) -> io::Result<Machine> {
        execute!(io::stdout(), EnableMouseCapture)?;
        let mut gui_state = GUIState::default();
        loop {
            self.terminal.autoresize()?;
            let inputs = if poll(Duration::from_millis(100)).is_ok_and(|has_event| has_event) {
                match read() {
                    Ok(event) => GUI::handle_input(event),
                    Err(_) => Inputs::default(),
                }
            } else {
                Inputs::default()
            };

            if let Some((x, y)) = inputs.mouse_loc {
                gui_state.last_mouse_pos = Position::new(x, y);
            }
            if inputs.follow_pc {
                let offset = self.machine.regs.pc.wrapping_sub(self.machine.mem.left());
                gui_state.mem_scroll_pos = offset as usize / BYTES_PER_ROW;
            }

            self.terminal.draw(|frame| {
                GUI::draw(frame, self.pause, &self.machine, &mut gui_state, &inputs);
            })?;

            if inputs.exit {
                self.machine.quit();
                break;
            }

            self.pause = self.pause != inputs.toggle_pause;
            if self.machine.state().is_finished() {
                self.pause = true;
                continue;
            }
            let budget = match (inputs.step, self.pause) {
                (true, _) => 1,
                (false, false) => RUN_CHUNK,
                (false, true) => 0,
            };
            if budget > 0 && self.machine.run(budget).is_err() {
                self.pause = true;
            }
        }
        execute!(io::stdout(), DisableMouseCapture)?;
        Ok(self.machine)
    }

    fn state_label(state: &RunState) -> String {
        match state {
            RunState::Running => "running".into(),
            RunState::Stopped => "stopped".into(),
            RunState::Ended { code, pc } => {
                let verdict = if *code == 0 { "GOOD" } else { "BAD" };
                format!("HIT {verdict} TRAP (code {code}) at {pc:#010x}")
            }
            RunState::Aborted { error, .. } => format!("ABORT: {error}"),
            RunState::Quit => "quit".into(),
        }
    }

    fn draw(
        frame: &mut Frame,
        paused: bool,
        machine: &Machine,
        gui_state: &mut GUIState,
        inputs: &Inputs,
    ) {
        let columns = Layout::horizontal([
            Constraint::Fill(1),
            Constraint::Min(3 * BYTES_PER_ROW as u16 + 12 + 4),
        ]);
        let [register_area, main_area] = columns.areas(frame.area());
        let rhs_rows = Layout::vertical([Constraint::Fill(1), Constraint::Length(6)]);
        let [mem_area, control_area] = rhs_rows.areas(main_area);
        let register_area_block = Block::bordered().title(" registers ");
        let mem_area_block = Block::bordered().title(" memory ");
        let control_area_block = Block::bordered();
        frame.render_widget(&register_area_block, register_area);
        frame.render_widget(&mem_area_block, mem_area);
        frame.render_widget(&control_area_block, control_area);

        if let Some(dir) = &inputs.scroll_dir {
            let scroll_motion = if *dir == ScrollDirection::Forward { 1 } else { -1 };
            if mem_area.contains(gui_state.last_mouse_pos) {
                gui_state.mem_scroll_pos = gui_state
                    .mem_scroll_pos
                    .saturating_add_signed(scroll_motion);
            }
            if register_area.contains(gui_state.last_mouse_pos) {
                gui_state.reg_scroll_pos = gui_state
                    .reg_scroll_pos
                    .saturating_add_signed(scroll_motion);
            }
        }
        *gui_state.reg_table_state.offset_mut() = gui_state.reg_scroll_pos;

        // Memory readout
        let mem = machine.mem.bytes();
        let base = machine.mem.left();
        let pc_offset = machine.regs.pc.wrapping_sub(base) as usize;
        let visible_rows = (mem_area.height as usize).saturating_sub(3);
        let total_rows = mem.len().div_ceil(BYTES_PER_ROW);
        let max_scroll = total_rows.saturating_sub(visible_rows);
        gui_state.mem_scroll_pos = gui_state.mem_scroll_pos.min(max_scroll);
        let mem_scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
        let mem_table_even_style = Style::new();
        let mem_table_odd_style = Style::new().underlined();
        let pc_style = Style::new().fg(Color::Black).bg(Color::Yellow);

        let mem_table = Table::new(
            (0..visible_rows.min(total_rows)).map(|i| {
                let start = (gui_state.mem_scroll_pos + i) * BYTES_PER_ROW;
                let addr = base.wrapping_add(start as Word);
                let mut cols = vec![Cell::new(format!("{addr:08x}"))];
                for offset in start..(start + BYTES_PER_ROW).min(mem.len()) {
                    let cell = Cell::new(format!("{:02x}|", mem[offset]));
                    // highlight the instruction about to execute
                    cols.push(if (pc_offset..pc_offset + 4).contains(&offset) {
                        cell.style(pc_style)
                    } else {
                        cell
                    });
                }
                Row::new(cols).style(if i % 2 == 0 {
                    mem_table_even_style
                } else {
                    mem_table_odd_style
                })
            }),
            [
                vec![Constraint::Min(10)],
                vec![Constraint::Length(3); BYTES_PER_ROW],
                vec![Constraint::Length(1)],
            ]
            .concat(),
        )
        .header(
            Row::new(
                [
                    vec![Cell::new("--------")],
                    (0..BYTES_PER_ROW)
                        .map(|i| Cell::new(format!("{i:02x}")))
                        .collect::<Vec<Cell>>(),
                ]
                .concat(),
            )
            .reversed()
            .not_underlined(),
        );

        frame.render_stateful_widget(
            mem_table,
            mem_area_block.inner(mem_area),
            &mut gui_state.mem_table_state,
        );
        frame.render_stateful_widget(
            mem_scrollbar,
            mem_area.inner(Margin::new(0, 1)),
            &mut ScrollbarState::new(max_scroll).position(gui_state.mem_scroll_pos),
        );

        // pc & reg readouts
        let regs = &machine.regs;
        let [pc_area, reg_table_area] =
            Layout::vertical([Constraint::Length(2), Constraint::Fill(1)])
                .areas(register_area_block.inner(register_area));

        let reg_rows = regs.len() + 4;
        let reg_max_scroll = reg_rows.saturating_sub(reg_table_area.height as usize);
        gui_state.reg_scroll_pos = gui_state.reg_scroll_pos.min(reg_max_scroll);

        frame.render_widget(
            Text::raw(format!("pc : 0x{0:0>8X} | {0:0>10}", regs.pc)),
            pc_area,
        );

        let reg_scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);

        let csrs = [
            ("mstatus", regs.csr.mstatus),
            ("mtvec", regs.csr.mtvec),
            ("mepc", regs.csr.mepc),
            ("mcause", regs.csr.mcause),
        ];
        let reg_table = Table::new(
            (0..regs.len())
                .map(|i| {
                    Row::new([Cell::new(format!(
                        "{:<4} x{: <2}: 0x{2:0>8X} | {2:0>10}",
                        RegisterFile::name(i),
                        i,
                        regs.get(i)
                    ))])
                })
                .chain(csrs.iter().map(|(name, val)| {
                    Row::new([Cell::new(format!("{name:<8}: 0x{val:0>8X} | {val:0>10}"))])
                        .italic()
                }))
                .collect::<Vec<Row>>(),
            [Constraint::Fill(1)],
        );

        frame.render_stateful_widget(reg_table, reg_table_area, &mut gui_state.reg_table_state);
        frame.render_stateful_widget(
            reg_scrollbar,
            register_area.inner(Margin::new(0, 1)),
            &mut ScrollbarState::new(reg_max_scroll).position(gui_state.reg_scroll_pos),
        );

        let [instruction_area, status_area, help_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .areas(control_area_block.inner(control_area));

        let instruction = machine
            .peek()
            .unwrap_or_else(|| "<no valid instruction at pc>".into());
        frame.render_widget(Text::raw(instruction), instruction_area);
        frame.render_widget(
            Text::raw(format!(
                "{} {} | {} instructions",
                if paused { "||" } else { ">>" },
                GUI::state_label(machine.state()),
                machine.inst_count()
            )),
            status_area,
        );
        frame.render_widget(
            Text::raw("space: run/pause  right: step  p: show pc  q: quit").dim(),
            help_area,
        );
    }

    fn handle_input(event: Event) -> Inputs {
        match event {
            Event::Key(key_event) => match key_event.code {
                KeyCode::Char(c) => Inputs {
                    exit: c == 'q',
                    toggle_pause: c == ' ',
                    follow_pc: c == 'p',
                    ..Default::default()
                },
                KeyCode::Right => Inputs {
                    step: true,
                    ..Default::default()
                },
                KeyCode::Down => Inputs {
                    scroll_dir: Some(ScrollDirection::Forward),
                    ..Default::default()
                },
                KeyCode::Up => Inputs {
                    scroll_dir: Some(ScrollDirection::Backward),
                    ..Default::default()
                },
                _ => Inputs::default(),
            },
            Event::Mouse(mouse_event) => match mouse_event.kind {
                MouseEventKind::ScrollDown => Inputs {
                    scroll_dir: Some(ScrollDirection::Forward),
                    ..Default::default()
                },
                MouseEventKind::ScrollUp => Inputs {
                    scroll_dir: Some(ScrollDirection::Backward),
                    ..Default::default()
                },
                MouseEventKind::Moved => Inputs {
                    mouse_loc: Some((mouse_event.column, mouse_event.row)),
                    ..Default::default()
                },
                _ => Inputs::default(),
            },
            _ => Inputs::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ratatui::crossterm::event::{KeyEvent, KeyModifiers};

    use super::*;

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_key_bindings() {
        assert!(GUI::handle_input(key(KeyCode::Char('q'))).exit);
        assert!(GUI::handle_input(key(KeyCode::Char(' '))).toggle_pause);
        assert!(GUI::handle_input(key(KeyCode::Right)).step);
        assert!(GUI::handle_input(key(KeyCode::Char('p'))).follow_pc);
        assert_eq!(
            Some(ScrollDirection::Forward),
            GUI::handle_input(key(KeyCode::Down)).scroll_dir
        );
        let idle = GUI::handle_input(key(KeyCode::Esc));
        assert!(!idle.exit && !idle.step && !idle.toggle_pause);
    }

    #[test]
    fn test_state_label() {
        assert_eq!(
            "HIT GOOD TRAP (code 0) at 0x80000010",
            GUI::state_label(&RunState::Ended {
                code: 0,
                pc: 0x8000_0010
            })
        );
        assert_eq!("stopped", GUI::state_label(&RunState::Stopped));
    }
}
