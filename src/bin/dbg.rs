use std::{
    fs::File,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use log::LevelFilter;
use ratatui::{
    DefaultTerminal, Frame,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    debugger::{Cli, Command, CommandResult, Debugger, DebuggerState},
    emu::{
        self, Chip8, Chip8Config, DEFAULT_CYCLES_PER_SECOND, DISPLAY_X, DISPLAY_Y, Quirks,
        Scheduler, SchedulerResult,
    },
    u4,
};

const KEY_MAP: [KeyCode; 16] = [
    KeyCode::Char('x'), // 0x0
    KeyCode::Char('1'), // 0x1
    KeyCode::Char('2'), // 0x2
    KeyCode::Char('3'), // 0x3
    KeyCode::Char('q'), // 0x4
    KeyCode::Char('w'), // 0x5
    KeyCode::Char('e'), // 0x6
    KeyCode::Char('a'), // 0x7
    KeyCode::Char('s'), // 0x8
    KeyCode::Char('d'), // 0x9
    KeyCode::Char('z'), // 0xA
    KeyCode::Char('c'), // 0xB
    KeyCode::Char('4'), // 0xC
    KeyCode::Char('r'), // 0xD
    KeyCode::Char('f'), // 0xE
    KeyCode::Char('v'), // 0xF
];

// Key release events are not fired in terminals on Linux.
// To handle this, we implement a timeout after which we consider a key released.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);

/// Hex keypad as laid out on the COSMAC VIP.
const KEYPAD_LAYOUT: [[u8; 4]; 4] = [
    [0x1, 0x2, 0x3, 0xC],
    [0x4, 0x5, 0x6, 0xD],
    [0x7, 0x8, 0x9, 0xE],
    [0xA, 0x0, 0xB, 0xF],
];

/// Side panel: "0:00 1:00 2:00 3:00" plus borders.
const SIDE_PANEL_WIDTH: u16 = 19 + 2;

/// Longest wait for terminal input, keeps the UI responsive while halted.
const MAX_INPUT_WAIT: Duration = Duration::from_millis(16);

struct App {
    chip8: Chip8,
    scheduler: Scheduler,
    debugger: Debugger,

    input: String,
    output: String,
    should_quit: bool,
    last_command: Option<Command>,
    key_press_times: [Option<Instant>; 16],
}

impl App {
    fn new(rom: &[u8], config: &Chip8Config) -> anyhow::Result<Self> {
        config.validate().context("Invalid emulator configuration")?;

        let mut chip8 = Chip8::new(config);
        chip8
            .load(rom)
            .context("Failed to load ROM into CHIP-8 memory")?;

        Ok(Self {
            chip8,
            scheduler: Scheduler::new(config),
            debugger: Debugger::new(),

            input: String::new(),
            output: "Halted before the first instruction".to_string(),
            should_quit: false,
            last_command: None,
            key_press_times: [None; 16],
        })
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            let was_halted = self.debugger.is_halted();

            match self
                .scheduler
                .poll(&mut self.chip8, Some(&mut self.debugger), Instant::now())
            {
                Ok(SchedulerResult::Halted) if !was_halted => {
                    if let DebuggerState::AtBreakpoint(mnemonic) = self.debugger.state() {
                        self.output = format!("Hit breakpoint on {mnemonic}");
                    }
                }
                Ok(SchedulerResult::Quit) => self.should_quit = true,
                Ok(_) => {}
                Err(e) => {
                    log::error!("Execution stopped: {e}");
                    self.output = e.to_string();
                    self.debugger.pause();
                }
            }

            terminal.draw(|frame| self.draw(frame))?;

            self.check_key_timeout();

            let timeout = match self.scheduler.next_deadline() {
                Some(deadline) if !self.debugger.is_halted() => deadline
                    .saturating_duration_since(Instant::now())
                    .min(MAX_INPUT_WAIT),
                _ => MAX_INPUT_WAIT,
            };

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key_event(key);
                }
            }
        }

        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn check_key_timeout(&mut self) {
        let now = Instant::now();

        for (key, press_time) in u4::all().zip(self.key_press_times.iter_mut()) {
            if let Some(time) = press_time
                && now.duration_since(*time) > KEY_RELEASE_TIMEOUT
            {
                *press_time = None;
                self.chip8.set_key(key, false);
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        // Handle Ctrl+C globally
        if key.code == KeyCode::Char('c') && key.modifiers.contains(event::KeyModifiers::CONTROL) {
            self.debugger.terminate();
            self.should_quit = true;
            return;
        }

        if !self.debugger.is_halted() {
            match key.code {
                KeyCode::Esc => {
                    self.debugger.pause();
                    self.output = "Paused".to_string();
                }
                _ => {
                    if let Some(idx) = KEY_MAP.iter().position(|&k| k == key.code) {
                        self.chip8.set_key(u4::new(idx as u8), true);
                        self.key_press_times[idx] = Some(Instant::now());
                    }
                }
            }
        } else if key.kind == KeyEventKind::Press {
            match key.code {
                KeyCode::Esc => {
                    self.debugger.terminate();
                    self.should_quit = true;
                }
                KeyCode::Enter => {
                    self.handle_enter();
                }
                KeyCode::Char(c) => {
                    self.input.push(c);
                }
                KeyCode::Backspace => {
                    self.input.pop();
                }
                _ => {}
            }
        }
    }

    fn handle_enter(&mut self) {
        if self.input.trim().is_empty() {
            // Enter on an empty line repeats the previous command
            if let Some(command) = self.last_command.clone() {
                self.execute_command(command);
            }
        } else {
            match Cli::parse_line(&self.input) {
                Ok(command) => {
                    self.last_command = Some(command.clone());
                    self.execute_command(command);
                }
                Err(e) => {
                    self.output = e.to_string();
                    self.last_command = None;
                }
            }
        }

        self.input.clear();
    }

    fn execute_command(&mut self, command: Command) {
        match self.debugger.execute(command, &mut self.chip8) {
            Ok(CommandResult::Quit) => self.should_quit = true,
            Ok(result) => self.output = result.to_string(),
            Err(e) => self.output = e.to_string(),
        }
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Check if we have enough space
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDE_PANEL_WIDTH;
        const MIN_HEIGHT: u16 = DISPLAY_Y as u16 + 2 + 1 + 2 + 1 + 2;
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let center = area.centered(Constraint::Length(45), Constraint::Length(3));

            Paragraph::new(format!(
                "Terminal is too small ({}x{} min)",
                MIN_WIDTH, MIN_HEIGHT
            ))
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center)
            .block(Block::bordered())
            .render(center, buf);

            return;
        }

        let [left, right] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(SIDE_PANEL_WIDTH),
        ])
        .areas(area);

        let [display, output, input] = Layout::vertical([
            Constraint::Length(DISPLAY_Y as u16 + 2),
            Constraint::Min(1 + 2),
            Constraint::Length(1 + 2),
        ])
        .areas(left);

        let [state, keypad, machine] = Layout::vertical([
            Constraint::Length(1 + 2),
            Constraint::Length(4 + 2),
            Constraint::Min(13 + 2),
        ])
        .areas(right);

        self.render_display(display, buf);
        self.render_state(state, buf);
        self.render_keypad(keypad, buf);
        self.render_machine(machine, buf);
        self.render_output(output, buf);
        self.render_input(input, buf);
    }
}

fn tui_color(color: emu::Color) -> Color {
    let [r, g, b, _] = color.to_rgba();
    Color::Rgb(r, g, b)
}

impl App {
    fn render_display(&self, area: Rect, buf: &mut Buffer) {
        let text: Vec<Line> = self
            .chip8
            .framebuffer()
            .chunks_exact(DISPLAY_X)
            .map(|row| {
                row.iter()
                    .map(|&pixel| Span::styled("█", Style::default().fg(tui_color(pixel))))
                    .collect()
            })
            .collect();

        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Display "))
            .render(area, buf);
    }

    fn render_machine(&self, area: Rect, buf: &mut Buffer) {
        let chip8 = &self.chip8;
        let beep = if chip8.should_beep() { "*" } else { "" };

        let mut lines = vec![
            Line::from(format!("PC {:03X}  I {:03X}", chip8.pc(), chip8.index())),
            Line::from(format!(
                "DT {:02X}  ST {:02X}{beep}",
                chip8.delay_timer(),
                chip8.sound_timer()
            )),
            Line::default(),
        ];

        // Four registers to a row: "0:00 1:00 2:00 3:00"
        lines.extend(chip8.registers().chunks(4).enumerate().map(|(row, values)| {
            let cells: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(col, value)| format!("{:X}:{value:02X}", row * 4 + col))
                .collect();
            Line::from(cells.join(" "))
        }));

        lines.push(Line::default());
        if chip8.stack().is_empty() {
            lines.push(Line::from("Stack empty"));
        } else {
            lines.push(Line::from(format!("Stack ({})", chip8.stack().len())));
            lines.extend(chip8.stack().chunks(4).map(|frames| {
                let cells: Vec<String> = frames.iter().map(|addr| format!("{addr:03X}")).collect();
                Line::from(cells.join(" "))
            }));
        }

        Paragraph::new(lines)
            .block(Block::bordered().title(" Machine "))
            .render(area, buf);
    }

    fn render_output(&self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.output.as_str())
            .block(Block::bordered().title(" Output "))
            .render(area, buf);
    }

    fn render_input(&self, area: Rect, buf: &mut Buffer) {
        let title = match self.chip8.peek() {
            Some(next) if self.debugger.is_halted() => format!(" Command ({next}) "),
            _ => " Command ".to_string(),
        };

        Paragraph::new(self.input.as_str())
            .block(Block::bordered().title(title))
            .render(area, buf);
    }

    fn render_state(&self, area: Rect, buf: &mut Buffer) {
        let (text, color) = match self.debugger.state() {
            _ if !self.debugger.is_halted() && !self.debugger.is_terminated() => {
                ("RUNNING".to_string(), Color::Green)
            }
            DebuggerState::AtBreakpoint(mnemonic) => (format!("BREAK {mnemonic}"), Color::Red),
            DebuggerState::Terminated => ("QUIT".to_string(), Color::DarkGray),
            _ => ("PAUSED".to_string(), Color::Yellow),
        };

        Paragraph::new(Text::styled(text, Style::default().fg(color)))
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" State "))
            .render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<Line> = KEYPAD_LAYOUT
            .iter()
            .map(|row| row.iter().map(|&key| self.key_span(key)).collect())
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }

    fn key_span(&self, key: u8) -> Span<'static> {
        let style = if self.chip8.is_key_pressed(u4::new(key)) {
            Style::new().add_modifier(Modifier::REVERSED)
        } else {
            Style::new()
        };
        Span::styled(format!(" {key:X} "), style)
    }
}

/// TUI debugger for CHIP-8
///
/// Execution halts before the first instruction. Type `help` at the command line for the
/// debugger commands; Escape pauses a running program and quits a halted one.
#[derive(Parser)]
struct Args {
    /// Path to the ROM file to load
    rom_path: PathBuf,

    /// Instructions executed per second
    #[arg(short, long, default_value_t = DEFAULT_CYCLES_PER_SECOND, value_parser = clap::value_parser!(u32).range(1..))]
    cycles: u32,

    /// FX29 picks the glyph from the operand's high nibble instead of from Vx
    #[arg(long)]
    legacy_font_index: bool,

    /// Write logs to this file, the terminal is taken by the UI
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Increase log verbosity (can be given multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let Some(path) = args.log.as_ref() else {
        return Ok(());
    };

    let file = File::create(path).context("Failed to create log file")?;
    let filter = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, filter)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = Chip8Config {
        cycles_per_second: args.cycles,
        quirks: Quirks {
            font_index_from_operand: args.legacy_font_index,
        },
        ..Chip8Config::default()
    };

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;
    let mut app = App::new(&rom, &config).context("Failed to initialize application")?;

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(app: &App) -> Vec<String> {
        let area = Rect::new(0, 0, 100, 45);
        let mut buf = Buffer::empty(area);
        app.render(area, &mut buf);

        (0..area.height)
            .map(|y| (0..area.width).map(|x| buf[(x, y)].symbol()).collect())
            .collect()
    }

    fn shows(screen: &[String], text: &str) -> bool {
        screen.iter().any(|line| line.contains(text))
    }

    #[test]
    fn machine_panel_shows_registers_and_stack() {
        // CALL 0x204; CLS; LD VA, 0x2B
        let rom = [0x22, 0x04, 0x00, 0xE0, 0x6A, 0x2B];
        let mut app = App::new(&rom, &Chip8Config::default()).unwrap();
        app.chip8.cpu_cycle(None).unwrap();
        app.chip8.cpu_cycle(None).unwrap();

        let screen = screen(&app);
        assert!(shows(&screen, "PC 206  I 000"));
        assert!(shows(&screen, "8:00 9:00 A:2B B:00"));
        assert!(shows(&screen, "Stack (1)"));
        assert!(shows(&screen, "202"));
        assert!(shows(&screen, "PAUSED"));
    }

    #[test]
    fn empty_stack_is_labelled() {
        let app = App::new(&[0x00, 0xE0], &Chip8Config::default()).unwrap();
        assert!(shows(&screen(&app), "Stack empty"));
    }

    #[test]
    fn small_terminal_gets_a_warning() {
        let app = App::new(&[0x00, 0xE0], &Chip8Config::default()).unwrap();
        let area = Rect::new(0, 0, 60, 20);
        let mut buf = Buffer::empty(area);
        app.render(area, &mut buf);

        let text: String = (0..area.height)
            .flat_map(|y| (0..area.width).map(move |x| (x, y)))
            .map(|pos| buf[pos].symbol())
            .collect();
        assert!(text.contains("Terminal is too small"));
    }
}
