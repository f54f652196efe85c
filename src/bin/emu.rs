use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::{
        Arc,
        mpsc::{self, Receiver, TryRecvError},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use pixels::{Pixels, SurfaceTexture};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, KeyCode, NamedKey},
    window::{Window, WindowId},
};

use chip8_vm::{
    debugger::{Cli, Debugger},
    emu::{
        Chip8, Chip8Config, Color, DEFAULT_CYCLES_PER_SECOND, DISPLAY_X, DISPLAY_Y, Quirks,
        Scheduler, SchedulerResult,
    },
    u4,
};

/// Mapping from physical keyboard keys to CHIP-8 hex keypad (0x0-0xF).
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::KeyX,   // 0x00
    KeyCode::Digit1, // 0x01
    KeyCode::Digit2, // 0x02
    KeyCode::Digit3, // 0x03
    KeyCode::KeyQ,   // 0x04
    KeyCode::KeyW,   // 0x05
    KeyCode::KeyE,   // 0x06
    KeyCode::KeyA,   // 0x07
    KeyCode::KeyS,   // 0x08
    KeyCode::KeyD,   // 0x09
    KeyCode::KeyZ,   // 0x0A
    KeyCode::KeyC,   // 0x0B
    KeyCode::Digit4, // 0x0C
    KeyCode::KeyR,   // 0x0D
    KeyCode::KeyF,   // 0x0E
    KeyCode::KeyV,   // 0x0F
];

/// How often stdin is checked while the debugger holds execution.
const PROMPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Debugger prompt fed by a thread blocking on stdin.
struct Prompt {
    debugger: Debugger,
    lines: Receiver<String>,
    shown: bool,
}

impl Prompt {
    fn spawn() -> Self {
        let (sender, lines) = mpsc::channel();

        thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        Self::new(lines)
    }

    fn new(lines: Receiver<String>) -> Self {
        Self {
            debugger: Debugger::new(),
            lines,
            shown: false,
        }
    }

    /// Prints the next instruction and the prompt, once per halt.
    fn show(&mut self, chip8: &Chip8, out: &mut impl Write) -> io::Result<()> {
        if self.shown {
            return Ok(());
        }
        self.shown = true;

        match chip8.peek() {
            Some(next) => write!(out, "{:03X}: {next}\n(chip8) ", chip8.pc())?,
            None => write!(out, "(chip8) ")?,
        }
        out.flush()
    }

    /// Runs every command typed so far.
    fn handle_input(&mut self, chip8: &mut Chip8, out: &mut impl Write) -> io::Result<()> {
        loop {
            let line = match self.lines.try_recv() {
                Ok(line) => line,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    log::info!("stdin closed, quitting");
                    self.debugger.terminate();
                    return Ok(());
                }
            };

            self.shown = false;
            if line.trim().is_empty() {
                continue;
            }

            match Cli::parse_line(&line) {
                Ok(command) => match self.debugger.execute(command, chip8) {
                    Ok(result) => writeln!(out, "{result}")?,
                    Err(e) => writeln!(out, "{e}")?,
                },
                Err(e) => write!(out, "{e}")?,
            }
        }
    }
}

struct App {
    pixels: Option<Pixels<'static>>,
    window: Option<Arc<Window>>,
    scale: u32,

    chip8: Chip8,
    scheduler: Scheduler,
    prompt: Option<Prompt>,

    /// Stores the result of the application to be returned from main.
    exit_result: anyhow::Result<()>,
}

impl App {
    fn new(rom: &[u8], config: &Chip8Config, scale: u32, debug: bool) -> anyhow::Result<Self> {
        config.validate().context("Invalid emulator configuration")?;

        let mut chip8 = Chip8::new(config);
        chip8
            .load(rom)
            .context("Failed to load ROM into CHIP-8 memory")?;

        Ok(Self {
            pixels: None,
            window: None,
            scale,

            chip8,
            scheduler: Scheduler::new(config),
            prompt: debug.then(Prompt::spawn),

            exit_result: Ok(()),
        })
    }

    fn render(&mut self) -> anyhow::Result<()> {
        let Some(pixels) = self.pixels.as_mut() else {
            return Ok(());
        };

        for (pxl, color) in pixels
            .frame_mut()
            .chunks_exact_mut(4)
            .zip(self.chip8.framebuffer())
        {
            pxl.copy_from_slice(&color.to_rgba());
        }

        pixels.render().context("Pixels render error")
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = {
            let size = LogicalSize::new(DISPLAY_X as u32 * self.scale, DISPLAY_Y as u32 * self.scale);
            let min_size = LogicalSize::new(DISPLAY_X as u32, DISPLAY_Y as u32);

            Arc::new(
                event_loop
                    .create_window(
                        Window::default_attributes()
                            .with_title("chip8-vm")
                            .with_inner_size(size)
                            .with_min_inner_size(min_size),
                    )
                    .context("Failed to create window")?,
            )
        };

        self.window = Some(window.clone());
        self.pixels = {
            let window_size = window.inner_size();
            let surface_texture =
                SurfaceTexture::new(window_size.width, window_size.height, window.clone());

            let pixels = Pixels::new(DISPLAY_X as u32, DISPLAY_Y as u32, surface_texture)
                .context("Failed to create pixels surface")?;

            window.request_redraw();
            Some(pixels)
        };

        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                self.scheduler.request_quit();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut() {
                    pixels
                        .resize_surface(size.width, size.height)
                        .context("Failed to resize pixels surface")?;
                }
            }

            WindowEvent::RedrawRequested => self.render()?,

            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(key) = KEY_MAP.iter().position(|&k| k == event.physical_key) {
                    let pressed = event.state == ElementState::Pressed;
                    self.chip8.set_key(u4::new(key as u8), pressed);
                }
            }

            _ => (),
        }
        Ok(())
    }

    fn try_about_to_wait(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        if let Some(prompt) = self.prompt.as_mut() {
            if let Err(e) = prompt.handle_input(&mut self.chip8, &mut io::stdout().lock()) {
                log::warn!("Failed to write debugger output: {e}");
            }
        }

        let debugger = self.prompt.as_mut().map(|prompt| &mut prompt.debugger);
        let result = self
            .scheduler
            .poll(&mut self.chip8, debugger, Instant::now())
            .context("CHIP-8 execution error")?;

        match result {
            SchedulerResult::Ran { .. } => {
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            SchedulerResult::Halted => {
                if let Some(prompt) = self.prompt.as_mut() {
                    if let Err(e) = prompt.show(&self.chip8, &mut io::stdout().lock()) {
                        log::warn!("Failed to write debugger prompt: {e}");
                    }
                }
                // The last batch may have drawn before halting
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
                event_loop.set_control_flow(ControlFlow::wait_duration(PROMPT_POLL_INTERVAL));
                return Ok(());
            }
            SchedulerResult::Quit => {
                event_loop.exit();
                return Ok(());
            }
            SchedulerResult::Idle => (),
        }

        event_loop.set_control_flow(match self.scheduler.next_deadline() {
            Some(deadline) => ControlFlow::WaitUntil(deadline),
            None => ControlFlow::Poll,
        });
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        self.exit_result = Err(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_resumed(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_about_to_wait(event_loop) {
            self.fail(event_loop, e);
        }
    }
}

fn parse_palette(s: &str) -> Result<Color, String> {
    s.parse::<u8>()
        .ok()
        .and_then(Color::from_palette_index)
        .ok_or_else(|| {
            let names: Vec<String> = Color::PALETTE
                .iter()
                .enumerate()
                .map(|(i, (name, _))| format!("{} {name}", i + 1))
                .collect();
            format!("expected a palette index: {}", names.join(", "))
        })
}

/// CHIP-8 interpreter written in Rust.
///
/// Keys 1-4, Q-R, A-F, Z-V map to CHIP-8 keys.
/// Escape is used to exit the emulator.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Window scale factor
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    scale: u32,

    /// Foreground palette index (1 Black ... 16 White)
    #[arg(short, long, default_value = "16", value_parser = parse_palette)]
    foreground: Color,

    /// Background palette index (1 Black ... 16 White)
    #[arg(short, long, default_value = "1", value_parser = parse_palette)]
    background: Color,

    /// Instructions executed per second
    #[arg(short, long, default_value_t = DEFAULT_CYCLES_PER_SECOND, value_parser = clap::value_parser!(u32).range(1..))]
    cycles: u32,

    /// Halt before the first instruction and read debugger commands from stdin
    #[arg(short, long)]
    debug: bool,

    /// FX29 picks the glyph from the operand's high nibble instead of from Vx
    #[arg(long)]
    legacy_font_index: bool,

    /// Increase log verbosity (can be given multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> Chip8Config {
        Chip8Config {
            foreground: self.foreground,
            background: self.background,
            cycles_per_second: self.cycles,
            quirks: Quirks {
                font_index_from_operand: self.legacy_font_index,
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter(None, filter).init();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(&rom, &args.config(), args.scale, args.debug)
        .context("Failed to initialize application")?;
    event_loop
        .run_app(&mut app)
        .context("Error occurred during event loop execution")?;

    // Return the result captured during the event loop
    app.exit_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chip8_vm::{debugger::DebuggerState, emu::Mnemonic};

    fn prompt() -> (Prompt, mpsc::Sender<String>) {
        let (sender, lines) = mpsc::channel();
        (Prompt::new(lines), sender)
    }

    fn chip8() -> Chip8 {
        let mut chip8 = Chip8::with_seed(&Chip8Config::default(), 0);
        chip8.load(&[0x6A, 0x2B]).unwrap();
        chip8
    }

    #[test]
    fn shows_the_next_instruction_once_per_halt() {
        let (mut prompt, sender) = prompt();
        let mut chip8 = chip8();
        let mut out = Vec::new();

        prompt.show(&chip8, &mut out).unwrap();
        prompt.show(&chip8, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "200: LD VA, 0x2B\n(chip8) ");

        sender.send("g".to_string()).unwrap();
        let mut out = Vec::new();
        prompt.handle_input(&mut chip8, &mut out).unwrap();
        prompt.show(&chip8, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("(chip8) "));
    }

    #[test]
    fn command_results_and_errors_go_to_the_output() {
        let (mut prompt, sender) = prompt();
        let mut chip8 = chip8();
        let mut out = Vec::new();

        sender.send("b t 6XNN".to_string()).unwrap();
        sender.send("frobnicate".to_string()).unwrap();
        prompt.handle_input(&mut chip8, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Breakpoint on 6XNN set\n"));
        assert!(text.len() > "Breakpoint on 6XNN set\n".len());
        assert!(prompt.debugger.has_breakpoint(Mnemonic::SetRegImm));
    }

    #[test]
    fn closed_input_terminates_the_debugger() {
        let (mut prompt, sender) = prompt();
        drop(sender);

        prompt.handle_input(&mut chip8(), &mut Vec::<u8>::new()).unwrap();
        assert_eq!(prompt.debugger.state(), DebuggerState::Terminated);
    }

    #[test]
    fn failed_writes_are_reported() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (mut prompt, _sender) = prompt();
        assert!(prompt.show(&chip8(), &mut Closed).is_err());
    }
}
