use std::time::{Duration, Instant};

use super::{Chip8, Chip8Config, Chip8Error, CycleOutcome};
use crate::debugger::Debugger;

/// Frame quantum rate. Also the rate of the delay and sound timers.
pub const FRAMES_PER_SECOND: u32 = 60;
/// Largest backlog of missed frames that is caught up; anything older is dropped.
pub const MAX_CATCH_UP_FRAMES: u32 = 10;

/// Outcome of a [`Scheduler::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerResult {
    /// No quantum boundary was crossed.
    Idle,
    /// This many frames ran to completion; the framebuffer is worth presenting.
    Ran { frames: u32 },
    /// The debugger is holding execution before an instruction.
    Halted,
    /// Quit was requested, either directly or through the debugger.
    Quit,
}

/// Paces CPU cycles and timers against wall-clock time.
///
/// Elapsed time is cut into fixed frames. Every frame ticks the timers once, may raise the
/// display interrupt and then runs a batch of `cycles_per_second / 60` instructions.
pub struct Scheduler {
    frame_step: Duration,
    cycles_per_frame: u32,
    last_tick: Option<Instant>,
    frame_accumulator: Duration,
    /// Instructions left in the current frame's batch.
    cycles_remaining: u32,
    /// The previous poll stopped at a debugger halt.
    halted: bool,
    quit: bool,
}

impl Scheduler {
    pub fn new(config: &Chip8Config) -> Self {
        Self {
            frame_step: Duration::from_secs(1) / FRAMES_PER_SECOND,
            cycles_per_frame: (config.cycles_per_second / FRAMES_PER_SECOND).max(1),
            last_tick: None,
            frame_accumulator: Duration::ZERO,
            cycles_remaining: 0,
            halted: false,
            quit: false,
        }
    }

    pub fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_frame
    }

    pub fn frame_step(&self) -> Duration {
        self.frame_step
    }

    /// Asks the scheduler to stop; seen before the next cycle.
    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    /// When the next frame is due, so callers can sleep instead of spinning.
    pub fn next_deadline(&self) -> Option<Instant> {
        let last_tick = self.last_tick?;
        if self.cycles_remaining > 0 {
            return Some(last_tick);
        }
        Some(last_tick + self.frame_step.saturating_sub(self.frame_accumulator))
    }

    /// Runs everything that has become due by `now`.
    ///
    /// Missed frames are caught up, up to [`MAX_CATCH_UP_FRAMES`]. Time spent halted in the
    /// debugger is not counted, and a batch interrupted by a halt is finished before any new
    /// frame starts.
    pub fn poll(
        &mut self,
        chip8: &mut Chip8,
        mut debugger: Option<&mut Debugger>,
        now: Instant,
    ) -> Result<SchedulerResult, Chip8Error> {
        if self.quit || debugger.as_deref().is_some_and(Debugger::is_terminated) {
            self.quit = true;
            return Ok(SchedulerResult::Quit);
        }

        let elapsed = match self.last_tick {
            Some(last_tick) if !self.halted => now.saturating_duration_since(last_tick),
            _ => Duration::ZERO,
        };
        self.last_tick = Some(now);

        if debugger.as_deref().is_some_and(Debugger::is_halted) {
            self.halted = true;
            return Ok(SchedulerResult::Halted);
        }
        self.halted = false;

        self.frame_accumulator += elapsed;
        let max_backlog = self.frame_step * MAX_CATCH_UP_FRAMES;
        if self.frame_accumulator > max_backlog {
            log::warn!(
                "Emulation fell behind, dropping {:?}",
                self.frame_accumulator - max_backlog
            );
            self.frame_accumulator = max_backlog;
        }

        if let Some(stop) = self.run_batch(chip8, debugger.as_deref_mut())? {
            return Ok(stop);
        }

        let mut frames = 0;
        while self.frame_accumulator >= self.frame_step {
            self.frame_accumulator -= self.frame_step;
            frames += 1;

            if let Some(stop) = self.run_frame(chip8, debugger.as_deref_mut())? {
                return Ok(stop);
            }
        }

        Ok(if frames == 0 {
            SchedulerResult::Idle
        } else {
            SchedulerResult::Ran { frames }
        })
    }

    /// Runs one frame regardless of the clock: timers, display interrupt, then the batch.
    ///
    /// Returns `Some` when the batch stopped early because of the debugger or a quit request.
    pub fn run_frame(
        &mut self,
        chip8: &mut Chip8,
        debugger: Option<&mut Debugger>,
    ) -> Result<Option<SchedulerResult>, Chip8Error> {
        if self.quit {
            return Ok(Some(SchedulerResult::Quit));
        }

        chip8.timers_cycle();
        chip8.raise_display_interrupt();
        self.cycles_remaining = self.cycles_per_frame;

        self.run_batch(chip8, debugger)
    }

    fn run_batch(
        &mut self,
        chip8: &mut Chip8,
        mut debugger: Option<&mut Debugger>,
    ) -> Result<Option<SchedulerResult>, Chip8Error> {
        while self.cycles_remaining > 0 {
            if self.quit {
                return Ok(Some(SchedulerResult::Quit));
            }

            match chip8.cpu_cycle(debugger.as_deref_mut())? {
                CycleOutcome::Executed => self.cycles_remaining -= 1,
                CycleOutcome::Halted => {
                    self.halted = true;
                    return Ok(Some(SchedulerResult::Halted));
                }
                CycleOutcome::Quit => {
                    self.quit = true;
                    return Ok(Some(SchedulerResult::Quit));
                }
            }
        }

        Ok(None)
    }
}
