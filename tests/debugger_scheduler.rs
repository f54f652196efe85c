use std::time::Instant;

use chip8_vm::debugger::{Cli, CommandResult, Debugger, DebuggerState};
use chip8_vm::emu::{Chip8, Chip8Config, Mnemonic, Scheduler, SchedulerResult};

fn config() -> Chip8Config {
    Chip8Config {
        cycles_per_second: 600,
        ..Chip8Config::default()
    }
}

fn machine(rom: &[u8]) -> Chip8 {
    let mut chip8 = Chip8::with_seed(&config(), 7);
    chip8.load(rom).unwrap();
    chip8
}

/// Feeds one prompt line to the debugger.
fn command(debugger: &mut Debugger, chip8: &mut Chip8, line: &str) -> CommandResult {
    let command = Cli::parse_line(line).unwrap();
    debugger.execute(command, chip8).unwrap()
}

#[test]
fn breakpoint_halts_before_the_instruction_runs() {
    // CLS; ADD V0, 1; LD VA, 0x2B; JP 0x206
    let mut chip8 = machine(&[0x00, 0xE0, 0x70, 0x01, 0x6A, 0x2B, 0x12, 0x06]);
    let mut scheduler = Scheduler::new(&config());
    let mut debugger = Debugger::new();

    command(&mut debugger, &mut chip8, "breakpoint set 6XNN");
    command(&mut debugger, &mut chip8, "continue");

    let result = scheduler.run_frame(&mut chip8, Some(&mut debugger)).unwrap();

    assert_eq!(result, Some(SchedulerResult::Halted));
    assert_eq!(
        debugger.state(),
        DebuggerState::AtBreakpoint(Mnemonic::SetRegImm)
    );
    assert_eq!(chip8.pc(), 0x204);
    assert_eq!(chip8.registers()[0x0], 1);
    assert_eq!(chip8.registers()[0xA], 0);

    // Stepping runs the held instruction and halts in front of the jump
    command(&mut debugger, &mut chip8, "step");
    let result = scheduler.run_frame(&mut chip8, Some(&mut debugger)).unwrap();

    assert_eq!(result, Some(SchedulerResult::Halted));
    assert_eq!(debugger.state(), DebuggerState::Stepping);
    assert_eq!(chip8.registers()[0xA], 0x2B);
    assert_eq!(chip8.pc(), 0x206);
}

#[test]
fn breakpoint_on_a_waiting_draw_halts_once_per_visit() {
    // LD I, 0x50; DRW V0, V0, 5; JP 0x202
    let mut chip8 = machine(&[0xA0, 0x50, 0xD0, 0x05, 0x12, 0x02]);
    let mut scheduler = Scheduler::new(&config());
    let mut debugger = Debugger::new();

    command(&mut debugger, &mut chip8, "b s DXYN");
    command(&mut debugger, &mut chip8, "c");
    let result = scheduler.run_frame(&mut chip8, Some(&mut debugger)).unwrap();
    assert_eq!(result, Some(SchedulerResult::Halted));
    assert_eq!(chip8.pc(), 0x202);

    // The draw keeps retrying for the display interrupt without stopping again
    command(&mut debugger, &mut chip8, "c");
    let result = scheduler.run_frame(&mut chip8, Some(&mut debugger)).unwrap();
    assert_eq!(result, None);
    assert_eq!(debugger.state(), DebuggerState::Running);
    assert_eq!(chip8.pc(), 0x202);
    assert!(!chip8.is_pixel_lit(0, 0));

    // Once it draws, the jump back brings it to the breakpoint again
    let result = scheduler.run_frame(&mut chip8, Some(&mut debugger)).unwrap();
    assert_eq!(result, Some(SchedulerResult::Halted));
    assert_eq!(debugger.state(), DebuggerState::AtBreakpoint(Mnemonic::Draw));
    assert_eq!(chip8.pc(), 0x202);
    assert!(chip8.is_pixel_lit(0, 0));
}

#[test]
fn stepping_stops_at_instructions_without_a_mnemonic() {
    // LD V0, 1; 5121 (undefined); LD V1, 2
    let mut chip8 = machine(&[0x60, 0x01, 0x51, 0x21, 0x61, 0x02]);
    let mut scheduler = Scheduler::new(&config());
    let mut debugger = Debugger::new();

    command(&mut debugger, &mut chip8, "s");
    let result = scheduler.run_frame(&mut chip8, Some(&mut debugger)).unwrap();
    assert_eq!(result, Some(SchedulerResult::Halted));
    assert_eq!(chip8.pc(), 0x202);

    command(&mut debugger, &mut chip8, "s");
    let result = scheduler.run_frame(&mut chip8, Some(&mut debugger)).unwrap();
    assert_eq!(result, Some(SchedulerResult::Halted));
    assert_eq!(chip8.pc(), 0x204);
    assert_eq!(chip8.registers()[1], 0);
}

#[test]
fn breakpoints_can_be_named_by_table_number() {
    let mut chip8 = machine(&[0x6A, 0x2B]);
    let mut debugger = Debugger::new();

    command(&mut debugger, &mut chip8, "b t 8");
    let listed = command(&mut debugger, &mut chip8, "b l");

    assert!(matches!(listed, CommandResult::Breakpoints(ref list) if list == &[Mnemonic::SetRegImm]));
}

#[test]
fn stepping_executes_one_instruction_and_halted_time_is_not_counted() {
    // ADD V0, 1; JP 0x200
    let mut chip8 = machine(&[0x70, 0x01, 0x12, 0x00]);
    let mut scheduler = Scheduler::new(&config());
    let mut debugger = Debugger::new();
    let frame = scheduler.frame_step();
    let start = Instant::now();

    assert_eq!(
        scheduler.poll(&mut chip8, Some(&mut debugger), start).unwrap(),
        SchedulerResult::Halted
    );

    // A long pause at the prompt must not turn into a burst of catch-up frames
    let later = start + frame * 60;
    debugger.step();
    assert_eq!(
        scheduler.poll(&mut chip8, Some(&mut debugger), later).unwrap(),
        SchedulerResult::Idle
    );
    assert_eq!(chip8.registers()[0], 0);

    assert_eq!(
        scheduler
            .poll(&mut chip8, Some(&mut debugger), later + frame)
            .unwrap(),
        SchedulerResult::Halted
    );
    assert_eq!(chip8.registers()[0], 1);
    assert_eq!(chip8.pc(), 0x202);

    // Continuing finishes the interrupted batch of 10 before a new frame starts
    debugger.resume();
    assert_eq!(
        scheduler
            .poll(&mut chip8, Some(&mut debugger), later + frame * 2)
            .unwrap(),
        SchedulerResult::Idle
    );
    assert_eq!(chip8.registers()[0], 5);

    assert_eq!(
        scheduler
            .poll(&mut chip8, Some(&mut debugger), later + frame * 3)
            .unwrap(),
        SchedulerResult::Ran { frames: 1 }
    );
    assert_eq!(chip8.registers()[0], 10);
}

#[test]
fn quit_command_stops_the_scheduler() {
    let mut chip8 = machine(&[0x70, 0x01, 0x12, 0x00]);
    let mut scheduler = Scheduler::new(&config());
    let mut debugger = Debugger::new();

    let result = command(&mut debugger, &mut chip8, "q");
    assert!(matches!(result, CommandResult::Quit));

    assert_eq!(
        scheduler
            .poll(&mut chip8, Some(&mut debugger), Instant::now())
            .unwrap(),
        SchedulerResult::Quit
    );
    assert!(scheduler.is_quit());
    assert_eq!(chip8.registers()[0], 0);
}

#[test]
fn without_a_debugger_nothing_halts() {
    // LD VA, 0x2B; JP 0x200
    let mut chip8 = machine(&[0x6A, 0x2B, 0x12, 0x00]);
    let mut scheduler = Scheduler::new(&config());

    assert_eq!(scheduler.run_frame(&mut chip8, None).unwrap(), None);
    assert_eq!(chip8.registers()[0xA], 0x2B);
}
