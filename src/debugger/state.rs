use std::collections::BTreeSet;

use super::commands::{BreakpointAction, Command, CommandError, CommandResult, SetTarget};
use super::dump::StateDump;
use crate::emu::{Chip8, Mnemonic};

/// Where the debugger currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    /// Free-running until a breakpoint mnemonic comes up.
    Running,
    /// Halting before every instruction.
    Stepping,
    /// Halted in front of an instruction whose mnemonic has a breakpoint.
    AtBreakpoint(Mnemonic),
    Terminated,
}

/// Answer of the pre-instruction hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Halt,
    Quit,
}

/// Breakpoints keyed by mnemonic plus the step/continue state machine.
pub struct Debugger {
    state: DebuggerState,
    breakpoints: BTreeSet<Mnemonic>,
    /// One instruction may pass without a check, handed out by step and continue.
    granted: bool,
    /// Address of the last instruction let through. DXYN and FX0A re-fetch themselves while
    /// they wait, and those retries do not trip the breakpoint again.
    last_executed: Option<u16>,
}

impl Debugger {
    /// A debugger that halts before the first instruction.
    pub fn new() -> Self {
        Self {
            state: DebuggerState::Stepping,
            breakpoints: BTreeSet::new(),
            granted: false,
            last_executed: None,
        }
    }

    pub fn state(&self) -> DebuggerState {
        self.state
    }

    /// True while execution waits for a command.
    pub fn is_halted(&self) -> bool {
        !self.granted
            && matches!(
                self.state,
                DebuggerState::Stepping | DebuggerState::AtBreakpoint(_)
            )
    }

    pub fn is_terminated(&self) -> bool {
        self.state == DebuggerState::Terminated
    }

    /// Called with the address and mnemonic of every instruction about to execute.
    ///
    /// Machine calls and undefined instructions have no mnemonic. They can't carry a
    /// breakpoint but still halt while stepping and still use up a step.
    pub fn before_instruction(&mut self, pc: u16, mnemonic: Option<Mnemonic>) -> Gate {
        if self.state == DebuggerState::Terminated {
            return Gate::Quit;
        }

        let retry = self.last_executed == Some(pc);

        if std::mem::take(&mut self.granted) {
            self.last_executed = Some(pc);
            return Gate::Proceed;
        }

        match (self.state, mnemonic) {
            (DebuggerState::Running, Some(mnemonic))
                if !retry && self.breakpoints.contains(&mnemonic) =>
            {
                log::debug!("Hit breakpoint on {mnemonic} at {pc:#05X}");
                self.state = DebuggerState::AtBreakpoint(mnemonic);
                Gate::Halt
            }
            (DebuggerState::Running, _) => {
                self.last_executed = Some(pc);
                Gate::Proceed
            }
            _ => Gate::Halt,
        }
    }

    /// Lets exactly one instruction through, then halts again.
    pub fn step(&mut self) {
        self.state = DebuggerState::Stepping;
        self.granted = true;
    }

    /// Runs until the next breakpoint. The instruction currently held back is not re-checked.
    pub fn resume(&mut self) {
        self.state = DebuggerState::Running;
        self.granted = true;
    }

    /// Halts before the next instruction, dropping any pending step or continue.
    pub fn pause(&mut self) {
        if self.state != DebuggerState::Terminated {
            self.state = DebuggerState::Stepping;
            self.granted = false;
        }
    }

    pub fn terminate(&mut self) {
        log::debug!("Debugger terminated");
        self.state = DebuggerState::Terminated;
    }

    /// Flips the breakpoint on `mnemonic`; returns whether it is now set.
    pub fn toggle_breakpoint(&mut self, mnemonic: Mnemonic) -> bool {
        if self.breakpoints.remove(&mnemonic) {
            false
        } else {
            self.breakpoints.insert(mnemonic);
            true
        }
    }

    pub fn set_breakpoint(&mut self, mnemonic: Mnemonic) {
        self.breakpoints.insert(mnemonic);
    }

    pub fn clear_breakpoint(&mut self, mnemonic: Mnemonic) {
        self.breakpoints.remove(&mnemonic);
    }

    pub fn has_breakpoint(&self, mnemonic: Mnemonic) -> bool {
        self.breakpoints.contains(&mnemonic)
    }

    /// Breakpoints in table order.
    pub fn breakpoints(&self) -> Vec<Mnemonic> {
        self.breakpoints.iter().copied().collect()
    }

    pub fn execute(
        &mut self,
        command: Command,
        chip8: &mut Chip8,
    ) -> Result<CommandResult, CommandError> {
        match command {
            Command::Step => {
                self.step();
                Ok(CommandResult::Ok)
            }
            Command::Continue => {
                self.resume();
                Ok(CommandResult::Ok)
            }
            Command::Breakpoint { action } => Ok(self.handle_breakpoint(action)),
            Command::State => Ok(CommandResult::State(StateDump::new(chip8).to_string())),
            Command::Opcodes => Ok(CommandResult::Opcodes),
            Command::Set { target, value } => Self::handle_set(chip8, target, value),
            Command::Quit => {
                self.terminate();
                Ok(CommandResult::Quit)
            }
        }
    }

    fn handle_breakpoint(&mut self, action: BreakpointAction) -> CommandResult {
        match action {
            BreakpointAction::Toggle { mnemonic } => {
                let set = self.toggle_breakpoint(mnemonic);
                CommandResult::BreakpointToggled { mnemonic, set }
            }
            BreakpointAction::Set { mnemonic } => {
                self.set_breakpoint(mnemonic);
                CommandResult::Ok
            }
            BreakpointAction::Clear { mnemonic } => {
                self.clear_breakpoint(mnemonic);
                CommandResult::Ok
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
                CommandResult::Ok
            }
            BreakpointAction::List => CommandResult::Breakpoints(self.breakpoints()),
        }
    }

    fn handle_set(
        chip8: &mut Chip8,
        target: SetTarget,
        value: u16,
    ) -> Result<CommandResult, CommandError> {
        match target {
            SetTarget::V(reg) => {
                let value = u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange)?;
                chip8.set_register(reg, value);
            }
            SetTarget::I => chip8.set_index(value),
            SetTarget::Pc => {
                if value % 2 != 0 || usize::from(value) >= crate::emu::MEMORY_SIZE {
                    return Err(CommandError::ValueOutOfRange);
                }
                chip8.set_pc(value);
            }
        }

        Ok(CommandResult::Ok)
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u4;

    #[test]
    fn starts_halted_in_stepping_mode() {
        let mut debugger = Debugger::new();
        assert!(debugger.is_halted());
        assert_eq!(
            debugger.before_instruction(0x200, Some(Mnemonic::Jump)),
            Gate::Halt
        );
    }

    #[test]
    fn step_grants_exactly_one_instruction() {
        let mut debugger = Debugger::new();
        debugger.step();
        assert!(!debugger.is_halted());
        assert_eq!(
            debugger.before_instruction(0x200, Some(Mnemonic::Jump)),
            Gate::Proceed
        );
        assert!(debugger.is_halted());
        assert_eq!(
            debugger.before_instruction(0x300, Some(Mnemonic::Jump)),
            Gate::Halt
        );
    }

    #[test]
    fn instructions_without_mnemonic_still_halt_and_use_up_a_step() {
        let mut debugger = Debugger::new();
        assert_eq!(debugger.before_instruction(0x200, None), Gate::Halt);

        debugger.step();
        assert_eq!(debugger.before_instruction(0x200, None), Gate::Proceed);
        assert_eq!(debugger.before_instruction(0x202, None), Gate::Halt);
    }

    #[test]
    fn instructions_without_mnemonic_never_trip_a_breakpoint() {
        let mut debugger = Debugger::new();
        for mnemonic in Mnemonic::ALL {
            debugger.set_breakpoint(mnemonic);
        }
        debugger.resume();
        assert_eq!(
            debugger.before_instruction(0x200, Some(Mnemonic::Jump)),
            Gate::Proceed
        );
        assert_eq!(debugger.before_instruction(0x300, None), Gate::Proceed);
    }

    #[test]
    fn continue_runs_to_the_next_breakpoint() {
        let mut debugger = Debugger::new();
        debugger.set_breakpoint(Mnemonic::SetRegImm);
        debugger.resume();

        assert_eq!(
            debugger.before_instruction(0x200, Some(Mnemonic::SetRegImm)),
            Gate::Proceed
        );
        assert_eq!(
            debugger.before_instruction(0x202, Some(Mnemonic::AluAdd)),
            Gate::Proceed
        );
        assert_eq!(
            debugger.before_instruction(0x204, Some(Mnemonic::SetRegImm)),
            Gate::Halt
        );
        assert_eq!(
            debugger.state(),
            DebuggerState::AtBreakpoint(Mnemonic::SetRegImm)
        );
        assert!(debugger.is_halted());

        // Continuing moves past the instruction that triggered the breakpoint
        debugger.resume();
        assert_eq!(
            debugger.before_instruction(0x204, Some(Mnemonic::SetRegImm)),
            Gate::Proceed
        );
        assert_eq!(
            debugger.before_instruction(0x206, Some(Mnemonic::SetRegImm)),
            Gate::Halt
        );
    }

    #[test]
    fn retries_of_a_waiting_instruction_do_not_halt_again() {
        let mut debugger = Debugger::new();
        debugger.set_breakpoint(Mnemonic::Draw);
        debugger.resume();

        assert_eq!(
            debugger.before_instruction(0x200, Some(Mnemonic::SetIndexImm)),
            Gate::Proceed
        );
        assert_eq!(
            debugger.before_instruction(0x202, Some(Mnemonic::Draw)),
            Gate::Halt
        );

        debugger.resume();
        for _ in 0..5 {
            assert_eq!(
                debugger.before_instruction(0x202, Some(Mnemonic::Draw)),
                Gate::Proceed
            );
        }

        // Coming back around the loop is a new hit
        assert_eq!(
            debugger.before_instruction(0x204, Some(Mnemonic::Jump)),
            Gate::Proceed
        );
        assert_eq!(
            debugger.before_instruction(0x202, Some(Mnemonic::Draw)),
            Gate::Halt
        );
    }

    #[test]
    fn pause_revokes_a_pending_grant() {
        let mut debugger = Debugger::new();
        debugger.resume();
        debugger.pause();
        assert!(debugger.is_halted());
        assert_eq!(
            debugger.before_instruction(0x200, Some(Mnemonic::Jump)),
            Gate::Halt
        );
    }

    #[test]
    fn toggling_breakpoints() {
        let mut debugger = Debugger::new();
        assert!(debugger.toggle_breakpoint(Mnemonic::Draw));
        assert!(debugger.toggle_breakpoint(Mnemonic::ClearDisplay));
        assert_eq!(
            debugger.breakpoints(),
            vec![Mnemonic::ClearDisplay, Mnemonic::Draw]
        );
        assert!(!debugger.toggle_breakpoint(Mnemonic::Draw));
        assert!(!debugger.has_breakpoint(Mnemonic::Draw));
    }

    #[test]
    fn quit_terminates() {
        let mut debugger = Debugger::new();
        let mut chip8 = Chip8::default();
        let result = debugger.execute(Command::Quit, &mut chip8).unwrap();
        assert!(matches!(result, CommandResult::Quit));
        assert!(debugger.is_terminated());
        assert!(!debugger.is_halted());
        assert_eq!(
            debugger.before_instruction(0x200, Some(Mnemonic::Jump)),
            Gate::Quit
        );
    }

    #[test]
    fn set_command_writes_machine_state() {
        let mut debugger = Debugger::new();
        let mut chip8 = Chip8::default();

        debugger
            .execute(
                Command::Set {
                    target: SetTarget::V(u4::new(0xA)),
                    value: 0x7F,
                },
                &mut chip8,
            )
            .unwrap();
        assert_eq!(chip8.registers()[0xA], 0x7F);

        let too_big = debugger.execute(
            Command::Set {
                target: SetTarget::V(u4::new(0)),
                value: 0x100,
            },
            &mut chip8,
        );
        assert!(matches!(too_big, Err(CommandError::ValueOutOfRange)));

        let odd_pc = debugger.execute(
            Command::Set {
                target: SetTarget::Pc,
                value: 0x301,
            },
            &mut chip8,
        );
        assert!(matches!(odd_pc, Err(CommandError::ValueOutOfRange)));
        assert_eq!(chip8.pc(), 0x200);
    }
}
