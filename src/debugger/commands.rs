use std::fmt;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

use super::dump::opcode_table;
use crate::emu::{Chip8Error, Mnemonic};
use crate::u4;

#[derive(Parser)]
#[command(multicall = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parses one line typed at the debugger prompt.
    pub fn parse_line(line: &str) -> Result<Command, clap::Error> {
        Cli::try_parse_from(line.split_whitespace()).map(|cli| cli.command)
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Execute one instruction, then halt again
    #[command(visible_aliases = ["s", "n"])]
    Step,

    /// Run until an instruction with a breakpoint comes up
    #[command(visible_aliases = ["c", "m"])]
    Continue,

    /// Manage breakpoints on instruction mnemonics (e.g. 8XY4)
    #[command(visible_alias = "b")]
    Breakpoint {
        #[command(subcommand)]
        action: BreakpointAction,
    },

    /// Show registers, timers, stack and keys
    #[command(visible_alias = "g")]
    State,

    /// List the instruction mnemonics breakpoints can be placed on
    #[command(visible_alias = "o")]
    Opcodes,

    /// Overwrite a register, the index register or the program counter
    Set {
        #[arg(value_parser = parse_set_target)]
        target: SetTarget,
        #[arg(value_parser = maybe_hex::<u16>)]
        value: u16,
    },

    #[command(visible_aliases = ["q", "k"])]
    Quit,
}

pub enum CommandResult {
    Ok,
    BreakpointToggled { mnemonic: Mnemonic, set: bool },
    Breakpoints(Vec<Mnemonic>),
    State(String),
    Opcodes,
    Quit,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Ok => f.write_str("OK"),
            CommandResult::BreakpointToggled { mnemonic, set } => {
                let state = if *set { "set" } else { "cleared" };
                write!(f, "Breakpoint on {mnemonic} {state}")
            }
            CommandResult::Breakpoints(breakpoints) if breakpoints.is_empty() => {
                f.write_str("No breakpoints")
            }
            CommandResult::Breakpoints(breakpoints) => {
                f.write_str("Breakpoints:")?;
                for mnemonic in breakpoints {
                    write!(f, " {mnemonic}")?;
                }
                Ok(())
            }
            CommandResult::State(dump) => f.write_str(dump),
            CommandResult::Opcodes => f.write_str(opcode_table(2).trim_end()),
            CommandResult::Quit => f.write_str("Quit"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Error while executing cpu instruction: {0}")]
    Chip8Error(#[from] Chip8Error),
    #[error("Value out of range")]
    ValueOutOfRange,
}

#[derive(Subcommand, Clone, Debug)]
pub enum BreakpointAction {
    /// Set the breakpoint if it is clear, clear it if it is set
    #[command(visible_alias = "t")]
    Toggle {
        #[arg(value_parser = parse_mnemonic)]
        mnemonic: Mnemonic,
    },

    #[command(visible_alias = "s")]
    Set {
        #[arg(value_parser = parse_mnemonic)]
        mnemonic: Mnemonic,
    },

    #[command(visible_alias = "c")]
    Clear {
        #[arg(value_parser = parse_mnemonic)]
        mnemonic: Mnemonic,
    },

    #[command(visible_alias = "l")]
    List,

    #[command(visible_alias = "ca")]
    ClearAll,
}

#[derive(Clone, Debug)]
pub enum SetTarget {
    V(u4),
    I,
    Pc,
}

fn parse_mnemonic(s: &str) -> Result<Mnemonic, String> {
    s.parse::<Mnemonic>().map_err(|e| e.to_string())
}

fn parse_set_target(s: &str) -> Result<SetTarget, String> {
    let lower = s.to_lowercase();

    match lower.as_str() {
        "index" | "i" => Ok(SetTarget::I),
        "pc" => Ok(SetTarget::Pc),

        _ if lower.starts_with('v') => {
            let hex_str = &lower[1..];
            match u8::from_str_radix(hex_str, 16) {
                Ok(val) if val < 16 => Ok(SetTarget::V(u4::new(val))),
                _ => Err(format!("Invalid register: '{}'", s)),
            }
        }

        _ => Err(format!("Unknown set target: '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert!(matches!(Cli::parse_line("n"), Ok(Command::Step)));
        assert!(matches!(Cli::parse_line("continue"), Ok(Command::Continue)));
        assert!(matches!(Cli::parse_line("k"), Ok(Command::Quit)));
        assert!(matches!(Cli::parse_line("g"), Ok(Command::State)));
    }

    #[test]
    fn parses_breakpoint_mnemonics() {
        assert!(matches!(
            Cli::parse_line("b t 6XNN"),
            Ok(Command::Breakpoint {
                action: BreakpointAction::Toggle {
                    mnemonic: Mnemonic::SetRegImm
                }
            })
        ));
        assert!(matches!(
            Cli::parse_line("breakpoint set 14"),
            Ok(Command::Breakpoint {
                action: BreakpointAction::Set {
                    mnemonic: Mnemonic::AluAdd
                }
            })
        ));
        assert!(Cli::parse_line("b t 6XYZ").is_err());
    }

    #[test]
    fn parses_set_targets_and_hex_values() {
        assert!(matches!(
            Cli::parse_line("set vA 0x1F"),
            Ok(Command::Set {
                target: SetTarget::V(reg),
                value: 0x1F
            }) if reg == u4::new(0xA)
        ));
        assert!(matches!(
            Cli::parse_line("set pc 512"),
            Ok(Command::Set {
                target: SetTarget::Pc,
                value: 0x200
            })
        ));
        assert!(Cli::parse_line("set v10 1").is_err());
    }

    #[test]
    fn results_render_for_the_prompt() {
        let toggled = CommandResult::BreakpointToggled {
            mnemonic: Mnemonic::Draw,
            set: true,
        };
        assert_eq!(toggled.to_string(), "Breakpoint on DXYN set");
        assert_eq!(
            CommandResult::Breakpoints(vec![]).to_string(),
            "No breakpoints"
        );
        assert_eq!(
            CommandResult::Breakpoints(vec![Mnemonic::SetRegImm, Mnemonic::Draw]).to_string(),
            "Breakpoints: 6XNN DXYN"
        );
        assert_eq!(CommandResult::Opcodes.to_string().lines().count(), 17);
    }
}
