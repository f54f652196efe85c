use std::fmt;

use crate::emu::{Chip8, Mnemonic};

/// Human-readable snapshot of the machine, as printed by the `state` command.
pub struct StateDump<'a> {
    chip8: &'a Chip8,
}

impl<'a> StateDump<'a> {
    pub fn new(chip8: &'a Chip8) -> Self {
        Self { chip8 }
    }
}

impl fmt::Display for StateDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chip8 = self.chip8;

        write!(f, "PC:          {:#06X}", chip8.pc())?;
        if let Some(next) = chip8.peek() {
            write!(f, "  ({next})")?;
        }
        writeln!(f)?;
        writeln!(f, "I:           {:#06X}", chip8.index())?;
        writeln!(f, "Delay Timer: {}", chip8.delay_timer())?;
        writeln!(f, "Sound Timer: {}", chip8.sound_timer())?;

        for (reg, value) in chip8.registers().iter().enumerate() {
            writeln!(f, "V{reg:X}:          {value:02X} ({value})")?;
        }

        write!(f, "Stack:      ")?;
        if chip8.stack().is_empty() {
            write!(f, " empty")?;
        }
        for addr in chip8.stack() {
            write!(f, " {addr:03X}")?;
        }
        writeln!(f)?;

        writeln!(f, "Keys Pressed:  {}", KeyBits(chip8.keys_pressed()))?;
        write!(f, "Keys Snapshot: {}", KeyBits(chip8.keys_snapshot()))
    }
}

/// Keys 0-F as a row of 0/1.
struct KeyBits(u16);

impl fmt::Display for KeyBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in 0..16 {
            if key > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", (self.0 >> key) & 1)?;
        }
        Ok(())
    }
}

/// The numbered mnemonic table, laid out in `columns` columns.
pub fn opcode_table(columns: usize) -> String {
    let columns = columns.max(1);
    let rows = Mnemonic::ALL.len().div_ceil(columns);
    let mut out = String::new();

    for row in 0..rows {
        let line: Vec<String> = (0..columns)
            .filter_map(|col| Mnemonic::ALL.get(col * rows + row))
            .map(|m| {
                format!(
                    "{:<4}{} {:<17}",
                    format!("{}.", m.number()),
                    m.as_str(),
                    m.description()
                )
            })
            .collect();
        out.push_str(line.join(" ").trim_end());
        out.push('\n');
    }

    out
}
