use super::{Chip8Error, Color};

pub const DEFAULT_CYCLES_PER_SECOND: u32 = 700;

/// Compatibility switches for behaviour that differs between interpreters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quirks {
    /// FX29 takes the glyph from the high nibble of the operand `x` instead of from `Vx`.
    /// `x` is only four bits wide, so this always selects glyph 0.
    ///
    /// Off by default: FX29 then points I at the glyph for the low nibble of `Vx`, which
    /// is what ROMs expect. Turn it on to reproduce interpreters that compute `x >> 4`.
    pub font_index_from_operand: bool,
}

/// Everything the machine needs to know before a ROM is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chip8Config {
    pub foreground: Color,
    pub background: Color,
    /// Target instructions per second, spread over 60 frames.
    pub cycles_per_second: u32,
    pub quirks: Quirks,
}

impl Chip8Config {
    pub fn validate(&self) -> Result<(), Chip8Error> {
        if self.cycles_per_second == 0 {
            return Err(Chip8Error::InvalidConfig(
                "cycles per second must be a non-zero positive number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Chip8Config {
    fn default() -> Self {
        Self {
            foreground: Color::WHITE,
            background: Color::BLACK,
            cycles_per_second: DEFAULT_CYCLES_PER_SECOND,
            quirks: Quirks::default(),
        }
    }
}
