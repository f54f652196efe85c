use super::Color;

/// Error types that can occur during CHIP-8 emulation
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: u16 },

    #[error("Stack overflow: subroutine call at {pc:#06X} nested deeper than {depth} levels")]
    StackOverflow { pc: u16, depth: usize },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// What a single CPU cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An instruction was decoded and executed (possibly as a no-op or a rewind).
    Executed,
    /// The debugger held the instruction back; pc still points at it.
    Halted,
    /// The debugger was told to quit.
    Quit,
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
pub const DISPLAY_SIZE: usize = DISPLAY_X * DISPLAY_Y;

/// Row-major 64x32 colour framebuffer.
pub type Framebuffer = [Color; DISPLAY_SIZE];
