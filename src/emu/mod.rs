mod chip8;
mod color;
mod config;
mod execute;
mod font;
mod opcode;
mod scheduler;
mod types;

pub use chip8::*;
pub use color::*;
pub use config::*;
pub use font::*;
pub use opcode::*;
pub use scheduler::*;
pub use types::*;
