mod commands;
mod dump;
mod state;

pub use commands::*;
pub use dump::*;
pub use state::*;
