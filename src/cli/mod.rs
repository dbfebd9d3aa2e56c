//! Command-line interface: parsing and command dispatch.

mod commands;
mod parser;

pub use commands::{OutputFormat, execute};
pub use parser::{Cli, Commands};
