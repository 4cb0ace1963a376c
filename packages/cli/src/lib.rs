// ABOUTME: Berth command-line interface library
// ABOUTME: Argument parsing, logging setup, dependency wiring and command handlers for the berth binary

pub mod cli;
pub mod commands;
pub mod context;
pub mod logging;
pub mod output;

pub use cli::{Cli, Commands};
pub use context::AppContext;
pub use output::OutputFormat;
