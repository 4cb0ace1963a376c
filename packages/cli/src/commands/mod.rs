pub mod sandbox;
pub mod spec;

pub use sandbox::{handle_sandbox_command, SandboxCommands};
pub use spec::{handle_spec_command, SpecCommands};
