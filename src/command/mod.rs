//! OS command execution.

pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use runner::{CommandOutput, CommandRunner, SystemCommandRunner, NO_EXIT_CODE};
