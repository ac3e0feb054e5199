//! Registry of named operations that operators and scripts can invoke,
//! track and terminate while the proxy keeps running.
mod command;
mod error;
mod registry;
mod syntax;

pub use command::{Command, CommandContext, CommandHandler, ExecutionMode};
pub use error::CommandError;
pub use registry::{CommandRegistry, RunningCommandEvent};
pub use syntax::CommandInvocation;
