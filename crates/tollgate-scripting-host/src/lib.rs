//! Script host for tollgate.
//!
//! A [`ScriptHost`] sits between an opaque [`ScriptEngine`] and the
//! [`CommandRegistry`](tollgate_commands::CommandRegistry): every subroutine of
//! the loaded script becomes a `script-<name>` command, and the reserved `exec`
//! command runs any subroutine by name. [`ScriptWatcher`] reloads the script
//! when its file changes.
mod engine;
mod error;
mod host;
mod options;
mod watcher;

pub use engine::{Diagnostic, ScriptEngine, ScriptError, ScriptObjects, Severity, SubroutineDefinition};
pub use error::HostError;
pub use host::{
    is_script_command_name, script_command_name, LoadReport, ScriptHost, EXEC_COMMAND,
    SCRIPT_COMMAND_PREFIX,
};
pub use options::{DisplayFilters, NoDisplayFilters, ScriptOptions};
pub use watcher::{ScriptWatcher, DEFAULT_WATCH_INTERVAL};
