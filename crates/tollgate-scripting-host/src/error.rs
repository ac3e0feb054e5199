use std::path::PathBuf;

use tollgate_commands::CommandError;

use crate::engine::{Diagnostic, ScriptError};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Script {} rejected with {} error(s)", file.display(), errors.len())]
    LoadRejected {
        file: PathBuf,
        errors: Vec<Diagnostic>,
    },

    #[error("Unknown subroutine '{0}'")]
    UnknownSubroutine(String),

    #[error(transparent)]
    Engine(#[from] ScriptError),

    #[error(transparent)]
    Command(#[from] CommandError),
}
