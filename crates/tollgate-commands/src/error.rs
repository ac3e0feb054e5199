#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Command '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Unknown command '{0}'")]
    NotFound(String),

    #[error("Command '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Invalid command syntax: '{0}'")]
    InvalidSyntax(String),
}
