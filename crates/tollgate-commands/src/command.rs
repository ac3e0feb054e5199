use std::fmt;
use std::sync::Arc;

use tollgate_journal::{CancellationFlag, JournalError};

/// How an invocation is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Runs on the invoking thread and blocks it until the handler returns
    #[default]
    Sequential,
    /// Runs detached on the blocking pool; tracked and terminable by name
    AlwaysParallel,
}

pub type CommandHandler = Arc<dyn Fn(CommandContext) -> anyhow::Result<()> + Send + Sync>;

/// A named operation that can be registered with the [`CommandRegistry`](crate::CommandRegistry)
#[derive(Clone)]
pub struct Command {
    name: String,
    handler: CommandHandler,
    execution_mode: ExecutionMode,
    summary: Option<String>,
}

impl Command {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            execution_mode: ExecutionMode::default(),
            summary: None,
        }
    }

    pub fn with_mode(mut self, execution_mode: ExecutionMode) -> Self {
        self.execution_mode = execution_mode;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub(crate) fn handler(&self) -> &CommandHandler {
        &self.handler
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("execution_mode", &self.execution_mode)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// Everything a handler gets to see about its invocation
#[derive(Debug, Clone)]
pub struct CommandContext {
    name: String,
    parameters: String,
    cancellation: CancellationFlag,
}

impl CommandContext {
    pub(crate) fn new(name: String, parameters: String, cancellation: CancellationFlag) -> Self {
        Self {
            name,
            parameters,
            cancellation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &str {
        &self.parameters
    }

    /// Flag raised by `terminate`; long-running handlers must poll it
    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Bail out with [`JournalError::Cancelled`] once terminated
    pub fn check_cancelled(&self) -> anyhow::Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(JournalError::Cancelled.into());
        }
        Ok(())
    }
}
