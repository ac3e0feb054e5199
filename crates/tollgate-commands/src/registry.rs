use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use tokio::runtime::Handle;
use tollgate_journal::{CancellationFlag, JournalError};
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandContext, ExecutionMode};
use crate::error::CommandError;
use crate::syntax::CommandInvocation;

/// Raised whenever the set of running commands changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunningCommandEvent {
    Added(String),
    Removed(String),
}

impl RunningCommandEvent {
    pub fn command_name(&self) -> &str {
        match self {
            RunningCommandEvent::Added(name) | RunningCommandEvent::Removed(name) => name,
        }
    }
}

type Observer = Arc<dyn Fn(&RunningCommandEvent) + Send + Sync>;

struct RunningCommand {
    cancellation: CancellationFlag,
    mode: ExecutionMode,
    started: Instant,
}

struct RegistryInner {
    commands: RwLock<HashMap<String, Arc<Command>>>,
    running: Mutex<HashMap<String, RunningCommand>>,
    observers: RwLock<Vec<Observer>>,
    runtime: Handle,
}

impl RegistryInner {
    fn running(&self) -> MutexGuard<'_, HashMap<String, RunningCommand>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: RunningCommandEvent) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(&event);
        }
    }

    fn start(&self, name: &str, mode: ExecutionMode) -> Result<CancellationFlag, CommandError> {
        let cancellation = CancellationFlag::new();
        {
            let mut running = self.running();
            if running.contains_key(name) {
                return Err(CommandError::AlreadyRunning(name.to_string()));
            }
            running.insert(
                name.to_string(),
                RunningCommand {
                    cancellation: cancellation.clone(),
                    mode,
                    started: Instant::now(),
                },
            );
        }

        self.notify(RunningCommandEvent::Added(name.to_string()));
        Ok(cancellation)
    }

    fn finish(&self, name: &str) {
        let removed = self.running().remove(name);
        if let Some(command) = removed {
            debug!(
                target: "commands",
                "Command {} ({:?}) finished after {:?}",
                name,
                command.mode,
                command.started.elapsed()
            );
            self.notify(RunningCommandEvent::Removed(name.to_string()));
        }
    }
}

/// Removes a tracked command from the running set when dropped, including
/// when its task is discarded by a shutting down runtime
struct RunningGuard {
    inner: Arc<RegistryInner>,
    name: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.inner.finish(&self.name);
    }
}

/// Tracks registered commands and the ones currently running.
///
/// Cloning is cheap and every clone sees the same registry.
#[derive(Clone)]
pub struct CommandRegistry {
    inner: Arc<RegistryInner>,
}

impl CommandRegistry {
    /// Create a registry that runs always-parallel commands on `runtime`'s blocking pool
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                commands: RwLock::new(HashMap::new()),
                running: Mutex::new(HashMap::new()),
                observers: RwLock::new(Vec::new()),
                runtime,
            }),
        }
    }

    pub fn register(&self, command: Command) -> Result<(), CommandError> {
        let mut commands = self
            .inner
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if commands.contains_key(command.name()) {
            return Err(CommandError::AlreadyRegistered(command.name().to_string()));
        }

        debug!(target: "commands", "Registering command {} ({:?})", command.name(), command.execution_mode());
        commands.insert(command.name().to_string(), Arc::new(command));
        Ok(())
    }

    /// Remove a command. Running invocations keep going until they finish.
    pub fn unregister(&self, name: &str) -> bool {
        self.inner
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner
            .commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn command(&self, name: &str) -> Option<Arc<Command>> {
        self.inner
            .commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all registered commands, sorted
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Start the command `name`.
    ///
    /// `mode` overrides the mode the command was registered with. Sequential
    /// invocations run on the caller's thread and return once the handler is
    /// done. They are not tracked, so concurrent sequential calls of the same
    /// command are allowed and [`terminate`](Self::terminate) cannot reach them;
    /// their cancellation comes from the caller. Always-parallel invocations
    /// return as soon as the command shows up in
    /// [`running_commands`](Self::running_commands), and a second one of the
    /// same name fails with [`CommandError::AlreadyRunning`] until it ends.
    /// Handler failures are logged here and never returned.
    pub fn invoke(
        &self,
        name: &str,
        parameters: &str,
        mode: Option<ExecutionMode>,
    ) -> Result<(), CommandError> {
        let command = self
            .command(name)
            .ok_or_else(|| CommandError::NotFound(name.to_string()))?;
        let mode = mode.unwrap_or(command.execution_mode());

        match mode {
            ExecutionMode::Sequential => {
                let ctx = CommandContext::new(name.to_string(), parameters.to_string(), CancellationFlag::new());
                run_handler(&command, ctx);
            }
            ExecutionMode::AlwaysParallel => {
                let cancellation = self.inner.start(name, mode)?;
                let ctx = CommandContext::new(name.to_string(), parameters.to_string(), cancellation);
                let guard = RunningGuard {
                    inner: self.inner.clone(),
                    name: name.to_string(),
                };
                self.inner.runtime.spawn_blocking(move || {
                    let _guard = guard;
                    run_handler(&command, ctx);
                });
            }
        }

        Ok(())
    }

    /// Parse and invoke operator syntax such as `,exec heal`
    pub fn invoke_syntax(&self, syntax: &str, mode: Option<ExecutionMode>) -> Result<(), CommandError> {
        let invocation = CommandInvocation::parse(syntax)?;
        self.invoke(&invocation.name, &invocation.parameters, mode)
    }

    /// Request cooperative cancellation. Returns false if `name` is not running.
    pub fn terminate(&self, name: &str) -> bool {
        match self.inner.running().get(name) {
            Some(command) => {
                info!(target: "commands", "Terminating command {}", name);
                command.cancellation.cancel();
                true
            }
            None => {
                warn!(target: "commands", "Cannot terminate {}, it is not running", name);
                false
            }
        }
    }

    pub fn terminate_all(&self) {
        for (name, command) in self.inner.running().iter() {
            debug!(target: "commands", "Terminating command {}", name);
            command.cancellation.cancel();
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.inner.running().contains_key(name)
    }

    /// Names of running commands, sorted
    pub fn running_commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.running().keys().cloned().collect();
        names.sort();
        names
    }

    /// Observe additions to and removals from the running set
    pub fn on_running_commands_changed<F>(&self, observer: F)
    where
        F: Fn(&RunningCommandEvent) + Send + Sync + 'static,
    {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }
}

/// Run a handler, containing its failures at the invocation boundary
fn run_handler(command: &Command, ctx: CommandContext) {
    let name = ctx.name().to_string();
    debug!(target: "commands", "Running command {}", name);

    let handler = command.handler().clone();
    match panic::catch_unwind(AssertUnwindSafe(move || handler(ctx))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) if matches!(e.downcast_ref::<JournalError>(), Some(JournalError::Cancelled)) => {
            info!(target: "console", "Command {} terminated", name);
        }
        Ok(Err(e)) => {
            error!(target: "console", "Command {} failed: {:#}", name, e);
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(target: "console", "Command {} panicked: {}", name, message);
        }
    }
}
