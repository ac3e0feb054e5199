use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tollgate_commands::{Command, CommandContext, CommandRegistry, ExecutionMode};
use tollgate_journal::CancellationFlag;
use tracing::{debug, error, info, warn};

use crate::engine::{Diagnostic, ScriptEngine, ScriptError, ScriptObjects, Severity};
use crate::error::HostError;
use crate::options::{DisplayFilters, ScriptOptions};

/// Every subroutine is registered as a command named `script-<subroutine>`
pub const SCRIPT_COMMAND_PREFIX: &str = "script-";

/// Reserved command running the subroutine named by its parameters
pub const EXEC_COMMAND: &str = "exec";

pub fn is_script_command_name(name: &str) -> bool {
    name.starts_with(SCRIPT_COMMAND_PREFIX)
}

pub fn script_command_name(subroutine: &str) -> String {
    format!("{SCRIPT_COMMAND_PREFIX}{subroutine}")
}

/// Outcome of a successful load
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub file: PathBuf,
    pub warnings: Vec<Diagnostic>,
    /// Command names bound for the loaded subroutines
    pub commands: Vec<String>,
}

type RunningObserver = Arc<dyn Fn() + Send + Sync>;
type LoadedObserver = Arc<dyn Fn(&Path) + Send + Sync>;

/// Hosts one script engine and exposes its subroutines as commands
pub struct ScriptHost {
    this: Weak<ScriptHost>,
    engine: Arc<dyn ScriptEngine>,
    registry: CommandRegistry,
    filters: Arc<dyn DisplayFilters>,
    owns_exec: bool,
    options: RwLock<ScriptOptions>,
    bound_commands: Mutex<Vec<String>>,
    running_observers: RwLock<Vec<RunningObserver>>,
    loaded_observers: RwLock<Vec<LoadedObserver>>,
}

impl ScriptHost {
    /// Create a host and register the reserved `exec` command
    pub fn new(
        engine: Arc<dyn ScriptEngine>,
        registry: CommandRegistry,
        filters: Arc<dyn DisplayFilters>,
    ) -> Result<Arc<Self>, HostError> {
        let mut exec_registration = Ok(());
        let host = Arc::new_cyclic(|this: &Weak<ScriptHost>| {
            exec_registration = registry.register(exec_command(this.clone()));
            Self {
                this: this.clone(),
                engine,
                registry,
                filters,
                owns_exec: exec_registration.is_ok(),
                options: RwLock::new(ScriptOptions::default()),
                bound_commands: Mutex::new(Vec::new()),
                running_observers: RwLock::new(Vec::new()),
                loaded_observers: RwLock::new(Vec::new()),
            }
        });
        exec_registration?;

        let this = host.this.clone();
        host.registry.on_running_commands_changed(move |event| {
            if let Some(host) = this.upgrade() {
                if is_script_command_name(event.command_name()) {
                    host.notify_running_subroutines_changed();
                }
            }
        });

        Ok(host)
    }

    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        self.engine.current_file()
    }

    /// Load a script and bind its subroutines.
    ///
    /// The previously bound commands are always removed first. Warnings are
    /// logged; any error leaves the new script without commands. Options are
    /// activated and script-loaded observers notified either way.
    pub fn load_script(&self, path: &Path) -> Result<LoadReport, HostError> {
        info!(target: "console", "Loading {}", path.display());

        self.unbind_commands();

        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        for diagnostic in self.engine.load(path) {
            match diagnostic.severity {
                Severity::Warning => {
                    warn!(target: "console", "Warning: {}", diagnostic);
                    warnings.push(diagnostic);
                }
                Severity::Error => {
                    error!(target: "console", "Error: {}", diagnostic);
                    errors.push(diagnostic);
                }
                Severity::Info => debug!(target: "scripting", "{}", diagnostic),
            }
        }

        let commands = if errors.is_empty() {
            self.bind_commands()
        } else {
            Vec::new()
        };

        self.activate_options();
        self.notify_script_loaded(path);

        if !errors.is_empty() {
            return Err(HostError::LoadRejected {
                file: path.to_path_buf(),
                errors,
            });
        }

        info!(
            target: "scripting",
            "Loaded {} with {} subroutine(s)",
            path.display(),
            commands.len()
        );

        Ok(LoadReport {
            file: path.to_path_buf(),
            warnings,
            commands,
        })
    }

    fn bind_commands(&self) -> Vec<String> {
        let mut bound = Vec::new();

        for subroutine in self.engine.subroutines() {
            let name = script_command_name(&subroutine.name);
            let this = self.this.clone();
            let subroutine_name = subroutine.name;

            let command = Command::new(name.clone(), move |ctx| match this.upgrade() {
                Some(host) => Ok(host.call_subroutine(&subroutine_name, ctx.cancellation())?),
                None => Ok(()),
            });

            match self.registry.register(command) {
                Ok(()) => bound.push(name),
                Err(e) => error!(target: "scripting", "Cannot bind subroutine: {}", e),
            }
        }

        *self
            .bound_commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = bound.clone();
        bound
    }

    fn unbind_commands(&self) {
        let bound = std::mem::take(
            &mut *self
                .bound_commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for name in bound {
            self.registry.unregister(&name);
        }
    }

    fn activate_options(&self) {
        let options = self.options();
        debug!(target: "scripting", "Activating script options {:?}", options);
        self.filters.set_light_enabled(options.light);
    }

    pub fn options(&self) -> ScriptOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the options. They take effect on the next load.
    pub fn set_options(&self, options: ScriptOptions) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
    }

    /// Run a subroutine on the calling thread, logging script failures.
    ///
    /// Only an unknown subroutine is reported back to the caller.
    pub fn call_subroutine(&self, name: &str, cancellation: &CancellationFlag) -> Result<(), HostError> {
        match self.try_call_subroutine(name, cancellation) {
            Err(HostError::Engine(e)) => {
                self.report_failure(&e);
                Ok(())
            }
            result => result,
        }
    }

    /// Run a subroutine on the calling thread and return its failure as is
    pub fn try_call_subroutine(&self, name: &str, cancellation: &CancellationFlag) -> Result<(), HostError> {
        self.ensure_subroutine(name)?;
        debug!(target: "scripting", "Calling subroutine {}", name);
        self.engine.call_subroutine(name, cancellation)?;
        Ok(())
    }

    fn report_failure(&self, failure: &ScriptError) {
        let file = self
            .engine
            .current_file()
            .map(|path| path.display().to_string())
            .unwrap_or_default();

        error!(target: "console", "Line {}, {} - {}", failure.line(), file, failure);

        if let ScriptError::Internal { source, .. } = failure {
            debug!(target: "console", "{:?}", source);
        }
    }

    /// `exec` only starts the subroutine's own command, so the run is tracked
    /// and terminated under the subroutine's name
    fn exec_command(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        self.exec_subroutine(ctx.parameters().trim())?;
        Ok(())
    }

    /// Start a subroutine's command in always-parallel mode
    pub fn exec_subroutine(&self, name: &str) -> Result<(), HostError> {
        self.ensure_subroutine(name)?;
        self.registry.invoke(
            &script_command_name(name),
            "",
            Some(ExecutionMode::AlwaysParallel),
        )?;
        Ok(())
    }

    /// Request cancellation of a running subroutine
    pub fn terminate(&self, name: &str) -> bool {
        self.is_defined(name) && self.registry.terminate(&script_command_name(name))
    }

    pub fn is_subroutine_running(&self, name: &str) -> bool {
        self.is_defined(name) && self.registry.is_running(&script_command_name(name))
    }

    /// Running subroutines, by subroutine name
    pub fn running_subroutines(&self) -> Vec<String> {
        self.registry
            .running_commands()
            .into_iter()
            .filter_map(|name| name.strip_prefix(SCRIPT_COMMAND_PREFIX).map(str::to_string))
            .collect()
    }

    fn is_defined(&self, name: &str) -> bool {
        self.engine
            .subroutines()
            .iter()
            .any(|subroutine| subroutine.name == name)
    }

    fn ensure_subroutine(&self, name: &str) -> Result<(), HostError> {
        if self.is_defined(name) {
            Ok(())
        } else {
            Err(HostError::UnknownSubroutine(name.to_string()))
        }
    }

    pub fn get_object(&self, name: &str) -> Option<i32> {
        self.engine.get_object(name)
    }

    pub fn add_object(&self, name: &str, value: i32) {
        self.engine.add_object(name, value);
    }

    pub fn objects(&self) -> ScriptObjects {
        self.engine.objects()
    }

    pub fn set_objects(&self, objects: ScriptObjects) {
        self.engine.set_objects(objects);
    }

    pub fn on_running_subroutines_changed<F>(&self, observer: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.running_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub fn on_script_loaded<F>(&self, observer: F)
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.loaded_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    fn notify_running_subroutines_changed(&self) {
        let observers = self
            .running_observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer();
        }
    }

    fn notify_script_loaded(&self, path: &Path) {
        let observers = self
            .loaded_observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(path);
        }
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        self.unbind_commands();
        if self.owns_exec {
            self.registry.unregister(EXEC_COMMAND);
        }
    }
}

fn exec_command(this: Weak<ScriptHost>) -> Command {
    Command::new(EXEC_COMMAND, move |ctx| match this.upgrade() {
        Some(host) => host.exec_command(&ctx),
        None => Ok(()),
    })
    .with_summary("Run a script subroutine")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_command_names() {
        assert_eq!(script_command_name("heal"), "script-heal");
        assert!(is_script_command_name("script-heal"));
        assert!(!is_script_command_name("exec"));
        assert!(!is_script_command_name("heal-script-"));
    }
}
