//! Builder and wiring for a proxy session

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tollgate_commands::CommandRegistry;
use tollgate_journal::{Cancellation, EventJournal, EventJournalAwaiter, EventSource};
use tollgate_scripting_host::{HostError, ScriptEngine, ScriptHost, ScriptWatcher};
use tracing::{debug, info};

use crate::config::{ScriptingConfig, TollgateConfig};
use crate::filters::LightFilter;
use crate::observers::{LightObserver, MapObserver, SpeechObserver};
use crate::packets::{PacketDispatcher, ServerPacket};

/// Error during session construction
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No tokio runtime available - build the session from within a runtime or use .with_runtime()")]
    MissingRuntime,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Builder for ProxySession
#[derive(Default)]
pub struct ProxySessionBuilder {
    config: Option<TollgateConfig>,
    runtime: Option<Handle>,
    engine: Option<Arc<dyn ScriptEngine>>,
}

impl ProxySessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration instead of the defaults
    pub fn with_config(mut self, config: TollgateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Runtime whose blocking pool runs always-parallel commands
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Attach a script engine; ignored when scripting is disabled in the config
    pub fn with_script_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<ProxySession, BuildError> {
        let config = self.config.unwrap_or_default();
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| BuildError::MissingRuntime)?,
        };

        let journal = Arc::new(EventJournal::new());
        let source = Arc::new(EventSource::new(journal.clone()));
        let dispatcher = PacketDispatcher::new();

        let map = MapObserver::attach(&dispatcher, source.clone());
        SpeechObserver::attach(&dispatcher, source.clone());
        LightObserver::attach(&dispatcher, source.clone());
        let light_filter = LightFilter::attach(&dispatcher);

        let registry = CommandRegistry::new(runtime);

        let host = match self.engine {
            Some(engine) if config.scripting.enabled => {
                let host = ScriptHost::new(engine, registry.clone(), light_filter.clone())?;
                host.set_objects(config.scripting.objects.clone());
                host.set_options(config.scripting.options.clone());
                debug!(target: "scripting", "Script host attached");
                Some(host)
            }
            Some(_) => {
                info!(target: "scripting", "Scripting disabled, script engine not attached");
                None
            }
            None => None,
        };

        Ok(ProxySession {
            default_timeout: config.journal.default_timeout(),
            config,
            journal,
            source,
            dispatcher,
            map,
            light_filter,
            registry,
            host,
        })
    }
}

/// One client connection's worth of journal, observers, commands and scripts
pub struct ProxySession {
    config: TollgateConfig,
    journal: Arc<EventJournal>,
    source: Arc<EventSource>,
    dispatcher: PacketDispatcher,
    map: Arc<MapObserver>,
    light_filter: Arc<LightFilter>,
    registry: CommandRegistry,
    host: Option<Arc<ScriptHost>>,
    default_timeout: Option<Duration>,
}

impl ProxySession {
    pub fn builder() -> ProxySessionBuilder {
        ProxySessionBuilder::new()
    }

    /// Handle a decoded packet from the server, returning what to forward to the client
    pub fn handle_server_packet(&self, packet: ServerPacket) -> Option<ServerPacket> {
        self.dispatcher.dispatch(packet)
    }

    /// Create an awaiter that falls back to the configured default timeout
    pub fn awaiter(&self, cancellation: Arc<dyn Cancellation>) -> EventJournalAwaiter {
        let awaiter = EventJournalAwaiter::new(self.source.clone(), cancellation);
        match self.default_timeout {
            Some(timeout) => awaiter.with_default_timeout(Arc::new(move || Some(timeout))),
            None => awaiter,
        }
    }

    /// Load the configured startup script, if any
    pub fn load_configured_script(&self) -> Option<Result<(), HostError>> {
        let host = self.host.as_ref()?;
        let path = self.config.scripting.script_path.as_ref()?;
        Some(host.load_script(path).map(|_| ()))
    }

    /// Watch the configured script for changes when hot reload is enabled
    pub fn spawn_script_watcher(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let scripting = &self.config.scripting;
        if !scripting.hot_reload {
            return None;
        }

        let host = self.host.as_ref()?;
        let path = scripting.script_path.clone()?;
        let watcher = ScriptWatcher::with_interval(path, scripting.hot_reload_interval());
        Some(watcher.spawn(host, shutdown))
    }

    /// Copy the host's objects and options back into `scripting` for saving
    pub fn store_script_state(&self, scripting: &mut ScriptingConfig) {
        if let Some(host) = &self.host {
            scripting.objects = host.objects();
            scripting.options = host.options();
        }
    }

    pub fn config(&self) -> &TollgateConfig {
        &self.config
    }

    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }

    pub fn source(&self) -> &Arc<EventSource> {
        &self.source
    }

    pub fn dispatcher(&self) -> &PacketDispatcher {
        &self.dispatcher
    }

    pub fn map(&self) -> &Arc<MapObserver> {
        &self.map
    }

    pub fn light_filter(&self) -> &Arc<LightFilter> {
        &self.light_filter
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn host(&self) -> Option<&Arc<ScriptHost>> {
        self.host.as_ref()
    }
}

impl Drop for ProxySession {
    fn drop(&mut self) {
        self.registry.terminate_all();
    }
}
