use serde::{Deserialize, Serialize};

/// Options a script session activates every time a script is loaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    /// Force full brightness on the client
    pub light: bool,
}

/// Client-bound display filters the host can toggle
pub trait DisplayFilters: Send + Sync {
    fn set_light_enabled(&self, enabled: bool);
}

/// Filters that ignore every request, for hosts without a client attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplayFilters;

impl DisplayFilters for NoDisplayFilters {
    fn set_light_enabled(&self, _enabled: bool) {}
}
