use std::path::PathBuf;

use directories::ProjectDirs;

/// Platform-specific config, data and cache directories for the application.
///
/// Uses the XDG base directories on Linux (honouring `$XDG_CONFIG_HOME`
/// and friends), Application Support on macOS and `%APPDATA%` on Windows.
pub struct ProjectPaths {
    dirs: ProjectDirs,
}

impl ProjectPaths {
    /// Returns None when no home directory can be determined
    pub fn new(name: &str) -> Option<Self> {
        ProjectDirs::from("", "", name).map(|dirs| Self { dirs })
    }

    pub fn config_dir(&self) -> PathBuf {
        self.dirs.config_dir().to_path_buf()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dirs.data_dir().to_path_buf()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dirs.cache_dir().to_path_buf()
    }

    /// Log files live under the data directory
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}
