use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tollgate_journal::CancellationFlag;

/// Named object ids scripts refer to, e.g. `backpack` or `lastcorpse`
pub type ScriptObjects = BTreeMap<String, i32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message reported by the engine while loading a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, line: u32, column: u32, text: impl Into<String>) -> Self {
        Self {
            severity,
            line,
            column,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} {}", self.line, self.column, self.text)
    }
}

/// A subroutine exported by the loaded script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineDefinition {
    pub name: String,
}

impl SubroutineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script itself failed, e.g. a runtime error raised on `line`
    #[error("{message}")]
    ScriptFailed { line: u32, message: String },

    /// The interpreter broke while running the script
    #[error("{message}")]
    Internal {
        line: u32,
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ScriptError {
    pub fn line(&self) -> u32 {
        match self {
            ScriptError::ScriptFailed { line, .. } | ScriptError::Internal { line, .. } => *line,
        }
    }
}

/// Bridge to the opaque script interpreter.
///
/// Implementations are shared between every running subroutine, so each
/// method takes `&self` and the engine synchronizes its own state.
pub trait ScriptEngine: Send + Sync {
    /// Load (or reload) a script file, replacing the previous one
    fn load(&self, path: &Path) -> Vec<Diagnostic>;

    /// Subroutines defined by the currently loaded script
    fn subroutines(&self) -> Vec<SubroutineDefinition>;

    /// Run a subroutine to completion on the calling thread.
    ///
    /// Long running subroutines are expected to poll `cancellation`.
    fn call_subroutine(&self, name: &str, cancellation: &CancellationFlag) -> Result<(), ScriptError>;

    fn get_object(&self, name: &str) -> Option<i32>;

    fn add_object(&self, name: &str, value: i32);

    fn objects(&self) -> ScriptObjects;

    fn set_objects(&self, objects: ScriptObjects);

    /// File of the currently loaded script, if any
    fn current_file(&self) -> Option<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::new(Severity::Warning, 12, 4, "unused variable");
        assert_eq!(diagnostic.to_string(), "12, 4 unused variable");
        assert!(!diagnostic.is_error());
    }

    #[test]
    fn test_script_error_line() {
        let failed = ScriptError::ScriptFailed {
            line: 7,
            message: "division by zero".to_string(),
        };
        assert_eq!(failed.line(), 7);
        assert_eq!(failed.to_string(), "division by zero");

        let internal = ScriptError::Internal {
            line: 3,
            message: "stack corrupted".to_string(),
            source: "bad frame".into(),
        };
        assert_eq!(internal.line(), 3);
        assert_eq!(
            std::error::Error::source(&internal).map(|e| e.to_string()),
            Some("bad frame".to_string())
        );
    }
}
