use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::APP_NAME;
use crate::paths::ProjectPaths;

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Install the global subscriber for `component` ("proxy", "replay", ...).
///
/// Output goes to stdout, filtered by `RUST_LOG` (default `info`). With
/// `file_enabled` it is also written to `<data_dir>/logs/<component>.log`;
/// keep the returned guard alive or buffered lines are lost on exit.
/// Operator-facing messages use the `console` target.
pub fn init_logging(component: &str, file_enabled: bool) -> io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard, log_path) = if file_enabled {
        let log_path = log_file_path(component)?;
        let (writer, guard) = open_log_file(&log_path)?;
        let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
        (Some(layer), Some(guard), Some(log_path))
    } else {
        (None, None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stdout))
        .with(file_layer)
        .init();

    if let Some(log_path) = log_path {
        tracing::info!("Logging to file: {}", log_path.display());
    }

    Ok(guard)
}

fn log_file_path(component: &str) -> io::Result<PathBuf> {
    let log_dir = ProjectPaths::new(APP_NAME)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))?
        .log_dir();
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir.join(format!("{}.log", component)))
}

fn open_log_file(log_path: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    truncate_if_needed(log_path)?;
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    Ok(tracing_appender::non_blocking(BufWriter::new(file)))
}

/// Truncate log file if it exceeds MAX_LOG_SIZE.
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        File::create(log_path)?.set_len(0)?;
    }
    Ok(())
}
