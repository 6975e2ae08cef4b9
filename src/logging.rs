//! Tracing configuration and log routing.
//!
//! Everything goes to stdout through a compact formatter. A second, ANSI-free layer appends to a
//! log file: `DOCVEC_LOG_FILE` when set, otherwise `logs/docvec.log`. Access events (target
//! `access`, see [`crate::access_log`]) flow through both layers like any other event; rotation
//! and retention of the file are left to the host.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCVEC_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "docvec.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and file logging.
///
/// Respects `RUST_LOG` for filtering and defaults to `info`. Safe to call more than once; only
/// the first call installs a subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = std::env::var(LOG_FILE_ENV).ok().map(PathBuf::from);
    let result = match configure_file_writer(target.as_deref()) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Build a non-blocking writer for file logging.
///
/// Returns `None` when the target directory cannot be created or the file cannot be opened; the
/// process keeps logging to stdout in that case.
fn configure_file_writer(path: Option<&Path>) -> Option<NonBlocking> {
    let (directory, file_name) = match path {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name()?.to_os_string();
            (directory.to_path_buf(), file_name)
        }
        None => (PathBuf::from(DEFAULT_LOG_DIR), DEFAULT_LOG_NAME.into()),
    };

    if let Err(err) = std::fs::create_dir_all(&directory) {
        eprintln!("Failed to create log directory {}: {err}", directory.display());
        return None;
    }

    let file_appender = tracing_appender::rolling::never(&directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        // A writer from an earlier call is still alive; keep using that one.
        return None;
    }
    Some(non_blocking)
}
