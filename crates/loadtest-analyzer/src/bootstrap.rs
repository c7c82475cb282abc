use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use loadtest_core::error::PipelineError;
use regex::Regex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Initialise the global `tracing` subscriber.
///
/// `log_level` uses the `DEBUG`/`INFO`/`WARNING`/`ERROR`/`CRITICAL` names and
/// is mapped to a [`tracing_subscriber::EnvFilter`] directive. Falls back to
/// `"info"` if the level string is not recognised.
///
/// Console output goes to stderr so stdout only carries the report path. When
/// `log_file` is given, the same events are appended to it without colours.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(tracing_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Map a level name onto the lowercase directive `tracing` understands.
fn tracing_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_lowercase(),
    }
}

// ── Run directory discovery ────────────────────────────────────────────────────

/// Locate the most recent run directory under `root`.
///
/// Candidates are the immediate subdirectories whose name starts with
/// `prefix`. The newest by creation time wins; modification time stands in
/// on platforms that do not report creation time.
pub fn resolve_run_directory(root: &Path, prefix: &str) -> Result<PathBuf, PipelineError> {
    let pattern = Regex::new(&format!("^{}", regex::escape(prefix))).expect("regex is valid");

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| pattern.is_match(&entry.file_name().to_string_lossy()))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            let stamp = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some((stamp, entry.into_path()))
        })
        // Ties fall back to the lexically greatest name.
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
        .ok_or_else(|| PipelineError::NoRunDirectory(root.to_path_buf()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
