// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization
//!
//! Console output is always enabled. With the `file-logging` feature and a
//! configured `log_dir`, a combined JSON log is written to a timestamped run
//! folder and old runs are pruned by age and count.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, ObservabilityConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging initialization result
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Initialize logging with console output and optional file output
///
/// Creates a timestamped folder structure when `log_dir` is set:
/// ```text
/// ./logs/
///   └── run_20250101_120000/
///       └── emupilot.log (combined, JSON)
/// ```
pub fn init_logging(
    debug_flags: &CrateDebugFlags,
    config: &ObservabilityConfig,
) -> Result<LoggingGuard> {
    let filter = debug_flags.to_filter_string(&config.level);
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_layer: BoxedLayer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(EnvFilter::new(&filter))
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(EnvFilter::new(&filter))
            .boxed(),
    };
    layers.push(console_layer);

    #[cfg(feature = "file-logging")]
    let mut file_guards = Vec::new();
    let mut run_dir = None;

    if let Some(base_log_dir) = &config.log_dir {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let run_folder = base_log_dir.join(format!("run_{}", timestamp));
        std::fs::create_dir_all(&run_folder).with_context(|| {
            format!("Failed to create log directory: {}", run_folder.display())
        })?;

        cleanup_old_logs(base_log_dir, config.retention_days, config.retention_runs)?;

        #[cfg(feature = "file-logging")]
        {
            let appender = tracing_appender::rolling::daily(&run_folder, "emupilot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            file_guards.push(guard);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(EnvFilter::new(&filter))
                .boxed();
            layers.push(file_layer);
        }

        run_dir = Some(run_folder);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("global tracing subscriber already installed")?;

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: file_guards,
        log_dir: run_dir,
    })
}

/// Initialize console-only logging with default settings
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &ObservabilityConfig::default())
}

/// Clean up old run directories based on retention policy
pub fn cleanup_old_logs(
    base_log_dir: &Path,
    retention_days: u64,
    retention_runs: usize,
) -> Result<()> {
    if !base_log_dir.exists() {
        return Ok(());
    }

    let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, chrono::NaiveDateTime)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(stamp) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("run_"))
        else {
            continue;
        };
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S") {
            runs.push((path, dt));
        }
    }

    // Oldest first
    runs.sort_by_key(|(_, dt)| *dt);

    let mut kept: Vec<&PathBuf> = Vec::new();
    for (path, dt) in &runs {
        if *dt < cutoff {
            if let Err(e) = std::fs::remove_dir_all(path) {
                eprintln!(
                    "Warning: Failed to remove old log directory {}: {}",
                    path.display(),
                    e
                );
            }
        } else {
            kept.push(path);
        }
    }

    if kept.len() > retention_runs {
        let excess = kept.len() - retention_runs;
        for path in kept.into_iter().take(excess) {
            if let Err(e) = std::fs::remove_dir_all(path) {
                eprintln!(
                    "Warning: Failed to remove old log directory {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn run_name(days_ago: i64, offset_secs: i64) -> String {
        let at = chrono::Utc::now() - chrono::Duration::days(days_ago)
            + chrono::Duration::seconds(offset_secs);
        format!("run_{}", at.format("%Y%m%d_%H%M%S"))
    }

    #[test]
    fn test_cleanup_removes_expired_runs() {
        let dir = tempdir().unwrap();
        let old = dir.path().join(run_name(40, 0));
        let fresh = dir.path().join(run_name(1, 0));
        std::fs::create_dir_all(&old).unwrap();
        std::fs::create_dir_all(&fresh).unwrap();

        cleanup_old_logs(dir.path(), 30, 10).unwrap();

        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_cleanup_keeps_most_recent_runs() {
        let dir = tempdir().unwrap();
        let runs: Vec<PathBuf> = (0..4)
            .map(|i| dir.path().join(run_name(2, i * 60)))
            .collect();
        for run in &runs {
            std::fs::create_dir_all(run).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("not_a_run")).unwrap();

        cleanup_old_logs(dir.path(), 30, 2).unwrap();

        assert!(!runs[0].exists());
        assert!(!runs[1].exists());
        assert!(runs[2].exists());
        assert!(runs[3].exists());
        assert!(dir.path().join("not_a_run").exists());
    }

    #[test]
    fn test_cleanup_missing_dir_is_ok() {
        assert!(cleanup_old_logs(Path::new("/nonexistent/emupilot-logs"), 30, 10).is_ok());
    }
}
