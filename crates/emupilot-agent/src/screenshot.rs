//! Waiting for the emulator to finish writing a screenshot
//!
//! The emulator announces a screenshot path as soon as it starts writing, so
//! a reader can see a truncated file. Poll until the file is larger than a
//! threshold, a bounded number of times.

use emupilot_config::ScreenshotConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ScreenshotWaitError {
    #[error("Screenshot {path} not ready after {polls} polls (last size {last_size} bytes)")]
    NotReady {
        path: PathBuf,
        polls: u32,
        last_size: u64,
    },

    #[error("Reading screenshot {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Return the file contents once it exceeds `min_file_bytes`.
pub async fn wait_for_screenshot(
    path: &Path,
    config: &ScreenshotConfig,
) -> Result<Vec<u8>, ScreenshotWaitError> {
    let interval = Duration::from_millis(config.poll_interval_ms);
    let polls = config.max_polls.max(1);
    let mut last_size = 0;

    for poll in 1..=polls {
        // A missing file just means the writer has not created it yet.
        if let Ok(metadata) = tokio::fs::metadata(path).await {
            last_size = metadata.len();
            if last_size > config.min_file_bytes {
                debug!(
                    "[SCREENSHOT] {} ready after {} poll(s), {} bytes",
                    path.display(),
                    poll,
                    last_size
                );
                return tokio::fs::read(path)
                    .await
                    .map_err(|source| ScreenshotWaitError::Io {
                        path: path.to_path_buf(),
                        source,
                    });
            }
        }
        if poll < polls {
            tokio::time::sleep(interval).await;
        }
    }

    Err(ScreenshotWaitError::NotReady {
        path: path.to_path_buf(),
        polls,
        last_size,
    })
}
