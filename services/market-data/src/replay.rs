//! Journal replay source
//!
//! Reads newline-delimited JSON `SourceEvent`s from a file and hands them
//! out in order, optionally paced at a fixed interval. Used for offline
//! runs and demos where no live feed is available.
//!
//! Lines that fail to parse are logged and skipped; blank lines are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{info, warn};

use crate::events::SourceEvent;
use crate::source::MarketDataSource;

/// Errors opening a replay journal.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to open replay journal {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source that replays a JSON-lines journal.
pub struct ReplaySource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    /// Delay between consecutive events.
    pace: Option<Duration>,
    line_no: u64,
    events_read: u64,
    lines_skipped: u64,
    exhausted: bool,
}

impl ReplaySource {
    pub async fn open(path: impl AsRef<Path>, pace: Option<Duration>) -> Result<Self, ReplayError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| ReplayError::Open {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), pace_ms = pace.map(|p| p.as_millis() as u64), "Opened replay journal");

        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            pace,
            line_no: 0,
            events_read: 0,
            lines_skipped: 0,
            exhausted: false,
        })
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    pub fn lines_skipped(&self) -> u64 {
        self.lines_skipped
    }

    async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(Some(line)) => {
                self.line_no += 1;
                Some(line)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path = %self.path.display(), line = self.line_no + 1, error = %e, "Replay journal read failed");
                None
            }
        }
    }
}

#[async_trait]
impl MarketDataSource for ReplaySource {
    async fn next_update(&mut self) -> Option<SourceEvent> {
        if self.exhausted {
            return None;
        }

        loop {
            let Some(line) = self.next_line().await else {
                self.exhausted = true;
                info!(
                    path = %self.path.display(),
                    events = self.events_read,
                    skipped = self.lines_skipped,
                    "Replay journal exhausted"
                );
                return None;
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<SourceEvent>(trimmed) {
                Ok(event) => {
                    if let (Some(pace), true) = (self.pace, self.events_read > 0) {
                        tokio::time::sleep(pace).await;
                    }
                    self.events_read += 1;
                    return Some(event);
                }
                Err(e) => {
                    self.lines_skipped += 1;
                    warn!(
                        path = %self.path.display(),
                        line = self.line_no,
                        error = %e,
                        "Skipping malformed replay line"
                    );
                }
            }
        }
    }

    fn name(&self) -> &str {
        "replay"
    }
}
