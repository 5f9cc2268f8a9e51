//! File watcher adapter: polls metadata and emits updates on change.

use async_trait::async_trait;
use conflux_events::adapter::{AdapterBase, PollSource, PollingAdapter};
use conflux_events::error::AdapterResult;
use conflux_events::event::{ConnectionEvent, DataUpdateEvent};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// File watcher configuration.
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// File to observe
    pub path: PathBuf,

    /// Polling interval
    pub interval: Duration,

    /// Emit the file's content (with the previous content) instead of a bare
    /// modification notice
    pub emit_content: bool,
}

impl FileWatcherConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::from_millis(500),
            emit_content: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_content(mut self, emit_content: bool) -> Self {
        self.emit_content = emit_content;
        self
    }
}

struct WatchState {
    last_modified: Option<SystemTime>,
    last_content: Option<String>,
}

/// Poll source tracking one file's modification time.
///
/// The first poll of an existing file counts as a change, so subscribers get
/// an initial snapshot. Watch keys: `file_modified` (or `content` when
/// configured), `file_deleted`.
pub struct FileWatcherSource {
    config: FileWatcherConfig,
    state: Mutex<WatchState>,
}

#[async_trait]
impl PollSource for FileWatcherSource {
    async fn poll(&self, base: &AdapterBase) -> AdapterResult<()> {
        match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) => {
                let modified = meta.modified().ok();
                let changed = {
                    let mut state = self.state.lock().unwrap();
                    if state.last_modified != modified {
                        state.last_modified = modified;
                        true
                    } else {
                        false
                    }
                };
                if changed {
                    self.emit_change(base).await;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let deleted = {
                    let mut state = self.state.lock().unwrap();
                    if state.last_modified.is_some() {
                        state.last_modified = None;
                        state.last_content = None;
                        true
                    } else {
                        false
                    }
                };
                if deleted {
                    base.emit(DataUpdateEvent::new(
                        base.name(),
                        "file_deleted",
                        json!(self.config.path.display().to_string()),
                    ))
                    .await;
                }
            }
            Err(e) => {
                // Transient filesystem trouble; keep polling.
                base.emit(ConnectionEvent::error(base.name(), e.to_string()))
                    .await;
            }
        }
        Ok(())
    }
}

impl FileWatcherSource {
    async fn emit_change(&self, base: &AdapterBase) {
        if self.config.emit_content {
            let content = tokio::fs::read_to_string(&self.config.path)
                .await
                .unwrap_or_default();
            let previous = {
                let mut state = self.state.lock().unwrap();
                state.last_content.replace(content.clone())
            };
            base.emit(
                DataUpdateEvent::new(base.name(), "content", json!(content))
                    .with_previous(previous.map_or(serde_json::Value::Null, |p| json!(p))),
            )
            .await;
        } else {
            base.emit(DataUpdateEvent::new(
                base.name(),
                "file_modified",
                json!(self.config.path.display().to_string()),
            ))
            .await;
        }
    }
}

/// Build a file watcher adapter for `config`.
pub fn file_watcher(
    name: impl Into<String>,
    config: FileWatcherConfig,
) -> PollingAdapter<FileWatcherSource> {
    let interval = config.interval;
    PollingAdapter::new(
        name,
        interval,
        FileWatcherSource {
            config,
            state: Mutex::new(WatchState {
                last_modified: None,
                last_content: None,
            }),
        },
    )
}
