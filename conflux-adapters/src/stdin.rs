//! Line-buffered standard-input adapter.

use async_trait::async_trait;
use conflux_events::adapter::{Adapter, AdapterBase, AdapterState};
use conflux_events::error::AdapterResult;
use conflux_events::event::ConnectionEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One line of interactive input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineInputEvent {
    pub source: String,
    pub line: String,
}

/// Reads newline-terminated input from stdin and emits one
/// [`LineInputEvent`] per line.
///
/// Line-buffered only: raw key handling belongs to the terminal layer, not to
/// an event source.
pub struct StdinLineAdapter {
    base: Arc<AdapterBase>,
    task: Mutex<Option<ReaderTask>>,
}

struct ReaderTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl StdinLineAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: Arc::new(AdapterBase::new(name)),
            task: Mutex::new(None),
        }
    }
}

impl Default for StdinLineAdapter {
    fn default() -> Self {
        Self::new("stdin")
    }
}

#[async_trait]
impl Adapter for StdinLineAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.base.try_begin_connect()?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let base = Arc::clone(&self.base);
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            base.emit(LineInputEvent {
                                source: base.name().to_string(),
                                line,
                            })
                            .await;
                        }
                        Ok(None) => {
                            debug!(adapter = %base.name(), "stdin reached end of input");
                            base.set_state(AdapterState::Disconnected);
                            base.emit(ConnectionEvent::disconnected(base.name(), "end of input"))
                                .await;
                            break;
                        }
                        Err(e) => {
                            base.set_state(AdapterState::Error);
                            base.emit(ConnectionEvent::error(base.name(), e.to_string())).await;
                            break;
                        }
                    },
                }
            }
        });

        *self.task.lock().await = Some(ReaderTask {
            stop: stop_tx,
            handle,
        });
        self.base.complete_connect("reading stdin lines").await;
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        let was_connected = self.base.state() == AdapterState::Connected;
        if was_connected {
            self.base.set_state(AdapterState::Disconnecting);
        }
        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            warn!(adapter = %self.base.name(), error = %e, "stdin task join failed");
        }
        if was_connected {
            self.base.set_state(AdapterState::Disconnected);
            self.base
                .emit(ConnectionEvent::disconnected(self.base.name(), "input closed"))
                .await;
        }
        Ok(())
    }
}
