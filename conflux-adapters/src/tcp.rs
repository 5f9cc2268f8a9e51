//! TCP line-frame client adapter.

use async_trait::async_trait;
use conflux_events::adapter::{Adapter, AdapterBase, AdapterState};
use conflux_events::error::{AdapterError, AdapterResult};
use conflux_events::event::{ConnectionEvent, DataUpdateEvent};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Connects to a TCP endpoint and emits one `DataUpdateEvent { key: "line" }`
/// per newline-delimited frame.
///
/// A failed dial leaves the adapter in the `Error` state with one
/// connection-error event; `connect()` may then be retried. A remote close
/// returns the adapter to `Disconnected`; a read error parks it in `Error`.
pub struct TcpLineAdapter {
    base: Arc<AdapterBase>,
    addr: String,
    task: Mutex<Option<ReaderTask>>,
}

struct ReaderTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TcpLineAdapter {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            base: Arc::new(AdapterBase::new(name)),
            addr: addr.into(),
            task: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Adapter for TcpLineAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.base.try_begin_connect()?;
        let stream = match TcpStream::connect(&self.addr).await {
            Ok(stream) => stream,
            Err(e) => {
                self.base.fail_connect(e.to_string()).await;
                return Err(AdapterError::Connection {
                    name: self.base.name().to_string(),
                    details: e.to_string(),
                });
            }
        };

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let base = Arc::clone(&self.base);
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            base.emit(DataUpdateEvent::new(base.name(), "line", json!(line)))
                                .await;
                        }
                        Ok(None) => {
                            debug!(adapter = %base.name(), "remote closed the connection");
                            base.set_state(AdapterState::Disconnected);
                            base.emit(ConnectionEvent::disconnected(base.name(), "remote closed"))
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
        self.base
            .complete_connect(format!("connected to {}", self.addr))
            .await;
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
            warn!(adapter = %self.base.name(), error = %e, "reader task join failed");
        }
        // The reader records Disconnected/Error itself when the remote went
        // away first; only a locally initiated teardown transitions here.
        if was_connected {
            self.base.set_state(AdapterState::Disconnected);
            self.base
                .emit(ConnectionEvent::disconnected(self.base.name(), "disconnected"))
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_events::event::ConnectionKind;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_failure_enters_error_state() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let adapter = TcpLineAdapter::new("socket", addr.to_string());
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        adapter.subscribe(conflux_events::adapter::handler_fn(move |event| {
            let errors = Arc::clone(&counter);
            async move {
                if let Some(conn) = event.payload::<ConnectionEvent>()
                    && conn.kind == ConnectionKind::Error
                {
                    errors.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        }));

        assert!(adapter.connect().await.is_err());
        assert_eq!(adapter.state(), AdapterState::Error);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // Nothing to tear down, but disconnect stays safe to call.
        adapter.disconnect().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Error);

        // With a listener back on the same port, an explicit retry succeeds.
        let listener = TcpListener::bind(addr).await.unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Keep the connection open while the client is under test.
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });
        adapter.connect().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Connected);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        adapter.disconnect().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Disconnected);
    }

    #[tokio::test]
    async fn test_lines_become_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"alpha\nbeta\n").await.unwrap();
            socket.flush().await.unwrap();
            // Hold the socket open until the client walks away.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let adapter = TcpLineAdapter::new("socket", addr.to_string());
        let lines = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        adapter.subscribe(conflux_events::adapter::handler_fn(move |event| {
            let lines = Arc::clone(&sink);
            async move {
                if let Some(update) = event.payload::<DataUpdateEvent>()
                    && update.key == "line"
                {
                    lines.lock().unwrap().push(update.value.clone());
                }
                Ok(())
            }
        }));

        adapter.connect().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Connected);

        for _ in 0..200 {
            if lines.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            *lines.lock().unwrap(),
            vec![json!("alpha"), json!("beta")]
        );

        adapter.disconnect().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Disconnected);
        server.abort();
    }

    #[tokio::test]
    async fn test_remote_close_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let adapter = TcpLineAdapter::new("socket", addr.to_string());
        adapter.connect().await.unwrap();

        for _ in 0..200 {
            if adapter.state() == AdapterState::Disconnected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(adapter.state(), AdapterState::Disconnected);

        adapter.disconnect().await.unwrap();
    }
}
