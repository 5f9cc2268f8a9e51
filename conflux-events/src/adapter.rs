//! Adapter base: connection state machine, subscriber fan-out, polling loop.
//!
//! An adapter is a named producer. It owns an ordered subscriber list and a
//! connection state machine; concrete adapters implement `connect` /
//! `disconnect` and call [`AdapterBase::emit`] from whatever task feeds them.

use crate::error::{AdapterError, AdapterResult, HandlerError};
use crate::event::{ConnectionEvent, Event};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Connection state of an adapter.
///
/// Written only by the owning adapter, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdapterState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
    Error = 4,
}

impl AdapterState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            _ => Self::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscriber callback invoked for every event an adapter emits.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<(), HandlerError>;
}

/// Closure-backed [`EventHandler`].
struct FnHandler {
    f: Box<
        dyn Fn(Event) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>
            + Send
            + Sync,
    >,
}

#[async_trait]
impl EventHandler for FnHandler {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        (self.f)(event).await
    }
}

/// Wrap an async closure as a shareable [`EventHandler`].
///
/// The returned `Arc` is the handler's identity for `unsubscribe`.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler {
        f: Box::new(
            move |event| -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>> {
                Box::pin(f(event))
            },
        ),
    })
}

/// Shared plumbing for every adapter: name, atomic state cell, ordered
/// subscriber list, and the emit fan-out.
pub struct AdapterBase {
    name: String,
    state: AtomicU8,
    subscribers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl AdapterBase {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(adapter = %name, "adapter created");
        Self {
            name,
            state: AtomicU8::new(AdapterState::Disconnected as u8),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Record a state transition. Only the owning adapter calls this.
    pub fn set_state(&self, new_state: AdapterState) {
        let old = AdapterState::from_u8(self.state.swap(new_state as u8, Ordering::SeqCst));
        if old != new_state {
            info!(adapter = %self.name, from = %old, to = %new_state, "adapter state changed");
        }
    }

    /// Reserve the `Connecting` slot.
    ///
    /// Permitted from `Disconnected` and from `Error` (the explicit retry
    /// path); `connect()` while `Connecting`, `Connected`, or `Disconnecting`
    /// is rejected with [`AdapterError::InvalidTransition`].
    pub fn try_begin_connect(&self) -> AdapterResult<()> {
        for from in [AdapterState::Disconnected, AdapterState::Error] {
            if self
                .state
                .compare_exchange(
                    from as u8,
                    AdapterState::Connecting as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                info!(adapter = %self.name, from = %from, to = %AdapterState::Connecting, "adapter state changed");
                return Ok(());
            }
        }
        Err(AdapterError::InvalidTransition {
            name: self.name.clone(),
            state: self.state(),
        })
    }

    /// Finish a successful `connect()`: enter `Connected` and notify the
    /// adapter's own subscribers.
    pub async fn complete_connect(&self, details: impl Into<String>) {
        self.set_state(AdapterState::Connected);
        self.emit(ConnectionEvent::connected(&self.name, details)).await;
    }

    /// Fail a `connect()` attempt: enter `Error` and emit exactly one
    /// connection-error event. Recovery is an explicit `connect()` retry.
    pub async fn fail_connect(&self, details: impl Into<String>) {
        self.set_state(AdapterState::Error);
        self.emit(ConnectionEvent::error(&self.name, details)).await;
    }

    /// Append a subscriber. Duplicates are allowed and are each invoked once
    /// per emit; insertion order is delivery order.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.push(handler);
        debug!(adapter = %self.name, total = subscribers.len(), "handler subscribed");
    }

    /// Subscribe an async closure; returns the handler handle for later
    /// `unsubscribe`.
    pub fn subscribe_fn<F, Fut>(&self, f: F) -> Arc<dyn EventHandler>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler = handler_fn(f);
        self.subscribe(Arc::clone(&handler));
        handler
    }

    /// Remove every entry with the same handler identity. Returns how many
    /// were removed.
    pub fn unsubscribe(&self, handler: &Arc<dyn EventHandler>) -> usize {
        let mut subscribers = self.subscribers.write().unwrap();
        let before = subscribers.len();
        subscribers.retain(|existing| !Arc::ptr_eq(existing, handler));
        let removed = before - subscribers.len();
        debug!(adapter = %self.name, removed, remaining = subscribers.len(), "handler unsubscribed");
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    /// Wrap `payload` in a fresh envelope and fan it out.
    pub async fn emit<T: Send + Sync + 'static>(&self, payload: T) {
        self.emit_event(Event::new(payload)).await;
    }

    /// Deliver `event` to every current subscriber, sequentially and in
    /// subscription order, on the calling task. A failing handler is logged
    /// and does not stop the remaining handlers. No I/O happens here; the
    /// subscriber list is snapshotted under a short read lock before any
    /// handler runs.
    pub async fn emit_event(&self, event: Event) {
        trace!(
            adapter = %self.name,
            event_type = event.type_name(),
            event_id = event.id(),
            "emitting event"
        );
        let handlers: Vec<Arc<dyn EventHandler>> = self.subscribers.read().unwrap().clone();
        for handler in handlers {
            if let Err(e) = handler.handle(event.clone()).await {
                error!(
                    adapter = %self.name,
                    event_type = event.type_name(),
                    event_id = event.id(),
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }
}

/// A named event producer with a connection lifecycle.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Shared adapter plumbing (state cell and subscriber list).
    fn base(&self) -> &AdapterBase;

    /// Establish the underlying source.
    ///
    /// Re-entry policy is [`AdapterBase::try_begin_connect`]: allowed from
    /// `Disconnected` and `Error` only. On failure the adapter ends in the
    /// `Error` state, emits one connection-error event to its own
    /// subscribers, and may be retried with another `connect()`.
    async fn connect(&self) -> AdapterResult<()>;

    /// Tear the source down, joining any background task it owns. A no-op
    /// when nothing is running.
    async fn disconnect(&self) -> AdapterResult<()>;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn state(&self) -> AdapterState {
        self.base().state()
    }

    fn is_connected(&self) -> bool {
        self.state() == AdapterState::Connected
    }

    fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.base().subscribe(handler)
    }

    fn unsubscribe(&self, handler: &Arc<dyn EventHandler>) -> usize {
        self.base().unsubscribe(handler)
    }
}

/// A polling data source driven by [`PollingAdapter`] at a fixed interval.
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    /// Validate the source before the polling loop starts. An `Err` fails the
    /// `connect()` and leaves the adapter in the `Error` state.
    async fn on_connect(&self, base: &AdapterBase) -> AdapterResult<()> {
        let _ = base;
        Ok(())
    }

    /// One polling pass. Errors are logged; the loop keeps running.
    async fn poll(&self, base: &AdapterBase) -> AdapterResult<()>;
}

/// Adapter driving a [`PollSource`] on its own background task.
pub struct PollingAdapter<S: PollSource> {
    base: Arc<AdapterBase>,
    source: Arc<S>,
    interval: Duration,
    task: Mutex<Option<PollTask>>,
}

struct PollTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl<S: PollSource> PollingAdapter<S> {
    pub fn new(name: impl Into<String>, interval: Duration, source: S) -> Self {
        Self {
            base: Arc::new(AdapterBase::new(name)),
            source: Arc::new(source),
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl<S: PollSource> Adapter for PollingAdapter<S> {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.base.try_begin_connect()?;
        if let Err(e) = self.source.on_connect(&self.base).await {
            self.base.fail_connect(e.to_string()).await;
            return Err(e);
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let base = Arc::clone(&self.base);
        let source = Arc::clone(&self.source);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            debug!(adapter = %base.name(), "polling task started");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = source.poll(&base).await {
                            error!(adapter = %base.name(), error = %e, "poll failed");
                        }
                    }
                }
            }
            debug!(adapter = %base.name(), "polling task stopped");
        });

        *self.task.lock().await = Some(PollTask {
            stop: stop_tx,
            handle,
        });
        self.base
            .complete_connect(format!("polling every {:?}", self.interval))
            .await;
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        self.base.set_state(AdapterState::Disconnecting);
        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            warn!(adapter = %self.base.name(), error = %e, "polling task join failed");
        }
        self.base.set_state(AdapterState::Disconnected);
        self.base
            .emit(ConnectionEvent::disconnected(self.base.name(), "polling stopped"))
            .await;
        Ok(())
    }
}
