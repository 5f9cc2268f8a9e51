//! Event envelope and standard payload types.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide event identifier. Strictly increasing, never reused.
pub type EventId = u64;

/// One counter for the whole process; only `Event::new` touches it.
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(0);

/// Immutable, type-erased event envelope.
///
/// Wraps a payload of any `Send + Sync + 'static` type together with a
/// process-wide monotonic id and a monotonic timestamp. Cloning shares the
/// payload; the envelope lives until the last holder (emitting adapter,
/// dispatch queue, or handler) drops it.
#[derive(Clone)]
pub struct Event {
    id: EventId,
    timestamp: Instant,
    type_id: TypeId,
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Event {
    /// Wrap `payload` in a new envelope, assigning the next global id and the
    /// current monotonic clock reading. Infallible.
    pub fn new<T: Send + Sync + 'static>(payload: T) -> Self {
        Self {
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            timestamp: Instant::now(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            payload: Arc::new(payload),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Stable type tag of the payload, usable as a registry key.
    pub fn payload_type(&self) -> TypeId {
        self.type_id
    }

    /// Payload type name, for diagnostics only.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Send + Sync + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrow the payload as `T`, or `None` if the payload is another type.
    pub fn payload<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Shared handle to the payload as `T`, or `None` on a type mismatch.
    pub fn payload_arc<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// What a [`ConnectionEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    Connected,
    Disconnected,
    Error,
}

/// Connection lifecycle notification. Adapters emit these to their own
/// subscribers, not through the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub kind: ConnectionKind,
    /// Name of the adapter that produced the notification.
    pub source: String,
    pub details: String,
}

impl ConnectionEvent {
    pub fn connected(source: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind: ConnectionKind::Connected,
            source: source.into(),
            details: details.into(),
        }
    }

    pub fn disconnected(source: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind: ConnectionKind::Disconnected,
            source: source.into(),
            details: details.into(),
        }
    }

    pub fn error(source: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind: ConnectionKind::Error,
            source: source.into(),
            details: details.into(),
        }
    }
}

/// A keyed value observed by a data source, with the previous value when the
/// source tracks one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataUpdateEvent {
    pub source: String,
    pub key: String,
    pub value: serde_json::Value,
    pub previous: serde_json::Value,
}

impl DataUpdateEvent {
    pub fn new(
        source: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            source: source.into(),
            key: key.into(),
            value,
            previous: serde_json::Value::Null,
        }
    }

    pub fn with_previous(mut self, previous: serde_json::Value) -> Self {
        self.previous = previous;
        self
    }
}

/// Periodic liveness signal from a polling source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub source: String,
    pub interval: Duration,
}
