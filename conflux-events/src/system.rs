//! Composition root wiring adapters into the dispatcher.

use crate::adapter::{Adapter, handler_fn};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchResult, HandlerError};
use std::sync::Arc;
use tracing::{error, info};

/// Owns the dispatcher and a set of adapters; every event any registered
/// adapter emits is bridged straight into the dispatch queue.
pub struct AdapterSystem<C: Send + Sync + 'static> {
    dispatcher: Arc<Dispatcher<C>>,
    adapters: Vec<Arc<dyn Adapter>>,
}

impl<C: Send + Sync + 'static> AdapterSystem<C> {
    pub fn new(consumer: Arc<C>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(consumer)),
            adapters: Vec::new(),
        }
    }

    /// The dispatcher, for processor registration. Complete registration
    /// before [`start`](Self::start).
    pub fn dispatcher(&self) -> &Arc<Dispatcher<C>> {
        &self.dispatcher
    }

    /// Register `adapter` and subscribe the bridging handler that forwards
    /// its emitted events into the dispatcher.
    pub fn add_adapter(&mut self, adapter: Arc<dyn Adapter>) {
        info!(adapter = %adapter.name(), "adding adapter");
        let dispatcher = Arc::clone(&self.dispatcher);
        adapter.subscribe(handler_fn(move |event| {
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher
                    .dispatch(event)
                    .map_err(|e| HandlerError::Delivery(e.to_string()))
            }
        }));
        self.adapters.push(adapter);
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Start the dispatcher's consumer first, then connect every adapter in
    /// registration order — no adapter can emit into a dispatcher that is not
    /// yet draining. A failing connect is logged and does not stop the
    /// remaining adapters; the failing adapter reports through its own
    /// `Error` state and connection-error event.
    pub async fn start(&self) -> DispatchResult<()> {
        info!(adapters = self.adapters.len(), "adapter system starting");
        self.dispatcher.start().await?;
        for adapter in &self.adapters {
            info!(adapter = %adapter.name(), "connecting adapter");
            if let Err(e) = adapter.connect().await {
                error!(adapter = %adapter.name(), error = %e, "adapter connect failed");
            }
        }
        Ok(())
    }

    /// Disconnect every adapter in registration order, then stop the
    /// dispatcher. Everything the adapters enqueued before their disconnect
    /// drains before this returns.
    pub async fn stop(&self) {
        for adapter in &self.adapters {
            info!(adapter = %adapter.name(), "disconnecting adapter");
            if let Err(e) = adapter.disconnect().await {
                error!(adapter = %adapter.name(), error = %e, "adapter disconnect failed");
            }
        }
        self.dispatcher.stop().await;
        info!("adapter system stopped");
    }
}
