//! Typed event dispatch and adapter lifecycle for Conflux.
//!
//! This crate decouples heterogeneous data producers from a single consumer
//! by routing typed events through a thread-safe dispatch layer.
//!
//! ## Pieces
//!
//! - **[`Event`]** - immutable, identity-bearing, type-erased envelope
//! - **[`Adapter`]** - named producer with a connection state machine and an
//!   ordered subscriber list
//! - **[`Dispatcher`]** - FIFO queue plus type-indexed processor registry,
//!   drained by a single consumer task
//! - **[`Pipeline`]** - filter-then-transform chain gating and reshaping
//!   events ahead of a terminal handler
//! - **[`AdapterSystem`]** - composition root wiring adapters into the
//!   dispatcher with ordered start/stop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conflux_events::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone)]
//! struct Tick { count: u32 }
//!
//! struct Engine;
//!
//! #[async_trait]
//! impl Consumer for Engine {
//!     async fn process(&self, event: &Event) -> ProcessOutcome {
//!         println!("engine saw {:?}", event);
//!         ProcessOutcome::Accepted
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut system = AdapterSystem::new(Arc::new(Engine));
//!     system.dispatcher().register_forwarding::<Tick>();
//!     // system.add_adapter(...);
//!     system.start().await?;
//!     // ...
//!     system.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - Event ids are process-wide, strictly increasing, and never reused.
//! - Dispatch order: `dispatch` calls that complete sequentially are consumed
//!   in that order; concurrent calls interleave in enqueue order.
//! - Events enqueued before `stop()` is invoked are drained before `stop()`
//!   returns.
//! - One failing subscriber or processor never halts its siblings or the
//!   consumer loop.

pub mod adapter;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod system;

pub use adapter::{
    Adapter, AdapterBase, AdapterState, EventHandler, PollSource, PollingAdapter, handler_fn,
};
pub use dispatcher::{Consumer, Dispatcher, ProcessOutcome, Processor};
pub use error::{AdapterError, AdapterResult, DispatchError, DispatchResult, HandlerError};
pub use event::{
    ConnectionEvent, ConnectionKind, DataUpdateEvent, Event, EventId, HeartbeatEvent,
};
pub use pipeline::{
    AndFilter, Filter, FilterMapTransform, FilteredHandler, MapTransform, NotFilter, OrFilter,
    Pipeline, PredicateFilter, Transform, TypeFilter, TypedPredicateFilter,
};
pub use system::AdapterSystem;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapter::{
        Adapter, AdapterBase, AdapterState, EventHandler, PollSource, PollingAdapter, handler_fn,
    };
    pub use crate::dispatcher::{Consumer, Dispatcher, ProcessOutcome};
    pub use crate::error::{
        AdapterError, AdapterResult, DispatchError, DispatchResult, HandlerError,
    };
    pub use crate::event::{
        ConnectionEvent, ConnectionKind, DataUpdateEvent, Event, EventId, HeartbeatEvent,
    };
    pub use crate::pipeline::{Filter, FilteredHandler, Pipeline, Transform};
    pub use crate::system::AdapterSystem;
}
