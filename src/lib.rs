// Conflux - typed event dispatch and source adapters for Rust
//
// This library routes typed events from heterogeneous producers (files,
// sockets, timers, stdin) through a thread-safe dispatch layer to a single
// consumer, with composable filter/transform pipelines in between.

// Re-export core functionality
pub use conflux_events::*;

// Re-export the bundled source adapters
#[cfg(feature = "adapters")]
pub use conflux_adapters;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Adapter,
        AdapterBase,
        AdapterError,
        AdapterResult,
        AdapterState,
        AdapterSystem,
        AndFilter,
        ConnectionEvent,
        ConnectionKind,
        Consumer,
        DataUpdateEvent,
        DispatchError,
        DispatchResult,
        Dispatcher,
        Event,
        EventHandler,
        EventId,
        Filter,
        FilteredHandler,
        HandlerError,
        HeartbeatEvent,
        NotFilter,
        OrFilter,
        Pipeline,
        PollSource,
        PollingAdapter,
        ProcessOutcome,
        Transform,
        TypeFilter,
        TypedPredicateFilter,
        handler_fn,
    };

    #[cfg(feature = "adapters")]
    pub use conflux_adapters::{
        FileWatcherConfig, LineInputEvent, StdinLineAdapter, TcpLineAdapter, file_watcher,
        heartbeat_adapter,
    };
}
