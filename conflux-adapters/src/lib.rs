//! Ready-made data source adapters for Conflux.
//!
//! Each adapter is a leaf producer over the `conflux-events` adapter base:
//! it owns its source plumbing, drives the standard connection state machine,
//! and emits typed events to its subscribers.
//!
//! - [`heartbeat`] - fixed-interval liveness ticks
//! - [`file`] - file watcher polling modification time (optionally content)
//! - [`tcp`] - newline-delimited frames from a TCP endpoint
//! - [`stdin`] - line-buffered interactive input
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conflux_adapters::heartbeat::heartbeat_adapter;
//! use conflux_events::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut system = AdapterSystem::new(Arc::new(engine));
//! system.dispatcher().register_forwarding::<HeartbeatEvent>();
//! system.add_adapter(Arc::new(heartbeat_adapter("pulse", Duration::from_secs(1))));
//! system.start().await?;
//! ```

pub mod file;
pub mod heartbeat;
pub mod stdin;
pub mod tcp;

pub use file::{FileWatcherConfig, FileWatcherSource, file_watcher};
pub use heartbeat::{HeartbeatSource, heartbeat_adapter};
pub use stdin::{LineInputEvent, StdinLineAdapter};
pub use tcp::TcpLineAdapter;
