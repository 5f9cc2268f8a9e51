//! Error types for event handling, dispatch, and adapter lifecycle.

use crate::adapter::AdapterState;
use thiserror::Error;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Failure of a single subscriber or pipeline stage during `emit`.
///
/// These are contained at the emit site: the failing handler is logged and
/// the remaining handlers still run.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler-specific failure
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler could not hand the event onward (e.g. dispatcher stopped)
    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// Dispatcher-side errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The consumer has exited; no new events are accepted
    #[error("dispatcher is stopped")]
    Stopped,

    /// `start()` was called more than once (or after `stop()`)
    #[error("dispatcher consumer already started")]
    AlreadyStarted,

    /// A registered processor failed for one event
    #[error("processor failed: {0}")]
    Processor(String),
}

/// Adapter lifecycle errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// `connect()` called from a state that does not permit it
    #[error("adapter '{name}' cannot connect while {state}")]
    InvalidTransition { name: String, state: AdapterState },

    /// The underlying source could not be established
    #[error("adapter '{name}' connection failed: {details}")]
    Connection { name: String, details: String },

    /// I/O error from the underlying source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
