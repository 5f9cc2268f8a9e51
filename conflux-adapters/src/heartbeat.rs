//! Interval heartbeat source.

use async_trait::async_trait;
use conflux_events::adapter::{AdapterBase, PollSource, PollingAdapter};
use conflux_events::error::AdapterResult;
use conflux_events::event::HeartbeatEvent;
use std::time::Duration;

/// Poll source that emits one [`HeartbeatEvent`] per polling pass.
///
/// Useful as a liveness signal and as the simplest possible producer when
/// wiring up a new system.
pub struct HeartbeatSource {
    interval: Duration,
}

#[async_trait]
impl PollSource for HeartbeatSource {
    async fn poll(&self, base: &AdapterBase) -> AdapterResult<()> {
        base.emit(HeartbeatEvent {
            source: base.name().to_string(),
            interval: self.interval,
        })
        .await;
        Ok(())
    }
}

/// Build a heartbeat adapter beating at `interval`.
pub fn heartbeat_adapter(
    name: impl Into<String>,
    interval: Duration,
) -> PollingAdapter<HeartbeatSource> {
    PollingAdapter::new(name, interval, HeartbeatSource { interval })
}
