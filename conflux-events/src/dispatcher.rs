//! Thread-safe event dispatch: FIFO queue, type-indexed processor registry,
//! single consumer task.
//!
//! The dispatcher decouples production rate from consumption rate. Producers
//! enqueue from any task via [`Dispatcher::dispatch`]; one consumer task pops
//! events in FIFO order and routes each to the processor registered for its
//! payload type, which drives the external consumer.

use crate::error::{DispatchError, DispatchResult};
use crate::event::Event;
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::TypeId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Outcome reported by the external consumer for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Accepted,
    Rejected,
}

/// The opaque downstream collaborator driven by registered processors.
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    async fn process(&self, event: &Event) -> ProcessOutcome;
}

/// Type-erased processor stored in the registry.
pub type Processor<C> = Arc<
    dyn Fn(Event, Arc<C>) -> Pin<Box<dyn Future<Output = DispatchResult<()>> + Send>>
        + Send
        + Sync,
>;

struct Registration<C> {
    type_name: &'static str,
    run: Processor<C>,
}

enum QueueItem {
    Event(Event),
    Shutdown,
}

/// Thread-safe dispatch queue plus type-indexed processor registry.
///
/// Generic over the external consumer type `C`; processors receive the event
/// and a shared handle to the consumer. Registration is meant to complete
/// before [`start`](Self::start) — the registry tolerates concurrent reads,
/// but racing a registration against in-flight dispatch of the same type is
/// the caller's responsibility to avoid.
///
/// Processors must be reasonably fast and non-blocking: shutdown is
/// cooperative, and a processor that never returns blocks `stop()`
/// indefinitely.
pub struct Dispatcher<C> {
    consumer: Arc<C>,
    processors: Arc<DashMap<TypeId, Registration<C>>>,
    tx: mpsc::UnboundedSender<QueueItem>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueueItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl<C: Send + Sync + 'static> Dispatcher<C> {
    pub fn new(consumer: Arc<C>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!("dispatcher created");
        Self {
            consumer,
            processors: Arc::new(DashMap::new()),
            tx,
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Install `processor` for payload type `T`, replacing any prior
    /// registration for that type.
    pub fn register_processor<T, F, Fut>(&self, processor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DispatchResult<()>> + Send + 'static,
    {
        let run: Processor<C> = Arc::new(
            move |event: Event,
                  consumer: Arc<C>|
                  -> Pin<Box<dyn Future<Output = DispatchResult<()>> + Send>> {
                match event.payload_arc::<T>() {
                    Some(payload) => Box::pin(processor(payload, consumer)),
                    // The registry keys on TypeId, so this arm is unreachable.
                    None => Box::pin(async { DispatchResult::Ok(()) }),
                }
            },
        );
        self.insert::<T>(run);
    }

    fn insert<T: Send + Sync + 'static>(&self, run: Processor<C>) {
        let type_name = std::any::type_name::<T>();
        let replaced = self
            .processors
            .insert(TypeId::of::<T>(), Registration { type_name, run });
        if replaced.is_some() {
            debug!(event_type = type_name, "processor replaced");
        } else {
            debug!(event_type = type_name, "processor registered");
        }
    }

    /// Whether a processor is registered for payload type `T`.
    pub fn has_processor<T: Send + Sync + 'static>(&self) -> bool {
        self.processors.contains_key(&TypeId::of::<T>())
    }

    /// Append `event` to the tail of the dispatch queue. O(1), callable
    /// concurrently from any number of producer tasks.
    ///
    /// Every event enqueued before `stop()` is invoked reaches its processor
    /// (or the dropped-as-unroutable warning) before `stop()` returns. Fails
    /// with [`DispatchError::Stopped`] once the consumer has exited.
    pub fn dispatch(&self, event: Event) -> DispatchResult<()> {
        trace!(
            event_type = event.type_name(),
            event_id = event.id(),
            "dispatching event"
        );
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(QueueItem::Event(event)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            DispatchError::Stopped
        })
    }

    /// Number of events enqueued but not yet handed to a processor.
    pub fn pending_events(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Spawn the single consumer task.
    ///
    /// Fails with [`DispatchError::AlreadyStarted`] if the consumer is or was
    /// ever running; a stopped dispatcher cannot be restarted.
    pub async fn start(&self) -> DispatchResult<()> {
        let rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or(DispatchError::AlreadyStarted)?;

        info!("dispatcher starting");
        let processors = Arc::clone(&self.processors);
        let consumer = Arc::clone(&self.consumer);
        let pending = Arc::clone(&self.pending);
        let handle = tokio::spawn(consume_loop(rx, processors, consumer, pending));
        *self.worker.lock().await = Some(handle);
        Ok(())
    }

    /// Request shutdown and wait for the consumer to exit.
    ///
    /// Everything enqueued before this call drains first: the shutdown marker
    /// rides the same FIFO queue, so the consumer reaches it only after all
    /// earlier events. Events dispatched concurrently with `stop()` have
    /// unspecified delivery; `dispatch` after the consumer exits fails with
    /// [`DispatchError::Stopped`]. Idempotent — a second call returns
    /// promptly without a double join.
    pub async fn stop(&self) {
        info!("dispatcher stopping");
        let _ = self.tx.send(QueueItem::Shutdown);
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatcher consumer join failed");
            }
            info!("dispatcher stopped");
        }
    }
}

impl<C: Consumer> Dispatcher<C> {
    /// Forward the whole envelope for payload type `T` straight to the
    /// consumer's `process`.
    pub fn register_forwarding<T: Send + Sync + 'static>(&self) {
        let run: Processor<C> = Arc::new(
            move |event: Event,
                  consumer: Arc<C>|
                  -> Pin<Box<dyn Future<Output = DispatchResult<()>> + Send>> {
                Box::pin(async move {
                    if consumer.process(&event).await == ProcessOutcome::Rejected {
                        debug!(
                            event_type = event.type_name(),
                            event_id = event.id(),
                            "consumer rejected event"
                        );
                    }
                    Ok(())
                })
            },
        );
        self.insert::<T>(run);
    }

    /// Convert payload `T` into `U`, wrap the result in a fresh envelope, and
    /// hand it to the consumer.
    pub fn register_mapping<T, U, F>(&self, convert: F)
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let run: Processor<C> = Arc::new(
            move |event: Event,
                  consumer: Arc<C>|
                  -> Pin<Box<dyn Future<Output = DispatchResult<()>> + Send>> {
                let mapped = event.payload::<T>().map(|payload| Event::new(convert(payload)));
                Box::pin(async move {
                    if let Some(mapped) = mapped
                        && consumer.process(&mapped).await == ProcessOutcome::Rejected
                    {
                        debug!(
                            event_type = mapped.type_name(),
                            event_id = mapped.id(),
                            "consumer rejected event"
                        );
                    }
                    Ok(())
                })
            },
        );
        self.insert::<T>(run);
    }
}

async fn consume_loop<C: Send + Sync + 'static>(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    processors: Arc<DashMap<TypeId, Registration<C>>>,
    consumer: Arc<C>,
    pending: Arc<AtomicUsize>,
) {
    debug!("dispatcher consumer started");
    while let Some(item) = rx.recv().await {
        let event = match item {
            QueueItem::Shutdown => break,
            QueueItem::Event(event) => event,
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        // Clone out of the registry so no map guard is held across the await.
        let registration = processors
            .get(&event.payload_type())
            .map(|r| (r.type_name, Arc::clone(&r.run)));
        let Some((type_name, run)) = registration else {
            warn!(
                event_type = event.type_name(),
                event_id = event.id(),
                "no processor registered, dropping event"
            );
            continue;
        };

        let event_id = event.id();
        trace!(event_type = type_name, event_id, "processing event");
        // Spawn-and-await confines a panicking processor to this one event;
        // the drain loop itself must never die.
        match tokio::spawn(run(event, Arc::clone(&consumer))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(event_type = type_name, event_id, error = %e, "processor failed");
            }
            Err(e) => {
                error!(event_type = type_name, event_id, error = %e, "processor panicked");
            }
        }
    }
    debug!("dispatcher consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Tick {
        count: u32,
    }

    #[derive(Debug, Clone)]
    struct Label {
        text: String,
    }

    struct CollectingConsumer {
        seen: StdMutex<Vec<String>>,
        reject: bool,
    }

    impl CollectingConsumer {
        fn new() -> Self {
            Self {
                seen: StdMutex::new(Vec::new()),
                reject: false,
            }
        }
    }

    #[async_trait]
    impl Consumer for CollectingConsumer {
        async fn process(&self, event: &Event) -> ProcessOutcome {
            self.seen.lock().unwrap().push(event.type_name().to_string());
            if self.reject {
                ProcessOutcome::Rejected
            } else {
                ProcessOutcome::Accepted
            }
        }
    }

    fn tick_recorder(dispatcher: &Dispatcher<()>, sink: Arc<StdMutex<Vec<u32>>>) {
        dispatcher.register_processor::<Tick, _, _>(move |tick, _consumer| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(tick.count);
                Ok(())
            }
        });
    }

    #[tokio::test]
    async fn test_sequential_dispatch_is_fifo() {
        let dispatcher = Dispatcher::new(Arc::new(()));
        let sink = Arc::new(StdMutex::new(Vec::new()));
        tick_recorder(&dispatcher, Arc::clone(&sink));

        dispatcher.start().await.unwrap();
        for count in 1..=3 {
            dispatcher.dispatch(Event::new(Tick { count })).unwrap();
        }
        dispatcher.stop().await;

        assert_eq!(*sink.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unroutable_event_is_dropped_without_crash() {
        let dispatcher = Dispatcher::new(Arc::new(()));
        let sink = Arc::new(StdMutex::new(Vec::new()));
        tick_recorder(&dispatcher, Arc::clone(&sink));

        dispatcher.start().await.unwrap();
        dispatcher.dispatch(Event::new("no processor for str")).unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 9 })).unwrap();
        dispatcher.stop().await;

        assert_eq!(*sink.lock().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_stop_drains_everything_already_enqueued() {
        let dispatcher = Dispatcher::new(Arc::new(()));
        let sink = Arc::new(StdMutex::new(Vec::new()));
        tick_recorder(&dispatcher, Arc::clone(&sink));

        dispatcher.start().await.unwrap();
        for count in 0..100 {
            dispatcher.dispatch(Event::new(Tick { count })).unwrap();
        }
        dispatcher.stop().await;

        assert_eq!(sink.lock().unwrap().len(), 100);
        assert_eq!(dispatcher.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dispatcher = Arc::new(Dispatcher::<()>::new(Arc::new(())));
        dispatcher.start().await.unwrap();

        let first = Arc::clone(&dispatcher);
        let second = Arc::clone(&dispatcher);
        tokio::join!(first.stop(), second.stop());

        // A third call after the fact returns promptly too.
        tokio::time::timeout(Duration::from_secs(1), dispatcher.stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_after_stop_fails() {
        let dispatcher = Dispatcher::new(Arc::new(()));
        dispatcher.start().await.unwrap();
        dispatcher.stop().await;

        let err = dispatcher.dispatch(Event::new(Tick { count: 1 })).unwrap_err();
        assert!(matches!(err, DispatchError::Stopped));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dispatcher = Dispatcher::<()>::new(Arc::new(()));
        dispatcher.start().await.unwrap();
        assert!(matches!(
            dispatcher.start().await,
            Err(DispatchError::AlreadyStarted)
        ));
        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let dispatcher = Dispatcher::new(Arc::new(()));
        let sink = Arc::new(StdMutex::new(Vec::new()));

        let stale = Arc::clone(&sink);
        dispatcher.register_processor::<Tick, _, _>(move |_tick, _consumer| {
            let sink = Arc::clone(&stale);
            async move {
                sink.lock().unwrap().push(0);
                Ok(())
            }
        });
        let live = Arc::clone(&sink);
        dispatcher.register_processor::<Tick, _, _>(move |tick, _consumer| {
            let sink = Arc::clone(&live);
            async move {
                sink.lock().unwrap().push(tick.count);
                Ok(())
            }
        });

        dispatcher.start().await.unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 5 })).unwrap();
        dispatcher.stop().await;

        assert_eq!(*sink.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_failing_processor_does_not_halt_the_loop() {
        let dispatcher = Dispatcher::new(Arc::new(()));
        let sink = Arc::new(StdMutex::new(Vec::new()));

        dispatcher.register_processor::<Label, _, _>(|_label, _consumer| async {
            Err(DispatchError::Processor("intentional".into()))
        });
        tick_recorder(&dispatcher, Arc::clone(&sink));

        dispatcher.start().await.unwrap();
        dispatcher
            .dispatch(Event::new(Label { text: "bad".into() }))
            .unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 2 })).unwrap();
        dispatcher.stop().await;

        assert_eq!(*sink.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_panicking_processor_does_not_halt_the_loop() {
        let dispatcher = Dispatcher::new(Arc::new(()));
        let sink = Arc::new(StdMutex::new(Vec::new()));

        dispatcher.register_processor::<Label, _, _>(|_label, _consumer| async {
            panic!("intentional");
        });
        tick_recorder(&dispatcher, Arc::clone(&sink));

        dispatcher.start().await.unwrap();
        dispatcher
            .dispatch(Event::new(Label { text: "bad".into() }))
            .unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 3 })).unwrap();
        dispatcher.stop().await;

        assert_eq!(*sink.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_forwarding_reaches_consumer() {
        let consumer = Arc::new(CollectingConsumer::new());
        let dispatcher = Dispatcher::new(Arc::clone(&consumer));
        dispatcher.register_forwarding::<Tick>();

        dispatcher.start().await.unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 1 })).unwrap();
        dispatcher.stop().await;

        let seen = consumer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("Tick"));
    }

    #[tokio::test]
    async fn test_mapping_rewraps_payload() {
        let consumer = Arc::new(CollectingConsumer::new());
        let dispatcher = Dispatcher::new(Arc::clone(&consumer));
        dispatcher.register_mapping::<Tick, Label, _>(|tick| Label {
            text: format!("tick {}", tick.count),
        });

        dispatcher.start().await.unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 4 })).unwrap();
        dispatcher.stop().await;

        let seen = consumer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("Label"));
    }

    #[tokio::test]
    async fn test_rejected_outcome_is_not_an_error() {
        let consumer = Arc::new(CollectingConsumer {
            seen: StdMutex::new(Vec::new()),
            reject: true,
        });
        let dispatcher = Dispatcher::new(Arc::clone(&consumer));
        dispatcher.register_forwarding::<Tick>();

        dispatcher.start().await.unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 1 })).unwrap();
        dispatcher.dispatch(Event::new(Tick { count: 2 })).unwrap();
        dispatcher.stop().await;

        assert_eq!(consumer.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pending_events_gauge() {
        let dispatcher = Dispatcher::<()>::new(Arc::new(()));
        let sink = Arc::new(StdMutex::new(Vec::new()));
        tick_recorder(&dispatcher, Arc::clone(&sink));

        for count in 0..3 {
            dispatcher.dispatch(Event::new(Tick { count })).unwrap();
        }
        assert_eq!(dispatcher.pending_events(), 3);

        dispatcher.start().await.unwrap();
        dispatcher.stop().await;
        assert_eq!(dispatcher.pending_events(), 0);
        assert_eq!(sink.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_has_processor() {
        let dispatcher = Dispatcher::<()>::new(Arc::new(()));
        assert!(!dispatcher.has_processor::<Tick>());
        dispatcher.register_processor::<Tick, _, _>(|_tick, _consumer| async { Ok(()) });
        assert!(dispatcher.has_processor::<Tick>());
    }
}
