//! Filter and transform stages composable ahead of a terminal handler.
//!
//! A [`Pipeline`] runs its filters in registration order (first rejection
//! drops the event, nothing later runs), then its transforms in registration
//! order (a transform yielding `None` drops the event). [`FilteredHandler`]
//! decorates any [`EventHandler`] with a pipeline.

use crate::adapter::EventHandler;
use crate::error::HandlerError;
use crate::event::Event;
use async_trait::async_trait;
use std::any::TypeId;
use std::sync::Arc;
use tracing::trace;

/// Accept/reject gate over an event.
pub trait Filter: Send + Sync {
    fn passes(&self, event: &Event) -> bool;
}

/// Accepts only events whose payload is exactly `T`.
pub struct TypeFilter {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeFilter {
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl Filter for TypeFilter {
    fn passes(&self, event: &Event) -> bool {
        event.payload_type() == self.type_id
    }
}

/// Accepts events for which a predicate over the raw envelope holds.
pub struct PredicateFilter {
    predicate: Box<dyn Fn(&Event) -> bool + Send + Sync>,
}

impl PredicateFilter {
    pub fn new(predicate: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl Filter for PredicateFilter {
    fn passes(&self, event: &Event) -> bool {
        (self.predicate)(event)
    }
}

/// Typed predicate: rejects events whose payload is not `T`, otherwise
/// applies the predicate to the payload.
pub struct TypedPredicateFilter<T> {
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: Send + Sync + 'static> TypedPredicateFilter<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl<T: Send + Sync + 'static> Filter for TypedPredicateFilter<T> {
    fn passes(&self, event: &Event) -> bool {
        event
            .payload::<T>()
            .map(|payload| (self.predicate)(payload))
            .unwrap_or(false)
    }
}

/// All children must pass; evaluation stops at the first rejection.
#[derive(Default)]
pub struct AndFilter {
    children: Vec<Box<dyn Filter>>,
}

impl AndFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.children.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.children.push(filter);
    }
}

impl Filter for AndFilter {
    fn passes(&self, event: &Event) -> bool {
        self.children.iter().all(|filter| filter.passes(event))
    }
}

/// Any child passing is enough; evaluation stops at the first acceptance.
#[derive(Default)]
pub struct OrFilter {
    children: Vec<Box<dyn Filter>>,
}

impl OrFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.children.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.children.push(filter);
    }
}

impl Filter for OrFilter {
    fn passes(&self, event: &Event) -> bool {
        self.children.iter().any(|filter| filter.passes(event))
    }
}

/// Negates a single child filter.
pub struct NotFilter {
    inner: Box<dyn Filter>,
}

impl NotFilter {
    pub fn new(inner: impl Filter + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Filter for NotFilter {
    fn passes(&self, event: &Event) -> bool {
        !self.inner.passes(event)
    }
}

/// Reshape an event; `None` drops it from the pipeline.
pub trait Transform: Send + Sync {
    fn apply(&self, event: Event) -> Option<Event>;
}

/// Converts an `In` payload into a fresh `Out` envelope (new id, new
/// timestamp); events of any other type pass through unchanged.
pub struct MapTransform<In, Out> {
    map: Box<dyn Fn(&In) -> Out + Send + Sync>,
}

impl<In, Out> MapTransform<In, Out>
where
    In: Send + Sync + 'static,
    Out: Send + Sync + 'static,
{
    pub fn new(map: impl Fn(&In) -> Out + Send + Sync + 'static) -> Self {
        Self { map: Box::new(map) }
    }
}

impl<In, Out> Transform for MapTransform<In, Out>
where
    In: Send + Sync + 'static,
    Out: Send + Sync + 'static,
{
    fn apply(&self, event: Event) -> Option<Event> {
        match event.payload::<In>() {
            Some(payload) => Some(Event::new((self.map)(payload))),
            None => Some(event),
        }
    }
}

/// Like [`MapTransform`], but the converter may yield `None` to drop the
/// event. Non-matching types still pass through unchanged.
pub struct FilterMapTransform<In, Out> {
    map: Box<dyn Fn(&In) -> Option<Out> + Send + Sync>,
}

impl<In, Out> FilterMapTransform<In, Out>
where
    In: Send + Sync + 'static,
    Out: Send + Sync + 'static,
{
    pub fn new(map: impl Fn(&In) -> Option<Out> + Send + Sync + 'static) -> Self {
        Self { map: Box::new(map) }
    }
}

impl<In, Out> Transform for FilterMapTransform<In, Out>
where
    In: Send + Sync + 'static,
    Out: Send + Sync + 'static,
{
    fn apply(&self, event: Event) -> Option<Event> {
        match event.payload::<In>() {
            Some(payload) => (self.map)(payload).map(Event::new),
            None => Some(event),
        }
    }
}

/// Ordered filters followed by ordered transforms.
#[derive(Default)]
pub struct Pipeline {
    filters: Vec<Box<dyn Filter>>,
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Accept only events carrying a `T` payload.
    pub fn filter_by_type<T: Send + Sync + 'static>(self) -> Self {
        self.with_filter(TypeFilter::of::<T>())
    }

    /// Accept `T` events satisfying `predicate`; everything else is rejected.
    pub fn filter_when<T: Send + Sync + 'static>(
        self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.with_filter(TypedPredicateFilter::new(predicate))
    }

    /// Convert `In` payloads into `Out` envelopes.
    pub fn map<In, Out>(self, map: impl Fn(&In) -> Out + Send + Sync + 'static) -> Self
    where
        In: Send + Sync + 'static,
        Out: Send + Sync + 'static,
    {
        self.with_transform(MapTransform::new(map))
    }

    /// Convert `In` payloads into `Out` envelopes, dropping on `None`.
    pub fn filter_map<In, Out>(
        self,
        map: impl Fn(&In) -> Option<Out> + Send + Sync + 'static,
    ) -> Self
    where
        In: Send + Sync + 'static,
        Out: Send + Sync + 'static,
    {
        self.with_transform(FilterMapTransform::new(map))
    }

    /// Run the event through every stage. `None` means the event was dropped:
    /// by the first rejecting filter (later stages never run) or by a
    /// transform yielding nothing.
    pub fn process(&self, event: Event) -> Option<Event> {
        for filter in &self.filters {
            if !filter.passes(&event) {
                trace!(
                    event_type = event.type_name(),
                    event_id = event.id(),
                    "event rejected by filter"
                );
                return None;
            }
        }
        let mut event = event;
        for transform in &self.transforms {
            event = transform.apply(event)?;
        }
        Some(event)
    }
}

/// Decorates a handler with a pipeline: the inner handler only sees events
/// the pipeline lets through.
pub struct FilteredHandler {
    pipeline: Pipeline,
    inner: Arc<dyn EventHandler>,
}

impl FilteredHandler {
    pub fn new(pipeline: Pipeline, inner: Arc<dyn EventHandler>) -> Self {
        Self { pipeline, inner }
    }
}

#[async_trait]
impl EventHandler for FilteredHandler {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        match self.pipeline.process(event) {
            Some(event) => self.inner.handle(event).await,
            None => Ok(()),
        }
    }
}
