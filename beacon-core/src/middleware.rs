//! Middleware chain
//!
//! Middleware steps run in registration order on every event of a flushed
//! batch. Each step receives the event by value together with a [`Next`]
//! continuation and must call [`Next::run`] to pass the (possibly modified)
//! event on. There is no separate reject signal: a step that never calls
//! `run` drops the event, and there is no deadline after which a stalled
//! step is skipped.
//!
//! `Next` is an index into a shared, immutable snapshot of the chain rather
//! than a nested closure, so each event walks the chain independently
//! (the index starts at zero for every event) and a step may hold on to its
//! continuation and resume the walk later, e.g. from another task.
//!
//! A step that panics is contained: the panic is logged, reported to the
//! sink through [`EventSink::step_failed`], and only that event is dropped.
//!
//! ```rust,ignore
//! analytics.use_middleware(|mut event: AnalyticsEvent, next: Next| {
//!     event.properties.insert("enriched".into(), true.into());
//!     next.run(event);
//! });
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::plugins::panic_message;
use crate::types::AnalyticsEvent;

/// A transform step in the chain.
pub trait Middleware: Send + Sync {
    fn handle(&self, event: AnalyticsEvent, next: Next);
}

impl<F> Middleware for F
where
    F: Fn(AnalyticsEvent, Next) + Send + Sync,
{
    fn handle(&self, event: AnalyticsEvent, next: Next) {
        self(event, next)
    }
}

/// Receives events that made it through the whole chain.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: AnalyticsEvent);

    /// Called when step `step` panicked; its event is dropped.
    fn step_failed(&self, _step: usize) {}
}

type Steps = Arc<[Arc<dyn Middleware>]>;

/// Continuation handed to a middleware step.
///
/// Consumed by [`run`](Next::run). Dropping it without calling `run` drops
/// the event.
pub struct Next {
    steps: Steps,
    index: usize,
    sink: Option<Arc<dyn EventSink>>,
}

impl Next {
    fn start(steps: Steps, sink: Arc<dyn EventSink>) -> Self {
        Self {
            steps,
            index: 0,
            sink: Some(sink),
        }
    }

    /// Pass `event` to the next step, or to the sink if this was the last.
    pub fn run(mut self, event: AnalyticsEvent) {
        let Some(sink) = self.sink.take() else {
            return;
        };

        match self.steps.get(self.index).cloned() {
            Some(step) => {
                let next = Next {
                    steps: Arc::clone(&self.steps),
                    index: self.index + 1,
                    sink: Some(Arc::clone(&sink)),
                };
                let message_id = event.message_id.clone();
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| step.handle(event, next))) {
                    tracing::warn!(
                        step = self.index,
                        message_id = %message_id,
                        panic = %panic_message(payload.as_ref()),
                        "Middleware panicked; event dropped"
                    );
                    sink.step_failed(self.index);
                }
            }
            None => sink.deliver(event),
        }
    }

    /// Number of steps still to run after this continuation is invoked.
    pub fn remaining(&self) -> usize {
        self.steps.len().saturating_sub(self.index)
    }
}

impl Drop for Next {
    fn drop(&mut self) {
        if self.sink.is_some() {
            tracing::debug!(
                step = self.index.saturating_sub(1),
                "Middleware did not advance; event dropped"
            );
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// Ordered, append-only list of middleware steps.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    steps: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; it runs after every step registered before it.
    pub fn push(&mut self, step: Arc<dyn Middleware>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Walk the chain for each event in order, delivering survivors to `sink`.
    ///
    /// The chain is snapshotted first, so steps registered while the batch is
    /// in flight apply from the next flush on.
    pub fn run(&self, events: Vec<AnalyticsEvent>, sink: Arc<dyn EventSink>) {
        let steps: Steps = self.steps.clone().into();
        for event in events {
            Next::start(Arc::clone(&steps), Arc::clone(&sink)).run(event);
        }
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{props, EventType, Integrations, Properties};
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AnalyticsEvent>>);

    impl EventSink for Collect {
        fn deliver(&self, event: AnalyticsEvent) {
            self.0.lock().push(event);
        }
    }

    fn event(name: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            event_type: EventType::Track,
            event: Some(name.to_string()),
            name: None,
            user_id: None,
            anonymous_id: "anon".to_string(),
            properties: Properties::new(),
            traits: None,
            context: Properties::new(),
            timestamp: Utc::now(),
            message_id: name.to_string(),
            integrations: Integrations::new(),
        }
    }

    fn tag(key: &'static str, value: &'static str) -> Arc<dyn Middleware> {
        Arc::new(move |mut event: AnalyticsEvent, next: Next| {
            event.properties.insert(key.to_string(), json!(value));
            next.run(event);
        })
    }

    #[test]
    fn test_empty_chain_passes_events_unmodified() {
        let sink = Arc::new(Collect::default());
        let original = vec![event("a"), event("b")];

        MiddlewareChain::new().run(original.clone(), sink.clone());

        assert_eq!(*sink.0.lock(), original);
    }

    #[test]
    fn test_steps_apply_in_registration_order() {
        let mut chain = MiddlewareChain::new();
        chain.push(tag("first", "1"));
        chain.push(tag("shared", "from-first"));
        chain.push(tag("second", "2"));
        chain.push(tag("shared", "from-last"));

        let sink = Arc::new(Collect::default());
        chain.run(vec![event("a"), event("b")], sink.clone());

        let delivered = sink.0.lock();
        assert_eq!(delivered.len(), 2);
        for e in delivered.iter() {
            assert_eq!(
                e.properties,
                props(json!({"first": "1", "second": "2", "shared": "from-last"}))
            );
        }
        assert_eq!(delivered[0].event.as_deref(), Some("a"));
        assert_eq!(delivered[1].event.as_deref(), Some("b"));
    }

    #[test]
    fn test_step_that_does_not_advance_drops_event() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(|event: AnalyticsEvent, next: Next| {
            if event.event.as_deref() != Some("blocked") {
                next.run(event);
            }
        }));
        chain.push(tag("after", "yes"));

        let sink = Arc::new(Collect::default());
        chain.run(
            vec![event("a"), event("blocked"), event("c")],
            sink.clone(),
        );

        let names: Vec<_> = sink
            .0
            .lock()
            .iter()
            .map(|e| e.event.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_deferred_continuation_completes_later() {
        let parked: Arc<Mutex<Vec<(AnalyticsEvent, Next)>>> = Arc::default();
        let parked_in_step = Arc::clone(&parked);

        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(move |event: AnalyticsEvent, next: Next| {
            if event.event.as_deref() == Some("slow") {
                parked_in_step.lock().push((event, next));
            } else {
                next.run(event);
            }
        }));
        chain.push(tag("tail", "ran"));

        let sink = Arc::new(Collect::default());
        chain.run(vec![event("slow"), event("fast")], sink.clone());
        assert_eq!(sink.0.lock().len(), 1);

        let (event, next) = parked.lock().pop().unwrap();
        assert_eq!(next.remaining(), 1);
        next.run(event);

        let delivered = sink.0.lock();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[1].event.as_deref(), Some("slow"));
        assert_eq!(delivered[1].properties["tail"], "ran");
    }

    #[derive(Default)]
    struct Counting {
        delivered: Mutex<Vec<AnalyticsEvent>>,
        failed_steps: Mutex<Vec<usize>>,
    }

    impl EventSink for Counting {
        fn deliver(&self, event: AnalyticsEvent) {
            self.delivered.lock().push(event);
        }

        fn step_failed(&self, step: usize) {
            self.failed_steps.lock().push(step);
        }
    }

    #[test]
    fn test_panicking_step_only_drops_its_event() {
        let mut chain = MiddlewareChain::new();
        chain.push(tag("first", "1"));
        chain.push(Arc::new(|event: AnalyticsEvent, next: Next| {
            if event.event.as_deref() == Some("bad") {
                panic!("enrichment bug");
            }
            next.run(event);
        }));

        let sink = Arc::new(Counting::default());
        chain.run(vec![event("a"), event("bad"), event("c")], sink.clone());

        let names: Vec<_> = sink
            .delivered
            .lock()
            .iter()
            .map(|e| e.event.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(*sink.failed_steps.lock(), vec![1]);
    }

    #[test]
    fn test_chain_len() {
        let mut chain = MiddlewareChain::new();
        assert!(chain.is_empty());
        chain.push(tag("a", "b"));
        assert_eq!(chain.len(), 1);
    }
}
