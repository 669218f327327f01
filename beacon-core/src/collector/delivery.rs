//! Post-middleware delivery to plugins
//!
//! A flushed batch is run through the middleware chain into a
//! [`BatchDelivery`] sink. While the chain's synchronous pass is running the
//! sink only collects survivors; [`finish`](BatchDelivery::finish) then hands
//! them to the plugins in queue order. Events whose middleware resumes later
//! (after `finish`) are dispatched as soon as they arrive.

use std::sync::Arc;

use parking_lot::Mutex;

use super::queue::PublishStats;
use crate::middleware::{EventSink, MiddlewareChain};
use crate::plugins::PluginRegistry;
use crate::types::AnalyticsEvent;

/// Sink between the middleware chain and the plugin registry.
pub struct BatchDelivery {
    pending: Mutex<Option<Vec<AnalyticsEvent>>>,
    plugins: PluginRegistry,
    stats: Arc<Mutex<PublishStats>>,
}

impl BatchDelivery {
    pub fn new(plugins: PluginRegistry, stats: Arc<Mutex<PublishStats>>) -> Self {
        Self {
            pending: Mutex::new(Some(Vec::new())),
            plugins,
            stats,
        }
    }

    /// Dispatch everything collected so far, in arrival order, and switch to
    /// immediate dispatch. Returns the number of events dispatched.
    pub fn finish(&self) -> usize {
        let ready = self.pending.lock().take().unwrap_or_default();
        for event in &ready {
            self.dispatch(event);
        }
        ready.len()
    }

    fn dispatch(&self, event: &AnalyticsEvent) {
        let report = self.plugins.dispatch(event);
        let mut stats = self.stats.lock();
        stats.events_dispatched += 1;
        stats.plugin_failures += report.failed;
    }
}

impl EventSink for BatchDelivery {
    fn deliver(&self, event: AnalyticsEvent) {
        {
            let mut pending = self.pending.lock();
            if let Some(batch) = pending.as_mut() {
                batch.push(event);
                return;
            }
        }
        tracing::debug!(
            event_type = %event.event_type,
            message_id = %event.message_id,
            "Deferred event completed middleware"
        );
        self.dispatch(&event);
    }

    fn step_failed(&self, _step: usize) {
        self.stats.lock().middleware_failures += 1;
    }
}

/// Run `events` through `chain` and dispatch the survivors to `plugins`.
///
/// Returns the number of events dispatched before returning; events held
/// back by asynchronous middleware are dispatched when they complete.
pub fn deliver_batch(
    events: Vec<AnalyticsEvent>,
    chain: &MiddlewareChain,
    plugins: PluginRegistry,
    stats: &Arc<Mutex<PublishStats>>,
) -> usize {
    let sink = Arc::new(BatchDelivery::new(plugins, Arc::clone(stats)));
    chain.run(events, Arc::clone(&sink) as Arc<dyn EventSink>);
    sink.finish()
}
