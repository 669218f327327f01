//! Pending-event buffer and publish statistics

use crate::types::AnalyticsEvent;

/// FIFO buffer of events waiting for the next flush.
///
/// The queue reports when it reaches the batch size; flushing is the
/// owner's job. [`take`](EventQueue::take) swaps the contents out so events
/// queued while a batch is being processed land in a fresh buffer.
#[derive(Debug)]
pub struct EventQueue {
    events: Vec<AnalyticsEvent>,
    batch_size: usize,
}

impl EventQueue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            events: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
        }
    }

    /// Append `event`. Returns true once the queue holds a full batch.
    pub fn push(&mut self, event: AnalyticsEvent) -> bool {
        self.events.push(event);
        self.is_full()
    }

    /// Remove and return every queued event, oldest first.
    pub fn take(&mut self) -> Vec<AnalyticsEvent> {
        std::mem::replace(&mut self.events, Vec::with_capacity(self.batch_size))
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.batch_size
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Publishing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishStats {
    /// Events accepted into the queue
    pub events_queued: usize,
    /// Events discarded because consent was not given
    pub events_dropped_no_consent: usize,
    /// Non-empty flushes
    pub flushes: usize,
    /// Events taken out of the queue by flushes
    pub events_flushed: usize,
    /// Events that made it through middleware to the plugins
    pub events_dispatched: usize,
    /// Events dropped because a middleware step panicked
    pub middleware_failures: usize,
    /// Plugin handler failures (errors and panics)
    pub plugin_failures: usize,
    /// Plugin load hook failures
    pub load_failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, Integrations, Properties};
    use chrono::Utc;

    fn event(id: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            event_type: EventType::Track,
            event: Some(id.to_string()),
            name: None,
            user_id: None,
            anonymous_id: "anon".to_string(),
            properties: Properties::new(),
            traits: None,
            context: Properties::new(),
            timestamp: Utc::now(),
            message_id: id.to_string(),
            integrations: Integrations::new(),
        }
    }

    #[test]
    fn test_push_reports_full_batch() {
        let mut queue = EventQueue::new(3);
        assert!(!queue.push(event("a")));
        assert!(!queue.push(event("b")));
        assert!(queue.push(event("c")));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_take_swaps_contents_in_order() {
        let mut queue = EventQueue::new(10);
        queue.push(event("a"));
        queue.push(event("b"));

        let taken = queue.take();
        assert!(queue.is_empty());
        assert_eq!(taken[0].message_id, "a");
        assert_eq!(taken[1].message_id, "b");

        queue.push(event("c"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let mut queue = EventQueue::new(0);
        assert_eq!(queue.batch_size(), 1);
        assert!(queue.push(event("a")));
    }

    #[test]
    fn test_publish_stats_default() {
        let stats = PublishStats::default();
        assert_eq!(stats.events_queued, 0);
        assert_eq!(stats.flushes, 0);
    }
}
