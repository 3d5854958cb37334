//! Synchronous event broadcasting.
//!
//! Observers subscribe to one [`EventKind`] and receive every matching
//! [`SegmentationEvent`] inline, on the publishing call stack, in
//! subscription order. There is no queue and no deduplication.
//!
//! Handlers may call back into the manager (including triggering further
//! publishes); no lock is held while they run. A panicking handler unwinds
//! into the publisher and later handlers for that publish are skipped.
//!
//! # Usage
//!
//! ```rust
//! use labelmap_core::{EventBroadcaster, EventKind, SegmentationEvent};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let events = EventBroadcaster::new();
//! let removed = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&removed);
//! let token = events.subscribe(EventKind::SegmentationRemoved, move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! events.publish(&SegmentationEvent::removed("seg-1"));
//! assert_eq!(removed.load(Ordering::SeqCst), 1);
//! assert!(events.unsubscribe(token));
//! ```

use crate::config::RenderConfiguration;
use crate::model::Segmentation;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind of segmentation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A segmentation was created.
    SegmentationAdded,
    /// A segmentation's metadata changed.
    SegmentationUpdated,
    /// A segmentation's voxels changed.
    SegmentationDataModified,
    /// A segmentation was removed.
    SegmentationRemoved,
    /// The render configuration changed.
    SegmentationConfigurationChanged,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 5] = [
        EventKind::SegmentationAdded,
        EventKind::SegmentationUpdated,
        EventKind::SegmentationDataModified,
        EventKind::SegmentationRemoved,
        EventKind::SegmentationConfigurationChanged,
    ];

    /// Returns the wire name of the event.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::SegmentationAdded => "SEGMENTATION_ADDED",
            EventKind::SegmentationUpdated => "SEGMENTATION_UPDATED",
            EventKind::SegmentationDataModified => "SEGMENTATION_DATA_MODIFIED",
            EventKind::SegmentationRemoved => "SEGMENTATION_REMOVED",
            EventKind::SegmentationConfigurationChanged => "SEGMENTATION_CONFIGURATION_CHANGED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationEvent {
    /// A segmentation was created.
    Added {
        /// The new record.
        segmentation: Segmentation,
    },
    /// A segmentation's metadata changed.
    Updated {
        /// The record after the change.
        segmentation: Segmentation,
    },
    /// A segmentation's voxels changed.
    DataModified {
        /// The record whose voxels changed.
        segmentation: Segmentation,
    },
    /// A segmentation was removed.
    Removed {
        /// Identifier of the removed record.
        segmentation_id: String,
    },
    /// The render configuration changed.
    ConfigurationChanged {
        /// The full configuration after the change.
        configuration: RenderConfiguration,
    },
}

impl SegmentationEvent {
    /// Creates an added event.
    pub fn added(segmentation: Segmentation) -> Self {
        Self::Added { segmentation }
    }

    /// Creates an updated event.
    pub fn updated(segmentation: Segmentation) -> Self {
        Self::Updated { segmentation }
    }

    /// Creates a data-modified event.
    pub fn data_modified(segmentation: Segmentation) -> Self {
        Self::DataModified { segmentation }
    }

    /// Creates a removed event.
    pub fn removed(segmentation_id: impl Into<String>) -> Self {
        Self::Removed {
            segmentation_id: segmentation_id.into(),
        }
    }

    /// Creates a configuration-changed event.
    pub fn configuration_changed(configuration: RenderConfiguration) -> Self {
        Self::ConfigurationChanged { configuration }
    }

    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            SegmentationEvent::Added { .. } => EventKind::SegmentationAdded,
            SegmentationEvent::Updated { .. } => EventKind::SegmentationUpdated,
            SegmentationEvent::DataModified { .. } => EventKind::SegmentationDataModified,
            SegmentationEvent::Removed { .. } => EventKind::SegmentationRemoved,
            SegmentationEvent::ConfigurationChanged { .. } => {
                EventKind::SegmentationConfigurationChanged
            }
        }
    }

    /// Returns the identifier of the segmentation the event concerns.
    #[must_use]
    pub fn segmentation_id(&self) -> Option<&str> {
        match self {
            SegmentationEvent::Added { segmentation }
            | SegmentationEvent::Updated { segmentation }
            | SegmentationEvent::DataModified { segmentation } => Some(&segmentation.id),
            SegmentationEvent::Removed { segmentation_id } => Some(segmentation_id),
            SegmentationEvent::ConfigurationChanged { .. } => None,
        }
    }
}

/// Token identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    /// Returns the raw token value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

type Handler = Arc<dyn Fn(&SegmentationEvent) + Send + Sync>;

struct Subscriber {
    token: SubscriptionToken,
    kind: EventKind,
    handler: Handler,
}

/// Synchronous publish/subscribe hub for segmentation events.
pub struct EventBroadcaster {
    next_token: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with no subscribers.
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes `handler` to events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&SegmentationEvent) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber {
            token,
            kind,
            handler: Arc::new(handler),
        });
        token
    }

    /// Removes a subscription.
    ///
    /// Returns false if the token was unknown or already removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.token != token);
        subscribers.len() != before
    }

    /// Delivers `event` to every subscriber of its kind, in subscription
    /// order. Returns the number of handlers run.
    ///
    /// Subscriptions added or removed by a handler take effect from the
    /// next publish.
    pub fn publish(&self, event: &SegmentationEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Returns the number of subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn handlers_run_in_subscription_order() {
        let events = EventBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            events.subscribe(EventKind::SegmentationRemoved, move |_| log.lock().push(name));
        }

        assert_eq!(events.publish(&SegmentationEvent::removed("a")), 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let events = EventBroadcaster::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        events.subscribe(EventKind::SegmentationConfigurationChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.publish(&SegmentationEvent::removed("a"));
        events.publish(&SegmentationEvent::configuration_changed(
            RenderConfiguration::default(),
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let events = EventBroadcaster::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let token = events.subscribe(EventKind::SegmentationRemoved, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(events.unsubscribe(token));
        assert!(!events.unsubscribe(token));
        events.publish(&SegmentationEvent::removed("a"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(events.subscriber_count(EventKind::SegmentationRemoved), 0);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let events = Arc::new(EventBroadcaster::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&events);
        let inner_log = Arc::clone(&log);
        events.subscribe(EventKind::SegmentationRemoved, move |event| {
            inner_log.lock().push(event.kind());
            inner.publish(&SegmentationEvent::configuration_changed(
                RenderConfiguration::default(),
            ));
        });
        let outer_log = Arc::clone(&log);
        events.subscribe(EventKind::SegmentationConfigurationChanged, move |event| {
            outer_log.lock().push(event.kind());
        });

        events.publish(&SegmentationEvent::removed("a"));
        assert_eq!(
            *log.lock(),
            vec![
                EventKind::SegmentationRemoved,
                EventKind::SegmentationConfigurationChanged
            ]
        );
    }

    #[test]
    #[should_panic(expected = "handler failed")]
    fn handler_panic_reaches_publisher() {
        let events = EventBroadcaster::new();
        events.subscribe(EventKind::SegmentationRemoved, |_| panic!("handler failed"));
        events.publish(&SegmentationEvent::removed("a"));
    }

    #[test]
    fn event_names_and_ids() {
        assert_eq!(EventKind::SegmentationAdded.name(), "SEGMENTATION_ADDED");
        assert_eq!(EventKind::ALL.len(), 5);
        let event = SegmentationEvent::removed("abc");
        assert_eq!(event.segmentation_id(), Some("abc"));
        assert_eq!(event.kind().to_string(), "SEGMENTATION_REMOVED");
    }
}
