use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Change channels of the data container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    WalletChanged,
    FavsChanged,
    MarkersChanged,
    NotesChanged,
    StockDataChanged,
    RefreshFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(Topic) + Send + Sync>;

/// In-process publish/subscribe.
///
/// Callbacks run synchronously on the publishing thread, outside of the
/// subscriber list lock, so a callback may subscribe or publish itself.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Topic, Callback)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic, callback: impl Fn(Topic) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, topic, Arc::new(callback)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn publish(&self, topic: Topic) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(_, t, _)| *t == topic)
            .map(|(_, _, cb)| cb.clone())
            .collect();
        trace!(?topic, subscribers = callbacks.len(), "publish");
        for callback in callbacks {
            callback(topic);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
