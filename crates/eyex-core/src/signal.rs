//! Ticketed subscriber lists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::callbacks::invoke_isolated;

/// Handle returned by [`Signal::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionTicket(u64);

type Subscriber = Arc<dyn Fn() + Send + Sync>;

/// A parameterless notification with any number of subscribers.
///
/// Subscribers run in subscription order, outside the internal lock, so a
/// subscriber may subscribe or unsubscribe while being notified.
#[derive(Default)]
pub struct Signal {
    name: &'static str,
    next_ticket: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionTicket, Subscriber)>>,
}

impl Signal {
    /// Create a named signal; the name appears in panic logs
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Add a subscriber
    pub fn subscribe(&self, subscriber: impl Fn() + Send + Sync + 'static) -> SubscriptionTicket {
        let ticket = SubscriptionTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((ticket, Arc::new(subscriber)));
        ticket
    }

    /// Remove a subscriber; returns whether it was present
    pub fn unsubscribe(&self, ticket: SubscriptionTicket) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(t, _)| *t != ticket);
        subscribers.len() != before
    }

    /// Notify every subscriber
    pub fn raise(&self) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            invoke_isolated(self.name, || subscriber());
        }
    }

    /// Number of subscribers
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Whether nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn raise_reaches_subscribers_until_unsubscribed() {
        let signal = Signal::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let ticket = signal.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        signal.raise();
        assert!(signal.unsubscribe(ticket));
        signal.raise();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!signal.unsubscribe(ticket));
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let signal = Signal::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        signal.subscribe(|| panic!("bad subscriber"));
        let counter = Arc::clone(&hits);
        signal.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        signal.raise();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
