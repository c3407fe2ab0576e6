//! Topic-keyed correlation bus.
//!
//! The bus is the rendezvous between the delivery thread (publisher) and
//! caller threads (subscribers). Topics are either numeric request ids or
//! well-known event names. Delivery policy, stated explicitly: publish takes
//! a snapshot of the topic's senders under the read lock, releases the lock,
//! then sends blocking on each bounded channel. A slow consumer can therefore
//! stall the publishing thread but never block topic-table mutation, and
//! in-order delivery is preserved so a terminal "end" frame cannot overtake
//! data frames. A subscriber that has gone away (receiver dropped) makes the
//! send fail immediately; the failure is ignored.
//!
//! There is no queuing before subscription. A subscriber observes only
//! frames published after it subscribed.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::subscription::Subscription;

/// Default per-subscriber buffer depth.
pub const DEFAULT_BUFFER: usize = 5;

/// Correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Explicit numeric request id, assigned by the caller per request.
    Request(i64),
    /// Well-known session-wide event name (e.g. `"NextValidId"`).
    Named(String),
}

impl From<i64> for Topic {
    fn from(req_id: i64) -> Self {
        Self::Request(req_id)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::Named(name.into())
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(id) => write!(f, "{id}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

struct SubEntry {
    token: u64,
    tx: Sender<String>,
}

/// Thread-safe publish/subscribe fan-out.
pub struct EventBus {
    topics: RwLock<AHashMap<Topic, Vec<SubEntry>>>,
    next_token: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: RwLock::new(AHashMap::new()),
            next_token: AtomicU64::new(1),
        })
    }

    /// Subscribe to a topic with the default buffer depth.
    pub fn subscribe(self: &Arc<Self>, topic: impl Into<Topic>) -> Subscription {
        self.subscribe_with_buffer(topic, DEFAULT_BUFFER)
    }

    /// Subscribe to a topic with an explicit buffer depth.
    pub fn subscribe_with_buffer(
        self: &Arc<Self>,
        topic: impl Into<Topic>,
        buffer: usize,
    ) -> Subscription {
        let topic = topic.into();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx): (Sender<String>, Receiver<String>) = bounded(buffer.max(1));
        {
            let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
            topics
                .entry(topic.clone())
                .or_default()
                .push(SubEntry { token, tx });
        }
        Subscription::new(Arc::clone(self), topic, token, rx)
    }

    /// Publish a frame to every current subscriber of the topic. Returns the
    /// number of subscribers the frame was handed to. No subscribers is a
    /// silent no-op.
    pub fn publish(&self, topic: impl Into<Topic>, msg: &str) -> usize {
        let topic = topic.into();
        let snapshot: Vec<Sender<String>> = {
            let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
            match topics.get(&topic) {
                Some(subs) => subs.iter().map(|s| s.tx.clone()).collect(),
                None => return 0,
            }
        };
        // Blocking sends, outside the table lock. A dropped receiver fails
        // the send immediately; that subscriber unsubscribed mid-flight.
        let mut delivered = 0;
        for tx in snapshot {
            if tx.send(msg.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Remove one subscriber from a topic. Idempotent. The subscriber's
    /// receiver observes disconnection once any in-flight publish clones of
    /// its sender are gone.
    pub(crate) fn unsubscribe(&self, topic: &Topic, token: u64) {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|s| s.token != token);
            if subs.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Remove every subscriber from a topic, disconnecting them all.
    pub fn unsubscribe_all(&self, topic: impl Into<Topic>) {
        let topic = topic.into();
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        topics.remove(&topic);
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: impl Into<Topic>) -> usize {
        let topic = topic.into();
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        topics.get(&topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("EventBus")
            .field("topics", &topics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(42, "nobody home"), 0);
    }

    #[test]
    fn two_subscribers_both_receive() {
        let bus = EventBus::new();
        let a = bus.subscribe(7);
        let b = bus.subscribe(7);
        assert_eq!(bus.publish(7, "hello"), 2);
        assert_eq!(a.recv().unwrap(), "hello");
        assert_eq!(b.recv().unwrap(), "hello");
    }

    #[test]
    fn unsubscribing_one_does_not_affect_the_other() {
        let bus = EventBus::new();
        let a = bus.subscribe(7);
        let b = bus.subscribe(7);
        a.cancel();
        assert_eq!(bus.subscriber_count(7), 1);
        assert_eq!(bus.publish(7, "still here"), 1);
        assert_eq!(b.recv().unwrap(), "still here");
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        {
            let _sub = bus.subscribe("NextValidId");
            assert_eq!(bus.subscriber_count("NextValidId"), 1);
        }
        assert_eq!(bus.subscriber_count("NextValidId"), 0);
    }

    #[test]
    fn unsubscribe_all_disconnects_receivers() {
        let bus = EventBus::new();
        let sub = bus.subscribe(9);
        bus.unsubscribe_all(9);
        assert!(sub.recv().is_err());
    }

    #[test]
    fn numeric_and_named_topics_are_distinct() {
        let bus = EventBus::new();
        let by_id = bus.subscribe(1);
        let by_name = bus.subscribe("error");
        bus.publish(1, "for the id");
        assert_eq!(by_id.recv().unwrap(), "for the id");
        assert!(by_name.try_recv().is_none());
    }

    #[test]
    fn frames_arrive_in_publish_order() {
        let bus = EventBus::new();
        let sub = bus.subscribe_with_buffer(3, 16);
        for i in 0..10 {
            bus.publish(3, &format!("frame-{i}"));
        }
        for i in 0..10 {
            assert_eq!(sub.recv().unwrap(), format!("frame-{i}"));
        }
    }

    // Unsubscribe racing an in-flight publish must never panic or deadlock.
    #[test]
    fn concurrent_publish_and_unsubscribe_stress() {
        let bus = EventBus::new();
        let publisher = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for i in 0..2000 {
                    bus.publish(99, &format!("m{i}"));
                }
            })
        };
        let churner = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for _ in 0..200 {
                    let sub = bus.subscribe_with_buffer(99, 4);
                    // Drain a little, then drop mid-stream.
                    let _ = sub.recv_timeout(Duration::from_micros(50));
                    drop(sub);
                }
            })
        };
        publisher.join().unwrap();
        churner.join().unwrap();
        assert_eq!(bus.publish(99, "after"), bus.subscriber_count(99));
    }
}
