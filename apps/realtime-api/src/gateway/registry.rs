//! Topic registry: which connections are watching which file.
//!
//! Owned and mutated only by the hub control loop, so it carries no locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use super::session::{ConnectionInfo, Frame, Subscriber};

/// Why a subscriber was dropped during a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Mailbox was full: the client is not keeping up.
    Lagging,
    /// Mailbox receiver is gone: the connection already tore down.
    Gone,
}

/// A subscriber removed by [`TopicRegistry::broadcast`].
#[derive(Debug)]
pub struct Evicted {
    pub info: Arc<ConnectionInfo>,
    pub reason: EvictReason,
}

#[derive(Default)]
pub struct TopicRegistry {
    topics: HashMap<String, HashMap<String, Subscriber>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber under its own topic, creating the topic if absent.
    pub fn insert(&mut self, subscriber: Subscriber) {
        let topic = subscriber.info.topic.clone();
        let id = subscriber.info.id.clone();
        self.topics.entry(topic).or_default().insert(id, subscriber);
    }

    /// Remove one subscriber. Empty topics are dropped.
    pub fn remove(&mut self, topic: &str, connection_id: &str) -> Option<Subscriber> {
        let subscribers = self.topics.get_mut(topic)?;
        let removed = subscribers.remove(connection_id);
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Offer `frame` to every subscriber of `topic` without waiting.
    ///
    /// Subscribers that cannot take the frame are removed and returned; their
    /// mailboxes close when the returned values are dropped.
    pub fn broadcast(&mut self, topic: &str, frame: &Frame) -> Vec<Evicted> {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        subscribers.retain(|_, subscriber| match subscriber.try_send(frame.clone()) {
            Ok(()) => true,
            Err(err) => {
                let reason = match err {
                    TrySendError::Full(_) => EvictReason::Lagging,
                    TrySendError::Closed(_) => EvictReason::Gone,
                };
                evicted.push(Evicted {
                    info: subscriber.info.clone(),
                    reason,
                });
                false
            }
        });

        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        evicted
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, HashMap::len)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn connection_count(&self) -> usize {
        self.topics.values().map(HashMap::len).sum()
    }

    /// Drop every subscriber, closing all mailboxes. Returns how many were open.
    pub fn clear(&mut self) -> usize {
        let count = self.connection_count();
        self.topics.clear();
        count
    }
}
