//! Broadcast hub for fanning out live events to connections watching a file.
//!
//! All registry mutation happens on a single control-loop task. Callers only
//! ever enqueue commands, so `subscribe`, `unsubscribe` and `publish` never
//! block. Delivery into a connection's mailbox is a non-blocking `try_send`;
//! a connection whose mailbox is full is disconnected rather than waited on.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::events::Event;
use super::registry::{EvictReason, TopicRegistry};
use super::session::{ConnectionInfo, Frame, Subscriber};

/// Snapshot of the registry size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub topics: usize,
    pub connections: usize,
}

enum Command {
    Subscribe(Subscriber),
    Unsubscribe { topic: String, connection_id: String },
    Publish(Event),
    Stats(oneshot::Sender<HubStats>),
    Shutdown,
}

/// Handle to the hub control loop. Cloneable; store in AppState.
///
/// The command queue is unbounded so callers never wait; it only holds
/// requests the loop has not reached yet. Event backpressure lives in the
/// bounded subscriber mailboxes.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
}

impl Hub {
    /// Start the control loop on the current runtime.
    ///
    /// The loop stops on [`Hub::shutdown`] or once every handle is dropped.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx));
        (Self { commands }, task)
    }

    /// Register a connection under its topic.
    ///
    /// If the hub has stopped, the subscriber is dropped, which closes its
    /// mailbox and lets the connection wind down.
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.send(Command::Subscribe(subscriber));
    }

    /// Remove a connection and close its mailbox. No-op if already removed.
    pub fn unsubscribe(&self, info: &ConnectionInfo) {
        self.send(Command::Unsubscribe {
            topic: info.topic.clone(),
            connection_id: info.id.clone(),
        });
    }

    /// Deliver `event` to every connection currently watching its topic.
    pub fn publish(&self, event: Event) {
        self.send(Command::Publish(event));
    }

    /// Close every connection and stop the control loop.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Current registry size, or `None` if the hub has stopped.
    pub async fn stats(&self) -> Option<HubStats> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stats(tx)).is_err() {
            return None;
        }
        rx.await.ok()
    }

    fn send(&self, command: Command) {
        // The loop only goes away on shutdown; late commands are dropped.
        if self.commands.send(command).is_err() {
            tracing::debug!("hub stopped; command dropped");
        }
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut registry = TopicRegistry::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Subscribe(subscriber) => {
                tracing::debug!(
                    connection_id = %subscriber.info.id,
                    user_id = %subscriber.info.user_id,
                    topic = %subscriber.info.topic,
                    "connection subscribed"
                );
                registry.insert(subscriber);
            }
            Command::Unsubscribe {
                topic,
                connection_id,
            } => {
                if registry.remove(&topic, &connection_id).is_some() {
                    tracing::debug!(%connection_id, %topic, "connection unsubscribed");
                }
            }
            Command::Publish(event) => publish(&mut registry, &event),
            Command::Stats(reply) => {
                let _ = reply.send(HubStats {
                    topics: registry.topic_count(),
                    connections: registry.connection_count(),
                });
            }
            Command::Shutdown => break,
        }
    }

    let closed = registry.clear();
    tracing::info!(closed, "hub stopped");
}

fn publish(registry: &mut TopicRegistry, event: &Event) {
    let topic = event.topic();
    if registry.subscriber_count(topic) == 0 {
        return;
    }

    let frame: Frame = match serde_json::to_string(event) {
        Ok(json) => Arc::from(json),
        Err(err) => {
            tracing::error!(?err, %topic, "failed to serialize event");
            return;
        }
    };

    for evicted in registry.broadcast(topic, &frame) {
        match evicted.reason {
            EvictReason::Lagging => tracing::warn!(
                connection_id = %evicted.info.id,
                user_id = %evicted.info.user_id,
                %topic,
                "mailbox full; disconnecting slow connection"
            ),
            EvictReason::Gone => tracing::debug!(
                connection_id = %evicted.info.id,
                %topic,
                "dropping closed connection"
            ),
        }
    }
}
