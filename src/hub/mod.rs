//! Fan-out Hub: routes tally broadcasts to every WebSocket subscriber of a poll.
//!
//! The hub is an actor: a single task owns the subscriber registry and processes register,
//! unregister, and broadcast commands off one channel, so there is never a data race between a
//! subscriber joining mid-broadcast and the registry being mutated. Subscriber send queues are
//! bounded; a subscriber that can't keep up gets dropped rather than slowing down every other
//! subscriber of the same poll.

pub mod server;

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Capacity of each subscriber's outbound queue. A subscriber whose queue is full
/// when a broadcast arrives is evicted, not blocked on.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Capacity of the hub's own command queue. Register/unregister/broadcast all funnel through
/// this one channel.
const COMMAND_QUEUE_CAPACITY: usize = 1024;

enum Command {
    Register {
        poll_id: String,
        tx: mpsc::Sender<Vec<u8>>,
        id_tx: tokio::sync::oneshot::Sender<SubscriberId>,
    },
    Unregister {
        poll_id: String,
        id: SubscriberId,
    },
    Broadcast {
        poll_id: String,
        payload: Vec<u8>,
    },
}

type SubscriberId = u64;

/// Cloneable handle to a running hub actor. Cheap to clone; every clone shares the same
/// registry through the underlying command channel.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
}

/// A live subscription to a poll's broadcast stream. Dropping it unregisters the subscriber.
pub struct Subscription {
    poll_id: String,
    id: SubscriberId,
    hub: Hub,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.hub.commands.try_send(Command::Unregister {
            poll_id: std::mem::take(&mut self.poll_id),
            id: self.id,
        });
    }
}

impl Hub {
    /// Spawn the hub actor and return a handle to it.
    pub fn spawn() -> Self {
        let (commands, mut rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        tokio::spawn(async move {
            let mut registry: HashMap<String, HashMap<SubscriberId, mpsc::Sender<Vec<u8>>>> =
                HashMap::new();
            let mut next_id: SubscriberId = 0;

            while let Some(command) = rx.recv().await {
                match command {
                    Command::Register { poll_id, tx, id_tx } => {
                        let id = next_id;
                        next_id += 1;
                        registry.entry(poll_id).or_default().insert(id, tx);
                        let _ = id_tx.send(id);
                    }
                    Command::Unregister { poll_id, id } => {
                        if let Some(subscribers) = registry.get_mut(&poll_id) {
                            subscribers.remove(&id);
                            if subscribers.is_empty() {
                                registry.remove(&poll_id);
                            }
                        }
                    }
                    Command::Broadcast { poll_id, payload } => {
                        if let Some(subscribers) = registry.get_mut(&poll_id) {
                            subscribers.retain(|_, tx| tx.try_send(payload.clone()).is_ok());
                        }
                    }
                }
            }
        });
        Self { commands }
    }

    pub async fn subscribe(&self, poll_id: impl Into<String>) -> Subscription {
        let poll_id = poll_id.into();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let (id_tx, id_rx) = tokio::sync::oneshot::channel();
        let _ = self
            .commands
            .send(Command::Register {
                poll_id: poll_id.clone(),
                tx,
                id_tx,
            })
            .await;
        let id = id_rx.await.unwrap_or(0);
        Subscription {
            poll_id,
            id,
            hub: self.clone(),
            rx,
        }
    }

    /// Non-blocking: a stalled hub actor must never back-pressure the tally path. If the
    /// command queue is full the broadcast is dropped and logged rather than awaited.
    pub async fn broadcast(&self, poll_id: impl Into<String>, payload: Vec<u8>) {
        let poll_id = poll_id.into();
        if let Err(e) = self.commands.try_send(Command::Broadcast {
            poll_id: poll_id.clone(),
            payload,
        }) {
            warn!(poll_id, error = %e, "dropped broadcast, hub command queue unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_broadcast_for_its_poll() {
        let hub = Hub::spawn();
        let mut sub = hub.subscribe("p1").await;
        hub.broadcast("p1", b"{\"A\":1}".to_vec()).await;
        assert_eq!(sub.recv().await, Some(b"{\"A\":1}".to_vec()));
    }

    #[tokio::test]
    async fn broadcast_to_other_poll_is_not_delivered() {
        let hub = Hub::spawn();
        let mut sub = hub.subscribe("p1").await;
        hub.broadcast("p2", b"{\"A\":1}".to_vec()).await;
        hub.broadcast("p1", b"{\"B\":1}".to_vec()).await;
        assert_eq!(sub.recv().await, Some(b"{\"B\":1}".to_vec()));
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_not_blocked_on() {
        let hub = Hub::spawn();
        let mut sub = hub.subscribe("p1").await;
        for i in 0..SUBSCRIBER_QUEUE_CAPACITY + 10 {
            hub.broadcast("p1", format!("{i}").into_bytes()).await;
        }
        // The queue filled and the subscriber was dropped from the registry; a further
        // broadcast completes without blocking the hub actor.
        hub.broadcast("p1", b"after-eviction".to_vec()).await;
        // Draining whatever made it into the bounded queue must terminate, not hang.
        let mut drained = 0;
        while tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            drained += 1;
        }
        assert!(drained <= SUBSCRIBER_QUEUE_CAPACITY);
    }
}
