//! Outbound record stream and inbound command channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use model::StreamRecord;
use parking_lot::Mutex;

use crate::error::RelayError;

/// Append-only outbound stream. `partition_key` is the stream token.
pub trait Publisher: Send + Sync {
    fn publish(&self, record: &StreamRecord, partition_key: &str) -> Result<(), RelayError>;
}

/// Called with `(topic, payload)` on whatever thread the transport delivers on.
pub type CommandHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

pub trait CommandSubscriber: Send + Sync {
    fn subscribe(&self, topic: &str, client_id: &str, handler: CommandHandler) -> Result<(), RelayError>;
    /// Drops every subscription, returns how many were active.
    fn unsubscribe_all(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub partition_key: String,
    pub record: StreamRecord,
}

pub type PublishedTx = crossbeam_channel::Sender<Published>;
pub type PublishedRx = crossbeam_channel::Receiver<Published>;

/// Publisher that forwards every record into a channel.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: PublishedTx,
}

impl Publisher for ChannelPublisher {
    fn publish(&self, record: &StreamRecord, partition_key: &str) -> Result<(), RelayError> {
        self.tx
            .send(Published { partition_key: partition_key.to_string(), record: record.clone() })
            .map_err(|_| RelayError::Transport("record receiver dropped".into()))
    }
}

pub fn channel() -> (ChannelPublisher, PublishedRx) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ChannelPublisher { tx }, rx)
}

struct Subscription {
    topic: String,
    client_id: String,
    handler: CommandHandler,
}

/// Subscriber that delivers synchronously from `deliver`.
#[derive(Default)]
pub struct MemorySubscriber {
    subs: Mutex<Vec<Subscription>>,
    unsubscribe_calls: AtomicUsize,
}

impl MemorySubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `payload` to every handler subscribed to `topic`; returns the
    /// number of handlers invoked.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
        // clone out so a handler may subscribe/unsubscribe without deadlocking
        let handlers: Vec<CommandHandler> =
            self.subs.lock().iter().filter(|s| s.topic == topic).map(|s| s.handler.clone()).collect();
        for h in &handlers {
            h(topic, payload);
        }
        handlers.len()
    }

    pub fn topics(&self) -> Vec<String> {
        self.subs.lock().iter().map(|s| s.topic.clone()).collect()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.subs.lock().iter().map(|s| s.client_id.clone()).collect()
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

impl CommandSubscriber for MemorySubscriber {
    fn subscribe(&self, topic: &str, client_id: &str, handler: CommandHandler) -> Result<(), RelayError> {
        self.subs.lock().push(Subscription {
            topic: topic.to_string(),
            client_id: client_id.to_string(),
            handler,
        });
        Ok(())
    }

    fn unsubscribe_all(&self) -> usize {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        let mut subs = self.subs.lock();
        let n = subs.len();
        subs.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_publisher_forwards() {
        let (publisher, rx) = channel();
        let rec = StreamRecord {
            kind: "fuel".into(),
            data: json!({"fuel_level": 10.0}),
            token: "t".into(),
            timestamp: "20240101T000000".into(),
            extra: Default::default(),
        };
        publisher.publish(&rec, "t").unwrap();
        let got = rx.try_recv().unwrap();
        assert_eq!(got.partition_key, "t");
        assert_eq!(got.record, rec);

        drop(rx);
        assert!(matches!(publisher.publish(&rec, "t"), Err(RelayError::Transport(_))));
    }

    #[test]
    fn memory_subscriber_routes_by_topic() {
        let sub = MemorySubscriber::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sub.subscribe(
            "lobby/commands",
            "client",
            Arc::new(move |_t: &str, p: &[u8]| sink.lock().push(p.to_vec())),
        )
        .unwrap();
        assert_eq!(sub.deliver("other/commands", b"x"), 0);
        assert_eq!(sub.deliver("lobby/commands", b"lf"), 1);
        assert_eq!(seen.lock().as_slice(), &[b"lf".to_vec()]);
        assert_eq!(sub.unsubscribe_all(), 1);
        assert_eq!(sub.deliver("lobby/commands", b"lf"), 0);
    }
}
