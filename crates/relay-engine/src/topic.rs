// A named fan-out channel owning its subscriber set and replay history.
use crate::ring::HistoryBuffer;
use crate::subscriber::Subscriber;
use chrono::{DateTime, Utc};
use relay_wire::{Message, ServerFrame};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct Topic {
    name: String,
    subscribers: RwLock<HashMap<String, Arc<Subscriber>>>,
    history: HistoryBuffer,
    message_count: AtomicU64,
    created_at: DateTime<Utc>,
}

impl Topic {
    pub fn new(name: impl Into<String>, history_capacity: usize) -> Self {
        Self {
            name: name.into(),
            subscribers: RwLock::new(HashMap::new()),
            history: HistoryBuffer::new(history_capacity),
            message_count: AtomicU64::new(0),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_subscriber(&self, subscriber: Arc<Subscriber>) {
        self.subscribers
            .write()
            .expect("subscribers lock")
            .insert(subscriber.client_id().to_string(), subscriber);
    }

    pub fn remove_subscriber(&self, client_id: &str) {
        self.subscribers
            .write()
            .expect("subscribers lock")
            .remove(client_id);
    }

    // Remove only if the map still holds this exact subscriber, so the
    // teardown of a displaced connection cannot evict its replacement.
    pub(crate) fn remove_subscriber_instance(&self, subscriber: &Arc<Subscriber>) {
        let mut subscribers = self.subscribers.write().expect("subscribers lock");
        if subscribers
            .get(subscriber.client_id())
            .is_some_and(|current| Arc::ptr_eq(current, subscriber))
        {
            subscribers.remove(subscriber.client_id());
        }
    }

    /// Snapshot of the current subscriber set.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .read()
            .expect("subscribers lock")
            .values()
            .cloned()
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("subscribers lock").len()
    }

    /// Stamp the message, record it, and fan it out.
    ///
    /// The subscriber set is snapshotted before any enqueue runs, so
    /// overflow handling for one slow consumer never stalls other
    /// publishes or subscribes on this topic.
    pub fn publish(&self, mut message: Message) {
        message.timestamp = Some(Utc::now());
        // Count before append so the count never trails the history size.
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.history.append(message.clone());
        metrics::counter!("relay_engine_messages_published_total").increment(1);

        let subscribers = self.subscribers();
        let frame = ServerFrame::event(&self.name, message);
        for subscriber in subscribers {
            if !subscriber.is_closed() {
                subscriber.enqueue(frame.clone());
            }
        }
    }

    pub fn last_n(&self, n: usize) -> Vec<Message> {
        self.history.last(n)
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn history_size(&self) -> usize {
        self.history.size()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(tag: &str) -> Message {
        Message::new(tag, serde_json::json!({"tag": tag}))
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_subscriber() {
        let topic = Topic::new("orders", 10);
        let a = Arc::new(Subscriber::new("a", 10));
        let b = Arc::new(Subscriber::new("b", 10));
        topic.add_subscriber(a.clone());
        topic.add_subscriber(b.clone());

        topic.publish(message("m1"));

        for subscriber in [&a, &b] {
            match subscriber.next_frame().await.expect("frame") {
                ServerFrame::Event { topic, message, .. } => {
                    assert_eq!(topic, "orders");
                    assert_eq!(message.id, "m1");
                    assert!(message.timestamp.is_some());
                }
                other => panic!("expected event, got {other:?}"),
            }
        }
    }

    #[test]
    fn publish_skips_closed_subscribers() {
        let topic = Topic::new("orders", 10);
        let open = Arc::new(Subscriber::new("open", 10));
        let closed = Arc::new(Subscriber::new("closed", 10));
        closed.close();
        topic.add_subscriber(open.clone());
        topic.add_subscriber(closed.clone());

        topic.publish(message("m1"));
        assert_eq!(open.queued_frames(), 1);
        assert_eq!(closed.queued_frames(), 0);
    }

    #[test]
    fn publish_records_history_and_count() {
        let topic = Topic::new("orders", 2);
        for tag in ["m1", "m2", "m3"] {
            topic.publish(message(tag));
        }
        assert_eq!(topic.message_count(), 3);
        assert_eq!(topic.history_size(), 2);
        let ids: Vec<_> = topic.last_n(5).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
    }

    #[test]
    fn adding_same_client_id_replaces_membership() {
        let topic = Topic::new("orders", 2);
        let first = Arc::new(Subscriber::new("c1", 10));
        let second = Arc::new(Subscriber::new("c1", 10));
        topic.add_subscriber(first.clone());
        topic.add_subscriber(second.clone());
        assert_eq!(topic.subscriber_count(), 1);

        // Removing the displaced instance must not evict the replacement.
        topic.remove_subscriber_instance(&first);
        assert_eq!(topic.subscriber_count(), 1);
        topic.remove_subscriber_instance(&second);
        assert_eq!(topic.subscriber_count(), 0);
    }
}
