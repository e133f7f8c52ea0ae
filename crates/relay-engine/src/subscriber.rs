// Per-connection delivery state: a bounded frame queue filled by engine
// fan-out and drained by the connection's single write loop.
use relay_wire::{ErrorCode, ServerFrame};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, watch};

#[derive(Debug)]
pub struct Subscriber {
    client_id: String,
    capacity: usize,
    queue: Mutex<VecDeque<ServerFrame>>,
    notify: Notify,
    topics: Mutex<HashSet<String>>,
    closed: AtomicBool,
    // Set on overflow, cleared whenever the write loop dequeues a frame.
    // An overflow that finds it still set means the consumer made no
    // progress since the last one.
    saturated: AtomicBool,
    authenticated: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl Subscriber {
    pub fn new(client_id: impl Into<String>, capacity: usize) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            client_id: client_id.into(),
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            topics: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
            saturated: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            closed_tx,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Queue a frame for delivery without blocking. No-op once closed.
    ///
    /// On overflow the oldest queued frame is dropped and the append
    /// retried. If the queue was still saturated from a previous overflow,
    /// or the retry loses a race with another producer, the subscriber gets
    /// one terminal `SLOW_CONSUMER` notice and is closed.
    pub fn enqueue(&self, frame: ServerFrame) {
        if self.is_closed() {
            return;
        }
        let Err(frame) = self.try_push(frame) else {
            return;
        };

        tracing::warn!(client_id = %self.client_id, "slow consumer: dropping oldest queued frame");
        metrics::counter!("relay_engine_frames_dropped_total").increment(1);
        let was_saturated = self.saturated.swap(true, Ordering::AcqRel);
        self.drop_oldest();
        let still_full = self.try_push(frame).is_err();
        if was_saturated || still_full {
            tracing::warn!(client_id = %self.client_id, "slow consumer: queue overflow, disconnecting");
            metrics::counter!("relay_engine_slow_consumer_disconnects_total").increment(1);
            self.push_unbounded(ServerFrame::error(
                None,
                ErrorCode::SlowConsumer,
                "subscriber queue overflow, disconnecting",
            ));
            self.close();
        }
    }

    /// Next frame for the write loop. Returns `None` once the subscriber is
    /// closed and the queue fully drained, so already-queued frames (and a
    /// terminal notice) still reach the transport. Cancel-safe: no frame is
    /// held across an await point.
    pub async fn next_frame(&self) -> Option<ServerFrame> {
        loop {
            if let Some(frame) = self.pop() {
                self.saturated.store(false, Ordering::Release);
                return Some(frame);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Idempotent close. Enqueue becomes a no-op, the write loop is woken
    /// to drain and shut the transport, and the read loop is signalled.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.closed_tx.send(true);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A watch receiver that flips to `true` when the subscriber closes.
    pub fn closed_watch(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    pub fn set_authenticated(&self) {
        self.authenticated.store(true, Ordering::Release);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn add_topic(&self, name: &str) {
        self.topics.lock().expect("topics lock").insert(name.to_string());
    }

    pub fn remove_topic(&self, name: &str) {
        self.topics.lock().expect("topics lock").remove(name);
    }

    /// Snapshot of the topics this subscriber currently belongs to.
    pub fn topics(&self) -> Vec<String> {
        self.topics
            .lock()
            .expect("topics lock")
            .iter()
            .cloned()
            .collect()
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.lock().expect("queue lock").len()
    }

    // Each step of the overflow protocol takes the lock on its own, so
    // concurrent producers can interleave between the drop and the retry.
    fn try_push(&self, frame: ServerFrame) -> Result<(), ServerFrame> {
        {
            let mut queue = self.queue.lock().expect("queue lock");
            if queue.len() >= self.capacity {
                return Err(frame);
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
        Ok(())
    }

    fn drop_oldest(&self) {
        self.queue.lock().expect("queue lock").pop_front();
    }

    // The terminal notice may exceed capacity by one slot so it cannot
    // displace events already owed to the peer.
    fn push_unbounded(&self, frame: ServerFrame) {
        self.queue.lock().expect("queue lock").push_back(frame);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<ServerFrame> {
        self.queue.lock().expect("queue lock").pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_wire::Message;

    fn event(tag: &str) -> ServerFrame {
        ServerFrame::event("orders", Message::new(tag, serde_json::Value::Null))
    }

    fn event_id(frame: &ServerFrame) -> String {
        match frame {
            ServerFrame::Event { message, .. } => message.id.clone(),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn frames_drain_in_fifo_order() {
        let subscriber = Subscriber::new("c1", 8);
        subscriber.enqueue(event("a"));
        subscriber.enqueue(event("b"));
        subscriber.enqueue(event("c"));
        for expected in ["a", "b", "c"] {
            let frame = subscriber.next_frame().await.expect("frame");
            assert_eq!(event_id(&frame), expected);
        }
    }

    #[tokio::test]
    async fn enqueue_after_close_is_a_no_op() {
        let subscriber = Subscriber::new("c1", 8);
        subscriber.close();
        subscriber.enqueue(event("a"));
        assert_eq!(subscriber.queued_frames(), 0);
        assert!(subscriber.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn close_drains_queued_frames_before_ending() {
        let subscriber = Subscriber::new("c1", 8);
        subscriber.enqueue(event("a"));
        subscriber.enqueue(event("b"));
        subscriber.close();
        subscriber.close(); // idempotent
        assert_eq!(event_id(&subscriber.next_frame().await.expect("a")), "a");
        assert_eq!(event_id(&subscriber.next_frame().await.expect("b")), "b");
        assert!(subscriber.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_frame_once() {
        let subscriber = Subscriber::new("c1", 2);
        subscriber.enqueue(event("e1"));
        subscriber.enqueue(event("e2"));
        subscriber.enqueue(event("e3"));
        assert!(!subscriber.is_closed());
        assert_eq!(subscriber.queued_frames(), 2);
        assert_eq!(event_id(&subscriber.next_frame().await.expect("e2")), "e2");
        assert_eq!(event_id(&subscriber.next_frame().await.expect("e3")), "e3");
    }

    #[tokio::test]
    async fn repeated_overflow_without_progress_terminates() {
        // Stalled consumer, capacity 2: the third enqueue drops the oldest,
        // the fourth finds the queue still saturated and escalates. The peer
        // still gets the two most recent events, then the terminal notice.
        let subscriber = Subscriber::new("c1", 2);
        for tag in ["e1", "e2", "e3", "e4"] {
            subscriber.enqueue(event(tag));
        }
        assert!(subscriber.is_closed());
        assert_eq!(event_id(&subscriber.next_frame().await.expect("e3")), "e3");
        assert_eq!(event_id(&subscriber.next_frame().await.expect("e4")), "e4");
        match subscriber.next_frame().await.expect("terminal") {
            ServerFrame::Error { error, .. } => {
                assert_eq!(error.code, ErrorCode::SlowConsumer);
            }
            other => panic!("expected slow consumer error, got {other:?}"),
        }
        assert!(subscriber.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn consumer_progress_resets_the_overflow_escalation() {
        let subscriber = Subscriber::new("c1", 2);
        subscriber.enqueue(event("e1"));
        subscriber.enqueue(event("e2"));
        subscriber.enqueue(event("e3")); // overflow: drops e1
        assert_eq!(event_id(&subscriber.next_frame().await.expect("e2")), "e2");
        // The dequeue above counts as progress, so the next overflow drops
        // the oldest again instead of terminating.
        subscriber.enqueue(event("e4"));
        subscriber.enqueue(event("e5")); // overflow: drops e3
        assert!(!subscriber.is_closed());
        assert_eq!(event_id(&subscriber.next_frame().await.expect("e4")), "e4");
        assert_eq!(event_id(&subscriber.next_frame().await.expect("e5")), "e5");
    }

    #[tokio::test]
    async fn close_signals_the_watch_channel() {
        let subscriber = Subscriber::new("c1", 2);
        let mut watch = subscriber.closed_watch();
        assert!(!*watch.borrow());
        subscriber.close();
        watch.changed().await.expect("watch");
        assert!(*watch.borrow());
    }

    #[test]
    fn topic_membership_round_trip() {
        let subscriber = Subscriber::new("c1", 2);
        subscriber.add_topic("orders");
        subscriber.add_topic("invoices");
        let mut topics = subscriber.topics();
        topics.sort();
        assert_eq!(topics, vec!["invoices", "orders"]);
        subscriber.remove_topic("orders");
        assert_eq!(subscriber.topics(), vec!["invoices"]);
    }
}
