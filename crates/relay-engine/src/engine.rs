// Topic and client registries plus the lifecycle operations the gateway
// drives over them. Registries sit behind a readers-writer lock so
// publishes and stats reads proceed in parallel while create/delete and
// registration serialize.
use crate::subscriber::Subscriber;
use crate::topic::Topic;
use crate::{EngineError, Result};
use relay_wire::{Message, ServerFrame};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct TopicSummary {
    pub name: String,
    pub subscribers: usize,
}

#[derive(Debug, Clone)]
pub struct TopicStats {
    pub messages: u64,
    pub subscribers: usize,
}

#[derive(Debug, Clone)]
pub struct EngineHealth {
    pub uptime_sec: u64,
    pub topics: usize,
    pub subscribers: usize,
}

#[derive(Debug)]
pub struct Engine {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    clients: RwLock<HashMap<String, Arc<Subscriber>>>,
    started_at: Instant,
    shutting_down: AtomicBool,
    history_capacity: usize,
}

impl Engine {
    /// A fresh engine whose topics keep `history_capacity` messages for
    /// replay.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
            shutting_down: AtomicBool::new(false),
            history_capacity: history_capacity.max(1),
        }
    }

    pub async fn create_topic(&self, name: &str) -> Result<()> {
        let mut topics = self.topics.write().await;
        if topics.contains_key(name) {
            return Err(EngineError::TopicExists(name.to_string()));
        }
        topics.insert(
            name.to_string(),
            Arc::new(Topic::new(name, self.history_capacity)),
        );
        drop(topics);
        tracing::info!(topic = %name, history = self.history_capacity, "topic created");
        Ok(())
    }

    /// Delete a topic, notifying its subscribers and revoking their
    /// membership. Subscribers stay connected.
    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        let topic = {
            let mut topics = self.topics.write().await;
            topics
                .remove(name)
                .ok_or_else(|| EngineError::TopicNotFound(name.to_string()))?
        };
        tracing::info!(topic = %name, "topic deleted");

        // Notify outside the registry lock so enqueue cost cannot block it.
        let notice = ServerFrame::info(Some(name.to_string()), "topic_deleted");
        for subscriber in topic.subscribers() {
            subscriber.enqueue(notice.clone());
            subscriber.remove_topic(name);
        }
        Ok(())
    }

    pub async fn list_topics(&self) -> Vec<TopicSummary> {
        let topics = self.topics.read().await;
        topics
            .values()
            .map(|topic| TopicSummary {
                name: topic.name().to_string(),
                subscribers: topic.subscriber_count(),
            })
            .collect()
    }

    pub async fn topic_exists(&self, name: &str) -> bool {
        self.topics.read().await.contains_key(name)
    }

    /// Subscribe a registered client to a topic. Re-subscribing dedupes via
    /// the membership map and still succeeds. Returns the replay window the
    /// caller should enqueue as events after its ack.
    pub async fn subscribe(
        &self,
        client_id: &str,
        topic_name: &str,
        last_n: usize,
    ) -> Result<Vec<Message>> {
        let topic = self.get_topic(topic_name).await?;
        let subscriber = self.get_client(client_id).await?;

        topic.add_subscriber(subscriber.clone());
        subscriber.add_topic(topic_name);
        tracing::info!(client_id = %client_id, topic = %topic_name, "client subscribed");

        if last_n == 0 {
            return Ok(Vec::new());
        }
        Ok(topic.last_n(last_n))
    }

    /// Unsubscribe a client. Idempotent for a client that is not in the
    /// topic's set, but the topic itself must exist.
    pub async fn unsubscribe(&self, client_id: &str, topic_name: &str) -> Result<()> {
        let topic = self.get_topic(topic_name).await?;
        topic.remove_subscriber(client_id);
        if let Ok(subscriber) = self.get_client(client_id).await {
            subscriber.remove_topic(topic_name);
        }
        tracing::info!(client_id = %client_id, topic = %topic_name, "client unsubscribed");
        Ok(())
    }

    pub async fn publish(&self, topic_name: &str, message: Message) -> Result<()> {
        let topic = self.get_topic(topic_name).await?;
        tracing::debug!(topic = %topic_name, id = %message.id, "message published");
        topic.publish(message);
        Ok(())
    }

    /// Register a connection's subscriber. A later registration under the
    /// same client id displaces the earlier one, which is detached from its
    /// topics and closed here.
    pub async fn register_client(&self, subscriber: Arc<Subscriber>) {
        let client_id = subscriber.client_id().to_string();
        let previous = {
            let mut clients = self.clients.write().await;
            clients.insert(client_id.clone(), subscriber)
        };
        metrics::gauge!("relay_engine_connected_clients").increment(1.0);
        if let Some(previous) = previous {
            tracing::warn!(client_id = %client_id, "client id reused; displacing previous registration");
            metrics::gauge!("relay_engine_connected_clients").decrement(1.0);
            self.detach(&previous).await;
        }
        tracing::info!(client_id = %client_id, "client registered");
    }

    /// Unregister a connection on teardown: drop the registry entry, leave
    /// every topic, close the subscriber. Identity-guarded so the teardown
    /// of a displaced connection cannot remove its replacement.
    pub async fn unregister_client(&self, subscriber: &Arc<Subscriber>) {
        let client_id = subscriber.client_id();
        let removed = {
            let mut clients = self.clients.write().await;
            match clients.get(client_id) {
                Some(current) if Arc::ptr_eq(current, subscriber) => {
                    clients.remove(client_id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            metrics::gauge!("relay_engine_connected_clients").decrement(1.0);
            tracing::info!(client_id = %client_id, "client unregistered");
        }
        self.detach(subscriber).await;
    }

    pub async fn stats(&self) -> HashMap<String, TopicStats> {
        let topics = self.topics.read().await;
        topics
            .iter()
            .map(|(name, topic)| {
                (
                    name.clone(),
                    TopicStats {
                        messages: topic.message_count(),
                        subscribers: topic.subscriber_count(),
                    },
                )
            })
            .collect()
    }

    pub async fn health(&self) -> EngineHealth {
        let topics = self.topics.read().await.len();
        let subscribers = self.clients.read().await.len();
        EngineHealth {
            uptime_sec: self.started_at.elapsed().as_secs(),
            topics,
            subscribers,
        }
    }

    /// Flip the shutdown flag, then close every registered subscriber under
    /// the registry lock. The gateway refuses new connections once the flag
    /// is set.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        tracing::info!("engine shutting down");
        let clients = self.clients.write().await;
        for (client_id, subscriber) in clients.iter() {
            tracing::info!(client_id = %client_id, "closing client connection");
            subscriber.close();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    async fn get_topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.topics
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::TopicNotFound(name.to_string()))
    }

    async fn get_client(&self, client_id: &str) -> Result<Arc<Subscriber>> {
        self.clients
            .read()
            .await
            .get(client_id)
            .cloned()
            .ok_or_else(|| EngineError::ClientNotFound(client_id.to_string()))
    }

    // Remove a subscriber from every topic it joined, then close it.
    async fn detach(&self, subscriber: &Arc<Subscriber>) {
        for name in subscriber.topics() {
            if let Ok(topic) = self.get_topic(&name).await {
                topic.remove_subscriber_instance(subscriber);
            }
            subscriber.remove_topic(&name);
        }
        subscriber.close();
    }
}
