// In-memory pub/sub core: topic registry, per-subscriber bounded delivery
// queues with drop-oldest backpressure, and bounded replay history.
pub mod engine;
pub mod ring;
pub mod subscriber;
pub mod topic;

pub use engine::{Engine, EngineHealth, TopicStats, TopicSummary};
pub use ring::HistoryBuffer;
pub use subscriber::Subscriber;
pub use topic::Topic;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("topic already exists: {0}")]
    TopicExists(String),
    #[error("topic not found: {0}")]
    TopicNotFound(String),
    #[error("client not found: {0}")]
    ClientNotFound(String),
}
