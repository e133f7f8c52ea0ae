//! Control API request and response bodies.
use relay_engine::{EngineHealth, TopicStats, TopicSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTopicRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateTopicResponse {
    pub status: String,
    pub topic: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteTopicResponse {
    pub status: String,
    pub topic: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopicEntry {
    pub name: String,
    pub subscribers: usize,
}

impl From<TopicSummary> for TopicEntry {
    fn from(summary: TopicSummary) -> Self {
        Self {
            name: summary.name,
            subscribers: summary.subscribers,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListTopicsResponse {
    pub topics: Vec<TopicEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopicStatsEntry {
    pub messages: u64,
    pub subscribers: usize,
}

impl From<TopicStats> for TopicStatsEntry {
    fn from(stats: TopicStats) -> Self {
        Self {
            messages: stats.messages,
            subscribers: stats.subscribers,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub topics: HashMap<String, TopicStatsEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub uptime_sec: u64,
    pub topics: usize,
    pub subscribers: usize,
}

impl From<EngineHealth> for HealthResponse {
    fn from(health: EngineHealth) -> Self {
        Self {
            uptime_sec: health.uptime_sec,
            topics: health.topics,
            subscribers: health.subscribers,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub endpoints: HashMap<String, String>,
}
