// JSON wire format for the relay protocol: one frame per websocket message.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

// Client frame tags we dispatch on; anything else is an unknown type.
const CLIENT_FRAME_TYPES: [&str; 5] = ["subscribe", "unsubscribe", "publish", "ping", "auth"];

/// A published message. The timestamp is assigned by the engine at publish
/// time and travels on the wire in the enclosing frame's `ts` field, never
/// inside the message object itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(skip)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
            timestamp: None,
        }
    }

    /// Whether the id is a syntactically valid UUID, the ingress requirement
    /// for publishes.
    pub fn has_valid_id(&self) -> bool {
        uuid::Uuid::parse_str(&self.id).is_ok()
    }
}

/// Frames sent by clients over the websocket transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        #[serde(default)]
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        #[serde(default)]
        last_n: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Unsubscribe {
        #[serde(default)]
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Publish {
        #[serde(default)]
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Auth {
        #[serde(default)]
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ClientFrame {
    /// Decode one client frame from a text payload.
    ///
    /// A frame whose `type` tag is not part of the protocol surfaces as
    /// `Error::UnknownType` so the runtime can echo the offending tag back;
    /// every other decode failure is `Error::Malformed`.
    pub fn parse(input: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        let tag = value
            .get("type")
            .and_then(|tag| tag.as_str())
            .map(str::to_owned);
        match serde_json::from_value(value) {
            Ok(frame) => Ok(frame),
            Err(err) => match tag {
                Some(tag) if !CLIENT_FRAME_TYPES.contains(&tag.as_str()) => {
                    Err(Error::UnknownType(tag))
                }
                _ => Err(Error::Malformed(err)),
            },
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            ClientFrame::Subscribe { request_id, .. }
            | ClientFrame::Unsubscribe { request_id, .. }
            | ClientFrame::Publish { request_id, .. }
            | ClientFrame::Ping { request_id }
            | ClientFrame::Auth { request_id, .. } => request_id.as_deref(),
        }
    }
}

/// The closed set of error codes surfaced to clients, on both the websocket
/// and control transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    TopicNotFound,
    SlowConsumer,
    Unauthorized,
    InvalidApiKey,
    MissingApiKey,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::TopicNotFound => "TOPIC_NOT_FOUND",
            ErrorCode::SlowConsumer => "SLOW_CONSUMER",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::MissingApiKey => "MISSING_API_KEY",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

/// Frames sent by the server. Every frame carries an RFC3339 UTC timestamp
/// in `ts`, stamped when the frame is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        status: String,
        ts: String,
    },
    Event {
        topic: String,
        message: Message,
        ts: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        error: ErrorInfo,
        ts: String,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        ts: String,
    },
    Info {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        msg: String,
        ts: String,
    },
}

impl ServerFrame {
    pub fn ack(request_id: Option<String>, topic: Option<String>, status: &str) -> Self {
        ServerFrame::Ack {
            request_id,
            topic,
            status: status.to_string(),
            ts: rfc3339(Utc::now()),
        }
    }

    /// An event frame. The `ts` field carries the publish timestamp so a
    /// replayed event keeps the instant it was originally published.
    pub fn event(topic: &str, message: Message) -> Self {
        let ts = rfc3339(message.timestamp.unwrap_or_else(Utc::now));
        ServerFrame::Event {
            topic: topic.to_string(),
            message,
            ts,
        }
    }

    pub fn error(request_id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            request_id,
            error: ErrorInfo {
                code,
                message: message.into(),
            },
            ts: rfc3339(Utc::now()),
        }
    }

    pub fn pong(request_id: Option<String>) -> Self {
        ServerFrame::Pong {
            request_id,
            ts: rfc3339(Utc::now()),
        }
    }

    pub fn info(topic: Option<String>, msg: &str) -> Self {
        ServerFrame::Info {
            topic,
            msg: msg.to_string(),
            ts: rfc3339(Utc::now()),
        }
    }
}

/// RFC3339 with second precision and a `Z` suffix, e.g.
/// `2025-08-25T10:00:00Z`.
pub fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
