// One task pair per connection. The read loop decodes client frames and
// drives the engine; the write loop is the only writer on the socket and
// drains the subscriber queue, interleaving heartbeats.
use crate::app::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_engine::{EngineError, Subscriber};
use relay_wire::{ClientFrame, ErrorCode, Message, ServerFrame};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, timeout};

// Window a connecting client has to present credentials.
const AUTH_DEADLINE: Duration = Duration::from_secs(10);

pub(super) async fn run(socket: WebSocket, state: AppState, client_id: String) {
    let subscriber = Arc::new(Subscriber::new(
        client_id.clone(),
        state.config.subscriber_queue_size,
    ));
    state.engine.register_client(subscriber.clone()).await;
    tracing::info!(client_id = %client_id, "websocket client connected");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(
        sink,
        subscriber.clone(),
        state.config.ping_period,
        state.config.write_wait,
    ));

    read_loop(stream, &state, &subscriber).await;

    // Every read-loop exit path tears the connection down completely; the
    // write loop drains what is queued and closes the transport.
    state.engine.unregister_client(&subscriber).await;
    let _ = writer.await;
    tracing::info!(client_id = %client_id, "websocket client disconnected");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    subscriber: Arc<Subscriber>,
    ping_period: Duration,
    write_wait: Duration,
) {
    let mut heartbeat = tokio::time::interval(ping_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            frame = subscriber.next_frame() => {
                let Some(frame) = frame else { break };
                if write_frame(&mut sink, &frame, write_wait).await.is_err() {
                    tracing::info!(client_id = %subscriber.client_id(), "write failed; dropping connection");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let ping = ServerFrame::info(None, "ping");
                if write_frame(&mut sink, &ping, write_wait).await.is_err() {
                    tracing::info!(client_id = %subscriber.client_id(), "heartbeat failed; dropping connection");
                    break;
                }
            }
        }
    }

    subscriber.close();
    let _ = sink.close().await;
}

async fn write_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrame,
    write_wait: Duration,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(frame)?;
    timeout(write_wait, sink.send(WsMessage::Text(text)))
        .await
        .map_err(|_| anyhow::anyhow!("write deadline exceeded"))??;
    Ok(())
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    state: &AppState,
    subscriber: &Arc<Subscriber>,
) {
    let mut closed = subscriber.closed_watch();

    if state.validator.is_enabled()
        && !auth_gate(&mut stream, state, subscriber, &mut closed).await
    {
        return;
    }

    let pong_wait = state.config.pong_wait;
    let idle_timeout = state.config.idle_timeout;
    let mut last_activity = Instant::now();

    loop {
        // The read deadline is the pong window, shortened to whatever is
        // left of the idle allowance so a permanently silent peer is
        // evicted at idle_timeout rather than pong_wait.
        let read_deadline = if idle_timeout.is_zero() {
            pong_wait
        } else {
            pong_wait.min(idle_timeout.saturating_sub(last_activity.elapsed()))
        };
        let next = tokio::select! {
            _ = closed.changed() => break,
            next = timeout(read_deadline, stream.next()) => next,
        };
        let message = match next {
            Err(_) => {
                if !idle_timeout.is_zero() && last_activity.elapsed() >= idle_timeout {
                    tracing::info!(client_id = %subscriber.client_id(), "closing idle connection");
                } else {
                    // The peer went silent for longer than the read deadline.
                    tracing::info!(client_id = %subscriber.client_id(), "read deadline expired");
                }
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::debug!(client_id = %subscriber.client_id(), error = %err, "websocket read failed");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };
        last_activity = Instant::now();

        match message {
            WsMessage::Text(text) => dispatch(state, subscriber, &text).await,
            WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => dispatch(state, subscriber, &text).await,
                Err(_) => send_error(
                    subscriber,
                    None,
                    ErrorCode::BadRequest,
                    "frames must be UTF-8 JSON",
                ),
            },
            // Transport pings and pongs only refresh the read deadline.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Close(_) => break,
        }
    }
}

// Only an auth frame is acceptable until the gate passes; anything else
// ends the connection after an error notice.
async fn auth_gate(
    stream: &mut SplitStream<WebSocket>,
    state: &AppState,
    subscriber: &Arc<Subscriber>,
    closed: &mut watch::Receiver<bool>,
) -> bool {
    let first = tokio::select! {
        _ = closed.changed() => return false,
        first = timeout(AUTH_DEADLINE, next_text(stream)) => first,
    };
    let text = match first {
        Err(_) => {
            send_error(
                subscriber,
                None,
                ErrorCode::Unauthorized,
                "Authentication timeout",
            );
            tracing::warn!(client_id = %subscriber.client_id(), "authentication timeout");
            return false;
        }
        Ok(None) => return false,
        Ok(Some(text)) => text,
    };

    match ClientFrame::parse(&text) {
        Ok(ClientFrame::Auth {
            api_key,
            request_id,
        }) => {
            if !state.validator.validate(&api_key) {
                send_error(
                    subscriber,
                    request_id,
                    ErrorCode::InvalidApiKey,
                    "Invalid or expired API key",
                );
                tracing::warn!(client_id = %subscriber.client_id(), "authentication failed");
                return false;
            }
            subscriber.set_authenticated();
            subscriber.enqueue(ServerFrame::ack(request_id, None, "authenticated"));
            tracing::info!(client_id = %subscriber.client_id(), "client authenticated");
            true
        }
        Ok(frame) => {
            send_error(
                subscriber,
                frame.request_id().map(str::to_owned),
                ErrorCode::Unauthorized,
                "Authentication required. First message must be of type 'auth'",
            );
            false
        }
        Err(_) => {
            send_error(
                subscriber,
                None,
                ErrorCode::Unauthorized,
                "Authentication required. First message must be of type 'auth'",
            );
            false
        }
    }
}

// The next text or binary payload, skipping transport control frames.
async fn next_text(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(message) = stream.next().await {
        match message {
            Ok(WsMessage::Text(text)) => return Some(text),
            Ok(WsMessage::Binary(bytes)) => return String::from_utf8(bytes).ok(),
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
            Ok(WsMessage::Close(_)) | Err(_) => return None,
        }
    }
    None
}

async fn dispatch(state: &AppState, subscriber: &Arc<Subscriber>, text: &str) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(relay_wire::Error::UnknownType(tag)) => {
            send_error(
                subscriber,
                None,
                ErrorCode::BadRequest,
                format!("Unknown message type: {tag}"),
            );
            return;
        }
        Err(err) => {
            send_error(subscriber, None, ErrorCode::BadRequest, err.to_string());
            return;
        }
    };

    match frame {
        // The gate already ran (or auth is disabled); repeats are invalid.
        ClientFrame::Auth { request_id, .. } => {
            send_error(
                subscriber,
                request_id,
                ErrorCode::BadRequest,
                "Already authenticated",
            );
        }
        ClientFrame::Subscribe {
            topic,
            last_n,
            request_id,
            ..
        } => handle_subscribe(state, subscriber, topic, last_n, request_id).await,
        ClientFrame::Unsubscribe {
            topic, request_id, ..
        } => handle_unsubscribe(state, subscriber, topic, request_id).await,
        ClientFrame::Publish {
            topic,
            message,
            request_id,
        } => handle_publish(state, subscriber, topic, message, request_id).await,
        ClientFrame::Ping { request_id } => subscriber.enqueue(ServerFrame::pong(request_id)),
    }
}

async fn handle_subscribe(
    state: &AppState,
    subscriber: &Arc<Subscriber>,
    topic: String,
    last_n: usize,
    request_id: Option<String>,
) {
    if topic.is_empty() {
        send_error(subscriber, request_id, ErrorCode::BadRequest, "topic is required");
        return;
    }
    match state
        .engine
        .subscribe(subscriber.client_id(), &topic, last_n)
        .await
    {
        Ok(history) => {
            // Ack first; replayed events follow in queue order, so anything
            // published after this point lands behind the replay.
            subscriber.enqueue(ServerFrame::ack(request_id, Some(topic.clone()), "ok"));
            for message in history {
                subscriber.enqueue(ServerFrame::event(&topic, message));
            }
        }
        Err(err) => send_engine_error(subscriber, request_id, &topic, err),
    }
}

async fn handle_unsubscribe(
    state: &AppState,
    subscriber: &Arc<Subscriber>,
    topic: String,
    request_id: Option<String>,
) {
    if topic.is_empty() {
        send_error(subscriber, request_id, ErrorCode::BadRequest, "topic is required");
        return;
    }
    match state
        .engine
        .unsubscribe(subscriber.client_id(), &topic)
        .await
    {
        Ok(()) => subscriber.enqueue(ServerFrame::ack(request_id, Some(topic), "ok")),
        Err(err) => send_engine_error(subscriber, request_id, &topic, err),
    }
}

async fn handle_publish(
    state: &AppState,
    subscriber: &Arc<Subscriber>,
    topic: String,
    message: Option<Message>,
    request_id: Option<String>,
) {
    if topic.is_empty() {
        send_error(subscriber, request_id, ErrorCode::BadRequest, "topic is required");
        return;
    }
    let Some(message) = message else {
        send_error(subscriber, request_id, ErrorCode::BadRequest, "message is required");
        return;
    };
    if message.id.is_empty() {
        send_error(subscriber, request_id, ErrorCode::BadRequest, "message.id is required");
        return;
    }
    if !message.has_valid_id() {
        send_error(
            subscriber,
            request_id,
            ErrorCode::BadRequest,
            "message.id must be a valid UUID",
        );
        return;
    }
    match state.engine.publish(&topic, message).await {
        Ok(()) => subscriber.enqueue(ServerFrame::ack(request_id, Some(topic), "ok")),
        Err(err) => send_engine_error(subscriber, request_id, &topic, err),
    }
}

fn send_engine_error(
    subscriber: &Subscriber,
    request_id: Option<String>,
    topic: &str,
    err: EngineError,
) {
    match err {
        EngineError::TopicNotFound(_) => send_error(
            subscriber,
            request_id,
            ErrorCode::TopicNotFound,
            format!("Topic '{topic}' does not exist"),
        ),
        other => send_error(subscriber, request_id, ErrorCode::Internal, other.to_string()),
    }
}

fn send_error(
    subscriber: &Subscriber,
    request_id: Option<String>,
    code: ErrorCode,
    message: impl Into<String>,
) {
    subscriber.enqueue(ServerFrame::error(request_id, code, message));
}
