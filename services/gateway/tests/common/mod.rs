#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use gateway::app::{AppState, build_router};
use gateway::config::GatewayConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        port: 0,
        metrics_bind: "127.0.0.1:0".parse().expect("addr"),
        ring_buffer_size: 100,
        subscriber_queue_size: 100,
        ping_period: Duration::from_secs(30),
        pong_wait: Duration::from_secs(60),
        write_wait: Duration::from_secs(10),
        read_timeout: Duration::from_secs(15),
        write_timeout: Duration::from_secs(15),
        idle_timeout: Duration::ZERO,
        shutdown_timeout: Duration::from_secs(5),
        auth_enabled: false,
        api_keys: Vec::new(),
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
}

impl TestServer {
    pub fn ws_url(&self, client_id: Option<&str>) -> String {
        match client_id {
            Some(id) => format!("ws://{}/ws?client_id={id}", self.addr),
            None => format!("ws://{}/ws", self.addr),
        }
    }
}

/// Serve the gateway router on an ephemeral port for websocket tests.
pub async fn spawn_gateway(config: GatewayConfig) -> TestServer {
    let state = AppState::new(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve");
    });
    TestServer { addr, state }
}

pub async fn connect_ws(url: &str) -> WsClient {
    let (socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("ws connect");
    socket
}

pub async fn send_json(socket: &mut WsClient, value: serde_json::Value) {
    socket
        .send(WsMessage::Text(value.to_string()))
        .await
        .expect("ws send");
}

/// Next JSON frame from the server, skipping transport control frames.
pub async fn recv_json(socket: &mut WsClient) -> serde_json::Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame within deadline")
            .expect("stream open")
            .expect("ws read");
        match message {
            WsMessage::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            WsMessage::Binary(bytes) => return serde_json::from_slice(&bytes).expect("json frame"),
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            WsMessage::Close(_) => panic!("connection closed while awaiting frame"),
        }
    }
}

/// Drive the stream until the server closes it.
pub async fn expect_close(socket: &mut WsClient) {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("close within deadline")
        {
            None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => return,
            Some(Ok(_)) => continue,
        }
    }
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
