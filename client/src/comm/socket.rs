//! Push channels to the socket node
//!
//! One channel per context (`userComm`, `groupComm`, `memberComm`). Each
//! channel subscribes with a signed handshake and feeds every frame it
//! receives through the shared [`InboundHandler`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::comm::inbound::InboundHandler;
use crate::comm::keys::sign;
use crate::error::{AppError, AppResult};

/// Reconnect delays stop growing here
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

pub const USER_CHANNEL: &str = "userComm";
pub const GROUP_CHANNEL: &str = "groupComm";
pub const MEMBER_CHANNEL: &str = "memberComm";

/// An open connection to the socket node
#[async_trait]
pub trait SocketConnection: Send {
    /// Emit a named event with a JSON payload
    async fn emit(&mut self, event: &str, payload: Value) -> AppResult<()>;

    /// Next `message` payload; `None` once the connection is gone
    async fn next_message(&mut self) -> Option<AppResult<String>>;
}

/// Opens connections to the socket node
#[async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    async fn connect(&self, address: &str) -> AppResult<Box<dyn SocketConnection>>;
}

/// Timestamp format used by the subscribe handshake
pub fn handshake_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Subscribe payload for channel `name` keyed by `token`
pub fn subscribe_payload(name: &str, token: &str, timestamp: &str) -> AppResult<Value> {
    Ok(json!({
        "id": token,
        "type": name,
        "timestamp": timestamp,
        "signature": sign(timestamp, token)?,
    }))
}

/// Manages the set of open channels
pub struct Sockets {
    connector: Arc<dyn SocketConnector>,
    inbound: InboundHandler,
    address: String,
    retry_base: Duration,
    channels: HashMap<String, JoinHandle<()>>,
}

impl Sockets {
    pub fn new(
        connector: Arc<dyn SocketConnector>,
        inbound: InboundHandler,
        address: impl Into<String>,
        retry_base: Duration,
    ) -> Self {
        Self {
            connector,
            inbound,
            address: address.into(),
            retry_base,
            channels: HashMap::new(),
        }
    }

    /// Open channel `name` keyed by `token`, replacing any channel of that name
    pub fn open(&mut self, name: &str, token: &str) {
        tracing::debug!("Opening socket {:?} at {}", name, self.address);
        self.close(name);
        let task = tokio::spawn(run_channel(
            self.connector.clone(),
            self.inbound.clone(),
            self.address.clone(),
            name.to_string(),
            token.to_string(),
            self.retry_base,
        ));
        self.channels.insert(name.to_string(), task);
    }

    pub fn close(&mut self, name: &str) {
        if let Some(task) = self.channels.remove(name) {
            tracing::debug!("closing socket {:?}", name);
            task.abort();
        }
    }

    pub fn close_all(&mut self) {
        let names: Vec<String> = self.channels.keys().cloned().collect();
        for name in names {
            self.close(&name);
        }
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.channels
            .get(name)
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Sockets {
    fn drop(&mut self) {
        self.close_all();
    }
}

async fn run_channel(
    connector: Arc<dyn SocketConnector>,
    inbound: InboundHandler,
    address: String,
    name: String,
    token: String,
    retry_base: Duration,
) {
    let mut delay = retry_base;
    loop {
        match connector.connect(&address).await {
            Ok(mut conn) => {
                let subscribed = match subscribe_payload(&name, &token, &handshake_timestamp()) {
                    Ok(payload) => conn.emit("subscribe", payload).await,
                    Err(e) => Err(e),
                };
                match subscribed {
                    Ok(()) => {
                        tracing::info!("socket {} subscribed", name);
                        delay = retry_base;
                        while let Some(frame) = conn.next_message().await {
                            match frame {
                                Ok(text) => {
                                    inbound.handle_text(&text).await;
                                }
                                Err(e) => {
                                    tracing::warn!("socket {} read failed: {}", name, e);
                                    break;
                                }
                            }
                        }
                        tracing::info!("socket {} disconnected", name);
                    }
                    Err(e) => tracing::warn!("socket {} subscribe failed: {}", name, e),
                }
            }
            Err(e) => tracing::warn!("socket {} connect failed: {}", name, e),
        }

        tracing::debug!("reconnecting socket {} in {:?}", name, delay);
        tokio::time::sleep(delay).await;
        delay = delay.saturating_mul(2).min(MAX_RECONNECT_DELAY);
    }
}

// ============================================================================
// WebSocket implementation
// ============================================================================

/// Connector speaking JSON event frames over WebSockets:
/// `{"event": "<name>", "data": <payload>}`
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

/// Map an `http(s)` node address onto its `ws(s)` equivalent
pub fn websocket_url(address: &str) -> AppResult<url::Url> {
    let mut url = url::Url::parse(address)
        .map_err(|e| AppError::Config(format!("invalid node address {:?}: {}", address, e)))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(AppError::Config(format!("unsupported node scheme {:?}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Config(format!("cannot use scheme {} for {}", scheme, address)))?;
    Ok(url)
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, address: &str) -> AppResult<Box<dyn SocketConnection>> {
        let url = websocket_url(address)?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| AppError::Socket(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// Payload of a `message` event frame. Bare frames count as messages too.
fn message_payload(text: &str) -> Option<String> {
    let Ok(Value::Object(frame)) = serde_json::from_str::<Value>(text) else {
        return Some(text.to_string());
    };
    match (frame.get("event").and_then(Value::as_str), frame.get("data")) {
        (Some("message"), Some(Value::String(data))) => Some(data.clone()),
        (Some("message"), Some(data)) => Some(data.to_string()),
        (Some(other), _) => {
            tracing::trace!("ignoring socket event {}", other);
            None
        }
        (None, _) => Some(text.to_string()),
    }
}

#[async_trait]
impl SocketConnection for WsConnection {
    async fn emit(&mut self, event: &str, payload: Value) -> AppResult<()> {
        let frame = json!({"event": event, "data": payload}).to_string();
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| AppError::Socket(e.to_string()))
    }

    async fn next_message(&mut self) -> Option<AppResult<String>> {
        loop {
            let text = match self.stream.next().await? {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(AppError::Socket(e.to_string()))),
            };
            if let Some(payload) = message_payload(&text) {
                return Some(Ok(payload));
            }
        }
    }
}
