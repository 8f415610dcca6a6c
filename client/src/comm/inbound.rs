//! Inbound message handling
//!
//! Every payload from the server, whether it answers an RPC or arrives on a
//! socket channel, goes through [`InboundHandler::handle`]. Valid payloads
//! forward their configuration and commands on the incoming channel in
//! arrival order.

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::comm::keys::SharedKeyRing;
use crate::error::AppError;
use crate::models::de::truthy;
use crate::state::{Notice, NoticeLevel};

/// Signed wrapper around every server payload
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    body: Option<Value>,
}

/// Body of a validated server payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Body {
    #[serde(default, deserialize_with = "truthy")]
    pub status: bool,
    #[serde(default)]
    pub msg: Option<Value>,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub commands: Option<Map<String, Value>>,
    /// Any other result fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Body {
    /// User-facing message text, if the server sent one
    pub fn message(&self) -> Option<String> {
        self.msg.as_ref().map(|m| match m {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Commands the server may push to the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Logout,
    Invite(Value),
    Overlay(String),
    CheckEmail(String),
    RemoveOverlay,
    Navigate(String),
}

impl ClientCommand {
    pub fn parse(name: &str, arg: &Value) -> Option<Self> {
        let text = || match arg {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        match name {
            "logout" => Some(Self::Logout),
            "invite" => Some(Self::Invite(arg.clone())),
            "overlay" => Some(Self::Overlay(text())),
            "checkEmail" | "check_email" => Some(Self::CheckEmail(text())),
            "removeOverlay" | "remove_overlay" => Some(Self::RemoveOverlay),
            "navigate" => Some(Self::Navigate(text())),
            _ => None,
        }
    }
}

/// Items forwarded from the comm layer to the session, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Notice(Notice),
    Config(Value),
    Command(ClientCommand),
}

/// Result of handling one inbound payload
#[derive(Debug)]
pub enum Outcome {
    /// Unparseable, unsigned or signed by no known key. Dropped.
    Invalid(AppError),
    /// Valid, but the server reported a falsy status
    Failed(Body),
    Succeeded(Body),
}

impl Outcome {
    pub fn into_result(self) -> Result<Body, AppError> {
        match self {
            Outcome::Invalid(e) => Err(e),
            Outcome::Failed(body) => Err(AppError::Application(
                body.message()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "request was not successful".to_string()),
            )),
            Outcome::Succeeded(body) => Ok(body),
        }
    }
}

/// Validates inbound payloads and forwards their contents
#[derive(Debug, Clone)]
pub struct InboundHandler {
    keys: SharedKeyRing,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl InboundHandler {
    pub fn new(keys: SharedKeyRing, tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { keys, tx }
    }

    /// Handle a raw text payload
    pub async fn handle_text(&self, raw: &str) -> Outcome {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.handle(value).await,
            Err(e) => {
                tracing::error!("Unparseable message received: {}", e);
                Outcome::Invalid(AppError::Json(e))
            }
        }
    }

    /// Handle a payload that is already JSON. A JSON string is parsed once more.
    pub async fn handle(&self, data: Value) -> Outcome {
        let data = match data {
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!("Unparseable message received: {}", e);
                    return Outcome::Invalid(AppError::Json(e));
                }
            },
            other => other,
        };

        if data.is_null() {
            tracing::warn!("Empty message received");
            return Outcome::Invalid(AppError::Malformed("empty message".into()));
        }

        let envelope: Envelope = match serde_json::from_value(data) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!("Malformed message envelope: {}", e);
                return Outcome::Invalid(AppError::Malformed(e.to_string()));
            }
        };

        let timestamp = match &envelope.timestamp {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let validated = match (timestamp.as_deref(), envelope.signature.as_deref()) {
            (Some(ts), Some(sig)) => self.keys.read().await.validate(ts, sig),
            _ => None,
        };
        let Some(priority) = validated else {
            tracing::error!("Invalid message received");
            return Outcome::Invalid(AppError::InvalidSignature);
        };
        tracing::debug!("message validated with {:?} key", priority);

        let Some(body) = envelope.body else {
            tracing::error!("Could not find body in message");
            return Outcome::Invalid(AppError::Malformed("missing body".into()));
        };
        let body: Body = match serde_json::from_value(body) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Malformed message body: {}", e);
                return Outcome::Invalid(AppError::Malformed(e.to_string()));
            }
        };

        if let Some(text) = body.message() {
            let level = if body.status { NoticeLevel::Info } else { NoticeLevel::Error };
            self.forward(Inbound::Notice(Notice::new(text, level)));
        }

        if !body.status {
            tracing::warn!("received falsy status");
            return Outcome::Failed(body);
        }

        match &body.config {
            Some(config) if !config.is_null() => self.forward(Inbound::Config(config.clone())),
            _ => {
                tracing::debug!("no configuration data found");
                return Outcome::Succeeded(body);
            }
        }

        if let Some(commands) = &body.commands {
            for (name, arg) in commands {
                match ClientCommand::parse(name, arg) {
                    Some(command) => {
                        tracing::debug!("executing command: {}", name);
                        self.forward(Inbound::Command(command));
                    }
                    None => tracing::error!("Command {} has not been installed", name),
                }
            }
        }

        Outcome::Succeeded(body)
    }

    fn forward(&self, item: Inbound) {
        if self.tx.send(item).is_err() {
            tracing::warn!("incoming channel closed, dropping inbound item");
        }
    }
}
