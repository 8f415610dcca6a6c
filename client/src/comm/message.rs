//! Outbound requests and queued server messages

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::comm::inbound::Body;
use crate::error::{AppError, AppResult};

/// Remote procedures exposed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetList,
    GetObject,
    SubmitForm,
    GetAppConfig,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::GetList => "get_list",
            Action::GetObject => "get_object",
            Action::SubmitForm => "submit_form",
            Action::GetAppConfig => "get_app_config",
        }
    }
}

/// A call to a server function with positional JSON arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub action: String,
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(action: Action, args: Vec<Value>) -> Self {
        Self {
            action: action.name().to_string(),
            args,
        }
    }

    /// URL-encoded form body:
    /// `action=..&arg0=<json>..&quuid=..&time=..&signature=..`
    pub fn encode(&self, quuid: &Uuid, time_ms: i64, signature: &str) -> AppResult<String> {
        let mut query = format!("action={}", urlencoding::encode(&self.action));
        for (i, arg) in self.args.iter().enumerate() {
            let json = serde_json::to_string(arg)?;
            query.push_str(&format!("&arg{}={}", i, urlencoding::encode(&json)));
        }
        query.push_str(&format!("&quuid={}", quuid));
        query.push_str(&format!("&time={}", time_ms));
        query.push_str(&format!("&signature={}", urlencoding::encode(signature)));
        Ok(query)
    }
}

/// Completion handed back to whoever queued the message
pub type Completion = oneshot::Sender<AppResult<Body>>;

/// A request waiting in, or travelling through, the outbound queue
#[derive(Debug)]
pub struct ServerMessage {
    pub uuid: Uuid,
    pub method: String,
    /// Encoded form body, identical on every retry
    pub payload: String,
    pub in_flight: bool,
    /// Delay before the next retry
    pub retry_delay: Duration,
    pub attempts: u32,
    completion: Option<Completion>,
}

impl ServerMessage {
    pub fn new(uuid: Uuid, method: impl Into<String>, payload: String, completion: Option<Completion>) -> Self {
        let method = method.into();
        if completion.is_some() {
            tracing::debug!("Method {} has a callback.", method);
        }
        Self {
            uuid,
            method,
            payload,
            in_flight: false,
            retry_delay: Duration::ZERO,
            attempts: 0,
            completion,
        }
    }

    /// Short id for log lines
    pub fn short_id(&self) -> String {
        self.uuid.simple().to_string()[..4].to_string()
    }

    /// Resolve the caller's completion, if any
    pub fn finish(mut self, result: AppResult<Body>) {
        match self.completion.take() {
            Some(tx) => {
                if tx.send(result).is_err() {
                    tracing::debug!("caller of message {} went away", self.short_id());
                }
            }
            None => {
                if let Err(e) = result {
                    tracing::warn!("message {} ({}) finished with: {}", self.short_id(), self.method, e);
                }
            }
        }
    }
}

/// Wait for a completion, mapping a vanished messenger to an error
pub async fn wait(rx: oneshot::Receiver<AppResult<Body>>) -> AppResult<Body> {
    rx.await
        .map_err(|_| AppError::Internal("messenger stopped before answering".into()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_form_body() {
        let request = Request::new(
            Action::SubmitForm,
            vec![json!({"manager": "UserManager", "action": "sign_in", "config": {"email": "a@b.co"}})],
        );
        let quuid = Uuid::nil();
        let body = request.encode(&quuid, 1_400_000_000_000, "c2ln+/=").unwrap();

        assert!(body.starts_with("action=submit_form&arg0=%7B"));
        assert!(body.contains("&quuid=00000000-0000-0000-0000-000000000000"));
        assert!(body.contains("&time=1400000000000"));
        assert!(body.ends_with("&signature=c2ln%2B%2F%3D"));

        let arg0 = body
            .split('&')
            .find_map(|kv| kv.strip_prefix("arg0="))
            .unwrap();
        let decoded = urlencoding::decode(arg0).unwrap();
        let value: Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(value["config"]["email"], "a@b.co");
    }

    #[test]
    fn test_positional_args() {
        let request = Request::new(Action::GetObject, vec![json!(1), json!("two")]);
        let body = request.encode(&Uuid::nil(), 0, "s").unwrap();
        assert!(body.contains("&arg0=1&arg1=%22two%22&"));
    }

    #[tokio::test]
    async fn test_finish_resolves_completion() {
        let (tx, rx) = oneshot::channel();
        let msg = ServerMessage::new(Uuid::new_v4(), "get_list", String::new(), Some(tx));
        msg.finish(Err(AppError::Application("no".into())));
        assert!(matches!(wait(rx).await, Err(AppError::Application(_))));
    }
}
