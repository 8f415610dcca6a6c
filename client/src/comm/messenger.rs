//! Outbound messenger and the `Comm` handle
//!
//! A single task owns the [`MessageQueue`]; everything else talks to it
//! through a channel, so sends can never overlap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::comm::inbound::{Body, InboundHandler};
use crate::comm::keys::SharedKeyRing;
use crate::comm::message::{wait, Action, Request, ServerMessage};
use crate::comm::queue::{Dispatch, MessageQueue, RetryDecision};
use crate::comm::transport::Transport;
use crate::error::AppResult;
use crate::settings::Settings;

/// Drives the outbound queue over a transport
pub struct Messenger<T: Transport> {
    queue: MessageQueue,
    transport: T,
    inbound: InboundHandler,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
    pending: Arc<AtomicUsize>,
}

impl<T: Transport> Messenger<T> {
    pub async fn run(mut self) {
        loop {
            if self.queue.is_empty() {
                match self.rx.recv().await {
                    Some(message) => self.queue.push(message),
                    None => break,
                }
            }
            while let Ok(message) = self.rx.try_recv() {
                self.queue.push(message);
            }

            if let Some(dispatch) = self.queue.next_to_send() {
                self.deliver(dispatch).await;
            }
        }
        tracing::debug!("messenger stopped");
    }

    /// Send one message until it leaves the queue
    async fn deliver(&mut self, mut dispatch: Dispatch) {
        loop {
            match self.transport.send(&dispatch.payload).await {
                Ok(text) => {
                    tracing::debug!(">>> Message {} received...", dispatch.uuid);
                    let outcome = self.inbound.handle_text(&text).await;
                    if self.queue.complete(&dispatch.uuid, outcome) {
                        self.pending.fetch_sub(1, Ordering::SeqCst);
                    }
                    return;
                }
                Err(e) => match self.queue.fail_transport(&dispatch.uuid, e) {
                    RetryDecision::RetryAfter(delay) => {
                        tokio::time::sleep(delay).await;
                        match self.queue.retry(&dispatch.uuid) {
                            Some(next) => dispatch = next,
                            None => return,
                        }
                    }
                    RetryDecision::Dropped => {
                        self.pending.fetch_sub(1, Ordering::SeqCst);
                        return;
                    }
                },
            }
        }
    }
}

/// Cloneable handle for talking to the server
#[derive(Debug, Clone)]
pub struct Comm {
    tx: mpsc::UnboundedSender<ServerMessage>,
    keys: SharedKeyRing,
    pending: Arc<AtomicUsize>,
}

impl Comm {
    /// Spawn the messenger task and return a handle to it
    pub fn start<T: Transport>(
        transport: T,
        settings: &Settings,
        keys: SharedKeyRing,
        inbound: InboundHandler,
    ) -> (Comm, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let messenger = Messenger {
            queue: MessageQueue::new(
                settings.comm_backoff,
                settings.retry_base,
                settings.max_retry_delay,
            ),
            transport,
            inbound,
            rx,
            pending: pending.clone(),
        };
        let handle = tokio::spawn(messenger.run());
        (Comm { tx, keys, pending }, handle)
    }

    pub fn keys(&self) -> &SharedKeyRing {
        &self.keys
    }

    /// Whether any message is queued or travelling
    pub fn is_processing(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    async fn build(
        &self,
        request: &Request,
        completion: Option<oneshot::Sender<AppResult<Body>>>,
    ) -> AppResult<ServerMessage> {
        let quuid = Uuid::new_v4();
        let time_ms = chrono::Utc::now().timestamp_millis();
        let signature = self.keys.read().await.sign_outbound(&time_ms.to_string())?;
        let payload = request.encode(&quuid, time_ms, &signature)?;
        Ok(ServerMessage::new(quuid, request.action.clone(), payload, completion))
    }

    fn push(&self, message: ServerMessage) -> AppResult<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(message).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            crate::error::AppError::Internal("messenger is not running".into())
        })
    }

    /// Queue a request without waiting for its answer
    pub async fn enqueue(&self, request: Request) -> AppResult<Uuid> {
        let message = self.build(&request, None).await?;
        let uuid = message.uuid;
        self.push(message)?;
        Ok(uuid)
    }

    /// Queue a request now and hand back its answer for later
    pub async fn begin_call(&self, request: Request) -> AppResult<Pending> {
        let (tx, rx) = oneshot::channel();
        let message = self.build(&request, Some(tx)).await?;
        self.push(message)?;
        Ok(Pending(rx))
    }

    /// Queue a request and wait for the server's answer
    pub async fn call(&self, request: Request) -> AppResult<Body> {
        self.begin_call(request).await?.response().await
    }

    // ========================================================================
    // Server functions
    // ========================================================================

    /// Retrieve a page of one or more lists
    pub async fn get_list(&self, config: Value) -> AppResult<Body> {
        self.call(Request::new(Action::GetList, vec![config])).await
    }

    /// Request a page without waiting; it lands in the caches on arrival
    pub async fn fetch_list(&self, config: Value) -> AppResult<Uuid> {
        self.enqueue(Request::new(Action::GetList, vec![config])).await
    }

    /// Retrieve a named object
    pub async fn get_object(&self, config: Value) -> AppResult<Body> {
        self.call(Request::new(Action::GetObject, vec![config])).await
    }

    /// Submit a form to `manager.action`
    pub async fn submit_form(&self, manager: &str, action: &str, config: Value) -> AppResult<Body> {
        self.call(Request::new(Action::SubmitForm, vec![form_arg(manager, action, config)]))
            .await
    }

    /// Queue a form submission now, answer later
    pub async fn begin_submit_form(&self, manager: &str, action: &str, config: Value) -> AppResult<Pending> {
        self.begin_call(Request::new(Action::SubmitForm, vec![form_arg(manager, action, config)]))
            .await
    }

    /// Fire-and-forget form submission
    pub async fn submit_form_detached(&self, manager: &str, action: &str, config: Value) -> AppResult<Uuid> {
        self.enqueue(Request::new(Action::SubmitForm, vec![form_arg(manager, action, config)]))
            .await
    }

    pub async fn get_app_config(&self) -> AppResult<Body> {
        self.call(Request::new(Action::GetAppConfig, Vec::new())).await
    }
}

/// An answer queued for but not yet received
#[derive(Debug)]
pub struct Pending(oneshot::Receiver<AppResult<Body>>);

impl Pending {
    pub async fn response(self) -> AppResult<Body> {
        wait(self.0).await
    }
}

fn form_arg(manager: &str, action: &str, config: Value) -> Value {
    json!({
        "manager": manager,
        "action": action,
        "config": config,
    })
}
