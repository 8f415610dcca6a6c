//! Session wiring
//!
//! A [`Session`] owns the shared state, the record store, the comm handle
//! and the socket channels. It consumes everything the inbound handler
//! forwards and reacts when the current user, group or member changes:
//! re-keying the key ring, opening socket channels and fetching the first
//! pages of the lists relevant to the new context.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::cache::{SharedStore, Store, CHAT_ROOM_VIEW, GROUP_VIEWS, USER_VIEWS};
use crate::comm::{
    Action, ClientCommand, Comm, HttpTransport, Inbound, InboundHandler, KeyPriority, KeyRing, SharedKeyRing,
    Request, SocketConnector, Sockets, Transport, WsConnector, GROUP_CHANNEL, MEMBER_CHANNEL, USER_CHANNEL,
};
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, Record};
use crate::settings::Settings;
use crate::state::{create_shared_state, AppConfigSlot, Notice, SharedState};

const EVENT_CAPACITY: usize = 64;

/// Minimum length of a well-formed user token
const MIN_USER_TOKEN_LEN: usize = 33;

/// Events for the host application
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SlotChanged(AppConfigSlot),
    ListUpdated { view: String, record_type: String },
    ObjectUpdated(String),
    /// A command pushed by the server (navigate, overlay, ...)
    Command(ClientCommand),
    SignedOut,
}

/// Tokens the session last reacted to
#[derive(Debug, Default)]
struct Tracked {
    user: Option<String>,
    group: Option<String>,
    member: Option<String>,
}

struct Inner {
    state: SharedState,
    store: SharedStore,
    comm: Comm,
    sockets: Mutex<Sockets>,
    events: broadcast::Sender<ClientEvent>,
    tracked: Mutex<Tracked>,
}

/// Handle to a running client session
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
    tasks: Vec<AbortHandle>,
}

impl Session {
    /// Start a session over HTTP and WebSockets
    pub fn connect(settings: &Settings) -> AppResult<Self> {
        let transport = HttpTransport::new(settings)?;
        Self::start(settings, transport, Arc::new(WsConnector))
    }

    /// Start a session over the given transport and socket connector
    pub fn start<T: Transport>(
        settings: &Settings,
        transport: T,
        connector: Arc<dyn SocketConnector>,
    ) -> AppResult<Self> {
        let keys: SharedKeyRing = Arc::new(RwLock::new(KeyRing::new(settings.app_key.clone())));
        let (tx, rx) = mpsc::unbounded_channel();
        let inbound = InboundHandler::new(keys.clone(), tx);
        let (comm, messenger) = Comm::start(transport, settings, keys, inbound.clone());
        let sockets = Sockets::new(connector, inbound, settings.node_address(), settings.retry_base);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            state: create_shared_state(),
            store: Arc::new(RwLock::new(Store::with_default_views()?)),
            comm,
            sockets: Mutex::new(sockets),
            events,
            tracked: Mutex::new(Tracked::default()),
        });
        let listener = tokio::spawn(listen(inner.clone(), rx));
        tracing::info!("session started against {}", settings.server_address());

        Ok(Self {
            inner,
            tasks: vec![messenger.abort_handle(), listener.abort_handle()],
        })
    }

    pub fn state(&self) -> &SharedState {
        &self.inner.state
    }

    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    pub fn comm(&self) -> &Comm {
        &self.inner.comm
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Take and clear pending notifications
    pub async fn take_notices(&self) -> Vec<Notice> {
        self.inner.state.write().await.take_notices()
    }

    /// Load the app configuration and define the slots it carries
    pub async fn init(&self) -> AppResult<()> {
        let body = self.inner.comm.get_app_config().await?;
        let mut defined = Vec::new();
        {
            let mut state = self.inner.state.write().await;
            for slot in AppConfigSlot::ALL {
                let Some(value) = body.extra.get(slot.name()) else {
                    continue;
                };
                match state.define(slot, value) {
                    Ok(()) => defined.push(slot),
                    Err(e) => tracing::error!("could not define {}: {}", slot.name(), e),
                }
            }
        }
        self.inner.react(&defined).await
    }

    /// Merge a configuration object as if it had arrived from the server
    pub async fn apply_config(&self, config: &Value) -> AppResult<()> {
        self.inner.apply_config(config).await
    }

    /// Fetch the next page of a registered list
    pub async fn fetch_more(&self, view: &str, record_type: &str) -> AppResult<Option<Uuid>> {
        self.inner.fetch(view, record_type).await
    }

    /// Fetch a named object, registering it first
    pub async fn fetch_object(&self, name: &str) -> AppResult<Option<Uuid>> {
        let request = self.inner.store.write().await.serve_object(name);
        match request {
            Some(config) => {
                tracing::info!(">>> getting object {}", name);
                let request = Request::new(Action::GetObject, vec![config]);
                self.inner.comm.enqueue(request).await.map(Some)
            }
            None => Ok(None),
        }
    }

    pub async fn logout(&self) -> AppResult<()> {
        self.inner.logout().await
    }

    /// Leave the current group, keeping the user signed in
    pub async fn leave_group(&self) -> AppResult<()> {
        tracing::info!("leaving group");
        {
            let mut state = self.inner.state.write().await;
            state.clear_slot(AppConfigSlot::CurrentGroup);
            state.clear_slot(AppConfigSlot::CurrentMember);
        }
        self.inner
            .react(&[AppConfigSlot::CurrentGroup, AppConfigSlot::CurrentMember])
            .await
    }

    /// Stop the background tasks and close every socket
    pub async fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
        self.inner.sockets.lock().await.close_all();
    }
}

async fn listen(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(item) = rx.recv().await {
        match item {
            Inbound::Notice(notice) => {
                if !notice.text.is_empty() {
                    inner.state.write().await.push_notice(notice);
                }
            }
            Inbound::Config(config) => {
                if let Err(e) = inner.apply_config(&config).await {
                    tracing::error!("could not apply configuration: {}", e);
                }
            }
            Inbound::Command(command) => inner.handle_command(command).await,
        }
    }
    tracing::debug!("session listener stopped");
}

impl Inner {
    fn emit(&self, event: ClientEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn apply_config(self: &Arc<Self>, config: &Value) -> AppResult<()> {
        let report = {
            let mut state = self.state.write().await;
            let mut store = self.store.write().await;
            store.dispatch(config, &mut state)?
        };

        for (view, record_type) in &report.lists {
            self.emit(ClientEvent::ListUpdated {
                view: view.clone(),
                record_type: record_type.clone(),
            });
        }
        for name in &report.objects {
            self.emit(ClientEvent::ObjectUpdated(name.clone()));
        }

        if report.list_touched(CHAT_ROOM_VIEW, ChatMessage::KIND) {
            let requests = self.store.write().await.serve_answers();
            for request in requests {
                self.comm.fetch_list(request).await?;
            }
        }

        self.react(&report.slots).await
    }

    async fn handle_command(self: &Arc<Self>, command: ClientCommand) {
        if command == ClientCommand::Logout {
            if let Err(e) = self.logout().await {
                tracing::error!("logout failed: {}", e);
            }
        }
        self.emit(ClientEvent::Command(command));
    }

    /// React to app-config slots that just changed
    async fn react(self: &Arc<Self>, slots: &[AppConfigSlot]) -> AppResult<()> {
        let (user, user_id, group, member) = {
            let state = self.state.read().await;
            (
                state.user_token().map(str::to_string),
                state.current_user.as_ref().map(|u| u.user_id),
                state.group_token().map(str::to_string),
                state.member_token().map(str::to_string),
            )
        };

        for slot in slots {
            self.emit(ClientEvent::SlotChanged(*slot));
        }
        if slots.contains(&AppConfigSlot::CurrentUser) {
            self.on_user(user, user_id).await?;
        }
        if slots.contains(&AppConfigSlot::CurrentGroup) {
            self.on_group(group).await?;
        }
        if slots.contains(&AppConfigSlot::CurrentMember) {
            self.on_member(member, user_id.is_some()).await?;
        }
        Ok(())
    }

    async fn on_user(self: &Arc<Self>, token: Option<String>, user_id: Option<i64>) -> AppResult<()> {
        {
            let mut tracked = self.tracked.lock().await;
            if tracked.user == token {
                tracing::debug!("user already loaded");
                return Ok(());
            }
            tracked.user = token.clone();
        }

        let Some(token) = token else {
            self.comm.keys().write().await.set(KeyPriority::User, None);
            self.sockets.lock().await.close(USER_CHANNEL);
            return Ok(());
        };

        if token.len() < MIN_USER_TOKEN_LEN {
            tracing::warn!("user token should be longer than {} characters", MIN_USER_TOKEN_LEN - 1);
        }
        tracing::info!("signed in as user {:?}", user_id);
        self.comm.keys().write().await.set(KeyPriority::User, Some(token.clone()));

        let validation = self
            .comm
            .begin_submit_form(
                "UserManager",
                "validate_user",
                json!({"user_token": token, "user_id": user_id}),
            )
            .await?;
        let inner = self.clone();
        tokio::spawn(async move {
            match validation.response().await {
                Ok(_) => tracing::debug!("user validated"),
                Err(AppError::Application(msg)) => {
                    tracing::warn!("user validation refused: {}", msg);
                    if let Err(e) = inner.logout().await {
                        tracing::error!("logout failed: {}", e);
                    }
                }
                Err(e) => tracing::warn!("could not validate user: {}", e),
            }
        });

        self.sockets.lock().await.open(USER_CHANNEL, &token);
        self.fetch_views(&USER_VIEWS).await
    }

    async fn on_group(self: &Arc<Self>, token: Option<String>) -> AppResult<()> {
        {
            let mut tracked = self.tracked.lock().await;
            if tracked.group == token {
                return Ok(());
            }
            tracked.group = token.clone();
        }

        match token {
            Some(token) => {
                tracing::info!("entered group");
                self.comm.keys().write().await.set(KeyPriority::Group, Some(token.clone()));
                self.sockets.lock().await.open(GROUP_CHANNEL, &token);
                self.fetch_views(&GROUP_VIEWS).await
            }
            None => {
                self.comm.keys().write().await.set(KeyPriority::Group, None);
                self.sockets.lock().await.close(GROUP_CHANNEL);
                Ok(())
            }
        }
    }

    async fn on_member(self: &Arc<Self>, token: Option<String>, user_present: bool) -> AppResult<()> {
        let previous = {
            let mut tracked = self.tracked.lock().await;
            if token.is_some() && tracked.member == token {
                return Ok(());
            }
            std::mem::replace(&mut tracked.member, token.clone())
        };

        match token {
            Some(token) => {
                tracing::info!(">>> opening the member socket");
                self.comm.keys().write().await.set(KeyPriority::Member, Some(token.clone()));
                self.sockets.lock().await.open(MEMBER_CHANNEL, &token);
                Ok(())
            }
            None => {
                if previous.is_some() {
                    self.comm.keys().write().await.set(KeyPriority::Member, None);
                    self.sockets.lock().await.close(MEMBER_CHANNEL);
                }
                if user_present {
                    self.store.write().await.reset();
                    self.fetch_views(&USER_VIEWS).await?;
                }
                Ok(())
            }
        }
    }

    async fn fetch_views(&self, views: &[(&str, &str)]) -> AppResult<()> {
        for (view, record_type) in views {
            self.fetch(view, record_type).await?;
        }
        Ok(())
    }

    async fn fetch(&self, view: &str, record_type: &str) -> AppResult<Option<Uuid>> {
        let request = self.store.write().await.request_page(view, record_type);
        match request {
            Some(config) => self.comm.fetch_list(config).await.map(Some),
            None => Ok(None),
        }
    }

    async fn logout(self: &Arc<Self>) -> AppResult<()> {
        tracing::info!("logging out");
        // queued before the keys go, so it is signed as the outgoing user
        let submitted = self
            .comm
            .submit_form_detached("UserManager", "logout", json!({}))
            .await;

        self.state.write().await.clear_session();
        self.comm.keys().write().await.clear_session();
        self.store.write().await.clear();
        self.sockets.lock().await.close_all();
        *self.tracked.lock().await = Tracked::default();
        self.emit(ClientEvent::SignedOut);

        submitted.map(|_| ())
    }
}
