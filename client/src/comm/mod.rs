//! Server communication
//!
//! Outbound RPC queue with backoff, signature validation of everything
//! inbound, and the push socket channels.

mod inbound;
mod keys;
mod message;
mod messenger;
mod queue;
mod socket;
mod transport;

pub use inbound::{Body, ClientCommand, Inbound, InboundHandler, Outcome};
pub use keys::{sign, verify, KeyPriority, KeyRing, SharedKeyRing};
pub use message::{Action, Request, ServerMessage};
pub use messenger::{Comm, Messenger, Pending};
pub use queue::{Dispatch, MessageQueue, RetryDecision};
pub use socket::{
    handshake_timestamp, subscribe_payload, websocket_url, SocketConnection, SocketConnector, Sockets,
    WsConnector, GROUP_CHANNEL, MEMBER_CHANNEL, USER_CHANNEL,
};
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
pub(crate) use messenger::tests::ScriptedTransport;
#[cfg(test)]
pub(crate) use socket::tests::FakeConnector;
