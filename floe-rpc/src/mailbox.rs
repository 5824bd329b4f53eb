use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::RpcError;

/// One inbound request delivered to a mailbox: `Msg()` (the tagged bytes),
/// `Ack()` (success, no payload) and `Respond(err)` (failure).
pub struct Envelope {
    tag: String,
    bytes: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>, RpcError>>,
}

impl Envelope {
    pub fn new(tag: String, bytes: Vec<u8>) -> (Self, oneshot::Receiver<Result<Vec<u8>, RpcError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tag, bytes, reply: tx }, rx)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Acknowledge success with no payload.
    pub fn ack(self) {
        let _ = self.reply.send(Ok(Vec::new()));
    }

    /// Respond with a payload (used by request/response calls like `Term`).
    pub fn respond_ok(self, bytes: Vec<u8>) {
        let _ = self.reply.send(Ok(bytes));
    }

    /// Fail the request; the sender decides whether to retry.
    pub fn respond_err(self, err: RpcError) {
        let _ = self.reply.send(Err(err));
    }
}

/// Named mailboxes with typed request/response, consumed via `request` and
/// produced via `mailbox`.
#[async_trait]
pub trait Rpc: Send + Sync {
    async fn request(
        &self,
        timeout: Duration,
        receiver: &str,
        tag: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, RpcError>;

    async fn mailbox(&self, name: &str, capacity: usize) -> Result<mpsc::Receiver<Envelope>, RpcError>;
}

/// Peer/mailbox discovery events, as yielded by a `QueryWatch`.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    PeerFound { peer: String },
    PeerLost { peer: String },
    MailboxFound { peer: String, mailbox: String },
    MailboxLost { peer: String, mailbox: String },
    Error(String),
}

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn watch_peers(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, RpcError>;
    async fn watch_mailboxes(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, RpcError>;
}
