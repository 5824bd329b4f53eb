use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use crate::mailbox::{Discovery, DiscoveryEvent, Envelope, Rpc};
use crate::RpcError;

struct Directory {
    mailboxes: DashMap<String, mpsc::Sender<Envelope>>,
    peer_events: broadcast::Sender<DiscoveryEvent>,
    mailbox_events: broadcast::Sender<DiscoveryEvent>,
}

/// A single-process `Rpc`/`Discovery` transport: mailboxes registered in a
/// shared directory, peer/mailbox membership driven explicitly by test
/// harnesses via `register_peer`/`deregister_peer`. Sufficient for tests and
/// for running a single-process cluster without a real mailbox substrate.
#[derive(Clone)]
pub struct InMemoryTransport {
    dir: Arc<Directory>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        let (peer_events, _) = broadcast::channel(256);
        let (mailbox_events, _) = broadcast::channel(256);
        Self {
            dir: Arc::new(Directory {
                mailboxes: DashMap::new(),
                peer_events,
                mailbox_events,
            }),
        }
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_peer(&self, peer: &str) {
        let _ = self
            .dir
            .peer_events
            .send(DiscoveryEvent::PeerFound { peer: peer.to_string() });
    }

    pub fn deregister_peer(&self, peer: &str) {
        let _ = self
            .dir
            .peer_events
            .send(DiscoveryEvent::PeerLost { peer: peer.to_string() });
    }

    pub fn deregister_mailbox(&self, name: &str) {
        self.dir.mailboxes.remove(name);
        let _ = self.dir.mailbox_events.send(DiscoveryEvent::MailboxLost {
            peer: name.to_string(),
            mailbox: name.to_string(),
        });
    }
}

#[async_trait]
impl Rpc for InMemoryTransport {
    async fn request(
        &self,
        timeout: Duration,
        receiver: &str,
        tag: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, RpcError> {
        let sender = self
            .dir
            .mailboxes
            .get(receiver)
            .map(|e| e.clone())
            .ok_or_else(|| RpcError::NoSuchMailbox(receiver.to_string()))?;

        let (envelope, reply) = Envelope::new(tag.to_string(), bytes);
        sender
            .send(envelope)
            .await
            .map_err(|_| RpcError::MailboxClosed(receiver.to_string()))?;

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::MailboxClosed(receiver.to_string())),
            Err(_) => Err(RpcError::Timeout {
                receiver: receiver.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn mailbox(&self, name: &str, capacity: usize) -> Result<mpsc::Receiver<Envelope>, RpcError> {
        let (tx, rx) = mpsc::channel(capacity);
        self.dir.mailboxes.insert(name.to_string(), tx);
        let _ = self.dir.mailbox_events.send(DiscoveryEvent::MailboxFound {
            peer: name.to_string(),
            mailbox: name.to_string(),
        });
        Ok(rx)
    }
}

#[async_trait]
impl Discovery for InMemoryTransport {
    async fn watch_peers(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, RpcError> {
        Ok(subscribe(self.dir.peer_events.subscribe()))
    }

    async fn watch_mailboxes(&self) -> Result<mpsc::Receiver<DiscoveryEvent>, RpcError> {
        Ok(subscribe(self.dir.mailbox_events.subscribe()))
    }
}

fn subscribe(mut rx: broadcast::Receiver<DiscoveryEvent>) -> mpsc::Receiver<DiscoveryEvent> {
    let (tx, out) = mpsc::channel(256);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, JsonCodec};
    use crate::messages::Term;

    #[tokio::test]
    async fn request_round_trips_to_a_registered_mailbox() {
        let transport = InMemoryTransport::new();
        let mut inbox = transport.mailbox("leader", 8).await.unwrap();

        let responder = tokio::spawn(async move {
            let envelope = inbox.recv().await.unwrap();
            assert_eq!(envelope.tag(), Term::TAG);
            let codec = JsonCodec;
            let (_, bytes) = codec
                .marshal(&Term {
                    peers: vec!["p1".into()],
                })
                .unwrap();
            envelope.respond_ok(bytes);
        });

        let codec = JsonCodec;
        let (tag, bytes) = codec.marshal(&Term { peers: vec![] }).unwrap();
        let response = transport
            .request(Duration::from_secs(1), "leader", &tag, bytes)
            .await
            .unwrap();
        let term: Term = codec.unmarshal(&tag, &response).unwrap();
        assert_eq!(term.peers, vec!["p1".to_string()]);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn request_to_unknown_mailbox_fails_fast() {
        let transport = InMemoryTransport::new();
        let err = transport
            .request(Duration::from_millis(50), "nobody", "tag", vec![])
            .await;
        assert!(matches!(err, Err(RpcError::NoSuchMailbox(_))));
    }

    #[tokio::test]
    async fn request_times_out_if_never_answered() {
        let transport = InMemoryTransport::new();
        let _inbox = transport.mailbox("silent", 8).await.unwrap();
        let err = transport
            .request(Duration::from_millis(20), "silent", "tag", vec![])
            .await;
        assert!(matches!(err, Err(RpcError::Timeout { .. })));
    }

    #[tokio::test]
    async fn discovery_observes_peer_lifecycle() {
        let transport = InMemoryTransport::new();
        let mut peers = transport.watch_peers().await.unwrap();
        transport.register_peer("p1");
        transport.deregister_peer("p1");

        assert!(matches!(
            peers.recv().await,
            Some(DiscoveryEvent::PeerFound { .. })
        ));
        assert!(matches!(
            peers.recv().await,
            Some(DiscoveryEvent::PeerLost { .. })
        ));
    }
}
