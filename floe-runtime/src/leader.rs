use std::sync::Arc;
use std::time::Duration;

use floe_cluster::{ActorStart, PeerQueue};
use floe_rpc::{Codec, Discovery, DiscoveryEvent, JsonCodec, Rpc, Tagged, Term};
use health::HealthHandle;
use tokio::task::JoinSet;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::messages::StartActor;
use crate::RuntimeError;

/// The mailbox name the leader's term watcher listens on.
pub const LEADER_MAILBOX: &str = "leader";

/// Singleton cluster-wide actor: watches peer membership, keeps a
/// `PeerQueue` model of who is alive and which worker actors run where,
/// starts a worker actor per live peer, and serves `Term` requests so
/// workers can build their shuffle ring.
pub struct Leader {
    peer_queue: Arc<PeerQueue>,
    discovery: Arc<dyn Discovery>,
    rpc: Arc<dyn Rpc>,
    liveness: Option<HealthHandle>,
    cancel: CancellationToken,
}

impl Leader {
    pub fn new(discovery: Arc<dyn Discovery>, rpc: Arc<dyn Rpc>) -> Self {
        Self::with_liveness(discovery, rpc, None)
    }

    /// `liveness`, if given, is reported healthy once per successful
    /// worker-watcher tick -- the same "report healthy once the periodic
    /// loop completes an iteration cleanly" convention the reference
    /// binaries use for their own cleanup loops.
    pub fn with_liveness(
        discovery: Arc<dyn Discovery>,
        rpc: Arc<dyn Rpc>,
        liveness: Option<HealthHandle>,
    ) -> Self {
        Self {
            peer_queue: Arc::new(PeerQueue::new()),
            discovery,
            rpc,
            liveness,
            cancel: CancellationToken::new(),
        }
    }

    pub fn peer_queue(&self) -> Arc<PeerQueue> {
        self.peer_queue.clone()
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
    }

    /// Runs the four sub-tasks under a shared error group. A fatal watch
    /// error from any of them exits the leader; the cluster substrate is
    /// expected to elect a new one elsewhere.
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) -> Result<(), RuntimeError> {
        let mut tasks = JoinSet::new();
        tasks.spawn(peer_watcher(
            self.discovery.clone(),
            self.peer_queue.clone(),
            self.cancel.clone(),
        ));
        tasks.spawn(worker_watcher(
            self.rpc.clone(),
            self.peer_queue.clone(),
            self.liveness.clone(),
            self.cancel.clone(),
        ));
        tasks.spawn(mailbox_watcher(
            self.discovery.clone(),
            self.peer_queue.clone(),
            self.cancel.clone(),
        ));
        tasks.spawn(term_watcher(
            self.rpc.clone(),
            self.peer_queue.clone(),
            self.cancel.clone(),
        ));

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "leader sub-task failed, exiting leader");
                    self.cancel.cancel();
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "leader sub-task panicked");
                    self.cancel.cancel();
                }
            }
        }
        result
    }
}

/// The worker actor's name is the bare peer name: leader RPC target,
/// registered-actor id and the confirming mailbox name are all the same
/// string, so opening that one mailbox is enough to both answer the
/// `StartActor` handshake and show up in the mailbox watch.
fn worker_def(peer: &str) -> ActorStart {
    ActorStart {
        actor_type: "worker".to_string(),
        name: peer.to_string(),
        target_peer: peer.to_string(),
        config: Vec::new(),
    }
}

#[instrument(skip_all)]
async fn peer_watcher(
    discovery: Arc<dyn Discovery>,
    peer_queue: Arc<PeerQueue>,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    let mut events = discovery.watch_peers().await?;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            e = events.recv() => match e {
                Some(e) => e,
                None => return Err(RuntimeError::WatchClosed("peer watch")),
            },
        };
        match event {
            DiscoveryEvent::PeerFound { peer } => {
                info!(peer = %peer, "peer found");
                peer_queue.live(&peer);
                peer_queue.set_required(worker_def(&peer))?;
            }
            DiscoveryEvent::PeerLost { peer } => {
                info!(peer = %peer, "peer lost");
                peer_queue.dead(&peer);
                peer_queue.unset_required(&peer);
            }
            DiscoveryEvent::Error(_) => return Err(RuntimeError::WatchClosed("peer watch")),
            _ => {}
        }
    }
}

#[instrument(skip_all)]
async fn worker_watcher(
    rpc: Arc<dyn Rpc>,
    peer_queue: Arc<PeerQueue>,
    liveness: Option<HealthHandle>,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    let mut ticker = interval(Duration::from_secs(1));
    let codec = JsonCodec;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                for def in peer_queue.missing() {
                    start_actor(&rpc, &codec, &peer_queue, def).await;
                }
                if let Some(liveness) = &liveness {
                    liveness.report_healthy().await;
                }
            }
        }
    }
}

async fn start_actor(rpc: &Arc<dyn Rpc>, codec: &JsonCodec, peer_queue: &Arc<PeerQueue>, def: ActorStart) {
    peer_queue.optimistically_register(&def.name, &def.target_peer);

    let msg = StartActor {
        actor_type: def.actor_type.clone(),
        name: def.name.clone(),
        target_peer: def.target_peer.clone(),
        config: def.config.clone(),
    };
    let (tag, bytes) = match codec.marshal(&msg) {
        Ok(v) => v,
        Err(e) => {
            warn!(actor = %def.name, error = %e, "failed to marshal start-actor message");
            peer_queue.optimistically_unregister(&def.name);
            return;
        }
    };

    if let Err(e) = rpc
        .request(Duration::from_secs(30), &def.target_peer, &tag, bytes)
        .await
    {
        warn!(actor = %def.name, peer = %def.target_peer, error = %e, "start-actor rpc failed");
        peer_queue.optimistically_unregister(&def.name);
    }
}

#[instrument(skip_all)]
async fn mailbox_watcher(
    discovery: Arc<dyn Discovery>,
    peer_queue: Arc<PeerQueue>,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    let mut events = discovery.watch_mailboxes().await?;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            e = events.recv() => match e {
                Some(e) => e,
                None => return Err(RuntimeError::WatchClosed("mailbox watch")),
            },
        };
        match event {
            DiscoveryEvent::MailboxFound { peer, mailbox } => peer_queue.register(&mailbox, &peer),
            DiscoveryEvent::MailboxLost { mailbox, .. } => peer_queue.unregister(&mailbox),
            DiscoveryEvent::Error(_) => return Err(RuntimeError::WatchClosed("mailbox watch")),
            _ => {}
        }
    }
}

#[instrument(skip_all)]
async fn term_watcher(
    rpc: Arc<dyn Rpc>,
    peer_queue: Arc<PeerQueue>,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    while peer_queue.live_peers().is_empty() {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }

    let mut mailbox = rpc.mailbox(LEADER_MAILBOX, 64).await?;
    let codec = JsonCodec;
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            maybe = mailbox.recv() => match maybe {
                Some(e) => e,
                None => return Ok(()),
            },
        };

        if envelope.tag() != Term::TAG {
            envelope.respond_err(floe_rpc::RpcError::TagMismatch {
                expected: Term::TAG.to_string(),
                got: envelope.tag().to_string(),
            });
            continue;
        }

        let term = Term {
            peers: peer_queue.live_peers(),
        };
        match codec.marshal(&term) {
            Ok((_, bytes)) => envelope.respond_ok(bytes),
            Err(e) => envelope.respond_err(e),
        }
    }
}
