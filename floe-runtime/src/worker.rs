use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use floe_cluster::{Ring, RING_SIZE};
use floe_graph::GraphRegistry;
use floe_mapred::MapRedProcess;
use floe_registry::{Client as RegistryClient, Wanted, WatchEvent};
use floe_rpc::{Codec, JsonCodec, Rpc, Tagged, Term};
use floe_state::Driver;
use health::HealthHandle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::RuntimeError;

/// One per peer. Answers the leader's `StartActor` handshake on a mailbox
/// named after this peer, periodically refreshes the shuffle `Ring` from
/// the leader's `Term`, and starts/stops a `MapRedProcess` per graph
/// instance the registry says should be `running` on this peer.
pub struct Worker {
    peer: String,
    rpc: Arc<dyn Rpc>,
    registry: Arc<RegistryClient>,
    graph_registry: Arc<GraphRegistry>,
    driver: Arc<dyn Driver>,
    ring_size: usize,
    liveness: Option<HealthHandle>,
    processes: DashMap<String, Arc<MapRedProcess>>,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        peer: impl Into<String>,
        rpc: Arc<dyn Rpc>,
        registry: Arc<RegistryClient>,
        graph_registry: Arc<GraphRegistry>,
        driver: Arc<dyn Driver>,
    ) -> Self {
        Self::with_ring_size(peer, rpc, registry, graph_registry, driver, RING_SIZE)
    }

    /// All peers in a cluster must agree on `ring_size`; see `floe_cluster::Ring`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_ring_size(
        peer: impl Into<String>,
        rpc: Arc<dyn Rpc>,
        registry: Arc<RegistryClient>,
        graph_registry: Arc<GraphRegistry>,
        driver: Arc<dyn Driver>,
        ring_size: usize,
    ) -> Self {
        Self::with_liveness(peer, rpc, registry, graph_registry, driver, ring_size, None)
    }

    /// `liveness`, if given, is reported healthy once per successful term
    /// watcher tick.
    #[allow(clippy::too_many_arguments)]
    pub fn with_liveness(
        peer: impl Into<String>,
        rpc: Arc<dyn Rpc>,
        registry: Arc<RegistryClient>,
        graph_registry: Arc<GraphRegistry>,
        driver: Arc<dyn Driver>,
        ring_size: usize,
        liveness: Option<HealthHandle>,
    ) -> Self {
        Self {
            peer: peer.into(),
            rpc,
            registry,
            graph_registry,
            driver,
            ring_size,
            liveness,
            processes: DashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn stop(&self) {
        for entry in self.processes.iter() {
            entry.value().stop().await;
        }
        self.cancel.cancel();
    }

    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn run(self: Arc<Self>) -> Result<(), RuntimeError> {
        let mailbox = self.rpc.mailbox(&self.peer, 8).await?;

        let mut tasks = JoinSet::new();
        tasks.spawn(handshake_responder(mailbox, self.cancel.clone()));
        tasks.spawn(term_watcher(self.clone()));
        tasks.spawn(graph_watcher(self.clone()));

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(peer = %self.peer, error = %e, "worker sub-task failed, exiting worker");
                    self.cancel.cancel();
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(join_err) => {
                    warn!(peer = %self.peer, error = %join_err, "worker sub-task panicked");
                    self.cancel.cancel();
                }
            }
        }
        for entry in self.processes.iter() {
            entry.value().stop().await;
        }
        result
    }
}

/// Acks every inbound `StartActor` envelope on this peer's control mailbox;
/// the act of having opened the mailbox is what makes this peer visible to
/// the leader's mailbox watch.
async fn handshake_responder(
    mut mailbox: tokio::sync::mpsc::Receiver<floe_rpc::Envelope>,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            maybe = mailbox.recv() => match maybe {
                Some(e) => e,
                None => return Ok(()),
            },
        };
        envelope.ack();
    }
}

#[instrument(skip_all)]
async fn term_watcher(worker: Arc<Worker>) -> Result<(), RuntimeError> {
    let codec = JsonCodec;
    let mut first = true;
    loop {
        if !first {
            tokio::select! {
                _ = worker.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(10)) => {}
            }
        }
        first = false;

        let probe = Term { peers: vec![] };
        let (tag, bytes) = codec.marshal(&probe)?;
        match worker
            .rpc
            .request(Duration::from_secs(10), "leader", &tag, bytes)
            .await
        {
            Ok(response) => {
                let term: Term = codec.unmarshal(Term::TAG, &response)?;
                match Ring::with_size(&term.peers, worker.ring_size) {
                    Ok(ring) => {
                        let ring = Arc::new(ring);
                        for entry in worker.processes.iter() {
                            entry.value().set_ring(ring.clone());
                        }
                        if let Some(liveness) = &worker.liveness {
                            liveness.report_healthy().await;
                        }
                    }
                    Err(e) => warn!(peer = %worker.peer, error = %e, "failed to build ring from term"),
                }
            }
            Err(e) => warn!(peer = %worker.peer, error = %e, "term request to leader failed"),
        }
    }
}

#[instrument(skip_all)]
async fn graph_watcher(worker: Arc<Worker>) -> Result<(), RuntimeError> {
    let mut events = worker.registry.watch().await?;
    loop {
        let event = tokio::select! {
            _ = worker.cancel.cancelled() => return Ok(()),
            e = events.recv() => match e {
                Some(e) => e,
                None => return Err(RuntimeError::WatchClosed("registry watch")),
            },
        };

        match event {
            WatchEvent::Put(reg) => {
                let process_key = format!("{}-{}-{}", worker.peer, reg.graph_type, reg.name);
                match reg.wanted {
                    Wanted::Running => {
                        if worker.processes.contains_key(&process_key) {
                            continue;
                        }
                        let definition = match worker.graph_registry.get(&reg.graph_type) {
                            Ok(d) => d,
                            Err(e) => {
                                warn!(graph_type = %reg.graph_type, error = %e, "unknown graph type requested");
                                continue;
                            }
                        };
                        let process = match MapRedProcess::open(
                            &worker.peer,
                            &reg.graph_type,
                            &reg.name,
                            definition,
                            worker.driver.clone(),
                            worker.rpc.clone(),
                        )
                        .await
                        {
                            Ok(p) => Arc::new(p),
                            Err(e) => {
                                warn!(graph_type = %reg.graph_type, name = %reg.name, error = %e, "failed to open mapred process");
                                continue;
                            }
                        };
                        worker.processes.insert(process_key.clone(), process.clone());
                        info!(graph_type = %reg.graph_type, name = %reg.name, "starting graph instance");
                        let config = reg.config.clone();
                        let worker_for_task = worker.clone();
                        tokio::spawn(async move {
                            if let Err(e) = process.clone().run(config).await {
                                warn!(process = %process.id(), error = %e, "mapred process exited with error");
                            }
                            worker_for_task.processes.remove(&process_key);
                        });
                    }
                    Wanted::Stopping | Wanted::Terminating => {
                        if let Some((_, process)) = worker.processes.remove(&process_key) {
                            info!(graph_type = %reg.graph_type, name = %reg.name, "stopping graph instance");
                            process.stop().await;
                        }
                    }
                    Wanted::Unknown => {}
                }
            }
            WatchEvent::Delete { graph_type, name } => {
                let process_key = format!("{}-{}-{}", worker.peer, graph_type, name);
                if let Some((_, process)) = worker.processes.remove(&process_key) {
                    process.stop().await;
                }
            }
            WatchEvent::Error(e) => {
                warn!(peer = %worker.peer, error = %e, "registry watch reported an error");
            }
        }
    }
}
