use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use floe_cluster::Ring;
use floe_graph::{group_and_window_by, Definition, GraphError, Source, TriggerSignal};
use floe_merge::Merger;
use floe_rpc::{Codec, Envelope, JsonCodec, Rpc, Tagged};
use floe_state::{Conn, DrainSink, Row};
use floe_window::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::MapRedError;

/// One process per `(peer, graphType, graphName)`. Opens its storage `Conn`,
/// waits for the worker to deliver a `Ring`, instantiates the graph's
/// sources/sinks, opens a mailbox named after the process id, then runs the
/// Map/Reduce/Trigger sub-tasks under a shared cancellation scope until
/// `stop` is called or one of them fails.
pub struct MapRedProcess {
    id: String,
    mailbox_name: String,
    graph_type: String,
    graph_name: String,
    definition: Arc<Definition>,
    conn: Arc<dyn Conn>,
    rpc: Arc<dyn Rpc>,
    ring: Arc<crate::ring_cell::RingCell>,
    cancel: CancellationToken,
}

impl MapRedProcess {
    #[instrument(skip(definition, driver, rpc))]
    pub async fn open(
        peer: &str,
        graph_type: &str,
        graph_name: &str,
        definition: Arc<Definition>,
        driver: Arc<dyn floe_state::Driver>,
        rpc: Arc<dyn Rpc>,
    ) -> Result<Self, MapRedError> {
        let id = format!("{peer}-{graph_type}-{graph_name}");
        // The mailbox name must agree with `Ring::reducer`'s format so the
        // shuffle sends addressed to this peer land here.
        let mailbox_name = format!("worker-{peer}-{graph_type}-{graph_name}");
        let conn = driver.open(&id).await?;
        Ok(Self {
            id,
            mailbox_name,
            graph_type: graph_type.to_string(),
            graph_name: graph_name.to_string(),
            definition,
            conn,
            rpc,
            ring: Arc::new(crate::ring_cell::RingCell::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Delivers the ring built by the worker's term watcher. Non-blocking,
    /// no-op once this process has already received one.
    pub fn set_ring(&self, ring: Arc<Ring>) {
        self.ring.set(ring);
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
    }

    #[instrument(skip(self, config), fields(process = %self.id))]
    pub async fn run(self: Arc<Self>, config: Vec<u8>) -> Result<(), MapRedError> {
        let ring = self.ring.wait().await;

        let sources = self
            .definition
            .sources
            .setup(&self.graph_type, &self.graph_name, &config)?;
        let sinks = self
            .definition
            .sinks
            .setup(&self.graph_type, &self.graph_name, &config)?;

        let mailbox = self.rpc.mailbox(&self.mailbox_name, 256).await?;

        let trigger = self.definition.trigger.build();
        let signal: Arc<dyn TriggerSignal> = Arc::new(DrainSignal {
            conn: self.conn.clone(),
            sinks,
        });

        let (eos_tx, eos_rx) = watch::channel(false);

        let mut tasks = JoinSet::new();

        tasks.spawn(map_task(
            sources,
            self.definition.clone(),
            ring,
            self.rpc.clone(),
            self.graph_type.clone(),
            self.graph_name.clone(),
            self.cancel.clone(),
            eos_tx,
        ));
        tasks.spawn(reduce_task(
            mailbox,
            self.definition.clone(),
            self.conn.clone(),
            trigger.clone(),
            self.cancel.clone(),
        ));
        tasks.spawn(trigger_task(trigger, signal, eos_rx, self.cancel.clone()));

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(process = %self.id, error = %e, "mapred sub-task failed, cancelling group");
                    self.cancel.cancel();
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(join_err) => {
                    warn!(process = %self.id, error = %join_err, "mapred sub-task panicked");
                    self.cancel.cancel();
                }
            }
        }
        info!(process = %self.id, "mapred process exited");
        result
    }
}

struct DrainSignal {
    conn: Arc<dyn Conn>,
    sinks: Vec<Arc<dyn DrainSink>>,
}

#[async_trait]
impl TriggerSignal for DrainSignal {
    async fn signal(&self, keys: Vec<String>) -> Result<(), GraphError> {
        for sink in &self.sinks {
            self.conn
                .drain(&keys, sink.as_ref())
                .await
                .map_err(|e| GraphError::Sink(e.to_string()))?;
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(graph_type = %graph_type, graph_name = %graph_name))]
async fn map_task(
    mut sources: Vec<Box<dyn Source>>,
    definition: Arc<Definition>,
    ring: Arc<Ring>,
    rpc: Arc<dyn Rpc>,
    graph_type: String,
    graph_name: String,
    cancel: CancellationToken,
    eos_tx: watch::Sender<bool>,
) -> Result<(), MapRedError> {
    let codec = JsonCodec;

    for source in sources.iter_mut() {
        source.init().await?;
    }

    'sources: for source in sources.iter_mut() {
        loop {
            if cancel.is_cancelled() {
                break 'sources;
            }
            let value = match source.take(&cancel).await? {
                Some(v) => v,
                None => break,
            };
            let events = definition.transform.transform(value)?;
            for event in events {
                let keyed = group_and_window_by(&event, definition.group_by.as_ref());
                for ke in keyed {
                    let receiver = ring.reducer(&ke.key, &graph_type, &graph_name);
                    let data_type = floe_window::value_tag(&ke.message).to_string();
                    let data = serde_json::to_vec(&ke.message)?;
                    let wire = floe_rpc::KeyedEvent {
                        ts: ke.timestamp.timestamp(),
                        key: ke.key,
                        data_type,
                        data,
                    };
                    let (tag, bytes) = codec.marshal(&wire)?;
                    match rpc
                        .request(Duration::from_secs(10), &receiver, &tag, bytes)
                        .await
                    {
                        Ok(_) => common_metrics::inc("floe_shuffle_sent_total", &[], 1),
                        Err(e) => {
                            common_metrics::inc("floe_shuffle_send_failures_total", &[], 1);
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    for source in sources.iter_mut() {
        source.stop().await;
    }
    let _ = eos_tx.send(true);
    Ok(())
}

#[instrument(skip_all)]
async fn reduce_task(
    mut mailbox: mpsc::Receiver<Envelope>,
    definition: Arc<Definition>,
    conn: Arc<dyn Conn>,
    trigger: Arc<dyn floe_graph::Trigger>,
    cancel: CancellationToken,
) -> Result<(), MapRedError> {
    let codec = JsonCodec;

    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            maybe = mailbox.recv() => match maybe {
                Some(e) => e,
                None => return Ok(()),
            },
        };

        if envelope.tag() != floe_rpc::KeyedEvent::TAG {
            envelope.respond_err(floe_rpc::RpcError::TagMismatch {
                expected: floe_rpc::KeyedEvent::TAG.to_string(),
                got: envelope.tag().to_string(),
            });
            continue;
        }

        let wire: floe_rpc::KeyedEvent = match codec.unmarshal(envelope.tag(), envelope.bytes()) {
            Ok(w) => w,
            Err(e) => {
                envelope.respond_err(e);
                continue;
            }
        };

        let value: Value = match serde_json::from_slice(&wire.data) {
            Ok(v) => v,
            Err(e) => {
                envelope.respond_err(floe_rpc::RpcError::Codec(e));
                continue;
            }
        };

        let ts = Utc
            .timestamp_opt(wire.ts, 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());

        let spans = match definition.window.apply(ts) {
            Ok(s) => s,
            Err(e) => {
                envelope.respond_err(floe_rpc::RpcError::Remote(e.to_string()));
                continue;
            }
        };

        let window = definition.window;
        let merger = definition.merger.clone();
        let key = wire.key.clone();

        let result = {
            let _apply_timer = common_metrics::timing_guard("floe_reduce_apply_duration_ms", &[]);
            conn.apply(
                &key,
                Box::new(move |row: &mut Row| {
                    let merge_fn = move |prior: Option<Vec<Value>>, new: Vec<Value>| merger.merge(prior, new);
                    for span in &spans {
                        window
                            .merge(span, value.clone(), row, &merge_fn)
                            .map_err(|e| floe_state::StateError::Mutator(e.to_string()))?;
                    }
                    Ok(())
                }),
            )
            .await
        };

        match result {
            Ok(_) => {
                trigger.modified(&key).await;
                envelope.ack();
            }
            Err(e) => envelope.respond_err(floe_rpc::RpcError::Remote(e.to_string())),
        }
    }
}

async fn trigger_task(
    trigger: Arc<dyn floe_graph::Trigger>,
    signal: Arc<dyn TriggerSignal>,
    mut eos_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
) -> Result<(), MapRedError> {
    let starter = trigger.clone();
    let start_fut = async move { starter.start(signal).await };
    tokio::pin!(start_fut);
    loop {
        tokio::select! {
            res = &mut start_fut => {
                return res.map_err(MapRedError::Graph);
            }
            changed = eos_rx.changed() => {
                if changed.is_ok() && *eos_rx.borrow() {
                    trigger.eos().await;
                }
            }
            _ = cancel.cancelled() => {
                trigger.stop().await;
                return Ok(());
            }
        }
    }
}
