use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("watch channel closed: {0}")]
    WatchClosed(&'static str),

    #[error(transparent)]
    PeerQueue(#[from] floe_cluster::PeerQueueError),

    #[error(transparent)]
    Ring(#[from] floe_cluster::RingError),

    #[error(transparent)]
    Rpc(#[from] floe_rpc::RpcError),

    #[error(transparent)]
    Registry(#[from] floe_registry::RegistryError),

    #[error(transparent)]
    MapRed(#[from] floe_mapred::MapRedError),

    #[error(transparent)]
    Graph(#[from] floe_graph::GraphError),

    #[error(transparent)]
    State(#[from] floe_state::StateError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no graph definition registered for type {0}")]
    UnknownGraphType(String),
}
