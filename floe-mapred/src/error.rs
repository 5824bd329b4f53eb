use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapRedError {
    #[error("ring channel closed before a ring was delivered")]
    RingChannelClosed,

    #[error(transparent)]
    State(#[from] floe_state::StateError),

    #[error(transparent)]
    Graph(#[from] floe_graph::GraphError),

    #[error(transparent)]
    Window(#[from] floe_window::WindowError),

    #[error(transparent)]
    Rpc(#[from] floe_rpc::RpcError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("mailbox closed for process {0}")]
    MailboxClosed(String),
}
