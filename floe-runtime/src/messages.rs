use floe_rpc::Tagged;
use serde::{Deserialize, Serialize};

/// Sent by the leader's worker watcher to demand that a peer start a worker
/// actor. Internal to this crate's leader/worker handshake, not part of the
/// external wire contract users of this engine see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartActor {
    pub actor_type: String,
    pub name: String,
    pub target_peer: String,
    pub config: Vec<u8>,
}

impl Tagged for StartActor {
    const TAG: &'static str = "floe.runtime.StartActor";
}
