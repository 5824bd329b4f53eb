//! Cluster-membership and placement primitives: `PeerQueue` tracks who is
//! alive and which actors run where; `Ring` derives a deterministic
//! key-to-peer partition table from a roster so reducers converge without
//! coordination.

mod peer_queue;
mod ring;

pub use peer_queue::{ActorStart, PeerQueue, PeerQueueError, PeerState, RelocationPlan};
pub use ring::{Ring, RingError, RING_SIZE};
