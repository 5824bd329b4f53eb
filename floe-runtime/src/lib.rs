//! The leader/worker actor runtime: cluster role coordination built on top
//! of `floe-cluster`'s `PeerQueue`, `floe-rpc`'s mailboxes, `floe-registry`'s
//! graph intents and `floe-mapred`'s per-graph process.

mod error;
mod leader;
mod messages;
mod worker;

pub use error::RuntimeError;
pub use leader::{Leader, LEADER_MAILBOX};
pub use worker::Worker;
