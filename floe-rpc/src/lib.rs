//! The RPC/mailbox substrate contract: named mailboxes with typed
//! request/response, peer/mailbox discovery, the wire message types, a
//! `serde_json`-backed codec, and an in-memory transport for tests and
//! single-process operation.

mod codec;
mod error;
mod mailbox;
mod messages;
mod transport;

pub use codec::{Codec, JsonCodec, Tagged};
pub use error::RpcError;
pub use mailbox::{Discovery, DiscoveryEvent, Envelope, Rpc};
pub use messages::{KeyedEvent, Progress, Term};
pub use transport::InMemoryTransport;
