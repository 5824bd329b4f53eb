use std::sync::Arc;

use async_trait::async_trait;
use floe_window::{Span, Value};

use crate::{Row, StateError, Update};

/// A mutation over a single key's row state. The engine never mutates
/// storage outside of this closure.
pub type Mutator = Box<dyn FnOnce(&mut Row) -> Result<(), StateError> + Send>;

/// Receives drained `(key, span, values)` triples; adapted by the mapred
/// layer from a graph's declared sinks so this crate has no dependency on
/// sink/source adapter types.
#[async_trait]
pub trait DrainSink: Send + Sync {
    async fn give(&self, key: &str, span: Span, values: Vec<Value>) -> Result<(), StateError>;
}

/// A single opened storage connection. May batch mutations internally; the
/// engine assumes per-key atomicity of one `apply` call and no cross-key
/// ordering guarantees.
#[async_trait]
pub trait Conn: Send + Sync {
    async fn apply(&self, key: &str, mutator: Mutator) -> Result<Vec<Update>, StateError>;

    /// Walk `keys` and invoke `sink.give` for every span present under each.
    /// A key with no state is a no-op.
    async fn drain(&self, keys: &[String], sink: &dyn DrainSink) -> Result<(), StateError>;
}

/// Opens named, independent connections. Each graph instance opens one conn
/// named `"<peer>-<graphType>-<graphName>"`.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn open(&self, name: &str) -> Result<Arc<dyn Conn>, StateError>;
}
