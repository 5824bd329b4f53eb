use async_trait::async_trait;

use crate::RegistryError;

/// A value as stored in the coordination store, tagged with the version it
/// was written at (used for compare-and-swap).
#[derive(Debug, Clone)]
pub struct VersionedValue {
    pub key: String,
    pub value: Vec<u8>,
    pub version: u64,
}

/// A single change observed on a watched prefix.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Put(VersionedValue),
    Delete { key: String },
}

/// The external coordination store: key/value with watch and
/// compare-and-swap. `floe-registry` consumes this trait; the concrete
/// backend (etcd, consul, zookeeper, ...) is out of this design's scope.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// All current values under `prefix`.
    async fn get(&self, prefix: &str) -> Result<Vec<VersionedValue>, RegistryError>;

    /// A stream of changes under `prefix`, starting after `from_revision`
    /// (0 to receive every change from now on).
    async fn watch(
        &self,
        prefix: &str,
        from_revision: u64,
    ) -> Result<tokio::sync::mpsc::Receiver<StoreEvent>, RegistryError>;

    /// Writes `value` at `key`. `expect_version` is `Some(v)` for a
    /// compare-and-swap against the current version, `None` to require the
    /// key be absent (an insert), and is otherwise an unconditional put when
    /// the store implementation treats `None` as "don't care" -- this
    /// implementation treats `None` as unconditional.
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        expect_version: Option<u64>,
    ) -> Result<u64, RegistryError>;

    async fn delete(&self, key: &str, expect_version: Option<u64>) -> Result<(), RegistryError>;
}
