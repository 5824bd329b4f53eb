use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::store::{CoordinationStore, StoreEvent, VersionedValue};
use crate::RegistryError;

struct Entry {
    value: Vec<u8>,
    version: u64,
}

struct Inner {
    entries: RwLock<BTreeMap<String, Entry>>,
    changes: broadcast::Sender<StoreEvent>,
}

/// An in-memory `CoordinationStore`: sufficient for tests and for running a
/// single-process cluster without an external etcd/consul-equivalent.
/// `from_revision` is accepted by `watch` but not honored for historic
/// replay -- this store keeps no change log, only current values.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(BTreeMap::new()),
                changes,
            }),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn get(&self, prefix: &str) -> Result<Vec<VersionedValue>, RegistryError> {
        let entries = self.inner.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| VersionedValue {
                key: k.clone(),
                value: e.value.clone(),
                version: e.version,
            })
            .collect())
    }

    async fn watch(
        &self,
        prefix: &str,
        _from_revision: u64,
    ) -> Result<mpsc::Receiver<StoreEvent>, RegistryError> {
        let mut rx = self.inner.changes.subscribe();
        let (tx, out) = mpsc::channel(256);
        let prefix = prefix.to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let matches = match &event {
                            StoreEvent::Put(v) => v.key.starts_with(&prefix),
                            StoreEvent::Delete { key } => key.starts_with(&prefix),
                        };
                        if matches && tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(out)
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        expect_version: Option<u64>,
    ) -> Result<u64, RegistryError> {
        let mut entries = self.inner.entries.write().await;
        let current = entries.get(key).map(|e| e.version);
        if let Some(expected) = expect_version {
            if current != Some(expected) {
                return Err(RegistryError::CasConflict {
                    key: key.to_string(),
                    expected: Some(expected),
                    found: current,
                });
            }
        }
        let next_version = current.unwrap_or(0) + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                version: next_version,
            },
        );
        let _ = self.inner.changes.send(StoreEvent::Put(VersionedValue {
            key: key.to_string(),
            value,
            version: next_version,
        }));
        Ok(next_version)
    }

    async fn delete(&self, key: &str, expect_version: Option<u64>) -> Result<(), RegistryError> {
        let mut entries = self.inner.entries.write().await;
        let current = entries.get(key).map(|e| e.version);
        if let Some(expected) = expect_version {
            if current != Some(expected) {
                return Err(RegistryError::CasConflict {
                    key: key.to_string(),
                    expected: Some(expected),
                    found: current,
                });
            }
        }
        entries.remove(key);
        let _ = self.inner.changes.send(StoreEvent::Delete {
            key: key.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryStore::new();
        store.put("a.b.c", b"hello".to_vec(), None).await.unwrap();
        let got = store.get("a.b.").await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].value, b"hello".to_vec());
    }

    #[tokio::test]
    async fn cas_conflict_on_wrong_version() {
        let store = InMemoryStore::new();
        let v1 = store.put("k", b"v1".to_vec(), None).await.unwrap();
        assert_eq!(v1, 1);
        let err = store.put("k", b"v2".to_vec(), Some(99)).await;
        assert!(matches!(err, Err(RegistryError::CasConflict { .. })));
        store.put("k", b"v2".to_vec(), Some(1)).await.unwrap();
    }

    #[tokio::test]
    async fn watch_observes_future_puts_under_prefix() {
        let store = InMemoryStore::new();
        let mut rx = store.watch("flo.ns.graph.", 0).await.unwrap();
        store
            .put("flo.ns.graph.wc.g1", b"{}".to_vec(), None)
            .await
            .unwrap();
        store
            .put("flo.other.thing", b"{}".to_vec(), None)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        match event {
            StoreEvent::Put(v) => assert_eq!(v.key, "flo.ns.graph.wc.g1"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
