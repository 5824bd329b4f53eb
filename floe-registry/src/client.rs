use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::store::{CoordinationStore, StoreEvent};
use crate::types::{registration_key, Registration, Wanted, WatchEvent};
use crate::RegistryError;

/// Registry configuration: `namespace` partitions the keyspace so multiple
/// clusters can share one coordination store. Empty namespace is a
/// configuration error, rejected at construction.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub namespace: String,
    pub driver: String,
}

impl Cfg {
    pub fn new(namespace: impl Into<String>, driver: impl Into<String>) -> Result<Self, RegistryError> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(RegistryError::EmptyNamespace);
        }
        Ok(Self {
            namespace,
            driver: driver.into(),
        })
    }
}

/// The registry's CLI/client surface: create, terminate and watch graph
/// registrations under `flo.<namespace>.graph.<type>.<name>`.
pub struct Client {
    store: Arc<dyn CoordinationStore>,
    namespace: String,
}

impl Client {
    pub fn new(store: Arc<dyn CoordinationStore>, cfg: Cfg) -> Self {
        Self {
            store,
            namespace: cfg.namespace,
        }
    }

    fn key(&self, graph_type: &str, name: &str) -> String {
        registration_key(&self.namespace, graph_type, name)
    }

    /// Creates a registration with `wanted=running`, or flips `wanted` back
    /// to `running` if one already exists under this (type, name).
    pub async fn run_graph(
        &self,
        graph_type: &str,
        name: &str,
        config: Vec<u8>,
    ) -> Result<(), RegistryError> {
        self.set_wanted_or_create(graph_type, name, Wanted::Running, Some(config))
            .await
    }

    /// Sets `wanted=terminating` on an existing registration.
    pub async fn terminate_graph(&self, graph_type: &str, name: &str) -> Result<(), RegistryError> {
        self.set_wanted(graph_type, name, Wanted::Terminating).await
    }

    /// Reads the current registration for `(type, name)`, if any.
    pub async fn select(&self, graph_type: &str, name: &str) -> Result<Registration, RegistryError> {
        let key = self.key(graph_type, name);
        let values = self.store.get(&key).await?;
        match values.len() {
            0 => Err(RegistryError::ErrZeroValues(key)),
            1 => Ok(serde_json::from_slice(&values[0].value)?),
            _ => Err(RegistryError::MultipleValues(key)),
        }
    }

    /// Retries a CAS conflict on `SetWanted` once against the freshly read
    /// version; conflicts are only ever retried locally, never escalated.
    async fn set_wanted(&self, graph_type: &str, name: &str, wanted: Wanted) -> Result<(), RegistryError> {
        let key = self.key(graph_type, name);
        for attempt in 0..2 {
            let values = self.store.get(&key).await?;
            let Some(current) = values.into_iter().next() else {
                return Err(RegistryError::ErrZeroValues(key));
            };
            let mut reg: Registration = serde_json::from_slice(&current.value)?;
            reg.wanted = wanted;
            let encoded = serde_json::to_vec(&reg)?;
            match self.store.put(&key, encoded, Some(current.version)).await {
                Ok(_) => return Ok(()),
                Err(RegistryError::CasConflict { .. }) if attempt == 0 => {
                    warn!(key = %key, "cas conflict setting wanted, retrying once");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop returns or propagates on every iteration")
    }

    async fn set_wanted_or_create(
        &self,
        graph_type: &str,
        name: &str,
        wanted: Wanted,
        config: Option<Vec<u8>>,
    ) -> Result<(), RegistryError> {
        let key = self.key(graph_type, name);
        let existing = self.store.get(&key).await?;
        if let Some(current) = existing.into_iter().next() {
            let mut reg: Registration = serde_json::from_slice(&current.value)?;
            reg.wanted = wanted;
            if let Some(cfg) = config {
                reg.config = cfg;
            }
            let encoded = serde_json::to_vec(&reg)?;
            self.store.put(&key, encoded, Some(current.version)).await?;
            return Ok(());
        }
        let reg = Registration::new(graph_type, name, wanted, config.unwrap_or_default());
        let encoded = serde_json::to_vec(&reg)?;
        self.store.put(&key, encoded, None).await?;
        info!(graph_type, name, "registered new graph");
        Ok(())
    }

    pub async fn delete(&self, graph_type: &str, name: &str) -> Result<(), RegistryError> {
        let key = self.key(graph_type, name);
        self.store.delete(&key, None).await
    }

    /// Delivers the current entries then live events for every graph under
    /// this namespace.
    pub async fn watch(&self) -> Result<mpsc::Receiver<WatchEvent>, RegistryError> {
        let prefix = format!("flo.{}.graph.", self.namespace);
        let current = self.store.get(&prefix).await?;
        let mut store_events = self.store.watch(&prefix, 0).await?;

        let (tx, rx) = mpsc::channel(256);
        for v in current {
            match serde_json::from_slice::<Registration>(&v.value) {
                Ok(reg) => {
                    count_watch_event("put");
                    if tx.send(WatchEvent::Put(reg)).await.is_err() {
                        return Ok(rx);
                    }
                }
                Err(e) => {
                    count_watch_event("error");
                    let _ = tx.send(WatchEvent::Error(e.to_string())).await;
                }
            }
        }

        tokio::spawn(async move {
            while let Some(event) = store_events.recv().await {
                let mapped = match event {
                    StoreEvent::Put(v) => match serde_json::from_slice::<Registration>(&v.value) {
                        Ok(reg) => {
                            count_watch_event("put");
                            WatchEvent::Put(reg)
                        }
                        Err(e) => {
                            count_watch_event("error");
                            WatchEvent::Error(e.to_string())
                        }
                    },
                    StoreEvent::Delete { key } => {
                        let Some((graph_type, name)) = parse_graph_key(&key) else {
                            continue;
                        };
                        count_watch_event("delete");
                        WatchEvent::Delete { graph_type, name }
                    }
                };
                if tx.send(mapped).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

fn count_watch_event(event_type: &'static str) {
    common_metrics::inc(
        "floe_registry_watch_events_total",
        &[("event_type".to_string(), event_type.to_string())],
        1,
    );
}

fn parse_graph_key(key: &str) -> Option<(String, String)> {
    let mut parts = key.rsplitn(3, '.');
    let name = parts.next()?;
    let graph_type = parts.next()?;
    Some((graph_type.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    fn client() -> Client {
        let store = Arc::new(InMemoryStore::new());
        Client::new(store, Cfg::new("ns", "memory").unwrap())
    }

    #[test]
    fn empty_namespace_is_rejected() {
        assert!(matches!(Cfg::new("", "memory"), Err(RegistryError::EmptyNamespace)));
    }

    #[tokio::test]
    async fn round_trip_insert_select_set_wanted_delete() {
        let c = client();
        c.run_graph("wc", "g1", b"cfg".to_vec()).await.unwrap();

        let reg = c.select("wc", "g1").await.unwrap();
        assert_eq!(reg.wanted, Wanted::Running);
        assert_eq!(reg.config, b"cfg".to_vec());

        c.terminate_graph("wc", "g1").await.unwrap();
        let reg = c.select("wc", "g1").await.unwrap();
        assert_eq!(reg.wanted, Wanted::Terminating);

        c.delete("wc", "g1").await.unwrap();
        assert!(matches!(
            c.select("wc", "g1").await,
            Err(RegistryError::ErrZeroValues(_))
        ));
    }

    #[tokio::test]
    async fn run_graph_flips_wanted_back_to_running_if_present() {
        let c = client();
        c.run_graph("wc", "g1", b"cfg".to_vec()).await.unwrap();
        c.terminate_graph("wc", "g1").await.unwrap();
        c.run_graph("wc", "g1", b"cfg2".to_vec()).await.unwrap();
        let reg = c.select("wc", "g1").await.unwrap();
        assert_eq!(reg.wanted, Wanted::Running);
        assert_eq!(reg.config, b"cfg2".to_vec());
    }

    #[tokio::test]
    async fn watch_delivers_current_entries_then_live_events() {
        let c = client();
        c.run_graph("wc", "g1", vec![]).await.unwrap();
        let mut rx = c.watch().await.unwrap();

        let first = rx.recv().await.unwrap();
        match first {
            WatchEvent::Put(reg) => assert_eq!(reg.name, "g1"),
            other => panic!("unexpected {other:?}"),
        }

        c.run_graph("wc", "g2", vec![]).await.unwrap();
        let second = rx.recv().await.unwrap();
        match second {
            WatchEvent::Put(reg) => assert_eq!(reg.name, "g2"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
