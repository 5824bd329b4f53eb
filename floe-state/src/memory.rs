use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use floe_window::Span;
use tokio::sync::Mutex;

use crate::driver::{Conn, DrainSink, Driver, Mutator};
use crate::row::{Record, Row};
use crate::{StateError, Update};

/// Map-of-maps, one mutex per key: `name -> key -> (Span -> Record)`.
#[derive(Default)]
pub struct MemoryDriver {
    conns: DashMap<String, Arc<MemoryConn>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn open(&self, name: &str) -> Result<Arc<dyn Conn>, StateError> {
        let conn = self
            .conns
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryConn::default()))
            .clone();
        Ok(conn)
    }
}

#[derive(Default)]
pub struct MemoryConn {
    rows: DashMap<String, Arc<Mutex<BTreeMap<Span, Record>>>>,
}

impl MemoryConn {
    fn row_lock(&self, key: &str) -> Arc<Mutex<BTreeMap<Span, Record>>> {
        self.rows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BTreeMap::new())))
            .clone()
    }
}

#[async_trait]
impl Conn for MemoryConn {
    async fn apply(&self, key: &str, mutator: Mutator) -> Result<Vec<Update>, StateError> {
        let lock = self.row_lock(key);
        let mut guard = lock.lock().await;

        let mut row = Row::from_snapshot(guard.clone());
        mutator(&mut row)?;
        let manifest = row.flush();

        for update in &manifest {
            guard.insert(update.span, update.record.clone());
            for replaced in &update.replaces {
                if *replaced != update.span {
                    guard.remove(replaced);
                }
            }
        }
        Ok(manifest)
    }

    async fn drain(&self, keys: &[String], sink: &dyn DrainSink) -> Result<(), StateError> {
        for key in keys {
            let Some(lock) = self.rows.get(key).map(|e| e.clone()) else {
                continue;
            };
            let guard = lock.lock().await;
            for (span, record) in guard.iter() {
                sink.give(key, *span, record.values.clone()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_window::Value;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn span(start: i64, end: i64) -> Span {
        Span::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn apply_persists_across_calls() {
        let driver = MemoryDriver::new();
        let conn = driver.open("g-a").await.unwrap();

        conn.apply(
            "key1",
            Box::new(|row| {
                row.coalesce(span(0, 10), vec![], vec![json!(1)]);
                Ok(())
            }),
        )
        .await
        .unwrap();

        let manifest = conn
            .apply(
                "key1",
                Box::new(|row| {
                    let prior = row.get(&span(0, 10));
                    assert_eq!(prior, Some(vec![json!(1)]));
                    Ok(())
                }),
            )
            .await
            .unwrap();
        assert!(manifest.is_empty());
    }

    #[tokio::test]
    async fn apply_failure_leaves_state_untouched() {
        let driver = MemoryDriver::new();
        let conn = driver.open("g-b").await.unwrap();

        conn.apply(
            "key1",
            Box::new(|row| {
                row.coalesce(span(0, 10), vec![], vec![json!(1)]);
                Ok(())
            }),
        )
        .await
        .unwrap();

        let err = conn
            .apply(
                "key1",
                Box::new(|_row| Err(StateError::Mutator("boom".into()))),
            )
            .await;
        assert!(err.is_err());

        conn.apply(
            "key1",
            Box::new(|row| {
                assert_eq!(row.get(&span(0, 10)), Some(vec![json!(1)]));
                Ok(())
            }),
        )
        .await
        .unwrap();
    }

    struct CollectingSink {
        seen: StdMutex<Vec<(String, Span, Vec<Value>)>>,
    }

    #[async_trait]
    impl DrainSink for CollectingSink {
        async fn give(&self, key: &str, span: Span, values: Vec<Value>) -> Result<(), StateError> {
            self.seen
                .lock()
                .unwrap()
                .push((key.to_string(), span, values));
            Ok(())
        }
    }

    #[tokio::test]
    async fn drain_is_noop_for_absent_keys() {
        let driver = MemoryDriver::new();
        let conn = driver.open("g-c").await.unwrap();
        let sink = CollectingSink {
            seen: StdMutex::new(Vec::new()),
        };
        conn.drain(&["missing".to_string()], &sink).await.unwrap();
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drain_visits_every_span_for_present_keys() {
        let driver = MemoryDriver::new();
        let conn = driver.open("g-d").await.unwrap();
        conn.apply(
            "key1",
            Box::new(|row| {
                row.coalesce(span(0, 10), vec![], vec![json!("a")]);
                Ok(())
            }),
        )
        .await
        .unwrap();
        conn.apply(
            "key1",
            Box::new(|row| {
                row.coalesce(span(10, 20), vec![], vec![json!("b")]);
                Ok(())
            }),
        )
        .await
        .unwrap();

        let sink = CollectingSink {
            seen: StdMutex::new(Vec::new()),
        };
        conn.drain(&["key1".to_string()], &sink).await.unwrap();
        assert_eq!(sink.seen.lock().unwrap().len(), 2);
    }
}
