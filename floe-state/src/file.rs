//! A file-based KV driver: each conn is a single file on disk holding
//! length-delimited records keyed by `<keyPrefix>@<spanKey>`. Values are a
//! small envelope `{clock, count, dataType, data: [bytes]}` where `data` is
//! one serialized element per entry and `dataType` is the tag of the first
//! element -- all elements in one span must share a type.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use floe_window::{value_tag, Span};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::driver::{Conn, DrainSink, Driver, Mutator};
use crate::row::{Record, Row};
use crate::StateError;

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Envelope {
    clock: u64,
    count: u64,
    data_type: String,
    data: Vec<Vec<u8>>,
}

fn encode_record(record: &Record) -> Result<Envelope, StateError> {
    let data_type = record
        .values
        .first()
        .map(value_tag)
        .unwrap_or("null")
        .to_string();
    let mut data = Vec::with_capacity(record.values.len());
    for v in &record.values {
        let tag = value_tag(v);
        if tag != data_type {
            return Err(StateError::TypeMismatch {
                span: Vec::new(),
                expected: data_type,
                actual: tag.to_string(),
            });
        }
        data.push(serde_json::to_vec(v)?);
    }
    Ok(Envelope {
        clock: record.clock,
        count: record.count,
        data_type,
        data,
    })
}

fn decode_record(envelope: &Envelope) -> Result<Record, StateError> {
    let mut values = Vec::with_capacity(envelope.data.len());
    for bytes in &envelope.data {
        values.push(serde_json::from_slice(bytes)?);
    }
    Ok(Record {
        clock: envelope.clock,
        count: envelope.count,
        values,
    })
}

fn composite_key(key_prefix: &str, span: &Span) -> Vec<u8> {
    let mut out = key_prefix.as_bytes().to_vec();
    out.push(b'@');
    out.extend_from_slice(&span.key());
    out
}

/// Length-delimited on-disk layout: a sequence of `(u32 key_len, key bytes,
/// u32 value_len, value bytes)` records. The whole file is rewritten on
/// every flush -- adequate for the engine's at-least-once semantics and the
/// small working sets `Drain` operates over; not an append-only log.
fn write_file(path: &Path, entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), StateError> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        for (k, v) in entries {
            f.write_all(&(k.len() as u32).to_be_bytes())?;
            f.write_all(k)?;
            f.write_all(&(v.len() as u32).to_be_bytes())?;
            f.write_all(v)?;
        }
        f.flush()?;
    }
    std::fs::rename(tmp, path)?;
    Ok(())
}

fn read_file(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StateError> {
    let mut out = BTreeMap::new();
    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let mut pos = 0usize;
    while pos < buf.len() {
        let klen = read_u32(&buf, &mut pos)?;
        let key = read_bytes(&buf, &mut pos, klen)?;
        let vlen = read_u32(&buf, &mut pos)?;
        let val = read_bytes(&buf, &mut pos, vlen)?;
        out.insert(key, val);
    }
    Ok(out)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<usize, StateError> {
    if *pos + 4 > buf.len() {
        return Err(StateError::CorruptEnvelope("truncated length prefix".into()));
    }
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[*pos..*pos + 4]);
    *pos += 4;
    Ok(u32::from_be_bytes(b) as usize)
}

fn read_bytes(buf: &[u8], pos: &mut usize, len: usize) -> Result<Vec<u8>, StateError> {
    if *pos + len > buf.len() {
        return Err(StateError::CorruptEnvelope("truncated record body".into()));
    }
    let out = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(out)
}

pub struct FileDriver {
    base_dir: PathBuf,
    conns: DashMap<String, Arc<FileConn>>,
}

impl FileDriver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            conns: DashMap::new(),
        }
    }
}

#[async_trait]
impl Driver for FileDriver {
    async fn open(&self, name: &str) -> Result<Arc<dyn Conn>, StateError> {
        if let Some(existing) = self.conns.get(name) {
            return Ok(existing.clone());
        }
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.base_dir.join(format!("{name}.floekv"));
        let conn = Arc::new(FileConn {
            path,
            guard: Mutex::new(()),
        });
        self.conns.insert(name.to_string(), conn.clone());
        Ok(conn)
    }
}

pub struct FileConn {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileConn {
    fn rows_for(entries: &BTreeMap<Vec<u8>, Vec<u8>>, key: &str) -> Result<BTreeMap<Span, Record>, StateError> {
        let prefix = {
            let mut p = key.as_bytes().to_vec();
            p.push(b'@');
            p
        };
        let mut rows = BTreeMap::new();
        for (k, v) in entries.range(prefix.clone()..) {
            if !k.starts_with(&prefix) {
                break;
            }
            let span_key = &k[prefix.len()..];
            let span = Span::from_key(span_key)?;
            let envelope: Envelope = serde_json::from_slice(v)?;
            rows.insert(span, decode_record(&envelope)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl Conn for FileConn {
    async fn apply(&self, key: &str, mutator: Mutator) -> Result<Vec<crate::Update>, StateError> {
        let _permit = self.guard.lock().await;
        let mut entries = read_file(&self.path)?;
        let snapshot = Self::rows_for(&entries, key)?;

        let mut row = Row::from_snapshot(snapshot);
        mutator(&mut row)?;
        let manifest = row.flush();

        for update in &manifest {
            let envelope = encode_record(&update.record)?;
            entries.insert(composite_key(key, &update.span), serde_json::to_vec(&envelope)?);
            for replaced in &update.replaces {
                if replaced != &update.span {
                    entries.remove(&composite_key(key, replaced));
                }
            }
        }
        write_file(&self.path, &entries)?;
        Ok(manifest)
    }

    async fn drain(&self, keys: &[String], sink: &dyn DrainSink) -> Result<(), StateError> {
        let _permit = self.guard.lock().await;
        let entries = read_file(&self.path)?;
        for key in keys {
            let rows = Self::rows_for(&entries, key)?;
            for (span, record) in rows {
                sink.give(key, span, record.values).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn span(start: i64, end: i64) -> Span {
        Span::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FileDriver::new(dir.path());
        let conn = driver.open("g-file").await.unwrap();

        conn.apply(
            "key1",
            Box::new(|row| {
                row.coalesce(span(0, 10), vec![], vec![json!("a"), json!("b")]);
                Ok(())
            }),
        )
        .await
        .unwrap();

        // Re-open to force a fresh read from disk.
        drop(conn);
        let driver2 = FileDriver::new(dir.path());
        let conn2 = driver2.open("g-file").await.unwrap();
        conn2
            .apply(
                "key1",
                Box::new(|row| {
                    assert_eq!(row.get(&span(0, 10)), Some(vec![json!("a"), json!("b")]));
                    Ok(())
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_mixed_types_in_one_span() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FileDriver::new(dir.path());
        let conn = driver.open("g-mixed").await.unwrap();

        let err = conn
            .apply(
                "key1",
                Box::new(|row| {
                    row.coalesce(span(0, 10), vec![], vec![json!("a"), json!(1)]);
                    Ok(())
                }),
            )
            .await;
        assert!(matches!(err, Err(StateError::TypeMismatch { .. })));
    }
}
