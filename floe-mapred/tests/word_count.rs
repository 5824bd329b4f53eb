use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use floe_cluster::Ring;
use floe_graph::{
    Definition, Event, GraphError, GroupBy, SinkFactory, Source, SourceFactory, Transform,
    TriggerSpec,
};
use floe_mapred::MapRedProcess;
use floe_merge::Fold;
use floe_rpc::InMemoryTransport;
use floe_state::{DrainSink, MemoryDriver};
use floe_window::{Span, Value, WindowKind};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Emits a fixed sequence of lines, then EOF, matching the word-count
/// scenario: `"a a b"`, `"c"`, `""`.
struct LineSource {
    lines: std::vec::IntoIter<&'static str>,
}

#[async_trait]
impl Source for LineSource {
    async fn init(&mut self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn take(&mut self, _cancel: &CancellationToken) -> Result<Option<Value>, GraphError> {
        Ok(self.lines.next().map(|l| json!(l)))
    }

    async fn stop(&mut self) {}
}

struct LineSourceFactory;

impl SourceFactory for LineSourceFactory {
    fn setup(
        &self,
        _graph_type: &str,
        _graph_name: &str,
        _config: &[u8],
    ) -> Result<Vec<Box<dyn Source>>, GraphError> {
        Ok(vec![Box::new(LineSource {
            lines: vec!["a a b", "c", ""].into_iter(),
        })])
    }
}

/// Splits a line into one `Event` per word, `message = 1`, `id = word`.
struct SplitWords;

impl Transform for SplitWords {
    fn transform(&self, value: Value) -> Result<Vec<Event>, GraphError> {
        let line = value.as_str().unwrap_or_default();
        Ok(line
            .split_whitespace()
            .map(|w| Event {
                id: w.to_lowercase(),
                timestamp: chrono::Utc::now(),
                message: json!(1),
            })
            .collect())
    }
}

struct ByWord;

impl GroupBy for ByWord {
    fn keys(&self, event: &Event) -> Vec<String> {
        vec![event.id.clone()]
    }
}

#[derive(Default)]
struct CollectingSink {
    received: Mutex<HashMap<String, Vec<Value>>>,
}

#[async_trait]
impl DrainSink for CollectingSink {
    async fn give(&self, key: &str, _span: Span, values: Vec<Value>) -> Result<(), floe_state::StateError> {
        self.received
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(values);
        Ok(())
    }
}

struct CollectingSinkFactory {
    sink: Arc<CollectingSink>,
}

impl SinkFactory for CollectingSinkFactory {
    fn setup(
        &self,
        _graph_type: &str,
        _graph_name: &str,
        _config: &[u8],
    ) -> Result<Vec<Arc<dyn DrainSink>>, GraphError> {
        Ok(vec![self.sink.clone()])
    }
}

#[tokio::test]
async fn word_count_over_a_line_source_emits_final_counts() {
    let sink = Arc::new(CollectingSink::default());

    let definition = Definition::builder("word-count")
        .sources(Arc::new(LineSourceFactory))
        .sinks(Arc::new(CollectingSinkFactory { sink: sink.clone() }))
        .transform(Arc::new(SplitWords))
        .group_by(Arc::new(ByWord))
        .window(WindowKind::All)
        .merger(Arc::new(Fold::new(|a: Value, b: Value| {
            json!(a.as_i64().unwrap() + b.as_i64().unwrap())
        })))
        .trigger(TriggerSpec::WhenFinished)
        .build()
        .unwrap();

    let driver = Arc::new(MemoryDriver::new());
    let rpc = Arc::new(InMemoryTransport::new());

    let process = Arc::new(
        MapRedProcess::open("p1", "word-count", "g1", Arc::new(definition), driver, rpc)
            .await
            .unwrap(),
    );
    process.set_ring(Arc::new(Ring::new(&["p1".to_string()]).unwrap()));

    let handle = {
        let process = process.clone();
        tokio::spawn(async move { process.run(vec![]).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    process.stop().await;
    handle.await.unwrap().unwrap();

    let received = sink.received.lock().unwrap();
    let count_of = |word: &str| -> i64 {
        received
            .get(word)
            .and_then(|vs| vs.first())
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    };
    assert_eq!(count_of("a"), 2);
    assert_eq!(count_of("b"), 1);
    assert_eq!(count_of("c"), 1);
}
