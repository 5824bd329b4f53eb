//! A single built-in graph type so the binary is runnable out of the box:
//! counts words read line by line from stdin. Real deployments register
//! their own graph types into the `GraphRegistry` the same way before
//! calling `floe_runtime::Worker::run`; this crate carries no external
//! plugin-loading mechanism, so the reference set is compiled in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use floe_graph::{Definition, Event, GraphError, GroupBy, Source, SourceFactory, SinkFactory, Transform};
use floe_merge::Fold;
use floe_state::{DrainSink, StateError};
use floe_window::{Span, Value, WindowKind};
use floe_graph::TriggerSpec;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const WORD_COUNT: &str = "word-count";

struct StdinSource {
    lines: tokio::io::Lines<BufReader<tokio::io::Stdin>>,
}

#[async_trait]
impl Source for StdinSource {
    async fn init(&mut self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn take(&mut self, cancel: &CancellationToken) -> Result<Option<Value>, GraphError> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            line = self.lines.next_line() => {
                let line = line.map_err(|e| GraphError::Source(e.to_string()))?;
                Ok(line.map(Value::from))
            }
        }
    }

    async fn stop(&mut self) {}
}

struct StdinSourceFactory;

impl SourceFactory for StdinSourceFactory {
    fn setup(
        &self,
        _graph_type: &str,
        _graph_name: &str,
        _config: &[u8],
    ) -> Result<Vec<Box<dyn Source>>, GraphError> {
        Ok(vec![Box::new(StdinSource {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        })])
    }
}

struct SplitWords;

impl Transform for SplitWords {
    fn transform(&self, value: Value) -> Result<Vec<Event>, GraphError> {
        let line = value.as_str().unwrap_or_default();
        Ok(line
            .split_whitespace()
            .map(|w| Event {
                id: w.to_lowercase(),
                timestamp: Utc::now(),
                message: serde_json::json!(1),
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

struct LoggingSink;

#[async_trait]
impl DrainSink for LoggingSink {
    async fn give(&self, key: &str, span: Span, values: Vec<Value>) -> Result<(), StateError> {
        let total: i64 = values.iter().filter_map(|v| v.as_i64()).sum();
        info!(key, start = span.start(), end = span.end(), total, "word count drained");
        Ok(())
    }
}

struct LoggingSinkFactory;

impl SinkFactory for LoggingSinkFactory {
    fn setup(
        &self,
        _graph_type: &str,
        _graph_name: &str,
        _config: &[u8],
    ) -> Result<Vec<Arc<dyn DrainSink>>, GraphError> {
        Ok(vec![Arc::new(LoggingSink)])
    }
}

fn sum(a: Value, b: Value) -> Value {
    serde_json::json!(a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0))
}

pub fn word_count_definition() -> Definition {
    Definition::builder(WORD_COUNT)
        .sources(Arc::new(StdinSourceFactory))
        .sinks(Arc::new(LoggingSinkFactory))
        .transform(Arc::new(SplitWords))
        .group_by(Arc::new(ByWord))
        .window(WindowKind::All)
        .merger(Arc::new(Fold::new(sum)))
        .trigger(TriggerSpec::AtPeriod(Duration::from_secs(10)))
        .build()
        .expect("built-in word-count definition is well-formed")
}
