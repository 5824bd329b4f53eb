use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::GraphError;

/// Invoked by a firing trigger with the keys that satisfied its predicate.
/// The MapRed process's concrete implementation calls `conn.drain` for
/// every registered sink.
#[async_trait]
pub trait TriggerSignal: Send + Sync {
    async fn signal(&self, keys: Vec<String>) -> Result<(), GraphError>;
}

/// A policy deciding when to emit per-key state to sinks. Reentrant-safe
/// under a single internal mutex; `start` runs until `stop` is called.
#[async_trait]
pub trait Trigger: Send + Sync {
    async fn modified(&self, key: &str);
    async fn start(&self, signal: Arc<dyn TriggerSignal>) -> Result<(), GraphError>;
    async fn stop(&self);

    /// Consumed only by `WhenFinished`; a no-op for the other strategies.
    /// Called once by the Map sub-task after every source has reached EOF
    /// and had `Stop` run.
    async fn eos(&self) {}
}

/// Snapshots and clears the modified-key set every `period`.
pub struct AtPeriod {
    period: Duration,
    modified: Mutex<HashSet<String>>,
    cancel: CancellationToken,
}

impl AtPeriod {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            modified: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Trigger for AtPeriod {
    async fn modified(&self, key: &str) {
        self.modified.lock().unwrap().insert(key.to_string());
    }

    async fn start(&self, signal: Arc<dyn TriggerSignal>) -> Result<(), GraphError> {
        let mut ticker = interval(self.period);
        ticker.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    let keys: Vec<String> = mem::take(&mut *self.modified.lock().unwrap())
                        .into_iter()
                        .collect();
                    if !keys.is_empty() {
                        signal.signal(keys).await?;
                        common_metrics::inc(
                            "floe_trigger_fired_total",
                            &[("trigger_kind".to_string(), "at_period".to_string())],
                            1,
                        );
                    }
                }
            }
        }
    }

    async fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Fires a key once its last modification is older than `timeout`.
pub struct WhenDormant {
    timeout: Duration,
    tick: Duration,
    modified: Mutex<HashMap<String, Instant>>,
    cancel: CancellationToken,
}

impl WhenDormant {
    pub fn new(timeout: Duration) -> Self {
        let tick = timeout.div_f64(100.0).max(Duration::from_millis(100));
        Self {
            timeout,
            tick,
            modified: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Trigger for WhenDormant {
    async fn modified(&self, key: &str) {
        self.modified
            .lock()
            .unwrap()
            .insert(key.to_string(), Instant::now());
    }

    async fn start(&self, signal: Arc<dyn TriggerSignal>) -> Result<(), GraphError> {
        let mut ticker = interval(self.tick);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dormant: Vec<String> = {
                        let mut modified = self.modified.lock().unwrap();
                        let dormant: Vec<String> = modified
                            .iter()
                            .filter(|(_, last)| now.duration_since(**last) > self.timeout)
                            .map(|(k, _)| k.clone())
                            .collect();
                        for k in &dormant {
                            modified.remove(k);
                        }
                        dormant
                    };
                    if !dormant.is_empty() {
                        signal.signal(dormant).await?;
                        common_metrics::inc(
                            "floe_trigger_fired_total",
                            &[("trigger_kind".to_string(), "when_dormant".to_string())],
                            1,
                        );
                    }
                }
            }
        }
    }

    async fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Fires a key synchronously, inside `modified`, once it has been touched
/// `n` times since its last fire.
pub struct AtCount {
    n: u64,
    modified: Mutex<HashMap<String, u64>>,
    signal: Mutex<Option<Arc<dyn TriggerSignal>>>,
    cancel: CancellationToken,
}

impl AtCount {
    pub fn new(n: u64) -> Self {
        Self {
            n,
            modified: Mutex::new(HashMap::new()),
            signal: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Trigger for AtCount {
    async fn modified(&self, key: &str) {
        let fire = {
            let mut modified = self.modified.lock().unwrap();
            let count = modified.entry(key.to_string()).or_insert(0);
            *count += 1;
            if *count >= self.n {
                modified.remove(key);
                true
            } else {
                false
            }
        };
        if fire {
            let signal = self.signal.lock().unwrap().clone();
            if let Some(signal) = signal {
                match signal.signal(vec![key.to_string()]).await {
                    Ok(()) => common_metrics::inc(
                        "floe_trigger_fired_total",
                        &[("trigger_kind".to_string(), "at_count".to_string())],
                        1,
                    ),
                    Err(e) => warn!(key, error = %e, "at-count trigger signal failed"),
                }
            }
        }
    }

    async fn start(&self, signal: Arc<dyn TriggerSignal>) -> Result<(), GraphError> {
        *self.signal.lock().unwrap() = Some(signal);
        self.cancel.cancelled().await;
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Fires every modified key once, when told the pipeline has reached
/// end-of-source.
pub struct WhenFinished {
    modified: Mutex<HashSet<String>>,
    signal: Mutex<Option<Arc<dyn TriggerSignal>>>,
    cancel: CancellationToken,
}

impl Default for WhenFinished {
    fn default() -> Self {
        Self {
            modified: Mutex::new(HashSet::new()),
            signal: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }
}

impl WhenFinished {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Trigger for WhenFinished {
    async fn modified(&self, key: &str) {
        self.modified.lock().unwrap().insert(key.to_string());
    }

    async fn start(&self, signal: Arc<dyn TriggerSignal>) -> Result<(), GraphError> {
        *self.signal.lock().unwrap() = Some(signal);
        self.cancel.cancelled().await;
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
    }

    async fn eos(&self) {
        let keys: Vec<String> = mem::take(&mut *self.modified.lock().unwrap())
            .into_iter()
            .collect();
        if keys.is_empty() {
            return;
        }
        let signal = self.signal.lock().unwrap().clone();
        if let Some(signal) = signal {
            match signal.signal(keys).await {
                Ok(()) => common_metrics::inc(
                    "floe_trigger_fired_total",
                    &[("trigger_kind".to_string(), "when_finished".to_string())],
                    1,
                ),
                Err(e) => warn!(error = %e, "when-finished trigger signal failed"),
            }
        }
    }
}

/// Declarative trigger configuration attached to a `Definition`; `build`
/// instantiates the concrete strategy.
#[derive(Debug, Clone, Copy)]
pub enum TriggerSpec {
    AtPeriod(Duration),
    WhenDormant(Duration),
    AtCount(u64),
    WhenFinished,
}

impl TriggerSpec {
    pub fn build(&self) -> Arc<dyn Trigger> {
        match self {
            TriggerSpec::AtPeriod(p) => Arc::new(AtPeriod::new(*p)),
            TriggerSpec::WhenDormant(d) => Arc::new(WhenDormant::new(*d)),
            TriggerSpec::AtCount(n) => Arc::new(AtCount::new(*n)),
            TriggerSpec::WhenFinished => Arc::new(WhenFinished::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    struct Collector {
        fired: Mutex<Vec<Vec<String>>>,
    }

    impl Collector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fired: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TriggerSignal for Collector {
        async fn signal(&self, keys: Vec<String>) -> Result<(), GraphError> {
            self.fired.lock().unwrap().push(keys);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn at_period_fires_with_accumulated_keys() {
        let trigger = Arc::new(AtPeriod::new(Duration::from_millis(10)));
        let collector = Collector::new();

        let t = trigger.clone();
        let c: Arc<dyn TriggerSignal> = collector.clone();
        let handle = tokio::spawn(async move { t.start(c).await });

        trigger.modified("a").await;
        trigger.modified("b").await;
        sleep(Duration::from_millis(25)).await;
        trigger.stop().await;
        handle.await.unwrap().unwrap();

        let fired = collector.fired.lock().unwrap();
        let all_keys: HashSet<String> = fired.iter().flatten().cloned().collect();
        assert!(all_keys.contains("a"));
        assert!(all_keys.contains("b"));
    }

    #[tokio::test]
    async fn at_count_fires_synchronously_on_threshold() {
        let trigger = AtCount::new(3);
        let collector = Collector::new();
        let c: Arc<dyn TriggerSignal> = collector.clone();

        let t = Arc::new(trigger);
        let t2 = t.clone();
        let handle = tokio::spawn(async move { t2.start(c).await });
        // Give `start` a chance to install the signal handle.
        sleep(Duration::from_millis(5)).await;

        t.modified("k").await;
        t.modified("k").await;
        assert!(collector.fired.lock().unwrap().is_empty());
        t.modified("k").await;
        assert_eq!(collector.fired.lock().unwrap().len(), 1);
        assert_eq!(collector.fired.lock().unwrap()[0], vec!["k".to_string()]);

        t.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn when_finished_fires_every_modified_key_once_on_eos() {
        let trigger = Arc::new(WhenFinished::new());
        let collector = Collector::new();
        let c: Arc<dyn TriggerSignal> = collector.clone();

        let t = trigger.clone();
        let handle = tokio::spawn(async move { t.start(c).await });
        sleep(Duration::from_millis(5)).await;

        trigger.modified("a").await;
        trigger.modified("b").await;
        trigger.eos().await;

        let fired = collector.fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        let mut keys = fired[0].clone();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        drop(fired);

        trigger.stop().await;
        let _ = timeout(Duration::from_millis(50), handle).await;
    }
}
