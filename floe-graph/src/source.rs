use async_trait::async_trait;
use floe_window::Value;
use tokio_util::sync::CancellationToken;

use crate::GraphError;

/// A raw record source. `init` runs once before the first `take`; `take`
/// loops until it returns `Ok(None)` (EOF) or the cancellation token fires;
/// `stop` runs on exit regardless of outcome.
#[async_trait]
pub trait Source: Send {
    async fn init(&mut self) -> Result<(), GraphError>;
    async fn take(&mut self, cancel: &CancellationToken) -> Result<Option<Value>, GraphError>;
    async fn stop(&mut self);
}

/// Instantiates the concrete sources for one graph instance from its
/// declared config, called once by the MapRed process at startup.
pub trait SourceFactory: Send + Sync {
    fn setup(
        &self,
        graph_type: &str,
        graph_name: &str,
        config: &[u8],
    ) -> Result<Vec<Box<dyn Source>>, GraphError>;
}
