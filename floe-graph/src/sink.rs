use std::sync::Arc;

use floe_state::DrainSink;

use crate::GraphError;

/// Instantiates the concrete sinks for one graph instance from its declared
/// config. Sinks themselves are `floe_state::DrainSink`: the trigger
/// sub-task hands them directly to `Conn::drain`.
pub trait SinkFactory: Send + Sync {
    fn setup(
        &self,
        graph_type: &str,
        graph_name: &str,
        config: &[u8],
    ) -> Result<Vec<Arc<dyn DrainSink>>, GraphError>;
}
