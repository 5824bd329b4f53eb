use floe_window::{Timestamp, Value};

/// Produced by a user's `Transform` from one raw source value.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub timestamp: Timestamp,
    pub message: Value,
}

/// The output of grouping: what flows over the shuffle.
#[derive(Debug, Clone)]
pub struct KeyedEvent {
    pub timestamp: Timestamp,
    pub key: String,
    pub message: Value,
}
