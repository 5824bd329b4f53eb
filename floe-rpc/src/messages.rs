use serde::{Deserialize, Serialize};

/// Leader-to-worker cluster roster, used to build a `floe_cluster::Ring`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub peers: Vec<String>,
}

impl Term {
    pub const TAG: &'static str = "floe.Term";
}

/// The shuffle payload: a grouped, windowed event en route to its reducer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedEvent {
    /// Seconds since epoch.
    pub ts: i64,
    pub key: String,
    pub data_type: String,
    pub data: Vec<u8>,
}

impl KeyedEvent {
    pub const TAG: &'static str = "floe.KeyedEvent";
}

/// Reserved for watermarking; carries end-of-source signals consumed by the
/// `WhenFinished` trigger via a `Heuristic` tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub peer: String,
    pub graph: String,
    pub source: Vec<String>,
    pub done: bool,
    pub min_event_time: Option<i64>,
}

impl Progress {
    pub const TAG: &'static str = "floe.Progress";
}
