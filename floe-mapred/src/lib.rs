//! The MapRed process: one instance per `(peer, graphType, graphName)`,
//! running the Map, Reduce and Trigger sub-tasks that make up a graph
//! instance's data path.

mod error;
mod process;
mod ring_cell;

pub use error::MapRedError;
pub use process::MapRedProcess;
pub use ring_cell::RingCell;
