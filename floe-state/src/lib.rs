//! Row/Record state and the storage `Driver`/`Conn` abstraction the engine
//! uses to persist per-key, per-span windowed state, plus two concrete
//! drivers: an in-memory map-of-maps and a simple file-based KV.

mod driver;
mod error;
mod file;
mod memory;
mod row;

pub use driver::{Conn, DrainSink, Driver, Mutator};
pub use error::StateError;
pub use file::FileDriver;
pub use memory::{MemoryConn, MemoryDriver};
pub use row::{Record, Row, Update};
