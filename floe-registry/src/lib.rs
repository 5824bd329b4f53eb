//! The external coordination store contract (`CoordinationStore`), an
//! in-memory reference implementation, and the registry client surface used
//! to create/terminate/watch graph registrations.

mod client;
mod error;
mod memory;
mod store;
mod types;

pub use client::{Cfg, Client};
pub use error::RegistryError;
pub use memory::InMemoryStore;
pub use store::{CoordinationStore, StoreEvent, VersionedValue};
pub use types::{registration_key, Registration, Wanted, WatchEvent};
