//! Public graph surface: the `Event`/`KeyedEvent` types a user's `Transform`
//! and `GroupBy` operate on, the `Source`/`Sink` factory traits a graph
//! declares, the `Trigger` strategies that decide when state drains, and the
//! `Definition`/`GraphRegistry` that bundle a graph type into something the
//! MapRed process can run.

mod definition;
mod error;
mod event;
mod sink;
mod source;
mod transform;
mod trigger;

pub use definition::{Definition, DefinitionBuilder, GraphRegistry};
pub use error::GraphError;
pub use event::{Event, KeyedEvent};
pub use sink::SinkFactory;
pub use source::{Source, SourceFactory};
pub use transform::{group_and_window_by, GroupBy, Transform};
pub use trigger::{AtCount, AtPeriod, Trigger, TriggerSignal, TriggerSpec, WhenDormant, WhenFinished};
