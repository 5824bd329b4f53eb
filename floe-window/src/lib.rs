//! Spans and window strategies: the leaf primitives the rest of the engine
//! builds keyed, timestamped state on top of.

mod span;
mod strategy;

pub use span::{Span, SpanError, ALL_SPAN};
pub use strategy::{WindowError, WindowKind};

/// The dynamic, tagged-union-shaped payload the engine carries end to end:
/// events, row values and sink output are all this type. There is no
/// reflection at steady state -- values are only ever inspected by user
/// transforms and mergers, never by the engine itself.
pub type Value = serde_json::Value;

/// Absolute event time, second resolution.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A read/stage view onto a single key's `Span -> Record` state, as seen by
/// a window strategy's `merge`. Implemented by `floe_state::Row`; kept as a
/// trait here so window strategies have no dependency on the storage layer.
pub trait RowView {
    /// Staged value for `span` if it was coalesced earlier in this mutation,
    /// else the pre-mutation snapshot value, else `None`.
    fn get(&self, span: &Span) -> Option<Vec<Value>>;

    /// All spans visible in the current view (pre-mutation snapshot plus
    /// anything already staged this mutation).
    fn spans(&self) -> Vec<Span>;

    /// Stage a write: `new_span` will hold `values` once flushed, and every
    /// span in `replaced` will be deleted. `replaced` may include `new_span`
    /// itself (an in-place update of an existing span).
    fn coalesce(&mut self, new_span: Span, replaced: Vec<Span>, values: Vec<Value>);
}

/// A window strategy's merge combinator, supplied by the caller (normally a
/// `floe_merge::Merger` adapted to this signature). `prior` is `None` when
/// the target span has no existing value.
pub type MergeFn<'a> = dyn Fn(Option<Vec<Value>>, Vec<Value>) -> Vec<Value> + 'a;

/// The stable type tag for a dynamic `Value`, used wherever a span or wire
/// message needs a label for the shape of its payload (the file storage
/// driver's envelope, the RPC codec). All elements sharing one span or one
/// envelope must report the same tag.
pub fn value_tag(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
