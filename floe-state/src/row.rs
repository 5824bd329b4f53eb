use std::collections::{BTreeMap, HashSet};

use floe_window::{RowView, Span, Value};

/// Per-span state: `count` counts merges into that span, `clock` is a
/// monotonic per-span version counter, `values` is the merged payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub clock: u64,
    pub count: u64,
    pub values: Vec<Value>,
}

/// A staged write: `new_span` will hold `values` once flushed, and every
/// span in `replaced` is deleted (it may include `new_span` itself, for an
/// in-place update).
#[derive(Debug, Clone)]
struct Coalesce {
    new_span: Span,
    replaced: Vec<Span>,
    values: Vec<Value>,
}

/// The result of flushing one staged coalesce: the record written at the new
/// span, and the spans it replaced (for the driver to delete).
#[derive(Debug, Clone)]
pub struct Update {
    pub span: Span,
    pub record: Record,
    pub replaces: Vec<Span>,
}

/// A builder over a single key's `Span -> Record` state. Constructed from a
/// pre-mutation snapshot; callers stage `Coalesce` operations and then
/// `flush` once to compute the update manifest in a single step, removing
/// the need for nested transactions.
pub struct Row {
    snapshot: BTreeMap<Span, Record>,
    staged: Vec<Coalesce>,
}

impl Row {
    pub fn from_snapshot(snapshot: BTreeMap<Span, Record>) -> Self {
        Self {
            snapshot,
            staged: Vec::new(),
        }
    }

    pub fn is_empty_mutation(&self) -> bool {
        self.staged.is_empty()
    }

    /// Apply every staged coalesce (in order) and return the manifest. Also
    /// updates the in-memory snapshot so subsequent calls on the same `Row`
    /// (there should be none within one `Apply`, but tests find this handy)
    /// observe the new state.
    pub fn flush(&mut self) -> Vec<Update> {
        let mut manifest = Vec::with_capacity(self.staged.len());
        for c in self.staged.drain(..) {
            let mut max_clock = 0u64;
            let mut sum_count = 0u64;
            for r in &c.replaced {
                if let Some(rec) = self.snapshot.remove(r) {
                    max_clock = max_clock.max(rec.clock);
                    sum_count += rec.count;
                }
            }
            let record = Record {
                clock: max_clock + 1,
                count: sum_count + 1,
                values: c.values,
            };
            self.snapshot.insert(c.new_span, record.clone());
            manifest.push(Update {
                span: c.new_span,
                record,
                replaces: c.replaced,
            });
        }
        manifest
    }
}

impl RowView for Row {
    fn get(&self, span: &Span) -> Option<Vec<Value>> {
        for c in self.staged.iter().rev() {
            if &c.new_span == span {
                return Some(c.values.clone());
            }
        }
        for c in &self.staged {
            if c.replaced.contains(span) {
                return None;
            }
        }
        self.snapshot.get(span).map(|r| r.values.clone())
    }

    fn spans(&self) -> Vec<Span> {
        let mut replaced: HashSet<Span> = HashSet::new();
        for c in &self.staged {
            for r in &c.replaced {
                replaced.insert(*r);
            }
        }
        let mut out: Vec<Span> = self
            .snapshot
            .keys()
            .filter(|s| !replaced.contains(s))
            .copied()
            .collect();
        for c in &self.staged {
            if !out.contains(&c.new_span) {
                out.push(c.new_span);
            }
        }
        out
    }

    fn coalesce(&mut self, new_span: Span, replaced: Vec<Span>, values: Vec<Value>) {
        self.staged.push(Coalesce {
            new_span,
            replaced,
            values,
        });
    }
}
